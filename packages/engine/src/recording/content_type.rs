// packages/engine/src/recording/content_type.rs
//! Content-type classification and body pretty-printing

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

static JSON_CONTENT_TYPE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^application/(vnd\.(.*)\+)?json$").expect("static pattern compiles")
});

/// Coarse semantic category of a body ("short type")
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub enum ShortType {
    #[serde(rename = "JSON")]
    Json,
    #[serde(rename = "XML")]
    Xml,
    #[serde(rename = "HTML")]
    Html,
    #[serde(rename = "Image")]
    Image,
    #[default]
    #[serde(rename = "Other")]
    Other,
}

impl ShortType {
    pub const ALL: [ShortType; 5] = [
        ShortType::Json,
        ShortType::Xml,
        ShortType::Html,
        ShortType::Image,
        ShortType::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ShortType::Json => "JSON",
            ShortType::Xml => "XML",
            ShortType::Html => "HTML",
            ShortType::Image => "Image",
            ShortType::Other => "Other",
        }
    }
}

impl fmt::Display for ShortType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classify a bare MIME type (parameters already stripped)
pub fn classify(content_type: &str) -> ShortType {
    if JSON_CONTENT_TYPE.is_match(content_type) {
        ShortType::Json
    } else if content_type == "application/xml" || content_type == "text/xml" {
        ShortType::Xml
    } else if content_type == "text/html" {
        ShortType::Html
    } else if content_type.starts_with("image/") {
        ShortType::Image
    } else {
        ShortType::Other
    }
}

/// Strip `; charset=...` style parameters from a header value
pub fn mime_type(content_type: &str) -> &str {
    content_type.split(';').next().unwrap_or("").trim()
}

/// Pretty-print a JSON document with two-space indentation
///
/// Key order follows the source document. Anything that does not parse is
/// returned unchanged.
pub fn pretty_json(raw: &str) -> String {
    match serde_json::from_str::<serde_json::Value>(raw) {
        Ok(value) => serde_json::to_string_pretty(&value).unwrap_or_else(|_| raw.to_string()),
        Err(_) => raw.to_string(),
    }
}

/// Render persisted body text for display according to its content type
pub fn pretty_print(raw: &str, content_type: Option<&str>) -> String {
    match content_type.map(|ct| classify(mime_type(ct))) {
        Some(ShortType::Json) => pretty_json(raw),
        _ => raw.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_classification_table() {
        assert_eq!(classify("application/json"), ShortType::Json);
        assert_eq!(classify("application/vnd.api+json"), ShortType::Json);
        assert_eq!(classify("application/xml"), ShortType::Xml);
        assert_eq!(classify("text/xml"), ShortType::Xml);
        assert_eq!(classify("text/html"), ShortType::Html);
        assert_eq!(classify("image/png"), ShortType::Image);
        assert_eq!(classify("text/plain"), ShortType::Other);
        assert_eq!(classify(""), ShortType::Other);
    }

    #[test]
    fn test_json_pattern_is_anchored() {
        assert_eq!(classify("application/jsonp"), ShortType::Other);
        assert_eq!(classify("text/application/json"), ShortType::Other);
        assert_eq!(classify("application/vnd.github.v3+json"), ShortType::Json);
    }

    #[test]
    fn test_mime_type_strips_parameters() {
        assert_eq!(mime_type("application/json; charset=utf-8"), "application/json");
        assert_eq!(mime_type("text/html"), "text/html");
    }

    #[test]
    fn test_pretty_json_keeps_key_order() {
        let pretty = pretty_json(r#"{"b":1,"a":{"z":true,"y":[1,2]}}"#);
        assert_eq!(
            pretty,
            "{\n  \"b\": 1,\n  \"a\": {\n    \"z\": true,\n    \"y\": [\n      1,\n      2\n    ]\n  }\n}"
        );
    }

    #[test]
    fn test_pretty_json_returns_raw_on_failure() {
        assert_eq!(pretty_json("{not json"), "{not json");
    }

    #[test]
    fn test_pretty_print_only_formats_json() {
        assert_eq!(pretty_print(r#"{"id":1}"#, Some("application/json")), "{\n  \"id\": 1\n}");
        assert_eq!(pretty_print(r#"{"id":1}"#, Some("text/plain")), r#"{"id":1}"#);
        assert_eq!(pretty_print(r#"{"id":1}"#, None), r#"{"id":1}"#);
    }

    proptest! {
        #[test]
        fn prop_image_prefix_always_image(subtype in "[a-z0-9.+-]{1,16}") {
            let content_type = format!("image/{}", subtype);
            prop_assert_eq!(classify(&content_type), ShortType::Image);
        }

        #[test]
        fn prop_pretty_json_never_loses_text(raw in ".*") {
            let out = pretty_json(&raw);
            if serde_json::from_str::<serde_json::Value>(&raw).is_err() {
                prop_assert_eq!(out, raw);
            }
        }
    }
}
