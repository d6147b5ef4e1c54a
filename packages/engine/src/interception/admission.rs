// packages/engine/src/interception/admission.rs
//! Admission filter deciding which outbound requests get captured
//!
//! Rules are checked in order and the first match rejects:
//!
//! 1. capture switch off
//! 2. request carries the engine's [`InternalMarker`]
//! 3. scheme is not `http`/`https`
//! 4. URL starts with an ignored prefix
//! 5. URL matches an ignored regex
//!
//! The switch is an atomic so the disabled path costs one load. Ignore rules
//! sit behind a read-mostly lock and are only ever appended to.

use crate::utils::errors::{EngineError, Result};
use hyper::http::Extensions;
use hyper::{Request, Uri};
use parking_lot::RwLock;
use regex::Regex;
use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info};

/// Extension the engine puts on every request it replays
///
/// Requests carrying it are never captured again, which keeps stacked
/// capture layers and the engine's own traffic from being recorded twice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InternalMarker;

/// Why a request was not captured
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    Disabled,
    InternalMarker,
    UnsupportedScheme,
    IgnoredPrefix,
    IgnoredPattern,
}

impl RejectReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectReason::Disabled => "disabled",
            RejectReason::InternalMarker => "internal",
            RejectReason::UnsupportedScheme => "scheme",
            RejectReason::IgnoredPrefix => "ignored_prefix",
            RejectReason::IgnoredPattern => "ignored_pattern",
        }
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Admission outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Accept,
    Reject(RejectReason),
}

impl Admission {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Admission::Accept)
    }
}

/// Ignore rules
#[derive(Debug, Default)]
struct AdmissionRules {
    prefixes: HashSet<String>,
    patterns: Vec<Regex>,
}

/// Capture switch plus ignore rules
#[derive(Debug)]
pub struct AdmissionFilter {
    enabled: AtomicBool,
    rules: RwLock<AdmissionRules>,
}

impl AdmissionFilter {
    /// Create a filter with an empty rule set
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled: AtomicBool::new(enabled),
            rules: RwLock::new(AdmissionRules::default()),
        }
    }

    pub fn enable(&self) {
        self.enabled.store(true, Ordering::Release);
    }

    pub fn disable(&self) {
        self.enabled.store(false, Ordering::Release);
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    /// Never capture URLs starting with `prefix`
    pub fn ignore_url(&self, prefix: impl Into<String>) {
        let prefix = prefix.into();
        info!("Ignoring URL prefix {}", prefix);
        self.rules.write().prefixes.insert(prefix);
    }

    pub fn ignore_urls<I, S>(&self, prefixes: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut rules = self.rules.write();
        rules.prefixes.extend(prefixes.into_iter().map(Into::into));
    }

    /// Never capture URLs matching `pattern`
    pub fn ignore_regex(&self, pattern: &str) -> Result<()> {
        self.ignore_regexes([pattern])
    }

    /// Add several patterns. Nothing is added if any of them fails to compile.
    pub fn ignore_regexes<'a, I>(&self, patterns: I) -> Result<()>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let compiled = patterns
            .into_iter()
            .map(|pattern| {
                Regex::new(pattern).map_err(|e| {
                    EngineError::InvalidPattern(format!("{}: {}", pattern, e))
                })
            })
            .collect::<Result<Vec<_>>>()?;

        info!("Ignoring {} URL pattern(s)", compiled.len());
        self.rules.write().patterns.extend(compiled);
        Ok(())
    }

    pub fn ignored_prefix_count(&self) -> usize {
        self.rules.read().prefixes.len()
    }

    pub fn ignored_pattern_count(&self) -> usize {
        self.rules.read().patterns.len()
    }

    /// Decide for a request
    pub fn admit<B>(&self, request: &Request<B>) -> Admission {
        self.admit_parts(request.uri(), request.extensions())
    }

    /// Decide from a URI and request extensions
    pub fn admit_parts(&self, uri: &Uri, extensions: &Extensions) -> Admission {
        if !self.is_enabled() {
            return Admission::Reject(RejectReason::Disabled);
        }

        if extensions.get::<InternalMarker>().is_some() {
            return Admission::Reject(RejectReason::InternalMarker);
        }

        if !matches!(uri.scheme_str(), Some("http") | Some("https")) {
            return Admission::Reject(RejectReason::UnsupportedScheme);
        }

        let url = uri.to_string();
        let rules = self.rules.read();

        if rules.prefixes.iter().any(|prefix| url.starts_with(prefix.as_str())) {
            debug!("Not capturing {} (ignored prefix)", url);
            return Admission::Reject(RejectReason::IgnoredPrefix);
        }

        if rules.patterns.iter().any(|pattern| pattern.is_match(&url)) {
            debug!("Not capturing {} (ignored pattern)", url);
            return Admission::Reject(RejectReason::IgnoredPattern);
        }

        Admission::Accept
    }

    /// `true` if the request should be captured
    pub fn should_capture<B>(&self, request: &Request<B>) -> bool {
        self.admit(request).is_accepted()
    }
}

impl Default for AdmissionFilter {
    fn default() -> Self {
        Self::new(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::sync::Arc;

    fn get(url: &str) -> Request<()> {
        Request::get(url).body(()).unwrap()
    }

    fn enabled_filter() -> AdmissionFilter {
        let filter = AdmissionFilter::new(true);
        filter.ignore_url("https://ads.");
        filter.ignore_regex(r"^https://track\..*").unwrap();
        filter
    }

    #[test]
    fn test_ignore_rules() {
        let filter = enabled_filter();

        assert_eq!(
            filter.admit(&get("https://ads.example.com/x")),
            Admission::Reject(RejectReason::IgnoredPrefix)
        );
        assert_eq!(
            filter.admit(&get("https://track.foo.com/y")),
            Admission::Reject(RejectReason::IgnoredPattern)
        );
        assert!(filter.should_capture(&get("https://api.example.com/x")));
    }

    #[test]
    fn test_disabled_rejects_everything() {
        let filter = enabled_filter();
        filter.disable();

        assert_eq!(
            filter.admit(&get("https://api.example.com/x")),
            Admission::Reject(RejectReason::Disabled)
        );

        filter.enable();
        assert!(filter.should_capture(&get("https://api.example.com/x")));
    }

    #[test]
    fn test_internal_marker_rejected() {
        let filter = enabled_filter();
        let mut req = get("https://api.example.com/x");
        req.extensions_mut().insert(InternalMarker);

        assert_eq!(
            filter.admit(&req),
            Admission::Reject(RejectReason::InternalMarker)
        );
    }

    #[test]
    fn test_non_http_scheme_rejected() {
        let filter = AdmissionFilter::new(true);
        assert_eq!(
            filter.admit(&get("ftp://files.example.com/a")),
            Admission::Reject(RejectReason::UnsupportedScheme)
        );
        assert_eq!(
            filter.admit(&get("/relative/path")),
            Admission::Reject(RejectReason::UnsupportedScheme)
        );
        assert!(filter.should_capture(&get("http://plain.example.com/")));
    }

    #[test]
    fn test_invalid_regex_adds_nothing() {
        let filter = AdmissionFilter::new(true);
        let result = filter.ignore_regexes(["^ok$", "(unclosed"]);

        assert!(matches!(result, Err(EngineError::InvalidPattern(_))));
        assert_eq!(filter.ignored_pattern_count(), 0);
    }

    #[test]
    fn test_ignore_urls_bulk() {
        let filter = AdmissionFilter::new(true);
        filter.ignore_urls(vec!["http://a/", "http://b/", "http://a/"]);
        assert_eq!(filter.ignored_prefix_count(), 2);
        assert!(!filter.should_capture(&get("http://b/path")));
    }

    #[test]
    fn test_concurrent_reads_during_writes() {
        let filter = Arc::new(AdmissionFilter::new(true));

        let writer = {
            let filter = Arc::clone(&filter);
            std::thread::spawn(move || {
                for i in 0..200 {
                    filter.ignore_url(format!("http://blocked{}/", i));
                }
            })
        };
        let readers: Vec<_> = (0..4)
            .map(|_| {
                let filter = Arc::clone(&filter);
                std::thread::spawn(move || {
                    for _ in 0..200 {
                        assert!(filter.should_capture(&get("http://allowed.example.com/")));
                    }
                })
            })
            .collect();

        writer.join().unwrap();
        for reader in readers {
            reader.join().unwrap();
        }
        assert_eq!(filter.ignored_prefix_count(), 200);
    }

    proptest! {
        #[test]
        fn prop_prefix_always_rejects(path in "[a-z0-9/]{0,24}") {
            let filter = AdmissionFilter::new(true);
            filter.ignore_url("https://ads.");
            let url = format!("https://ads.example.com/{}", path);
            prop_assert_eq!(
                filter.admit(&get(&url)),
                Admission::Reject(RejectReason::IgnoredPrefix)
            );
        }
    }
}
