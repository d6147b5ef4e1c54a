// packages/engine/src/interception/redirect.rs
//! Redirect handling
//!
//! The engine does not decide whether to follow a redirect. For every 3xx
//! response with a `Location` header it builds the follow-up request, hands
//! it to the caller's [`RedirectPolicy`] and sends whatever comes back. The
//! request the policy sees never carries the engine's internal marker, and
//! credentials are copied across untouched; stripping them on cross-origin
//! hops is the policy's call.

use hyper::header::{self, HeaderMap, HeaderValue};
use hyper::http::uri::{Parts as UriParts, PathAndQuery};
use hyper::{Method, Request, Response, StatusCode, Uri};
use std::sync::Arc;
use tracing::debug;

/// Hops followed before the exchange fails
pub const MAX_REDIRECTS: usize = 10;

/// Caller-side decision on whether to follow a redirect
pub trait RedirectPolicy: Send + Sync {
    /// Return the request to send next, or `None` to hand the 3xx back to
    /// the caller as the final response.
    fn redirect(&self, response: &Response<()>, next: Request<()>) -> Option<Request<()>>;
}

impl<F> RedirectPolicy for F
where
    F: Fn(&Response<()>, Request<()>) -> Option<Request<()>> + Send + Sync,
{
    fn redirect(&self, response: &Response<()>, next: Request<()>) -> Option<Request<()>> {
        self(response, next)
    }
}

/// Follow every redirect unchanged
#[derive(Debug, Clone, Copy, Default)]
pub struct FollowAll;

impl RedirectPolicy for FollowAll {
    fn redirect(&self, _response: &Response<()>, next: Request<()>) -> Option<Request<()>> {
        Some(next)
    }
}

pub type SharedRedirectPolicy = Arc<dyn RedirectPolicy>;

/// `true` for statuses that carry a follow-up location
pub fn is_redirect(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::MOVED_PERMANENTLY
            | StatusCode::FOUND
            | StatusCode::SEE_OTHER
            | StatusCode::TEMPORARY_REDIRECT
            | StatusCode::PERMANENT_REDIRECT
    )
}

/// `true` if the follow-up request re-sends the original body
pub fn preserves_body(status: StatusCode, method: &Method) -> bool {
    match status {
        StatusCode::TEMPORARY_REDIRECT | StatusCode::PERMANENT_REDIRECT => true,
        StatusCode::SEE_OTHER => false,
        _ => *method != Method::POST,
    }
}

/// Resolve a `Location` value against the URI that produced it
pub fn resolve_location(base: &Uri, location: &str) -> Option<Uri> {
    if location.contains("://") {
        return location.parse().ok();
    }

    let path = if location.starts_with('/') {
        location.to_string()
    } else {
        let base_path = base.path();
        let dir = &base_path[..base_path.rfind('/').map_or(0, |i| i + 1)];
        format!("{}{}", if dir.is_empty() { "/" } else { dir }, location)
    };

    let mut parts = UriParts::default();
    parts.scheme = base.scheme().cloned();
    parts.authority = base.authority().cloned();
    parts.path_and_query = Some(PathAndQuery::try_from(path).ok()?);
    Uri::from_parts(parts).ok()
}

/// Build the follow-up request for a redirect response
///
/// Returns `None` when the response has no usable `Location`.
pub fn follow_up_request(
    method: &Method,
    uri: &Uri,
    headers: &HeaderMap,
    status: StatusCode,
    response_headers: &HeaderMap,
) -> Option<Request<()>> {
    let location = response_headers.get(header::LOCATION)?.to_str().ok()?;
    let target = resolve_location(uri, location)?;

    let keep_body = preserves_body(status, method);
    let next_method = if keep_body || *method == Method::HEAD {
        method.clone()
    } else {
        Method::GET
    };

    let mut next_headers = headers.clone();
    if !keep_body {
        next_headers.remove(header::CONTENT_TYPE);
        next_headers.remove(header::CONTENT_LENGTH);
        next_headers.remove(header::TRANSFER_ENCODING);
    }
    if target.authority() != uri.authority() {
        if let Some(authority) = target.authority() {
            if let Ok(host) = HeaderValue::from_str(authority.as_str()) {
                next_headers.insert(header::HOST, host);
            }
        }
    }

    debug!("Redirect {} {} -> {} {}", status, uri, next_method, target);

    let mut request = Request::new(());
    *request.method_mut() = next_method;
    *request.uri_mut() = target;
    *request.headers_mut() = next_headers;
    Some(request)
}

/// Response head exposed to the redirect policy
pub fn redirect_head(status: StatusCode, headers: &HeaderMap) -> Response<()> {
    let mut response = Response::new(());
    *response.status_mut() = status;
    *response.headers_mut() = headers.clone();
    response
}
