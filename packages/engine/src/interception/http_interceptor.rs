// packages/engine/src/interception/http_interceptor.rs
//! In-process HTTP interceptor
//!
//! [`CaptureLayer`] wraps any tower HTTP transport. Admitted requests are
//! replayed through the transport with an [`InternalMarker`] attached, and
//! the exchange is recorded as it happens:
//!
//! ```text
//! caller ──► CaptureService ──► admission ──reject──► transport (untouched)
//!                                   │
//!                                 accept
//!                                   ▼
//!            read request body, persist, build record        (Started)
//!                                   ▼
//!            replay with marker ──► transport
//!                                   ▼
//!            3xx? ──► redirect policy ──► replay again          (Redirected)
//!                                   ▼
//!            headers handed to caller                          (HeadersReceived)
//!                                   ▼
//!            CaptureBody forwards + buffers every frame        (DataReceived)
//!                                   ▼
//!            end of stream ──► body store, session log, registry (Success)
//!            error/timeout ──► error record published           (Failed)
//! ```
//!
//! Credential challenges (401/407) and the transport's own errors travel back
//! to the caller unchanged.

use crate::interception::admission::{Admission, AdmissionFilter, InternalMarker, RejectReason};
use crate::interception::capture_body::{CaptureBody, ExchangeCapture, PendingExchange};
use crate::interception::extensions::{BufferedBody, CacheStoragePolicy, RequestTimeout};
use crate::interception::redirect::{
    follow_up_request, is_redirect, preserves_body, redirect_head, RedirectPolicy,
    SharedRedirectPolicy, MAX_REDIRECTS,
};
use crate::observability::{
    METRIC_BYPASSED, METRIC_CAPTURED, METRIC_DURATION, METRIC_FAILED,
};
use crate::recording::body_store::{encode_body, BodyStore, Direction};
use crate::recording::content_type::{classify, mime_type};
use crate::recording::exchange::{
    capture_headers, CachePolicy, ExchangeRecord, RequestFacet, ResponseData,
};
use crate::recording::registry::ExchangeRegistry;
use crate::recording::session_log::SessionLog;
use crate::utils::errors::{BoxError, EngineError};
use bytes::Bytes;
use futures::future::BoxFuture;
use futures::FutureExt;
use http_body_util::{BodyExt, Full};
use hyper::body::Body;
use hyper::http::request::Parts;
use hyper::http::Extensions;
use hyper::{HeaderMap, Method, Request, Response, Uri, Version};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use parking_lot::RwLock;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::time::Instant;
use tower::{Layer, Service, ServiceExt};
use tracing::{debug, debug_span, warn, Instrument};

/// Plain hyper client used as the default transport
pub type HttpTransport = Client<HttpConnector, Full<Bytes>>;

/// Build a plain HTTP transport to wrap with a [`CaptureLayer`]
pub fn http_transport() -> HttpTransport {
    Client::builder(TokioExecutor::new()).build_http()
}

fn boxed<E: Into<BoxError>>(e: E) -> BoxError {
    e.into()
}

/// Shared capture state: where admitted exchanges end up
pub struct Interceptor {
    admission: Arc<AdmissionFilter>,
    body_store: Arc<BodyStore>,
    registry: Arc<ExchangeRegistry>,
    session_log: Arc<SessionLog>,
    cache_storage_policy: RwLock<CacheStoragePolicy>,
    default_timeout: Duration,
}

impl Interceptor {
    /// Create an interceptor over the given sinks
    pub fn new(
        admission: Arc<AdmissionFilter>,
        body_store: Arc<BodyStore>,
        registry: Arc<ExchangeRegistry>,
        session_log: Arc<SessionLog>,
        default_timeout: Duration,
    ) -> Self {
        Self {
            admission,
            body_store,
            registry,
            session_log,
            cache_storage_policy: RwLock::new(CacheStoragePolicy::default()),
            default_timeout,
        }
    }

    pub fn admission(&self) -> &Arc<AdmissionFilter> {
        &self.admission
    }

    pub fn body_store(&self) -> &Arc<BodyStore> {
        &self.body_store
    }

    pub fn registry(&self) -> &Arc<ExchangeRegistry> {
        &self.registry
    }

    pub fn session_log(&self) -> &Arc<SessionLog> {
        &self.session_log
    }

    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    /// Policy attached to every captured response
    pub fn cache_storage_policy(&self) -> CacheStoragePolicy {
        *self.cache_storage_policy.read()
    }

    pub fn set_cache_storage_policy(&self, policy: CacheStoragePolicy) {
        *self.cache_storage_policy.write() = policy;
    }

    /// Build the record for an admitted request and persist its body
    fn start(&self, parts: &Parts, body: &[u8]) -> (ExchangeRecord, Duration) {
        let cache_policy = parts
            .extensions
            .get::<CachePolicy>()
            .copied()
            .unwrap_or_default();
        let timeout = parts
            .extensions
            .get::<RequestTimeout>()
            .map(|t| t.0)
            .unwrap_or(self.default_timeout);

        let mut record =
            ExchangeRecord::new(RequestFacet::from_parts(parts, body, cache_policy, timeout));

        if !body.is_empty() {
            let short_type = record
                .request
                .content_type
                .as_deref()
                .map(|ct| classify(mime_type(ct)))
                .unwrap_or_default();

            match encode_body(body, short_type) {
                Some(text) => match self.body_store.write(&record.id, Direction::Request, &text) {
                    Ok(handle) => record.request.body = Some(handle),
                    Err(e) => warn!("Failed to persist request body for {}: {}", record.id, e),
                },
                None => debug!("Request body for {} is not UTF-8, not persisted", record.id),
            }
        }

        debug!(
            "Started exchange {}: {} {}",
            record.id, record.request.method, record.request.url
        );
        (record, timeout)
    }

    /// Success: persist the response body and publish
    pub(crate) fn complete(&self, mut record: ExchangeRecord, mut response: ResponseData, body: &[u8]) {
        response.body_length = body.len();

        if !body.is_empty() {
            match encode_body(body, response.short_type) {
                Some(text) => match self.body_store.write(&record.id, Direction::Response, &text) {
                    Ok(handle) => response.body = Some(handle),
                    Err(e) => warn!("Failed to persist response body for {}: {}", record.id, e),
                },
                None => debug!("Response body for {} is not UTF-8, not persisted", record.id),
            }
        }

        let status = response.status;
        record.set_response(response);

        metrics::counter!(METRIC_CAPTURED).increment(1);
        if let Some(elapsed) = record.elapsed {
            metrics::histogram!(METRIC_DURATION).record(elapsed);
        }

        debug!(
            "Exchange {} completed: {} ({} bytes)",
            record.id,
            status,
            body.len()
        );
        self.publish(record);
    }

    /// Failure: publish an error record
    pub(crate) fn fail(&self, mut record: ExchangeRecord) {
        record.mark_error();
        metrics::counter!(METRIC_FAILED).increment(1);

        debug!("Exchange {} failed: {}", record.id, record.request.url);
        self.publish(record);
    }

    /// Cancelled: forget the request body stored at Started
    pub(crate) fn discard(&self, record: &ExchangeRecord) {
        if self.body_store.remove(&record.id, Direction::Request) {
            debug!("Discarded request body for cancelled exchange {}", record.id);
        }
    }

    fn publish(&self, record: ExchangeRecord) {
        if let Err(e) = self.session_log.append_exchange(&record) {
            warn!("Failed to append exchange {} to session log: {}", record.id, e);
        }
        self.registry.add(record);
    }
}

/// Request head kept across redirect hops
struct RequestHead {
    method: Method,
    uri: Uri,
    version: Version,
    headers: HeaderMap,
    extensions: Extensions,
}

impl From<Parts> for RequestHead {
    fn from(parts: Parts) -> Self {
        Self {
            method: parts.method,
            uri: parts.uri,
            version: parts.version,
            headers: parts.headers,
            extensions: parts.extensions,
        }
    }
}

impl RequestHead {
    fn to_request<B: From<Bytes>>(&self, body: Bytes) -> Request<B> {
        let mut request = Request::new(B::from(body));
        *request.method_mut() = self.method.clone();
        *request.uri_mut() = self.uri.clone();
        *request.version_mut() = self.version;
        *request.headers_mut() = self.headers.clone();
        *request.extensions_mut() = self.extensions.clone();
        request
    }
}

/// Send a request, following redirects through the caller's policy
///
/// `mark` puts the internal marker on every request handed to the transport.
/// The request shown to the policy never carries it.
async fn dispatch<S, ReqBody, ResBody>(
    inner: S,
    mut head: RequestHead,
    mut body: Bytes,
    redirect_policy: Option<SharedRedirectPolicy>,
    mark: bool,
) -> Result<Response<ResBody>, BoxError>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>> + Clone,
    S::Error: Into<BoxError>,
    ReqBody: From<Bytes>,
{
    if mark {
        head.extensions.insert(InternalMarker);
    }
    let mut hops = 0;

    loop {
        let request = head.to_request::<ReqBody>(body.clone());
        let response = inner.clone().oneshot(request).await.map_err(boxed)?;

        let Some(policy) = redirect_policy.as_ref() else {
            return Ok(response);
        };
        let status = response.status();
        if !is_redirect(status) {
            return Ok(response);
        }
        let Some(mut next) = follow_up_request(
            &head.method,
            &head.uri,
            &head.headers,
            status,
            response.headers(),
        ) else {
            return Ok(response);
        };

        let mut extensions = head.extensions.clone();
        let marked = extensions.remove::<InternalMarker>().is_some();
        *next.extensions_mut() = extensions;

        let Some(next) = policy.redirect(&redirect_head(status, response.headers()), next) else {
            debug!("Redirect {} for {} not followed", status, head.uri);
            return Ok(response);
        };

        hops += 1;
        if hops > MAX_REDIRECTS {
            return Err(EngineError::TooManyRedirects(MAX_REDIRECTS).into());
        }

        let keep_body = preserves_body(status, &head.method)
            && *next.method() != Method::GET
            && *next.method() != Method::HEAD;
        if !keep_body {
            body = Bytes::new();
        }

        let (parts, ()) = next.into_parts();
        head = RequestHead::from(parts);
        if marked {
            head.extensions.insert(InternalMarker);
        }
    }
}

/// Tower layer installing capture on a transport
#[derive(Clone)]
pub struct CaptureLayer {
    interceptor: Option<Arc<Interceptor>>,
    redirect_policy: Option<SharedRedirectPolicy>,
}

impl CaptureLayer {
    pub fn new(interceptor: Arc<Interceptor>) -> Self {
        Self {
            interceptor: Some(interceptor),
            redirect_policy: None,
        }
    }

    /// Layer that never captures, only applies the redirect policy
    pub fn passthrough() -> Self {
        Self {
            interceptor: None,
            redirect_policy: None,
        }
    }

    /// Follow 3xx responses through `policy`. Without one they reach the caller.
    pub fn with_redirect_policy(mut self, policy: impl RedirectPolicy + 'static) -> Self {
        self.redirect_policy = Some(Arc::new(policy));
        self
    }

    pub fn with_shared_redirect_policy(mut self, policy: Option<SharedRedirectPolicy>) -> Self {
        self.redirect_policy = policy;
        self
    }

    pub fn is_capturing(&self) -> bool {
        self.interceptor.is_some()
    }
}

impl<S> Layer<S> for CaptureLayer {
    type Service = CaptureService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        CaptureService {
            inner,
            interceptor: self.interceptor.clone(),
            redirect_policy: self.redirect_policy.clone(),
        }
    }
}

/// Transport wrapped by a [`CaptureLayer`]
#[derive(Clone)]
pub struct CaptureService<S> {
    inner: S,
    interceptor: Option<Arc<Interceptor>>,
    redirect_policy: Option<SharedRedirectPolicy>,
}

impl<S> CaptureService<S> {
    pub fn get_ref(&self) -> &S {
        &self.inner
    }

    pub fn interceptor(&self) -> Option<&Arc<Interceptor>> {
        self.interceptor.as_ref()
    }
}

impl<S, ReqBody, ResBody> Service<Request<ReqBody>> for CaptureService<S>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>> + Clone + Send + 'static,
    S::Future: Send,
    S::Error: Into<BoxError>,
    ReqBody: Body + From<Bytes> + Send + 'static,
    ReqBody::Data: Send,
    ReqBody::Error: Into<BoxError>,
    ResBody: Body<Data = Bytes> + Send + 'static,
    ResBody::Error: Into<BoxError>,
{
    type Response = Response<CaptureBody<ResBody>>;
    type Error = BoxError;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx).map_err(boxed)
    }

    fn call(&mut self, request: Request<ReqBody>) -> Self::Future {
        let clone = self.inner.clone();
        let inner = std::mem::replace(&mut self.inner, clone);
        let redirect_policy = self.redirect_policy.clone();

        let admitted = self.interceptor.as_ref().and_then(|interceptor| {
            match interceptor.admission().admit(&request) {
                Admission::Accept => Some(Arc::clone(interceptor)),
                Admission::Reject(RejectReason::Disabled) => None,
                Admission::Reject(reason) => {
                    metrics::counter!(METRIC_BYPASSED, "reason" => reason.as_str()).increment(1);
                    None
                }
            }
        });

        match admitted {
            Some(interceptor) => {
                let span = debug_span!("exchange", method = %request.method(), uri = %request.uri());
                capture(inner, interceptor, redirect_policy, request)
                    .instrument(span)
                    .boxed()
            }
            None => passthrough(inner, redirect_policy, request).boxed(),
        }
    }
}

async fn passthrough<S, ReqBody, ResBody>(
    inner: S,
    redirect_policy: Option<SharedRedirectPolicy>,
    request: Request<ReqBody>,
) -> Result<Response<CaptureBody<ResBody>>, BoxError>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>> + Clone,
    S::Error: Into<BoxError>,
    ReqBody: Body + From<Bytes>,
    ReqBody::Error: Into<BoxError>,
{
    let response = match redirect_policy {
        None => inner.oneshot(request).await.map_err(boxed)?,
        Some(policy) => {
            let (parts, body) = request.into_parts();
            let body = body.collect().await.map_err(boxed)?.to_bytes();
            dispatch(inner, RequestHead::from(parts), body, Some(policy), false).await?
        }
    };
    Ok(response.map(CaptureBody::passthrough))
}

async fn capture<S, ReqBody, ResBody>(
    inner: S,
    interceptor: Arc<Interceptor>,
    redirect_policy: Option<SharedRedirectPolicy>,
    request: Request<ReqBody>,
) -> Result<Response<CaptureBody<ResBody>>, BoxError>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>> + Clone,
    S::Error: Into<BoxError>,
    ReqBody: Body + From<Bytes>,
    ReqBody::Error: Into<BoxError>,
    ResBody: Body<Data = Bytes>,
{
    let (parts, body) = request.into_parts();

    let body = match body.collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            let (record, _) = interceptor.start(&parts, &[]);
            interceptor.fail(record);
            return Err(boxed(e));
        }
    };

    let observed = if body.is_empty() {
        parts
            .extensions
            .get::<BufferedBody>()
            .map(|buffered| buffered.0.clone())
            .unwrap_or_default()
    } else {
        body.clone()
    };

    let (record, timeout) = interceptor.start(&parts, &observed);
    let deadline = (!timeout.is_zero()).then(|| Instant::now() + timeout);
    let pending = PendingExchange::new(record, Arc::clone(&interceptor));

    let send = dispatch(inner, RequestHead::from(parts), body, redirect_policy, true);
    let sent = match deadline {
        Some(deadline) => match tokio::time::timeout_at(deadline, send).await {
            Ok(result) => result,
            Err(_) => Err(EngineError::Timeout(timeout).into()),
        },
        None => send.await,
    };

    let response = match sent {
        Ok(response) => response,
        Err(e) => {
            if let Some(id) = pending.id() {
                debug!("Transport failed for {}: {}", id, e);
            }
            pending.fail();
            return Err(e);
        }
    };

    let (mut parts, body) = response.into_parts();
    let data = ResponseData::new(parts.status.as_u16(), capture_headers(&parts.headers));
    parts.extensions.insert(interceptor.cache_storage_policy());
    if let Some(id) = pending.id() {
        debug!("Headers received for {}: {}", id, parts.status);
    }

    let capture = ExchangeCapture::new(pending, data, deadline, timeout);
    if body.is_end_stream() {
        capture.complete();
        return Ok(Response::from_parts(parts, CaptureBody::passthrough(body)));
    }

    Ok(Response::from_parts(parts, CaptureBody::capturing(body, capture)))
}
