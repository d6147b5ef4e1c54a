// packages/engine/src/interception/registration.rs
//! Session configurations the capture layer is installed into
//!
//! A [`SessionConfig`] describes how a client builds its transport stack.
//! Installing capture is idempotent: the second install reports `false` and
//! leaves the configuration alone, so exchanges are never recorded twice.

use crate::context::CaptureContext;
use crate::interception::http_interceptor::{CaptureLayer, CaptureService, Interceptor};
use crate::interception::redirect::{RedirectPolicy, SharedRedirectPolicy};
use std::sync::Arc;
use tower::Layer;
use tracing::debug;

/// Kind of client session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionKind {
    /// Persistent cookies and cache
    Default,
    /// Nothing persisted past the session
    Ephemeral,
}

/// Transport configuration for one client session
#[derive(Clone)]
pub struct SessionConfig {
    kind: SessionKind,
    interceptor: Option<Arc<Interceptor>>,
    redirect_policy: Option<SharedRedirectPolicy>,
}

impl SessionConfig {
    pub fn default_session() -> Self {
        Self::with_kind(SessionKind::Default)
    }

    pub fn ephemeral() -> Self {
        Self::with_kind(SessionKind::Ephemeral)
    }

    fn with_kind(kind: SessionKind) -> Self {
        Self {
            kind,
            interceptor: None,
            redirect_policy: None,
        }
    }

    pub fn kind(&self) -> SessionKind {
        self.kind
    }

    pub fn stores_cookies(&self) -> bool {
        self.kind == SessionKind::Default
    }

    pub fn uses_persistent_cache(&self) -> bool {
        self.kind == SessionKind::Default
    }

    /// Follow redirects through `policy`
    pub fn with_redirect_policy(mut self, policy: impl RedirectPolicy + 'static) -> Self {
        self.redirect_policy = Some(Arc::new(policy));
        self
    }

    /// Install capture from `context`. Returns `false` if it was already installed.
    pub fn install(&mut self, context: &CaptureContext) -> bool {
        self.install_interceptor(context.interceptor())
    }

    pub fn install_interceptor(&mut self, interceptor: &Arc<Interceptor>) -> bool {
        if self.interceptor.is_some() {
            debug!("Capture already installed in {:?} session", self.kind);
            return false;
        }
        self.interceptor = Some(Arc::clone(interceptor));
        debug!("Capture installed in {:?} session", self.kind);
        true
    }

    /// Remove capture. Returns `false` if it was not installed.
    pub fn uninstall(&mut self) -> bool {
        self.interceptor.take().is_some()
    }

    pub fn is_installed(&self) -> bool {
        self.interceptor.is_some()
    }

    /// Layer matching this configuration
    pub fn layer(&self) -> CaptureLayer {
        let layer = match &self.interceptor {
            Some(interceptor) => CaptureLayer::new(Arc::clone(interceptor)),
            None => CaptureLayer::passthrough(),
        };
        layer.with_shared_redirect_policy(self.redirect_policy.clone())
    }

    /// Wrap a transport for this session
    pub fn wrap<S>(&self, transport: S) -> CaptureService<S> {
        self.layer().layer(transport)
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::default_session()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interception::admission::AdmissionFilter;
    use crate::recording::{BodyStore, ExchangeRegistry, SessionLog};
    use bytes::Bytes;
    use http_body_util::{BodyExt, Full};
    use hyper::{Request, Response};
    use std::convert::Infallible;
    use std::time::Duration;
    use tower::ServiceExt;

    fn interceptor(dir: &std::path::Path) -> Arc<Interceptor> {
        let body_store = Arc::new(BodyStore::new(dir.join("bodies")).unwrap());
        Arc::new(Interceptor::new(
            Arc::new(AdmissionFilter::new(true)),
            Arc::clone(&body_store),
            Arc::new(ExchangeRegistry::with_body_store(body_store)),
            Arc::new(SessionLog::new(dir.join("session.log"))),
            Duration::from_secs(60),
        ))
    }

    async fn ok(_req: Request<Full<Bytes>>) -> Result<Response<Full<Bytes>>, Infallible> {
        Ok(Response::new(Full::new(Bytes::from_static(b"ok"))))
    }

    #[test]
    fn test_session_kinds() {
        let default = SessionConfig::default_session();
        assert_eq!(default.kind(), SessionKind::Default);
        assert!(default.stores_cookies());

        let ephemeral = SessionConfig::ephemeral();
        assert_eq!(ephemeral.kind(), SessionKind::Ephemeral);
        assert!(!ephemeral.stores_cookies());
        assert!(!ephemeral.uses_persistent_cache());
    }

    #[test]
    fn test_install_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let interceptor = interceptor(dir.path());
        let mut config = SessionConfig::ephemeral();

        assert!(config.install_interceptor(&interceptor));
        assert!(!config.install_interceptor(&interceptor));
        assert!(config.is_installed());
        assert!(config.layer().is_capturing());

        assert!(config.uninstall());
        assert!(!config.uninstall());
        assert!(!config.layer().is_capturing());
    }

    #[tokio::test]
    async fn test_wrapped_transport_records_once() {
        let dir = tempfile::tempdir().unwrap();
        let interceptor = interceptor(dir.path());
        let mut config = SessionConfig::default_session();
        config.install_interceptor(&interceptor);
        config.install_interceptor(&interceptor);

        let request = Request::get("https://api.example.com/ping")
            .body(Full::new(Bytes::new()))
            .unwrap();
        let response = config
            .wrap(tower::service_fn(ok))
            .oneshot(request)
            .await
            .unwrap();
        response.into_body().collect().await.unwrap();

        assert_eq!(interceptor.registry().len(), 1);
    }

    #[tokio::test]
    async fn test_uninstalled_session_passes_through() {
        let dir = tempfile::tempdir().unwrap();
        let interceptor = interceptor(dir.path());
        let config = SessionConfig::default_session();

        let request = Request::get("https://api.example.com/ping")
            .body(Full::new(Bytes::new()))
            .unwrap();
        let response = config
            .wrap(tower::service_fn(ok))
            .oneshot(request)
            .await
            .unwrap();
        let body = response.into_body().collect().await.unwrap().to_bytes();

        assert_eq!(&body[..], b"ok");
        assert!(interceptor.registry().is_empty());
    }
}
