// packages/engine/src/context.rs
//! Capture context
//!
//! One [`CaptureContext`] owns everything a capture session needs: the
//! admission filter, the body store, the session log and the registry.
//! Several contexts can live side by side (one per test, for instance); they
//! share nothing.
//!
//! ```text
//! CaptureContext
//! ├─ Interceptor ──► AdmissionFilter (switch + ignore rules)
//! │              ├─► BodyStore        <base_dir>/{request,response}_body_<id>
//! │              ├─► SessionLog       <base_dir>/session.log
//! │              └─► ExchangeRegistry (records + subscribers)
//! └─ started flag
//! ```

use crate::interception::{
    AdmissionFilter, CacheStoragePolicy, CaptureLayer, Interceptor, SessionConfig,
};
use crate::recording::{BodyStore, Direction, ExchangeId, ExchangeRegistry, SessionLog};
use crate::utils::config::EngineConfig;
use crate::utils::errors::Result;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::info;

/// Owner of one capture session
pub struct CaptureContext {
    config: EngineConfig,
    interceptor: Arc<Interceptor>,
    started: AtomicBool,
}

impl CaptureContext {
    /// Build a context from configuration. Nothing is captured until [`start`](Self::start).
    pub fn new(config: EngineConfig) -> Result<Self> {
        let admission = Arc::new(AdmissionFilter::new(false));
        admission.ignore_urls(config.capture.ignored_urls.iter().cloned());
        admission.ignore_regexes(config.capture.ignored_regexes.iter().map(String::as_str))?;

        let body_store = Arc::new(BodyStore::new(&config.storage.base_dir)?);
        let registry = Arc::new(ExchangeRegistry::with_body_store(Arc::clone(&body_store)));
        let session_log = Arc::new(SessionLog::new(config.storage.session_log_path()));

        let interceptor = Interceptor::new(
            admission,
            body_store,
            registry,
            session_log,
            config.capture.default_timeout()?,
        );
        interceptor.set_cache_storage_policy(config.capture.cache_storage_policy);

        Ok(Self {
            config,
            interceptor: Arc::new(interceptor),
            started: AtomicBool::new(false),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn interceptor(&self) -> &Arc<Interceptor> {
        &self.interceptor
    }

    /// Wipe data left by earlier runs and start capturing
    ///
    /// With `capture.enabled = false` the context starts switched off until
    /// [`enable`](Self::enable) is called.
    pub fn start(&self) -> Result<()> {
        if self.started.swap(true, Ordering::AcqRel) {
            info!("Capture already started");
            return Ok(());
        }

        if let Err(e) = self.reset_storage() {
            self.started.store(false, Ordering::Release);
            return Err(e);
        }
        if self.config.capture.enabled {
            self.enable();
        }

        info!("Capture started, storing under {:?}", self.config.storage.base_dir);
        Ok(())
    }

    /// Stop capturing and discard the session's data
    pub fn stop(&self) -> Result<()> {
        if !self.started.swap(false, Ordering::AcqRel) {
            info!("Capture not started");
            return Ok(());
        }

        self.disable();
        self.reset_storage()?;

        info!("Capture stopped");
        Ok(())
    }

    fn reset_storage(&self) -> Result<()> {
        self.interceptor.registry().clear();
        self.interceptor.body_store().reset()?;
        self.interceptor.session_log().clear()
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::Acquire)
    }

    pub fn enable(&self) {
        self.interceptor.admission().enable();
    }

    pub fn disable(&self) {
        self.interceptor.admission().disable();
    }

    pub fn is_enabled(&self) -> bool {
        self.interceptor.admission().is_enabled()
    }

    pub fn ignore_url(&self, prefix: impl Into<String>) {
        self.interceptor.admission().ignore_url(prefix);
    }

    pub fn ignore_urls<I, S>(&self, prefixes: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.interceptor.admission().ignore_urls(prefixes);
    }

    pub fn ignore_regex(&self, pattern: &str) -> Result<()> {
        self.interceptor.admission().ignore_regex(pattern)
    }

    pub fn ignore_regexes<'a, I>(&self, patterns: I) -> Result<()>
    where
        I: IntoIterator<Item = &'a str>,
    {
        self.interceptor.admission().ignore_regexes(patterns)
    }

    pub fn set_cache_policy(&self, policy: CacheStoragePolicy) {
        self.interceptor.set_cache_storage_policy(policy);
    }

    pub fn cache_policy(&self) -> CacheStoragePolicy {
        self.interceptor.cache_storage_policy()
    }

    /// Capture layer bound to this context
    pub fn layer(&self) -> CaptureLayer {
        CaptureLayer::new(Arc::clone(&self.interceptor))
    }

    /// Install capture into a session configuration
    pub fn install(&self, config: &mut SessionConfig) -> bool {
        config.install(self)
    }

    pub fn registry(&self) -> &Arc<ExchangeRegistry> {
        self.interceptor.registry()
    }

    pub fn body_store(&self) -> &Arc<BodyStore> {
        self.interceptor.body_store()
    }

    /// Whole session log, empty if nothing was logged
    pub fn session_log(&self) -> Result<String> {
        self.interceptor.session_log().read()
    }

    /// Stored body of an exchange, pretty-printed, empty if none
    pub fn body(&self, id: &ExchangeId, direction: Direction) -> String {
        let content_type = self
            .registry()
            .records()
            .into_iter()
            .find(|record| &record.id == id)
            .and_then(|record| match direction {
                Direction::Request => record.request.content_type.clone(),
                Direction::Response => record
                    .response_data()
                    .and_then(|data| data.content_type.clone()),
            });

        self.body_store()
            .body_text(id, direction, content_type.as_deref())
    }

    /// Drop all records and their stored bodies
    pub fn clear(&self) {
        self.registry().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::errors::EngineError;
    use bytes::Bytes;
    use http_body_util::{BodyExt, Full};
    use hyper::{Request, Response};
    use std::convert::Infallible;
    use tempfile::TempDir;
    use tower::{Layer, ServiceExt};

    fn context() -> (TempDir, CaptureContext) {
        let dir = tempfile::tempdir().unwrap();
        let mut config = EngineConfig::default();
        config.storage.base_dir = dir.path().join("nettap");
        (dir, CaptureContext::new(config).unwrap())
    }

    async fn users(
        _req: Request<Full<Bytes>>,
    ) -> std::result::Result<Response<Full<Bytes>>, Infallible> {
        Ok(Response::builder()
            .header("content-type", "application/json; charset=utf-8")
            .body(Full::new(Bytes::from_static(b"{\"id\":1}")))
            .unwrap())
    }

    async fn fetch(context: &CaptureContext, url: &str) {
        let request = Request::post(url)
            .header("content-type", "text/plain")
            .body(Full::new(Bytes::from_static(b"ping")))
            .unwrap();
        let response = context
            .layer()
            .layer(tower::service_fn(users))
            .oneshot(request)
            .await
            .unwrap();
        response.into_body().collect().await.unwrap();
    }

    #[test]
    fn test_new_context_is_idle() {
        let (_dir, context) = context();
        assert!(!context.is_started());
        assert!(!context.is_enabled());
        assert_eq!(context.cache_policy(), CacheStoragePolicy::NotAllowed);
        assert_eq!(context.session_log().unwrap(), "");
    }

    #[test]
    fn test_invalid_configured_regex_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = EngineConfig::default();
        config.storage.base_dir = dir.path().to_path_buf();
        config.capture.ignored_regexes = vec!["(broken".to_string()];

        assert!(matches!(
            CaptureContext::new(config),
            Err(EngineError::InvalidPattern(_))
        ));
    }

    #[test]
    fn test_infinite_timeout_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = EngineConfig::default();
        config.storage.base_dir = dir.path().to_path_buf();
        config.capture.default_timeout_secs = f64::INFINITY;

        assert!(matches!(
            CaptureContext::new(config),
            Err(EngineError::ConfigError(_))
        ));
    }

    #[test]
    fn test_start_wipes_stale_files() {
        let (_dir, context) = context();
        let stale = context.body_store().base_dir().join("response_body_stale");
        std::fs::write(&stale, "old").unwrap();

        context.start().unwrap();
        assert!(context.is_started());
        assert!(context.is_enabled());
        assert!(!stale.exists());

        context.start().unwrap();
        assert!(context.is_started());
    }

    #[test]
    fn test_start_respects_enabled_setting() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = EngineConfig::default();
        config.storage.base_dir = dir.path().to_path_buf();
        config.capture.enabled = false;
        let context = CaptureContext::new(config).unwrap();

        context.start().unwrap();
        assert!(context.is_started());
        assert!(!context.is_enabled());
    }

    #[tokio::test]
    async fn test_start_capture_stop() {
        let (_dir, context) = context();
        context.start().unwrap();

        fetch(&context, "https://api.example.com/v1/users").await;

        let records = context.registry().records();
        assert_eq!(records.len(), 1);
        let id = records[0].id.clone();
        assert_eq!(context.body(&id, Direction::Response), "{\n  \"id\": 1\n}");
        assert_eq!(context.body(&id, Direction::Request), "ping");
        assert!(context.session_log().unwrap().contains("[Response Status] 200"));

        context.stop().unwrap();
        assert!(!context.is_started());
        assert!(!context.is_enabled());
        assert!(context.registry().is_empty());
        assert_eq!(context.body(&id, Direction::Response), "");
        assert_eq!(context.session_log().unwrap(), "");

        context.stop().unwrap();
    }

    #[tokio::test]
    async fn test_disabled_context_records_nothing() {
        let (_dir, context) = context();
        context.start().unwrap();
        context.disable();

        fetch(&context, "https://api.example.com/v1/users").await;
        assert!(context.registry().is_empty());

        context.enable();
        context.ignore_url("https://api.example.com/v1/");
        fetch(&context, "https://api.example.com/v1/users").await;
        assert!(context.registry().is_empty());

        fetch(&context, "https://api.example.com/v2/users").await;
        assert_eq!(context.registry().len(), 1);
    }

    #[tokio::test]
    async fn test_clear_drops_records_and_bodies() {
        let (_dir, context) = context();
        context.start().unwrap();
        fetch(&context, "https://api.example.com/a").await;
        let id = context.registry().records()[0].id.clone();

        context.clear();

        assert!(context.registry().is_empty());
        assert!(context.body_store().is_empty());
        assert_eq!(context.body(&id, Direction::Request), "");
    }

    #[tokio::test]
    async fn test_session_config_install() {
        let (_dir, context) = context();
        context.start().unwrap();

        let mut config = SessionConfig::default_session();
        assert!(context.install(&mut config));
        assert!(!context.install(&mut config));

        let request = Request::get("https://api.example.com/ping")
            .body(Full::new(Bytes::new()))
            .unwrap();
        let response = config
            .wrap(tower::service_fn(users))
            .oneshot(request)
            .await
            .unwrap();
        response.into_body().collect().await.unwrap();

        assert_eq!(context.registry().len(), 1);
    }

    #[test]
    fn test_ignore_regex_through_context() {
        let (_dir, context) = context();
        context.ignore_regex(r"^https://track\.").unwrap();
        assert!(context.ignore_regexes(["ok", "(bad"]).is_err());
        assert_eq!(context.interceptor().admission().ignored_pattern_count(), 1);
    }
}
