// packages/engine/src/main.rs
//! Nettap Engine
//!
//! Fetches every URL given on the command line through a captured session,
//! then prints the session log and a JSON export of the recorded exchanges.
//!
//! ```text
//! nettap-engine http://example.com/ http://example.com/api
//! ```

use anyhow::{Context, Result};
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::Request;
use nettap_engine::observability::{init_metrics, init_tracing};
use nettap_engine::{
    http_transport, CaptureContext, EngineConfig, ExportFormat, Exporter, FollowAll,
    SessionConfig, VERSION,
};
use tower::ServiceExt;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize observability (tracing, metrics)
    init_tracing()?;
    init_metrics()?;

    info!("Starting Nettap Engine v{}", VERSION);

    let urls: Vec<String> = std::env::args().skip(1).collect();
    if urls.is_empty() {
        anyhow::bail!("usage: nettap-engine <url>...");
    }

    // Load configuration
    let config = EngineConfig::load()?;
    info!("Configuration loaded: {:?}", config);

    let context = CaptureContext::new(config)?;
    context.start()?;

    let mut session = SessionConfig::default_session().with_redirect_policy(FollowAll);
    context.install(&mut session);
    let client = session.wrap(http_transport());

    for url in &urls {
        let request = Request::get(url.as_str())
            .body(Full::new(Bytes::new()))
            .with_context(|| format!("Invalid URL {}", url))?;

        match client.clone().oneshot(request).await {
            Ok(response) => {
                let status = response.status();
                match response.into_body().collect().await {
                    Ok(body) => info!("{} -> {} ({} bytes)", url, status, body.to_bytes().len()),
                    Err(e) => warn!("{} -> {}, body failed: {}", url, status, e),
                }
            }
            Err(e) => warn!("{} failed: {}", url, e),
        }
    }

    println!("{}", context.session_log()?);
    println!(
        "{}",
        Exporter::new(ExportFormat::Json).export(&context.registry().records())?
    );

    Ok(())
}
