//! Signs in to a Pennywise backend and keeps the session alive until Ctrl-C.
//!
//! ```text
//! PENNYWISE_API_URL=http://127.0.0.1:3000 \
//! PENNYWISE_EMAIL=ada@example.com PENNYWISE_PASSWORD=... \
//! RUST_LOG=pennywise=debug cargo run -p session-probe [path ...]
//! ```
//!
//! Each extra argument is an API path fetched once after sign-in.

use pennywise::prelude::*;
use serde_json::Value;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    pennywise::init_tracing("pennywise=info,session_probe=info");

    let config = ClientConfig::from_env()?;
    let email = std::env::var("PENNYWISE_EMAIL")?;
    let password = std::env::var("PENNYWISE_PASSWORD")?;
    info!(api_url = %config.api_url, "starting session probe");

    let session = config.build_session()?;
    let mut events = session.subscribe();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => info!(?event, "auth event"),
                Err(RecvError::Lagged(missed)) => warn!(missed, "event log fell behind"),
                Err(RecvError::Closed) => break,
            }
        }
    });

    if session.access_token().is_none() || session.is_token_expired_or_expiring() {
        session
            .sign_in(&Credentials::new(email, password))
            .await?;
    }

    let mut monitor = SessionMonitor::start(
        session.clone(),
        &TokioScheduler::new(),
        config.monitor.clone(),
    );
    let api = ApiClient::new(session.clone());

    let user = api.current_user().await?;
    info!(user = %user.id, email = ?user.email, "signed in");

    for path in std::env::args().skip(1) {
        match api.get_json::<Value>(&path).await {
            Ok(body) => println!("{path}: {body}"),
            Err(e) => warn!(%path, error = %e, "request failed"),
        }
    }

    tokio::signal::ctrl_c().await?;

    monitor.stop();
    info!(snapshot = ?session.snapshot(), "shutting down");
    session.sign_out().await;
    Ok(())
}
