//! Porchlight application shell.
//!
//! Thin binary that loads configuration and secrets, wires the components
//! together, and runs one scan. Core logic lives in the `crates/` directory.

use anyhow::{Context, Result};
use porchlight_browser::{BrowserEngine, PageDriver};
use porchlight_channel::{CodeChannel, GistStore, VerificationChannel};
use porchlight_core::AppConfig;
use porchlight_llm::{ChatClient, Classifier, CredentialPool};
use porchlight_report::{SmtpConfig, SmtpSink};
use porchlight_scanner::{LoginCredentials, ScanOrchestrator, SessionConfig};
use std::time::Duration;
use tracing::{info, warn};

/// Initialize tracing subscriber for logging
fn init_tracing() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,porchlight=debug"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true))
        .with(filter)
        .init();
}

fn env_var(name: &str) -> Result<String> {
    std::env::var(name).with_context(|| format!("{name} not set"))
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    info!("Starting Porchlight v{}", env!("CARGO_PKG_VERSION"));

    let config = AppConfig::load_with_env().context("loading configuration")?;

    let credentials = LoginCredentials {
        email: env_var("PORCHLIGHT_LOGIN_EMAIL")?,
        password: env_var("PORCHLIGHT_LOGIN_PASSWORD")?,
    };

    let pool =
        CredentialPool::load(&config.llm.keys_file).context("loading classification API keys")?;
    info!(keys = pool.len(), "classification credentials loaded");

    let chat = ChatClient::new(&config.llm.api_base, &config.llm.model, config.llm.temperature)
        .context("building chat client")?;
    let mut classifier = Classifier::new(
        Box::new(chat),
        pool,
        Duration::from_millis(config.llm.request_delay_ms),
    );

    let sink = SmtpSink::new(SmtpConfig {
        host: config.report.smtp_host.clone(),
        port: config.report.smtp_port,
        username: env_var("PORCHLIGHT_SMTP_USER")?,
        password: env_var("PORCHLIGHT_SMTP_PASSWORD")?,
        from_name: config.report.from_name.clone(),
    });

    let alert_recipients = if config.report.alert_recipients.is_empty() {
        config.report.recipients.clone()
    } else {
        config.report.alert_recipients.clone()
    };

    let channel = match std::env::var("PORCHLIGHT_STORE_TOKEN") {
        Ok(token) if !token.trim().is_empty() => {
            let store = GistStore::new(token, &config.channel.api_base)
                .context("building document store client")?;
            Some(VerificationChannel::new(
                store,
                Duration::from_secs(config.channel.timeout_secs),
                Duration::from_secs(config.channel.poll_secs),
                alert_recipients,
            ))
        }
        _ => {
            warn!("PORCHLIGHT_STORE_TOKEN not set; verification challenges need an attended browser");
            None
        }
    };

    let engine = BrowserEngine::launch(&config.browser)
        .await
        .context("launching browser")?;
    if let Err(e) = engine.clear_cookies().await {
        warn!(error = %e, "could not clear cookies");
    }

    let debug_dir = if config.general.debug_dumps {
        AppConfig::cache_dir().ok()
    } else {
        None
    };
    let session_config = SessionConfig::from_app(&config, debug_dir);

    let mut orchestrator = ScanOrchestrator::new(
        &engine,
        &mut classifier,
        channel.as_ref().map(|c| c as &dyn CodeChannel),
        &sink,
        &config,
        credentials,
    )
    .with_session_config(session_config);

    if let Ok(data_dir) = AppConfig::data_dir() {
        orchestrator = orchestrator.with_data_dir(data_dir);
    }

    // Interrupt aborts the scan but still releases the browser
    let outcome = tokio::select! {
        result = orchestrator.run() => Some(result),
        _ = tokio::signal::ctrl_c() => {
            warn!("interrupted, shutting down");
            None
        }
    };

    if let Err(e) = engine.close().await {
        warn!(error = %e, "could not close browser cleanly");
    }

    match outcome {
        Some(result) => {
            let outcome = result.context("scan failed")?;
            info!(
                term = %outcome.search_term,
                harvested = outcome.harvested,
                relevant = outcome.relevant,
                reported = outcome.reported,
                "scan complete"
            );
            Ok(())
        }
        None => Ok(()),
    }
}
