//! HTTP server binary for the voice tutor service.
//!
//! Loads configuration (env vars are authoritative per §6.6, with a
//! handful of CLI flags layered on top for local development, mirroring
//! the teacher's `fae` CLI's `--config` override pattern), wires up the
//! chosen adapters, runs crash recovery and a startup sync replay, then
//! serves the HTTP + realtime API until the process is asked to stop.

use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::EnvFilter;

use voice_tutor::adapters::llm_http::HttpLlmAdapter;
use voice_tutor::adapters::speech_stub::NullTtsAdapter;
use voice_tutor::adapters::store_http::HttpFlashcardStore;
use voice_tutor::adapters::store_local::LocalFlashcardStore;
use voice_tutor::api::{self, AppState};
use voice_tutor::config::{Environment, FlashcardAdapterKind, TutorConfig};
use voice_tutor::evaluation_service::EvaluationService;
use voice_tutor::fae_dirs;
use voice_tutor::hint_service::HintService;
use voice_tutor::ports::{FlashcardStore, LlmPort, TtsPort};
use voice_tutor::recovery_store::RecoveryStore;
use voice_tutor::session_manager::{SessionDeps, SessionManager};
use voice_tutor::sync_orchestrator::SyncOrchestrator;
use voice_tutor::usage::{UsageLedger, UsagePricing};

/// Voice-first spaced-repetition flashcard tutor: session orchestrator
/// HTTP server.
#[derive(Parser)]
#[command(name = "voice-tutor-server", version, about)]
struct Cli {
    /// Override `TUTOR_HOST` for local development.
    #[arg(long)]
    host: Option<String>,

    /// Override `TUTOR_PORT` for local development.
    #[arg(long)]
    port: Option<u16>,

    /// Force `development` behavior regardless of `ENVIRONMENT` (relaxes
    /// the production CORS allow-list requirement). Local development only.
    #[arg(long)]
    dev: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _log_guard = init_tracing();

    let cli = Cli::parse();

    let mut config = TutorConfig::from_env().map_err(|e| {
        error!(error = %e, "fatal: invalid configuration at startup");
        e
    })?;
    if let Some(host) = cli.host {
        config.server.host = host;
    }
    if let Some(port) = cli.port {
        config.server.port = port;
    }
    if cli.dev {
        config.environment = Environment::Development;
    }
    let config = Arc::new(config);

    info!(
        environment = ?config.environment,
        adapter = ?config.flashcard.adapter,
        "voice-tutor-server starting"
    );

    let recovery = Arc::new(RecoveryStore::open(&config.recovery.db_path).map_err(|e| {
        error!(error = %e, "fatal: cannot open recovery database");
        e
    })?);

    let usage = match UsageLedger::open(fae_dirs::usage_log_path(), UsagePricing::default()) {
        Ok(ledger) => Some(Arc::new(ledger)),
        Err(err) => {
            warn!(error = %err, "usage ledger unavailable; billing events will not be recorded");
            None
        }
    };

    let store: Arc<dyn FlashcardStore> = build_flashcard_store(&config)?;
    let llm: Arc<dyn LlmPort> = Arc::new(HttpLlmAdapter::new(&config.llm, config.llm.base_url.clone())?);

    let evaluation = Arc::new(EvaluationService::new(Arc::clone(&llm)));
    let hints = Arc::new(HintService::new(llm));
    // Real speech transcription/synthesis backends are an external collaborator
    // per §1; nothing in this service contacts a real ASR/TTS vendor, so the
    // session always runs with the null adapter until one is configured.
    let tts: Arc<dyn TtsPort> = Arc::new(NullTtsAdapter);

    let session_manager = Arc::new(SessionManager::new(SessionDeps {
        store: Arc::clone(&store),
        evaluation,
        hints,
        recovery: Arc::clone(&recovery),
        usage,
        tts,
        inactivity_timeout: config.session_inactivity_timeout(),
    }));

    let recovered = session_manager.recover_from_crash()?;
    if recovered > 0 {
        info!(recovered, "recovered sessions left over from a previous crash");
    }

    let purged = recovery
        .purge_stale(now_secs(), i64::from(config.recovery.purge_after_days) * 86_400)
        .unwrap_or_else(|err| {
            warn!(error = %err, "failed to purge stale recovery rows at startup");
            0
        });
    if purged > 0 {
        warn!(purged, "purged recovery rows unsynced beyond the retention window");
    }

    let startup_sync = SyncOrchestrator::new(Arc::clone(&store), Arc::clone(&recovery), config.recovery.purge_after_days);
    match startup_sync.replay_pending().await {
        Ok(report) => info!(synced = report.synced, failed = report.failed, "startup sync replay complete"),
        Err(err) => warn!(error = %err, "startup sync replay failed; ratings remain queued"),
    }

    let app_state = AppState::new(session_manager, store, recovery, Arc::clone(&config));
    let router = api::router(app_state).into_make_service_with_connect_info::<SocketAddr>();

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .map_err(|e| anyhow::anyhow!("invalid TUTOR_HOST/TUTOR_PORT: {e}"))?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("voice-tutor-server shut down cleanly");
    Ok(())
}

fn build_flashcard_store(config: &TutorConfig) -> anyhow::Result<Arc<dyn FlashcardStore>> {
    match config.flashcard.adapter {
        FlashcardAdapterKind::Anki => Ok(Arc::new(HttpFlashcardStore::new(&config.flashcard)?)),
        FlashcardAdapterKind::Local => {
            info!("FLASHCARD_ADAPTER=local: serving the built-in sample deck, nothing persists across restarts");
            Ok(Arc::new(LocalFlashcardStore::sample()))
        }
    }
}

fn now_secs() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// Mirrors the teacher's own tracing setup: terminal output honors
/// `RUST_LOG` (default `info`, third-party HTTP/TLS crates turned down to
/// `warn`), and a non-blocking rolling file writer mirrors the same
/// events into the data directory so crash forensics don't depend on
/// whoever was watching stdout (§10.1).
fn init_tracing() -> tracing_appender::non_blocking::WorkerGuard {
    let file_appender = tracing_appender::rolling::daily(fae_dirs::logs_dir(), "voice-tutor.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let env_filter = || {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("info,hyper=warn,h2=warn,rustls=warn"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_writer(std::io::stdout.and(non_blocking))
        .init();

    guard
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
    // Every live session is force-ended (best-effort rating flush, no user
    // notification) by dropping the process's task handles here; the
    // orchestrator's own teardown path already flushes to the recovery
    // store on every exit, not just the happy path (§5 Cancellation).
    info!("shutdown signal received");
}
