// tsframe Linux host: runs one frame-reading session, or a test stream source.

mod config;
mod telemetry;

use anyhow::Context;
use tsframe_core::{source, CancelToken, EventKind, EventReceiver, EventSink, Session};

use config::{Config, Role};

const VERSION: &str = env!("CARGO_PKG_VERSION");

fn main() -> anyhow::Result<()> {
    for arg in std::env::args().skip(1) {
        if arg == "--version" || arg == "-V" {
            println!("tsframe-linux {}", VERSION);
            return Ok(());
        }
    }

    telemetry::init_logging();
    let cfg = config::load();
    tracing::info!(version = VERSION, role = ?cfg.role, "starting");

    let rt = tokio::runtime::Runtime::new().context("building runtime")?;
    rt.block_on(async move {
        match cfg.role {
            Role::Receive => receive(&cfg).await,
            Role::Serve => serve(&cfg).await,
        }
    })
}

/// Run one session to completion, cancelling it on Ctrl+C or SIGTERM.
async fn receive(cfg: &Config) -> anyhow::Result<()> {
    let (events, rx) = EventSink::channel();
    let handle = Session::start(cfg.target(), cfg.mode, cfg.reader_config(), events)
        .context("starting session thread")?;
    tracing::info!(id = %handle.id(), target = %cfg.target(), mode = %cfg.mode, "session started");

    let event_log = tokio::spawn(log_events(rx));
    let cancel = handle.cancel_token();
    let mut worker = tokio::task::spawn_blocking(move || handle.join());
    let report = tokio::select! {
        joined = &mut worker => joined?,
        res = shutdown_signal() => {
            res?;
            tracing::info!("shutdown requested, cancelling session");
            cancel.cancel();
            worker.await?
        }
    };
    event_log.await?;

    tracing::info!(
        total = report.stats.attempts,
        good = report.stats.well_formed,
        bad = report.stats.malformed,
        "end of socket"
    );
    match report.error {
        None => Ok(()),
        Some(e) if e.is_cancelled() => Ok(()),
        Some(e) => Err(e.into()),
    }
}

/// Drain session events until the worker drops its sink.
async fn log_events(mut rx: EventReceiver) {
    while let Some(ev) = rx.recv().await {
        match ev.kind {
            EventKind::Malformed => {
                tracing::debug!(arg1 = ev.arg1, arg2 = ev.arg2, "event: malformed")
            }
            EventKind::Backoff => tracing::debug!(offset = ev.arg1, "event: try again"),
            EventKind::Finished => {
                tracing::info!(total = ev.arg1, good = ev.arg2, "event: finished")
            }
            kind => tracing::debug!(?kind, "event"),
        }
    }
}

/// Serve frames to every client until Ctrl+C or SIGTERM.
async fn serve(cfg: &Config) -> anyhow::Result<()> {
    let listener = source::bind(cfg.source_addr())?;
    let source_cfg = cfg.source_config();
    let cancel = CancelToken::new();
    let worker_cancel = cancel.clone();
    let mut worker = tokio::task::spawn_blocking(move || {
        source::serve(&listener, &source_cfg, &worker_cancel, None)
    });
    let sent = tokio::select! {
        joined = &mut worker => joined??,
        res = shutdown_signal() => {
            res?;
            tracing::info!("shutdown requested, stopping source");
            cancel.cancel();
            worker.await??
        }
    };
    tracing::info!(
        clients = sent.len(),
        frames = sent.iter().sum::<usize>(),
        "source stopped"
    );
    Ok(())
}

/// Wait for Ctrl+C or SIGTERM (Unix).
async fn shutdown_signal() -> anyhow::Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate()).context("installing SIGTERM handler")?;
        tokio::select! {
            res = tokio::signal::ctrl_c() => res?,
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
    }
    Ok(())
}
