//! RiskGate gateway binary.
//!
//! Loads configuration, initializes tracing, replays the journal, wires
//! the four risk rules into the evaluation engine, and serves the framed
//! TCP protocol until a termination signal arrives.

use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::net::TcpListener;
use tokio::signal::unix::{signal, SignalKind};
use tokio_util::sync::CancellationToken;

use rg_core::config::AppConfig;
use rg_engine::RiskEngine;
use rg_journal::{Journal, JournalSettings};
use rg_rules::{NewOrderMoratorium, PriceCheck, SeqBadTrades, TrailingDrawdown};

use rg_gateway::server;

/// RiskGate pre-trade risk server.
#[derive(Parser, Debug)]
#[command(name = "rg-gateway", about = "Pre-trade risk gate server")]
struct Args {
    /// Listening port (overrides configuration).
    port: Option<u16>,

    /// Path to TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

/// Short program name, used for the journal directory and panic file.
fn program_name() -> String {
    std::env::args()
        .next()
        .as_deref()
        .map(std::path::Path::new)
        .and_then(|p| p.file_name())
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "rg-gateway".to_string())
}

/// Append panic messages and backtraces to `<program>.panic` before the
/// default hook aborts the process.
fn install_panic_hook(program: &str) {
    let path = format!("{program}.panic");
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        use std::io::Write;
        if let Ok(mut file) = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
        {
            let backtrace = std::backtrace::Backtrace::force_capture();
            let _ = writeln!(file, "\n{info}\n{backtrace}");
        }
        default_hook(info);
    }));
}

async fn wait_for_stop_signal() -> Result<()> {
    let mut term = signal(SignalKind::terminate()).context("install SIGTERM handler")?;
    let mut int = signal(SignalKind::interrupt()).context("install SIGINT handler")?;
    let mut hup = signal(SignalKind::hangup()).context("install SIGHUP handler")?;
    let mut tstp =
        signal(SignalKind::from_raw(libc::SIGTSTP)).context("install SIGTSTP handler")?;

    tokio::select! {
        _ = term.recv() => tracing::info!("received SIGTERM"),
        _ = int.recv() => tracing::info!("received SIGINT"),
        _ = hup.recv() => tracing::info!("received SIGHUP"),
        _ = tstp.recv() => tracing::info!("received SIGTSTP"),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let program = program_name();
    install_panic_hook(&program);

    let cfg = AppConfig::load(args.config.as_deref())?;
    rg_core::logging::init_tracing(cfg.logging.json);

    let started = std::time::Instant::now();
    tracing::info!(%program, "starting");

    let port = args.port.unwrap_or(cfg.server.port);

    // ── Engine and rules (order checks run in this order) ──────────
    let engine = Arc::new(RiskEngine::new());
    engine.add_check(NewOrderMoratorium::new(&cfg.moratorium, &cfg.check));
    engine.add_check(PriceCheck::subscribe(
        engine.bus(),
        &cfg.price_check,
        &cfg.check,
    ));
    engine.add_check(SeqBadTrades::subscribe(
        engine.bus(),
        &cfg.bad_trades,
        &cfg.check,
    ));
    engine.add_check(TrailingDrawdown::subscribe(
        engine.bus(),
        &cfg.drawdown,
        &cfg.check,
    ));

    let cancel = CancellationToken::new();

    // ── Journal: replay existing files, then record live traffic ───
    let journal = Journal::spawn(
        &engine,
        JournalSettings {
            dir: cfg.journal.resolve_dir(&program),
            program: program.clone(),
            retention: cfg.journal.retention(),
            tick: cfg.server.tick(),
        },
        cancel.clone(),
    )?;

    // ── Listener ───────────────────────────────────────────────────
    let bind_addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, port));
    let listener = TcpListener::bind(bind_addr)
        .await
        .with_context(|| format!("failed to bind {bind_addr}"))?;

    let server = tokio::spawn(server::serve(
        listener,
        engine.clone(),
        cancel.clone(),
        cfg.server.max_frame_bytes,
    ));

    tracing::info!(
        %program,
        port,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "started"
    );

    wait_for_stop_signal().await?;

    // Stop in reverse start order: listener first, journal last.
    cancel.cancel();
    server.await.context("server task panicked")??;
    journal.stop();

    tracing::info!(%program, "stopped");
    Ok(())
}
