//! Journal lifecycle: replay on startup, background writer, retention.

use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};
use tokio_util::sync::CancellationToken;

use rg_core::types::{Quote, Timestamp, Trade};
use rg_core::window::MovingWindow;
use rg_engine::{RiskEngine, Subscription};

use crate::codec;

/// Journal file extension, shared by the writer and the replay scan.
const FILE_EXT: &str = "rm_save";

/// Hour stamp embedded in journal file names.
const HOUR_FORMAT: &str = "%y%m%d-%H";

/// Everything the journal needs to run.
#[derive(Debug, Clone)]
pub struct JournalSettings {
    /// Directory holding the per-hour files; created if absent.
    pub dir: PathBuf,
    /// Program name used as the file-name prefix.
    pub program: String,
    /// How long rotated files live before deletion.
    pub retention: Duration,
    /// Poll granularity of the writer thread.
    pub tick: Duration,
}

enum Record {
    Quote(Quote),
    Trade(Trade),
}

/// Durable journal of quotes and trades.
///
/// Created with [`Journal::spawn`]: existing files are replayed through
/// the engine first, then the journal subscribes to the live streams and
/// hands records to a dedicated writer thread. Dropping the journal (or
/// calling [`Journal::stop`]) unsubscribes and joins the writer.
pub struct Journal {
    worker: Option<JoinHandle<()>>,
    _quotes: Subscription<Quote>,
    _trades: Subscription<Trade>,
}

impl Journal {
    /// Replay existing files into `engine`, then start journaling its
    /// quote and trade streams.
    pub fn spawn(
        engine: &Arc<RiskEngine>,
        settings: JournalSettings,
        cancel: CancellationToken,
    ) -> Result<Self> {
        fs::create_dir_all(&settings.dir)
            .with_context(|| format!("failed to create journal dir {}", settings.dir.display()))?;

        replay_dir(&settings.dir, engine);
        let seed = existing_files(&settings.dir);

        let (tx, rx) = channel::unbounded::<Record>();
        let worker_settings = settings.clone();
        let worker = std::thread::Builder::new()
            .name("rg-journal".into())
            .spawn(move || writer_loop(rx, worker_settings, cancel, seed))
            .context("failed to start journal writer thread")?;

        // Subscribed only after replay, so replayed events are not
        // re-journaled.
        let quote_tx = tx.clone();
        let quotes = engine.bus().quotes.subscribe(move |quote: &Quote| {
            let _ = quote_tx.send(Record::Quote(quote.clone()));
        });
        let trade_tx = tx;
        let trades = engine.bus().trades.subscribe(move |trade: &Trade| {
            let _ = trade_tx.send(Record::Trade(trade.clone()));
        });

        Ok(Self {
            worker: Some(worker),
            _quotes: quotes,
            _trades: trades,
        })
    }

    /// Unsubscribe from the event streams and join the writer thread.
    ///
    /// The writer drains queued records before exiting, so everything
    /// observed before this call reaches disk.
    pub fn stop(mut self) {
        self.join_worker();
    }

    fn join_worker(&mut self) {
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                tracing::error!("journal writer thread panicked");
            }
        }
    }
}

impl Drop for Journal {
    fn drop(&mut self) {
        self.join_worker();
    }
}

// ── Replay ─────────────────────────────────────────────────────────────

/// Files currently on disk with their modification times, oldest first.
fn existing_files(dir: &Path) -> Vec<(Timestamp, PathBuf)> {
    let Ok(entries) = fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut files: Vec<(Timestamp, PathBuf)> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.extension().is_some_and(|ext| ext == FILE_EXT))
        .map(|path| (file_mtime(&path), path))
        .collect();
    files.sort();
    files
}

fn file_mtime(path: &Path) -> Timestamp {
    fs::metadata(path)
        .and_then(|meta| meta.modified())
        .ok()
        .and_then(|mtime| mtime.duration_since(std::time::UNIX_EPOCH).ok())
        .map(|since| Timestamp::from_millis(since.as_millis() as i64))
        .unwrap_or(Timestamp::EPOCH)
}

/// Replay every journal file in lexicographic (chronological) order.
///
/// Each record goes through the same entry point as live traffic; order
/// responses are discarded. A file that cannot be opened is skipped.
fn replay_dir(dir: &Path, engine: &Arc<RiskEngine>) {
    let Ok(entries) = fs::read_dir(dir) else {
        return;
    };
    let mut files: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.extension().is_some_and(|ext| ext == FILE_EXT))
        .collect();
    files.sort();

    tracing::info!(files = files.len(), dir = %dir.display(), "replaying journal");
    for file in &files {
        match replay_file(file, engine) {
            Ok(lines) => {
                tracing::info!(file = %file.display(), lines, "journal file replayed");
            }
            Err(error) => {
                tracing::warn!(file = %file.display(), %error, "skipping unreadable journal file");
            }
        }
    }
}

fn replay_file(path: &Path, engine: &Arc<RiskEngine>) -> Result<usize> {
    let started = std::time::Instant::now();
    let file =
        File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    let reader = BufReader::new(file);

    let mut lines = 0usize;
    for (line_no, line) in reader.lines().enumerate() {
        let line = line.with_context(|| format!("failed to read {}", path.display()))?;
        if line.is_empty() {
            continue;
        }
        match codec::decode_line(&line) {
            Some(msg) => {
                engine.handle(&msg);
                lines += 1;
            }
            None => {
                tracing::warn!(
                    file = %path.display(),
                    line = line_no + 1,
                    "skipping corrupt journal line"
                );
            }
        }
    }
    tracing::debug!(
        file = %path.display(),
        lines,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "replay pass finished"
    );
    Ok(lines)
}

// ── Writer ─────────────────────────────────────────────────────────────

struct OpenFile {
    path: PathBuf,
    writer: BufWriter<File>,
    hour: i64,
}

fn writer_loop(
    rx: Receiver<Record>,
    settings: JournalSettings,
    cancel: CancellationToken,
    seed: Vec<(Timestamp, PathBuf)>,
) {
    // Rotated-out files wait here until the retention horizon passes, then
    // get deleted. keep = 0: nothing survives past the horizon.
    let retention: MovingWindow<PathBuf> = MovingWindow::with_keep(settings.retention, 0);
    for (mtime, path) in seed {
        retention.insert_with(mtime, path, |_, old| delete_file(old));
    }

    let mut current: Option<OpenFile> = None;

    loop {
        match rx.recv_timeout(settings.tick) {
            Ok(record) => {
                write_record(&mut current, &settings, &retention, record);
                // Drain the burst before flushing once.
                while let Ok(record) = rx.try_recv() {
                    write_record(&mut current, &settings, &retention, record);
                }
                flush_current(&mut current);
            }
            Err(RecvTimeoutError::Timeout) => {
                if cancel.is_cancelled() {
                    break;
                }
                // Rotate even when idle, so a quiet hour still moves its
                // file into the retention window.
                let now = Timestamp::now();
                if current
                    .as_ref()
                    .is_some_and(|open| open.hour != hour_of(now))
                {
                    close_into_retention(&mut current, &retention, now);
                }
            }
            Err(RecvTimeoutError::Disconnected) => break,
        }

        retention.evict_with(Timestamp::now(), |_, path| delete_file(path));
    }

    // Drain whatever arrived before cancellation.
    while let Ok(record) = rx.try_recv() {
        write_record(&mut current, &settings, &retention, record);
    }
    flush_current(&mut current);
    if let Some(open) = &current {
        tracing::debug!(file = %open.path.display(), "journal writer stopped");
    }
}

fn write_record(
    current: &mut Option<OpenFile>,
    settings: &JournalSettings,
    retention: &MovingWindow<PathBuf>,
    record: Record,
) {
    let now = Timestamp::now();
    if let Err(error) = ensure_file(current, settings, retention, now) {
        tracing::error!(%error, "journal append dropped");
        return;
    }
    let Some(open) = current.as_mut() else {
        return;
    };

    let line = match record {
        Record::Quote(quote) => codec::encode_quote(&quote),
        Record::Trade(trade) => codec::encode_trade(&trade),
    };
    if let Err(error) = writeln!(open.writer, "{line}") {
        tracing::error!(file = %open.path.display(), %error, "journal append failed");
    }
}

fn hour_of(t: Timestamp) -> i64 {
    t.as_millis().div_euclid(3_600_000)
}

/// Flush and close the open file, handing it to the retention window.
fn close_into_retention(
    current: &mut Option<OpenFile>,
    retention: &MovingWindow<PathBuf>,
    now: Timestamp,
) {
    if let Some(mut old) = current.take() {
        let _ = old.writer.flush();
        tracing::debug!(file = %old.path.display(), "journal file closed");
        retention.insert_with(now, old.path, |_, expired| delete_file(expired));
    }
}

/// Open the file for the current hour, rotating the previous one into the
/// retention window on an hour boundary.
fn ensure_file(
    current: &mut Option<OpenFile>,
    settings: &JournalSettings,
    retention: &MovingWindow<PathBuf>,
    now: Timestamp,
) -> Result<()> {
    let hour = hour_of(now);
    if current.as_ref().is_some_and(|open| open.hour == hour) {
        return Ok(());
    }

    close_into_retention(current, retention, now);

    let path = settings.dir.join(hour_file_name(&settings.program, hour));
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("failed to open journal file {}", path.display()))?;
    tracing::info!(file = %path.display(), "journal file opened");
    *current = Some(OpenFile {
        path,
        writer: BufWriter::new(file),
        hour,
    });
    Ok(())
}

fn hour_file_name(program: &str, hour: i64) -> String {
    let stamp = DateTime::<Utc>::from_timestamp_millis(hour * 3_600_000)
        .map(|dt| dt.format(HOUR_FORMAT).to_string())
        .unwrap_or_else(|| hour.to_string());
    format!("{program}.{stamp}.{FILE_EXT}")
}

fn flush_current(current: &mut Option<OpenFile>) {
    if let Some(open) = current.as_mut() {
        if let Err(error) = open.writer.flush() {
            tracing::error!(file = %open.path.display(), %error, "journal flush failed");
        }
    }
}

fn delete_file(path: &PathBuf) {
    match fs::remove_file(path) {
        Ok(()) => tracing::info!(file = %path.display(), "expired journal file deleted"),
        Err(error) => {
            tracing::warn!(file = %path.display(), %error, "failed to delete expired journal file");
        }
    }
}
