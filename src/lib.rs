//! Switchboard: intent routing and shared conversation context for
//! multi-agent assistants.
//!
//! One coordinator sits between the user and a set of specialized agents.
//! Each utterance is classified by a language model, turned into a routing
//! decision, dispatched to the chosen agent and merged back into the
//! session's context.

pub mod agents;
pub mod config;
pub mod context;
pub mod dispatch;
pub mod inference;
pub mod routing;

#[cfg(test)]
pub(crate) mod test_support;

use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use anyhow::Context as _;

pub use agents::{AgentDescriptor, AgentInvoker, AgentRegistry};
pub use config::{load_config, SwitchboardConfig};
pub use context::{ContextStore, ConversationContext};
pub use dispatch::{DispatchCoordinator, DispatchError, TurnResponse};
pub use inference::{InferenceClient, ModelInference};

const DEFAULT_LOG_FILTER: &str = "switchboard=info,warn";

/// Platform data directory for Switchboard state (logs, session database).
///
/// - macOS: `~/Library/Application Support/switchboard/`
/// - Linux: `$XDG_DATA_HOME/switchboard/` (fallback `~/.local/share/switchboard/`)
///
/// Falls back to `~/.switchboard/` when neither can be resolved.
pub fn data_dir() -> PathBuf {
    if let Some(dir) = dirs::data_dir() {
        return dir.join("switchboard");
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".switchboard")
}

/// Install the global tracing subscriber.
///
/// With `logging.dir` set, the previous `logging.file_name` is rotated
/// (`.1`, `.2`, … up to `logging.keep`) and a fresh file is written through
/// a line-flushing writer. Otherwise logs go to stderr. `RUST_LOG` overrides
/// the configured filter.
pub fn init_tracing(logging: &config::LoggingConfig) -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().or_else(|_| {
        EnvFilter::try_new(logging.filter.as_deref().unwrap_or(DEFAULT_LOG_FILTER))
    })?;

    let Some(log_dir) = &logging.dir else {
        fmt::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_target(true)
            .try_init()
            .map_err(|e| anyhow::anyhow!("failed to install tracing subscriber: {e}"))?;
        return Ok(());
    };

    std::fs::create_dir_all(log_dir)
        .with_context(|| format!("failed to create log directory {}", log_dir.display()))?;
    let log_path = log_dir.join(&logging.file_name);
    let rotated = rotate_log_file(&log_path, logging.keep);

    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .with_context(|| format!("failed to open {}", log_path.display()))?;

    fmt::fmt()
        .with_env_filter(filter)
        .with_writer(LineFlushedFile::new(log_file))
        .with_ansi(false)
        .with_target(true)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to install tracing subscriber: {e}"))?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        log_file = %log_path.display(),
        keep = logging.keep,
        rotated,
        pid = std::process::id(),
        "switchboard logging started"
    );
    Ok(())
}

/// `base.{n}`, the n-th most recent rotated log.
fn rotated_path(base: &Path, n: u32) -> PathBuf {
    let mut name = base.as_os_str().to_owned();
    name.push(format!(".{n}"));
    PathBuf::from(name)
}

/// Move the current log aside before a new run writes to it.
///
/// `base` becomes `base.1`, `base.1` becomes `base.2` and so on; whatever
/// would land past `base.{keep}` is deleted. With `keep == 0` the previous
/// log is discarded. Returns whether there was a previous log. Missing
/// links in the chain are skipped.
fn rotate_log_file(base: &Path, keep: u32) -> bool {
    if !base.exists() {
        return false;
    }
    if keep == 0 {
        std::fs::remove_file(base).ok();
        return true;
    }
    std::fs::remove_file(rotated_path(base, keep)).ok();
    for n in (1..keep).rev() {
        std::fs::rename(rotated_path(base, n), rotated_path(base, n + 1)).ok();
    }
    std::fs::rename(base, rotated_path(base, 1)).ok();
    true
}

/// Shared log file flushed after every write, so lines survive a crash.
#[derive(Clone)]
struct LineFlushedFile {
    file: Arc<Mutex<File>>,
}

impl LineFlushedFile {
    fn new(file: File) -> Self {
        Self {
            file: Arc::new(Mutex::new(file)),
        }
    }

    // A panic mid-write leaves at worst a partial line; keep logging.
    fn lock(&self) -> MutexGuard<'_, File> {
        self.file.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Write for LineFlushedFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut file = self.lock();
        let n = file.write(buf)?;
        file.flush()?;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.lock().flush()
    }
}

impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for LineFlushedFile {
    type Writer = LineFlushedFile;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read(path: &Path) -> String {
        std::fs::read_to_string(path).unwrap()
    }

    fn seed(base: &Path, files: &[(&str, &str)]) {
        for (suffix, body) in files {
            std::fs::write(format!("{}{suffix}", base.display()), body).unwrap();
        }
    }

    #[test]
    fn test_rotate_shifts_and_drops_oldest() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("router.log");
        seed(&base, &[("", "current"), (".1", "one"), (".2", "two"), (".3", "three")]);

        assert!(rotate_log_file(&base, 3));

        assert!(!base.exists());
        assert_eq!(read(&rotated_path(&base, 1)), "current");
        assert_eq!(read(&rotated_path(&base, 2)), "one");
        assert_eq!(read(&rotated_path(&base, 3)), "two");
        assert!(!rotated_path(&base, 4).exists());
    }

    #[test]
    fn test_rotate_honours_keep() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("switchboard.log");
        seed(&base, &[("", "current"), (".1", "one")]);

        rotate_log_file(&base, 1);
        assert_eq!(read(&rotated_path(&base, 1)), "current");
        assert!(!rotated_path(&base, 2).exists());

        std::fs::write(&base, "next").unwrap();
        rotate_log_file(&base, 0);
        assert!(!base.exists());
        assert_eq!(read(&rotated_path(&base, 1)), "current");
    }

    #[test]
    fn test_rotate_with_gaps_and_no_previous_log() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("switchboard.log");
        assert!(!rotate_log_file(&base, 3));

        std::fs::write(&base, "only").unwrap();
        rotate_log_file(&base, 3);
        std::fs::write(&base, "second").unwrap();
        rotate_log_file(&base, 3);

        assert_eq!(read(&rotated_path(&base, 1)), "second");
        assert_eq!(read(&rotated_path(&base, 2)), "only");
    }

    #[test]
    fn test_line_flushed_file_writes_through() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.log");
        let mut writer = LineFlushedFile::new(File::create(&path).unwrap());
        let mut clone = writer.clone();

        writer.write_all(b"line one\n").unwrap();
        assert_eq!(read(&path), "line one\n");
        clone.write_all(b"line two\n").unwrap();
        assert_eq!(read(&path), "line one\nline two\n");
    }

    #[test]
    fn test_data_dir_is_named_for_crate() {
        let dir = data_dir();
        let name = dir.file_name().unwrap().to_string_lossy();
        assert!(name == "switchboard" || name == ".switchboard");
    }
}
