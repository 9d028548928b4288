//! Logging infrastructure for glidecloud.
//!
//! - Always prints to stderr
//! - Optionally appends to a log file through a non-blocking writer
//! - Filter defaults to `info` (`debug` when verbose), overridable by `RUST_LOG`

use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Guard that must be kept alive for the duration of logging.
///
/// Dropping this guard flushes and closes the log file writer, if any.
pub struct LoggingGuard {
    _file_guard: Option<WorkerGuard>,
}

/// Filter directive used when `RUST_LOG` is not set.
pub fn default_filter(verbose: bool) -> &'static str {
    if verbose {
        "debug"
    } else {
        "info"
    }
}

/// Initialize the global subscriber.
///
/// # Errors
///
/// Returns an error if the log file's directory cannot be created.
pub fn init_logging(log_file: Option<&Path>, verbose: bool) -> Result<LoggingGuard, io::Error> {
    let (file_layer, file_guard) = match log_file {
        Some(path) => {
            let (dir, name) = prepare_log_file(path)?;
            let appender = tracing_appender::rolling::never(dir, name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    let stderr_layer = tracing_subscriber::fmt::layer().with_writer(io::stderr);

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter(verbose)));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(stderr_layer)
        .init();

    Ok(LoggingGuard {
        _file_guard: file_guard,
    })
}

/// Split `path` into directory and file name, creating the directory.
fn prepare_log_file(path: &Path) -> Result<(PathBuf, OsString), io::Error> {
    let name = path.file_name().map(OsString::from).ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("log path has no file name: {}", path.display()),
        )
    })?;
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&dir)?;
    Ok((dir, name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_filter() {
        assert_eq!(default_filter(false), "info");
        assert_eq!(default_filter(true), "debug");
    }

    #[test]
    fn test_prepare_creates_nested_directory() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("deep/nested/glidecloud.log");

        let (dir, name) = prepare_log_file(&path).unwrap();

        assert!(dir.is_dir());
        assert_eq!(name, "glidecloud.log");
    }

    #[test]
    fn test_prepare_bare_file_name() {
        let (dir, name) = prepare_log_file(Path::new("server.log")).unwrap();
        assert_eq!(dir, PathBuf::from("."));
        assert_eq!(name, "server.log");
    }

    #[test]
    fn test_prepare_rejects_directory_path() {
        assert!(prepare_log_file(Path::new("/")).is_err());
    }

    #[test]
    fn test_guard_structure() {
        use tracing_appender::non_blocking::NonBlocking;

        let (writer, guard) = NonBlocking::new(std::io::sink());
        drop(writer);

        let _with_file = LoggingGuard {
            _file_guard: Some(guard),
        };
        let _without_file = LoggingGuard { _file_guard: None };
    }

    // Actual log output needs a global subscriber, which can only be set
    // once per process; that path is exercised by the binary.
}
