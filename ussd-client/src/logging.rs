//! `tracing` subscriber setup: stderr always, plus a per-day log file
//! when a directory is configured.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{Local, NaiveDate};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::prelude::*;

use crate::config::LoggingConfig;

/// `<directory>/<YYYY-MM-DD>.log`
pub fn log_file_path(directory: &Path, date: NaiveDate) -> PathBuf {
    directory.join(format!("{}.log", date.format("%Y-%m-%d")))
}

fn open_log_file(directory: &Path) -> std::io::Result<(PathBuf, File)> {
    std::fs::create_dir_all(directory)?;
    let path = log_file_path(directory, Local::now().date_naive());
    let file = OpenOptions::new().create(true).append(true).open(&path)?;
    Ok((path, file))
}

/// Install the global subscriber. `RUST_LOG` overrides `config.level`.
///
/// Returns the log file in use, if any.
pub fn init(config: &LoggingConfig) -> std::io::Result<Option<PathBuf>> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    let (path, file_layer) = if config.directory.is_empty() {
        (None, None)
    } else {
        let (path, file) = open_log_file(Path::new(&config.directory))?;
        let layer = fmt::layer()
            .with_ansi(false)
            .with_target(false)
            .with_writer(Mutex::new(file));
        (Some(path), Some(layer))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .init();
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn daily_file_name() {
        let date = NaiveDate::from_ymd_opt(2025, 3, 7).unwrap();
        assert_eq!(
            log_file_path(Path::new("/var/log/ussd"), date),
            PathBuf::from("/var/log/ussd/2025-03-07.log")
        );
    }

    #[test]
    fn open_creates_directory_and_appends() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("logs").join("app");
        let (path, _file) = open_log_file(&nested).unwrap();
        assert!(path.starts_with(&nested));
        assert!(path.exists());
        assert!(open_log_file(&nested).is_ok());
    }
}
