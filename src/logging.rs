// src/logging.rs

//! Log setup for the binary: `log` records go through env_logger to stderr
//! and, when `logging.file` is set, also to a daily-rotated file.

use std::io::{self, Write};
use std::path::Path;

use env_logger::{Env, Target, WriteStyle};
use tracing_appender::rolling::{RollingFileAppender, Rotation};

use crate::error::{AppError, Result};
use crate::models::LoggingConfig;

/// Install the global logger. `RUST_LOG` wins over the configured level;
/// `verbose` forces debug.
pub fn init(config: &LoggingConfig, verbose: bool) -> Result<()> {
    let level = if verbose {
        "debug".to_string()
    } else {
        config.level.trim().to_lowercase()
    };

    let mut builder = env_logger::Builder::from_env(Env::default().default_filter_or(level));
    builder.format_timestamp_secs();

    if let Some(path) = &config.file {
        let file = rolling_file(path, config.keep_files)?;
        builder
            .write_style(WriteStyle::Never)
            .target(Target::Pipe(Box::new(Tee {
                stderr: io::stderr(),
                file,
            })));
    }

    builder
        .try_init()
        .map_err(|e| AppError::config(format!("logger already installed: {e}")))
}

/// Daily appender for `path`: `dir/name.YYYY-MM-DD.ext`, keeping `keep` files.
fn rolling_file(path: &Path, keep: usize) -> Result<RollingFileAppender> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let prefix = path
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(|| AppError::config(format!("logging.file {} is invalid", path.display())))?;

    let mut appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(prefix)
        .max_log_files(keep.max(1));
    if let Some(ext) = path.extension().and_then(|s| s.to_str()) {
        appender = appender.filename_suffix(ext);
    }
    appender.build(dir).map_err(|e| {
        AppError::config(format!(
            "cannot open log file in {}: {e}",
            dir.display()
        ))
    })
}

/// Writes every record to stderr and the log file.
struct Tee<F> {
    stderr: io::Stderr,
    file: F,
}

impl<F: Write> Write for Tee<F> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        // a broken terminal must not stop the file log
        let _ = self.stderr.write_all(buf);
        self.file.write_all(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        let _ = self.stderr.flush();
        self.file.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rolling_file_is_dated_and_keeps_extension() {
        let dir = tempfile::tempdir().unwrap();
        let mut appender = rolling_file(&dir.path().join("flatwatch.log"), 7).unwrap();
        appender.write_all(b"cycle #1 done\n").unwrap();
        appender.flush().unwrap();

        let names: Vec<String> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names.len(), 1);
        assert!(names[0].starts_with("flatwatch."), "{names:?}");
        assert!(names[0].ends_with(".log"), "{names:?}");

        let written = std::fs::read_to_string(dir.path().join(&names[0])).unwrap();
        assert_eq!(written, "cycle #1 done\n");
    }

    #[test]
    fn tee_writes_the_whole_record_to_the_file() {
        let mut tee = Tee {
            stderr: io::stderr(),
            file: Vec::new(),
        };
        write!(tee, "[INFO] fetched {} listings", 3).unwrap();
        tee.flush().unwrap();
        assert_eq!(tee.file, b"[INFO] fetched 3 listings");
    }
}
