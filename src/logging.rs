use chrono::{Local, NaiveDate};
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

/// Daily harness log, e.g. `log_01-05-2024.txt`.
pub fn log_file_name(date: NaiveDate) -> String {
    format!("log_{}.txt", date.format("%d-%m-%Y"))
}

pub fn log_file_path(dir: &Path, date: NaiveDate) -> PathBuf {
    dir.join(log_file_name(date))
}

fn open_log_file(path: &Path) -> io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path)
}

/// Appends to the day's log file in `dir`, moving on to a new file the first
/// time something is written after the local date changes.
pub struct DailyLogWriter {
    dir: PathBuf,
    today: Box<dyn Fn() -> NaiveDate + Send>,
    current: Option<(NaiveDate, File)>,
}

impl DailyLogWriter {
    pub fn new(dir: &Path) -> Self {
        Self::with_clock(dir, || Local::now().date_naive())
    }

    fn with_clock<F>(dir: &Path, today: F) -> Self
    where
        F: Fn() -> NaiveDate + Send + 'static,
    {
        Self {
            dir: dir.to_path_buf(),
            today: Box::new(today),
            current: None,
        }
    }

    fn file(&mut self) -> io::Result<&mut File> {
        let today = (self.today)();
        let file = match self.current.take() {
            Some((date, file)) if date == today => file,
            _ => open_log_file(&log_file_path(&self.dir, today))?,
        };
        Ok(&mut self.current.insert((today, file)).1)
    }
}

impl Write for DailyLogWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.file()?.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        match &mut self.current {
            Some((_, file)) => file.flush(),
            None => Ok(()),
        }
    }
}

/// Installs the global subscriber: everything allowed by `RUST_LOG` (default
/// `debug`) goes to the daily file in `log_dir`, warnings and errors also go
/// to stderr. Console output stays quiet so the status line is readable.
///
/// The returned guard flushes the file writer on drop; keep it alive for the
/// life of the process.
pub fn init(log_dir: &Path) -> WorkerGuard {
    let path = log_file_path(log_dir, Local::now().date_naive());
    let file_error = open_log_file(&path).err();

    let (writer, guard) = tracing_appender::non_blocking(DailyLogWriter::new(log_dir));
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"));
    let file_layer = fmt::layer()
        .with_ansi(false)
        .with_writer(writer)
        .with_filter(filter);

    let console_layer = fmt::layer()
        .with_writer(io::stderr)
        .with_target(false)
        .with_filter(LevelFilter::WARN);

    tracing_subscriber::registry()
        .with(file_layer)
        .with(console_layer)
        .init();

    if let Some(e) = file_error {
        tracing::warn!("Could not open log file {}: {}", path.display(), e);
    }
    guard
}
