use chrono::{DateTime, Local};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::{RecorderBackend, RecorderError, ScreenRecorder};
use crate::capture::WindowHandle;
use crate::config::Config;
use crate::files;

static INSTANCE: AtomicUsize = AtomicUsize::new(0);

/// One numbered recording: picks the output names, drives a
/// [`ScreenRecorder`] and remembers when it started and finished.
pub struct RecordingSession {
    id: usize,
    video_path: PathBuf,
    log_path: PathBuf,
    started_at: DateTime<Local>,
    ended_at: Arc<Mutex<Option<DateTime<Local>>>>,
    recorder: ScreenRecorder,
}

/// Base name shared by the video and its log, e.g.
/// `ScreenRecording_2024-05-01T13_45_10`.
pub fn session_base_name(prefix: &str, started_at: &DateTime<Local>) -> String {
    let stamp = started_at.format("%Y-%m-%dT%H:%M:%S").to_string();
    format!("{}{}", prefix, files::to_valid_filename(&stamp))
}

impl RecordingSession {
    pub fn start(
        window: WindowHandle,
        config: &Config,
        backend: Arc<dyn RecorderBackend>,
    ) -> Result<Self, RecorderError> {
        let id = INSTANCE.fetch_add(1, Ordering::SeqCst) + 1;
        tracing::info!("RecordingSession #{} created", id);

        let output_dir = files::ensure_exists(&config.output.directory);
        let started_at = Local::now();
        let base = session_base_name(&config.output.file_prefix, &started_at);
        let video_path = output_dir.join(format!("{}.{}", base, config.output.video_extension));
        let log_path = output_dir.join(format!("{}.log", base));

        let mut recorder = ScreenRecorder::new(config.recorder_settings(), backend);
        let ended_at = Arc::new(Mutex::new(None));
        let ended = Arc::clone(&ended_at);
        recorder.on_complete(move |_| {
            let mut ended = ended.lock().unwrap_or_else(|e| e.into_inner());
            if ended.is_none() {
                *ended = Some(Local::now());
                tracing::info!("RecordingSession #{} complete", id);
            }
        });
        recorder.create_recording(&video_path, window, Some(log_path.clone()))?;

        Ok(Self {
            id,
            video_path,
            log_path,
            started_at,
            ended_at,
            recorder,
        })
    }

    pub fn stop(&mut self) -> Result<(), RecorderError> {
        self.recorder.end_recording()
    }

    /// Blocks until the recorder has reported back, or `timeout` passes.
    pub fn finish(&mut self, timeout: Duration) -> bool {
        self.recorder.wait(timeout)
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn video_path(&self) -> &Path {
        &self.video_path
    }

    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    pub fn started_at(&self) -> DateTime<Local> {
        self.started_at
    }

    pub fn ended_at(&self) -> Option<DateTime<Local>> {
        *self.ended_at.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recording::DryRunBackend;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn config_in(dir: &Path) -> Config {
        let mut config = Config::default();
        config.output.directory = dir.join("Recordings");
        config
    }

    #[test]
    fn test_base_name_is_filesystem_safe() {
        let started = Local.with_ymd_and_hms(2024, 5, 1, 13, 45, 10).unwrap();
        assert_eq!(
            session_base_name("ScreenRecording_", &started),
            "ScreenRecording_2024-05-01T13_45_10"
        );
    }

    #[test]
    fn test_session_lifecycle() {
        let dir = TempDir::new().unwrap();
        let config = config_in(dir.path());

        let mut session = RecordingSession::start(WindowHandle(11), &config, Arc::new(DryRunBackend)).unwrap();
        assert!(session.ended_at().is_none());
        assert_eq!(session.video_path().extension().unwrap(), "mp4");
        assert_eq!(session.log_path().extension().unwrap(), "log");
        assert!(session.video_path().starts_with(dir.path().join("Recordings")));

        session.stop().unwrap();
        assert!(session.finish(Duration::from_secs(5)));

        let ended = session.ended_at().unwrap();
        assert!(ended >= session.started_at());
        assert!(session.video_path().exists());
        assert!(session.log_path().exists());
    }

    #[test]
    fn test_sessions_are_numbered() {
        let dir = TempDir::new().unwrap();
        let config = config_in(dir.path());
        let backend: Arc<dyn RecorderBackend> = Arc::new(DryRunBackend);

        let mut first = RecordingSession::start(WindowHandle(1), &config, Arc::clone(&backend)).unwrap();
        first.stop().unwrap();
        first.finish(Duration::from_secs(5));
        let mut second = RecordingSession::start(WindowHandle(1), &config, backend).unwrap();
        second.stop().unwrap();
        second.finish(Duration::from_secs(5));

        assert!(second.id() > first.id());
    }
}
