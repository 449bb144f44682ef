use chrono::Local;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{channel, Receiver};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use super::{build_options, Recorder, RecorderBackend, RecorderError, RecorderEvent, RecorderSettings};
use crate::capture::WindowHandle;
use crate::files;

pub const DEFAULT_LOG_FILE: &str = "ScreenRecorder.log";

const FINISH_POLL_INTERVAL: Duration = Duration::from_millis(10);

static INSTANCE: AtomicUsize = AtomicUsize::new(0);

type CompletionCallback = Box<dyn FnMut(&Path) + Send>;
type RecorderSlot = Arc<Mutex<Option<Box<dyn Recorder>>>>;

/// Owns one backend recorder for the duration of a single recording.
pub struct ScreenRecorder {
    id: usize,
    settings: RecorderSettings,
    backend: Arc<dyn RecorderBackend>,
    recorder: RecorderSlot,
    video_path: Option<PathBuf>,
    subscribers: Arc<Mutex<Vec<CompletionCallback>>>,
    pump: Option<JoinHandle<()>>,
}

impl ScreenRecorder {
    pub fn new(settings: RecorderSettings, backend: Arc<dyn RecorderBackend>) -> Self {
        let id = INSTANCE.fetch_add(1, Ordering::SeqCst) + 1;
        tracing::info!("ScreenRecorder #{} created ({} backend)", id, backend.name());
        Self {
            id,
            settings,
            backend,
            recorder: Arc::new(Mutex::new(None)),
            video_path: None,
            subscribers: Arc::new(Mutex::new(Vec::new())),
            pump: None,
        }
    }

    /// Registers a callback run once the backend reports a finished recording.
    pub fn on_complete<F>(&self, callback: F)
    where
        F: FnMut(&Path) + Send + 'static,
    {
        self.subscribers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(Box::new(callback));
    }

    /// Starts recording `window` into `video_path`.
    ///
    /// Without an explicit `log_file` the backend logs to `ScreenRecorder.log`
    /// in the working directory, rotated first if it was created on an earlier day.
    pub fn create_recording(
        &mut self,
        video_path: &Path,
        window: WindowHandle,
        log_file: Option<PathBuf>,
    ) -> Result<(), RecorderError> {
        let log_file = match log_file {
            Some(path) => path,
            None => {
                let path = PathBuf::from(DEFAULT_LOG_FILE);
                files::rotate_if_stale(&path, self.settings.log_rotation, Local::now().date_naive())?;
                path
            }
        };

        let options = build_options(&self.settings, window, Some(log_file));

        tracing::info!("ScreenRecorder #{}: CreateRecording {}", self.id, video_path.display());
        tracing::info!("ScreenRecorder #{} EncoderProfile = {}", self.id, self.settings.profile.display_name());
        tracing::info!("ScreenRecorder #{} BitrateMode = {}", self.id, self.settings.bitrate_mode.display_name());
        tracing::info!("ScreenRecorder #{} Framerate = {} FPS", self.id, self.settings.framerate);
        tracing::info!("ScreenRecorder #{} Bitrate = {} BPS", self.id, self.settings.bitrate);
        tracing::info!("ScreenRecorder #{} Quality = {}", self.id, self.settings.quality);

        let recorder = self.backend.create(&options)?;
        self.video_path = Some(video_path.to_path_buf());

        let (tx, rx) = channel();
        self.pump = Some(self.spawn_pump(rx, video_path.to_path_buf()));

        let mut slot = self.recorder.lock().unwrap_or_else(|e| e.into_inner());
        let recorder = slot.insert(recorder);
        if let Err(e) = recorder.record(video_path, tx) {
            *slot = None;
            return Err(e);
        }
        Ok(())
    }

    fn spawn_pump(&self, rx: Receiver<RecorderEvent>, video_path: PathBuf) -> JoinHandle<()> {
        let id = self.id;
        let slot = Arc::clone(&self.recorder);
        let subscribers = Arc::clone(&self.subscribers);

        thread::spawn(move || {
            for event in rx {
                match event {
                    RecorderEvent::Status(status) => {
                        tracing::info!("ScreenRecorder #{}: status = {:?}", id, status);
                    }
                    RecorderEvent::Complete { path } => {
                        tracing::info!("ScreenRecorder #{}: recording complete {}", id, path.display());
                        release(&slot);
                        let mut subscribers = subscribers.lock().unwrap_or_else(|e| e.into_inner());
                        for callback in subscribers.iter_mut() {
                            callback(&path);
                        }
                    }
                    RecorderEvent::Failed { path, error } => {
                        tracing::error!(
                            "ScreenRecorder #{} failed: {} ({})",
                            id,
                            error,
                            video_path.display()
                        );
                        tracing::debug!("ScreenRecorder #{}: failed output {}", id, path.display());
                        release(&slot);
                    }
                }
            }
        })
    }

    /// Asks the backend to finish the current recording. Completion is
    /// reported asynchronously through [`ScreenRecorder::on_complete`].
    pub fn end_recording(&mut self) -> Result<(), RecorderError> {
        let video = self
            .video_path
            .as_deref()
            .map(|p| p.display().to_string())
            .unwrap_or_default();
        tracing::info!("ScreenRecorder #{}: EndRecording {}", self.id, video);

        let mut slot = self.recorder.lock().unwrap_or_else(|e| e.into_inner());
        let result = match slot.as_mut() {
            Some(recorder) => recorder.stop(),
            None => {
                tracing::error!("ScreenRecorder #{}: EndRecording called without an active recorder", self.id);
                Ok(())
            }
        };
        result
    }

    /// Waits up to `timeout` for the backend to report completion or failure.
    /// Returns false if the event pump is still running afterwards.
    pub fn wait(&mut self, timeout: Duration) -> bool {
        let Some(pump) = self.pump.take() else {
            return true;
        };
        let deadline = Instant::now() + timeout;
        while !pump.is_finished() {
            if Instant::now() >= deadline {
                tracing::warn!("ScreenRecorder #{}: backend did not finish within {:?}", self.id, timeout);
                self.pump = Some(pump);
                return false;
            }
            thread::sleep(FINISH_POLL_INTERVAL);
        }
        let _ = pump.join();
        true
    }

    #[cfg(test)]
    pub fn is_recording(&self) -> bool {
        self.recorder.lock().unwrap_or_else(|e| e.into_inner()).is_some()
    }
}

fn release(slot: &RecorderSlot) {
    slot.lock().unwrap_or_else(|e| e.into_inner()).take();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recording::{DryRunBackend, RecorderOptions};
    use std::fs;
    use std::sync::mpsc::Sender;
    use tempfile::TempDir;

    struct FailingBackend;

    struct FailingRecorder {
        events: Option<Sender<RecorderEvent>>,
        output: PathBuf,
    }

    impl RecorderBackend for FailingBackend {
        fn name(&self) -> &'static str {
            "failing"
        }

        fn create(&self, _options: &RecorderOptions) -> Result<Box<dyn Recorder>, RecorderError> {
            Ok(Box::new(FailingRecorder {
                events: None,
                output: PathBuf::new(),
            }))
        }
    }

    impl Recorder for FailingRecorder {
        fn record(&mut self, output: &Path, events: Sender<RecorderEvent>) -> Result<(), RecorderError> {
            self.output = output.to_path_buf();
            self.events = Some(events);
            Ok(())
        }

        fn stop(&mut self) -> Result<(), RecorderError> {
            if let Some(events) = self.events.take() {
                let _ = events.send(RecorderEvent::Failed {
                    path: self.output.clone(),
                    error: "encoder crashed".to_string(),
                });
            }
            Ok(())
        }
    }

    #[test]
    fn test_complete_notifies_subscribers_and_releases() {
        let dir = TempDir::new().unwrap();
        let video = dir.path().join("a.mp4");
        let log = dir.path().join("a.log");
        let completed = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&completed);

        let mut recorder = ScreenRecorder::new(RecorderSettings::default(), Arc::new(DryRunBackend));
        recorder.on_complete(move |path| sink.lock().unwrap().push(path.to_path_buf()));
        recorder.create_recording(&video, WindowHandle(3), Some(log.clone())).unwrap();
        assert!(recorder.is_recording());

        recorder.end_recording().unwrap();
        assert!(recorder.wait(Duration::from_secs(5)));

        assert_eq!(*completed.lock().unwrap(), vec![video.clone()]);
        assert!(!recorder.is_recording());
        assert!(video.exists());
        assert!(log.exists());
    }

    #[test]
    fn test_failure_releases_without_notifying() {
        let dir = TempDir::new().unwrap();
        let completed = Arc::new(Mutex::new(0usize));
        let sink = Arc::clone(&completed);

        let mut recorder = ScreenRecorder::new(RecorderSettings::default(), Arc::new(FailingBackend));
        recorder.on_complete(move |_| *sink.lock().unwrap() += 1);
        recorder
            .create_recording(&dir.path().join("b.mp4"), WindowHandle(3), Some(dir.path().join("b.log")))
            .unwrap();
        recorder.end_recording().unwrap();

        assert!(recorder.wait(Duration::from_secs(5)));
        assert_eq!(*completed.lock().unwrap(), 0);
        assert!(!recorder.is_recording());
    }

    #[test]
    fn test_end_without_recording_is_logged_not_fatal() {
        let mut recorder = ScreenRecorder::new(RecorderSettings::default(), Arc::new(DryRunBackend));
        assert!(recorder.end_recording().is_ok());
        assert!(recorder.wait(Duration::from_millis(10)));
    }

    #[test]
    fn test_instances_are_numbered() {
        let first = ScreenRecorder::new(RecorderSettings::default(), Arc::new(DryRunBackend));
        let second = ScreenRecorder::new(RecorderSettings::default(), Arc::new(DryRunBackend));
        assert!(second.id > first.id);
    }

    #[test]
    fn test_explicit_log_file_is_not_rotated() {
        let dir = TempDir::new().unwrap();
        let log = dir.path().join("c.log");
        fs::write(&log, "previous").unwrap();

        let mut recorder = ScreenRecorder::new(RecorderSettings::default(), Arc::new(DryRunBackend));
        recorder
            .create_recording(&dir.path().join("c.mp4"), WindowHandle(1), Some(log.clone()))
            .unwrap();
        recorder.end_recording().unwrap();
        recorder.wait(Duration::from_secs(5));

        assert!(fs::read_to_string(&log).unwrap().starts_with("previous"));
        assert!(!dir.path().join("c.0.log").exists());
    }
}
