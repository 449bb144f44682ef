mod dry_run;
#[cfg(feature = "capture")]
mod gif_backend;
mod options;
mod screen_recorder;
mod session;

pub use dry_run::DryRunBackend;
#[cfg(feature = "capture")]
pub use gif_backend::GifBackend;
pub use options::{
    build_options, BitrateControlMode, H264Profile, LogSeverity, RecorderOptions, RecorderSettings,
};
pub use screen_recorder::ScreenRecorder;
pub use session::RecordingSession;

use std::path::{Path, PathBuf};
use std::sync::mpsc::Sender;
use std::sync::Arc;

use crate::files::RotateError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecorderStatus {
    Recording,
    Finishing,
}

#[derive(Debug, Clone)]
pub enum RecorderEvent {
    Status(RecorderStatus),
    Complete { path: PathBuf },
    Failed { path: PathBuf, error: String },
}

#[derive(Debug, thiserror::Error)]
pub enum RecorderError {
    #[error("failed to create recorder: {0}")]
    Create(String),
    #[error("recorder is not recording")]
    NotRecording,
    #[error("recording to {path} failed: {message}")]
    Record { path: PathBuf, message: String },
    #[error("failed to rotate recorder log: {0}")]
    Rotate(#[from] RotateError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// A single recording in progress. Events are reported on the sender passed
/// to [`Recorder::record`]; the recorder drops its sender once it has reported
/// completion or failure.
pub trait Recorder: Send {
    fn record(&mut self, output: &Path, events: Sender<RecorderEvent>) -> Result<(), RecorderError>;
    fn stop(&mut self) -> Result<(), RecorderError>;
}

pub trait RecorderBackend: Send + Sync {
    fn name(&self) -> &'static str;
    fn create(&self, options: &RecorderOptions) -> Result<Box<dyn Recorder>, RecorderError>;
}

#[cfg(feature = "capture")]
pub fn default_backend() -> Arc<dyn RecorderBackend> {
    Arc::new(GifBackend::default())
}

#[cfg(not(feature = "capture"))]
pub fn default_backend() -> Arc<dyn RecorderBackend> {
    Arc::new(DryRunBackend)
}
