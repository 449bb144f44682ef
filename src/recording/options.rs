use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::capture::WindowHandle;
use crate::files::DEFAULT_MAX_FILES;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum BitrateControlMode {
    #[default]
    Cbr,
    Quality,
    UnconstrainedVbr,
}

impl BitrateControlMode {
    pub fn display_name(&self) -> &'static str {
        match self {
            BitrateControlMode::Cbr => "CBR",
            BitrateControlMode::Quality => "Quality",
            BitrateControlMode::UnconstrainedVbr => "UnconstrainedVBR",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum H264Profile {
    Baseline,
    #[default]
    Main,
    High,
}

impl H264Profile {
    pub fn display_name(&self) -> &'static str {
        match self {
            H264Profile::Baseline => "Baseline",
            H264Profile::Main => "Main",
            H264Profile::High => "High",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum LogSeverity {
    Trace,
    #[default]
    Debug,
    Info,
    Warn,
    Error,
}

/// Encoder knobs set by the session before a recording is created.
#[derive(Debug, Clone)]
pub struct RecorderSettings {
    pub bitrate_mode: BitrateControlMode,
    pub profile: H264Profile,
    pub framerate: u32,
    pub bitrate: u32,
    pub quality: u8,
    pub mouse_pointer: bool,
    pub log_rotation: usize,
    pub log_severity: LogSeverity,
}

impl Default for RecorderSettings {
    fn default() -> Self {
        Self {
            bitrate_mode: BitrateControlMode::Cbr,
            profile: H264Profile::Main,
            framerate: 30,
            bitrate: 8000 * 1000,
            quality: 70,
            mouse_pointer: false,
            log_rotation: DEFAULT_MAX_FILES,
            log_severity: LogSeverity::Debug,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecorderOptions {
    pub log: LogOptions,
    pub video: VideoEncoderOptions,
    pub audio: AudioOptions,
    pub sources: Vec<RecordingSource>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogOptions {
    pub enabled: bool,
    pub file: Option<PathBuf>,
    pub severity: LogSeverity,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct H264Encoder {
    pub bitrate_mode: BitrateControlMode,
    pub profile: H264Profile,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VideoEncoderOptions {
    pub encoder: H264Encoder,
    pub framerate: u32,
    pub bitrate: u32,
    pub quality: u8,
    /// Lets playback start at arbitrary positions without reading the header first.
    pub fragmented_mp4: bool,
    pub throttling_disabled: bool,
    pub hardware_encoding: bool,
    pub low_latency: bool,
    pub mp4_fast_start: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AudioOptions {
    pub enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum RecordingSource {
    Window {
        handle: WindowHandle,
        cursor_capture: bool,
    },
}

impl RecordingSource {
    pub fn window(&self) -> WindowHandle {
        match self {
            RecordingSource::Window { handle, .. } => *handle,
        }
    }
}

/// Maps session settings onto the backend's option tree.
///
/// Cursor capture is configured on the window source. Global mouse options
/// are ignored by window sources.
pub fn build_options(settings: &RecorderSettings, window: WindowHandle, log_file: Option<PathBuf>) -> RecorderOptions {
    RecorderOptions {
        log: LogOptions {
            enabled: true,
            file: log_file,
            severity: settings.log_severity,
        },
        video: VideoEncoderOptions {
            encoder: H264Encoder {
                bitrate_mode: settings.bitrate_mode,
                profile: settings.profile,
            },
            framerate: settings.framerate,
            bitrate: settings.bitrate,
            quality: settings.quality,
            fragmented_mp4: true,
            throttling_disabled: false,
            hardware_encoding: true,
            low_latency: false,
            mp4_fast_start: false,
        },
        audio: AudioOptions { enabled: false },
        sources: vec![RecordingSource::Window {
            handle: window,
            cursor_capture: settings.mouse_pointer,
        }],
    }
}
