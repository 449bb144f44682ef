use anyhow::{anyhow, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::files::DEFAULT_MAX_FILES;
use crate::recording::{BitrateControlMode, H264Profile, LogSeverity, RecorderSettings};

pub const CONFIG_ENV: &str = "REPREC_CONFIG";

const MAX_QUALITY: u8 = 100;
const MIN_FRAMERATE: u32 = 1;
const MAX_FRAMERATE: u32 = 120;
const MIN_BITRATE: u32 = 100 * 1000;
const MAX_BITRATE: u32 = 100 * 1000 * 1000;
const MIN_CYCLE_SECS: u64 = 1;
const MAX_CYCLE_SECS: u64 = 3600;
const MAX_IDLE_POLL_SECS: u64 = 60;
const MAX_WINDOW_TIMEOUT_SECS: u64 = 600;
const MAX_ROTATION: usize = 100;
const MAX_PREFIX_LEN: usize = 64;
const MAX_EXTENSION_LEN: usize = 8;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    pub output: OutputConfig,
    pub harness: HarnessConfig,
    #[serde(default)]
    pub encoder: EncoderConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OutputConfig {
    pub directory: PathBuf,
    pub file_prefix: String,
    pub video_extension: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HarnessConfig {
    pub target_application: String,
    #[serde(default)]
    pub window_id: Option<u32>,
    pub cycle_secs: u64,
    pub idle_poll_secs: u64,
    pub window_timeout_secs: u64,
    #[serde(default = "default_start_recording")]
    pub start_recording: bool,
}

fn default_start_recording() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EncoderConfig {
    pub bitrate_mode: BitrateControlMode,
    pub profile: H264Profile,
    pub framerate: u32,
    pub bitrate: u32,
    pub quality: u8,
    pub mouse_pointer: bool,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            bitrate_mode: BitrateControlMode::Cbr,
            profile: H264Profile::Main,
            framerate: 30,
            bitrate: 8000 * 1000,
            quality: 70,
            mouse_pointer: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    pub recorder_log_rotation: usize,
    pub recorder_severity: LogSeverity,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            recorder_log_rotation: DEFAULT_MAX_FILES,
            recorder_severity: LogSeverity::Debug,
        }
    }
}

impl HarnessConfig {
    pub fn cycle(&self) -> Duration {
        Duration::from_secs(self.cycle_secs)
    }

    pub fn idle_poll(&self) -> Duration {
        Duration::from_secs(self.idle_poll_secs)
    }

    pub fn window_timeout(&self) -> Duration {
        Duration::from_secs(self.window_timeout_secs)
    }
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        if self.output.directory.as_os_str().is_empty() {
            return Err(anyhow!("output directory must not be empty"));
        }
        if self.output.file_prefix.len() > MAX_PREFIX_LEN {
            return Err(anyhow!("file_prefix too long"));
        }
        if self.output.file_prefix.contains('/')
            || self.output.file_prefix.contains('\\')
            || self.output.file_prefix.contains("..")
        {
            return Err(anyhow!("file_prefix contains invalid path characters"));
        }
        if self.output.video_extension.is_empty()
            || self.output.video_extension.len() > MAX_EXTENSION_LEN
            || !self.output.video_extension.chars().all(|c| c.is_ascii_alphanumeric())
        {
            return Err(anyhow!("video_extension must be 1 to {} alphanumeric characters", MAX_EXTENSION_LEN));
        }
        if self.harness.window_id.is_none() && self.harness.target_application.trim().is_empty() {
            return Err(anyhow!("either target_application or window_id must be set"));
        }
        if self.harness.cycle_secs < MIN_CYCLE_SECS || self.harness.cycle_secs > MAX_CYCLE_SECS {
            return Err(anyhow!("cycle_secs must be between {} and {}", MIN_CYCLE_SECS, MAX_CYCLE_SECS));
        }
        if self.harness.idle_poll_secs == 0 || self.harness.idle_poll_secs > MAX_IDLE_POLL_SECS {
            return Err(anyhow!("idle_poll_secs must be between 1 and {}", MAX_IDLE_POLL_SECS));
        }
        if self.harness.window_timeout_secs > MAX_WINDOW_TIMEOUT_SECS {
            return Err(anyhow!("window_timeout_secs must be <= {}", MAX_WINDOW_TIMEOUT_SECS));
        }
        if self.encoder.quality > MAX_QUALITY {
            return Err(anyhow!("quality must be <= {}", MAX_QUALITY));
        }
        if self.encoder.framerate < MIN_FRAMERATE || self.encoder.framerate > MAX_FRAMERATE {
            return Err(anyhow!("framerate must be between {} and {}", MIN_FRAMERATE, MAX_FRAMERATE));
        }
        if self.encoder.bitrate < MIN_BITRATE || self.encoder.bitrate > MAX_BITRATE {
            return Err(anyhow!("bitrate must be between {} and {}", MIN_BITRATE, MAX_BITRATE));
        }
        if self.logging.recorder_log_rotation == 0 || self.logging.recorder_log_rotation > MAX_ROTATION {
            return Err(anyhow!("recorder_log_rotation must be between 1 and {}", MAX_ROTATION));
        }
        Ok(())
    }

    fn sanitize(&mut self) {
        self.encoder.quality = self.encoder.quality.min(MAX_QUALITY);
        self.encoder.framerate = self.encoder.framerate.clamp(MIN_FRAMERATE, MAX_FRAMERATE);
        self.encoder.bitrate = self.encoder.bitrate.clamp(MIN_BITRATE, MAX_BITRATE);
        self.harness.cycle_secs = self.harness.cycle_secs.clamp(MIN_CYCLE_SECS, MAX_CYCLE_SECS);
        self.harness.idle_poll_secs = self.harness.idle_poll_secs.clamp(1, MAX_IDLE_POLL_SECS);
        self.harness.window_timeout_secs = self.harness.window_timeout_secs.min(MAX_WINDOW_TIMEOUT_SECS);
        self.logging.recorder_log_rotation = self.logging.recorder_log_rotation.clamp(1, MAX_ROTATION);

        if self.output.file_prefix.len() > MAX_PREFIX_LEN
            || self.output.file_prefix.contains('/')
            || self.output.file_prefix.contains('\\')
            || self.output.file_prefix.contains("..")
        {
            self.output.file_prefix = "ScreenRecording_".to_string();
        }
    }

    pub fn recorder_settings(&self) -> RecorderSettings {
        RecorderSettings {
            bitrate_mode: self.encoder.bitrate_mode,
            profile: self.encoder.profile,
            framerate: self.encoder.framerate,
            bitrate: self.encoder.bitrate,
            quality: self.encoder.quality,
            mouse_pointer: self.encoder.mouse_pointer,
            log_rotation: self.logging.recorder_log_rotation,
            log_severity: self.logging.recorder_severity,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        let output_dir = std::env::current_dir()
            .unwrap_or_else(|_| PathBuf::from("."))
            .join("Recordings");

        let target_application = if cfg!(windows) { "mspaint.exe" } else { "xclock" };

        Self {
            output: OutputConfig {
                directory: output_dir,
                file_prefix: "ScreenRecording_".to_string(),
                video_extension: "mp4".to_string(),
            },
            harness: HarnessConfig {
                target_application: target_application.to_string(),
                window_id: None,
                cycle_secs: 5,
                idle_poll_secs: 1,
                window_timeout_secs: 30,
                start_recording: true,
            },
            encoder: EncoderConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Config {
    pub fn config_dir() -> Option<PathBuf> {
        ProjectDirs::from("com", "reprec", "reprec").map(|p| p.config_dir().to_path_buf())
    }

    pub fn config_path() -> Option<PathBuf> {
        if let Some(path) = std::env::var_os(CONFIG_ENV) {
            return Some(PathBuf::from(path));
        }
        Self::config_dir().map(|p| p.join("config.toml"))
    }

    pub fn load() -> Result<Self> {
        match Self::config_path() {
            Some(path) if path.exists() => Self::load_from(&path),
            _ => Ok(Config::default()),
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&content)?;
        config.sanitize();
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let path = Self::config_path().ok_or_else(|| anyhow!("No config directory available"))?;
        self.save_to(&path)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        self.validate()?;
        if let Some(dir) = path.parent() {
            if !dir.as_os_str().is_empty() {
                fs::create_dir_all(dir)?;
            }
        }
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }
}
