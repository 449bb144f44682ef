use chrono::{DateTime, Local};
use serde::Serialize;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::mpsc::Sender;
use std::time::Instant;

use super::options::LogSeverity;
use super::{Recorder, RecorderBackend, RecorderError, RecorderEvent, RecorderOptions, RecorderStatus};

/// Backend that captures nothing. On stop it writes a JSON manifest of the
/// options and timing to the output path, which is enough to exercise the
/// start/stop cycle, file numbering and log rotation without a display.
#[derive(Debug, Default, Clone, Copy)]
pub struct DryRunBackend;

impl RecorderBackend for DryRunBackend {
    fn name(&self) -> &'static str {
        "dry-run"
    }

    fn create(&self, options: &RecorderOptions) -> Result<Box<dyn Recorder>, RecorderError> {
        if options.sources.is_empty() {
            return Err(RecorderError::Create("no recording source configured".to_string()));
        }
        Ok(Box::new(DryRunRecorder {
            options: options.clone(),
            active: None,
        }))
    }
}

struct DryRunRecorder {
    options: RecorderOptions,
    active: Option<ActiveRecording>,
}

struct ActiveRecording {
    output: PathBuf,
    events: Sender<RecorderEvent>,
    started_at: DateTime<Local>,
    started: Instant,
}

#[derive(Serialize)]
struct Manifest<'a> {
    backend: &'static str,
    started_at: String,
    stopped_at: String,
    duration_ms: u128,
    options: &'a RecorderOptions,
}

impl DryRunRecorder {
    fn log(&self, severity: LogSeverity, message: &str) {
        let log = &self.options.log;
        if !log.enabled || severity < log.severity {
            return;
        }
        let Some(path) = &log.file else {
            return;
        };
        let line = format!(
            "{} [{:?}] {}\n",
            Local::now().format("%Y-%m-%d %H:%M:%S%.3f"),
            severity,
            message
        );
        let result = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .and_then(|mut file| file.write_all(line.as_bytes()));
        if let Err(e) = result {
            tracing::warn!("Dry-run recorder could not write log {}: {}", path.display(), e);
        }
    }

    fn write_manifest(&self, active: &ActiveRecording) -> Result<(), RecorderError> {
        let manifest = Manifest {
            backend: "dry-run",
            started_at: active.started_at.to_rfc3339(),
            stopped_at: Local::now().to_rfc3339(),
            duration_ms: active.started.elapsed().as_millis(),
            options: &self.options,
        };
        let json = serde_json::to_string_pretty(&manifest).map_err(|e| RecorderError::Record {
            path: active.output.clone(),
            message: e.to_string(),
        })?;
        fs::write(&active.output, json)?;
        Ok(())
    }
}

impl Recorder for DryRunRecorder {
    fn record(&mut self, output: &Path, events: Sender<RecorderEvent>) -> Result<(), RecorderError> {
        if self.active.is_some() {
            return Ok(());
        }
        self.log(
            LogSeverity::Info,
            &format!(
                "Recording window {} to {}",
                self.options.sources[0].window(),
                output.display()
            ),
        );
        let _ = events.send(RecorderEvent::Status(RecorderStatus::Recording));
        self.active = Some(ActiveRecording {
            output: output.to_path_buf(),
            events,
            started_at: Local::now(),
            started: Instant::now(),
        });
        Ok(())
    }

    fn stop(&mut self) -> Result<(), RecorderError> {
        let active = self.active.take().ok_or(RecorderError::NotRecording)?;
        let _ = active.events.send(RecorderEvent::Status(RecorderStatus::Finishing));

        let event = match self.write_manifest(&active) {
            Ok(()) => {
                self.log(LogSeverity::Info, &format!("Recording complete: {}", active.output.display()));
                RecorderEvent::Complete {
                    path: active.output.clone(),
                }
            }
            Err(e) => {
                self.log(LogSeverity::Error, &format!("Recording failed: {}", e));
                RecorderEvent::Failed {
                    path: active.output.clone(),
                    error: e.to_string(),
                }
            }
        };
        let _ = active.events.send(event);
        Ok(())
    }
}
