use anyhow::{anyhow, Result};
use gif::{Encoder, Frame, Repeat};
use image::RgbaImage;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{channel, Receiver, Sender};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use super::options::RecordingSource;
use super::{Recorder, RecorderBackend, RecorderError, RecorderEvent, RecorderOptions, RecorderStatus};
use crate::capture::{self, WindowHandle};

const MAX_FRAMES: usize = 18000;
const MAX_GIF_DIMENSION: u32 = 4096;
const MAX_FRAME_MEMORY_MB: usize = 1024;
const MIN_FRAME_INTERVAL_MS: u64 = 16;
const MAX_GIF_FPS: u32 = 60;

/// Records the target window into an animated GIF. Frames are grabbed with
/// xcap on a worker thread and encoded when the recording is stopped.
#[derive(Debug, Clone)]
pub struct GifBackend {
    pub max_duration: Duration,
}

impl Default for GifBackend {
    fn default() -> Self {
        Self {
            max_duration: Duration::from_secs(300),
        }
    }
}

impl RecorderBackend for GifBackend {
    fn name(&self) -> &'static str {
        "gif"
    }

    fn create(&self, options: &RecorderOptions) -> Result<Box<dyn Recorder>, RecorderError> {
        let window = options
            .sources
            .first()
            .map(|s| s.window())
            .ok_or_else(|| RecorderError::Create("no recording source configured".to_string()))?;
        let cursor = options
            .sources
            .iter()
            .any(|s| matches!(s, RecordingSource::Window { cursor_capture: true, .. }));
        if cursor {
            tracing::debug!("GIF backend cannot draw the cursor; cursor capture ignored");
        }
        Ok(Box::new(GifRecorder {
            window,
            fps: options.video.framerate.clamp(1, MAX_GIF_FPS),
            max_duration: self.max_duration,
            active: None,
        }))
    }
}

struct GifRecorder {
    window: WindowHandle,
    fps: u32,
    max_duration: Duration,
    active: Option<ActiveCapture>,
}

struct ActiveCapture {
    output: PathBuf,
    events: Sender<RecorderEvent>,
    stop_signal: Sender<()>,
    worker: JoinHandle<Vec<RgbaImage>>,
}

impl Recorder for GifRecorder {
    fn record(&mut self, output: &Path, events: Sender<RecorderEvent>) -> Result<(), RecorderError> {
        if self.active.is_some() {
            return Ok(());
        }

        let (tx, rx): (Sender<()>, Receiver<()>) = channel();
        let window = self.window;
        let fps = self.fps;
        let max_duration = self.max_duration;
        let worker = thread::spawn(move || capture_frames(window, fps, max_duration, rx));

        let _ = events.send(RecorderEvent::Status(RecorderStatus::Recording));
        self.active = Some(ActiveCapture {
            output: output.with_extension("gif"),
            events,
            stop_signal: tx,
            worker,
        });
        Ok(())
    }

    fn stop(&mut self) -> Result<(), RecorderError> {
        let active = self.active.take().ok_or(RecorderError::NotRecording)?;
        let _ = active.stop_signal.send(());
        let _ = active.events.send(RecorderEvent::Status(RecorderStatus::Finishing));
        let fps = self.fps;

        thread::spawn(move || {
            let event = match active.worker.join() {
                Ok(frames) => match save_gif(&frames, fps, &active.output) {
                    Ok(()) => RecorderEvent::Complete {
                        path: active.output.clone(),
                    },
                    Err(e) => RecorderEvent::Failed {
                        path: active.output.clone(),
                        error: e.to_string(),
                    },
                },
                Err(_) => RecorderEvent::Failed {
                    path: active.output.clone(),
                    error: "capture thread panicked".to_string(),
                },
            };
            let _ = active.events.send(event);
        });
        Ok(())
    }
}

fn capture_frames(window: WindowHandle, fps: u32, max_duration: Duration, stop: Receiver<()>) -> Vec<RgbaImage> {
    let min_frame_duration = Duration::from_millis(MIN_FRAME_INTERVAL_MS);
    let frame_duration = Duration::from_secs_f64(1.0 / fps as f64).max(min_frame_duration);
    let start_time = Instant::now();
    let max_memory = MAX_FRAME_MEMORY_MB * 1024 * 1024;
    let mut total_memory: usize = 0;
    let mut frames = Vec::new();

    loop {
        if stop.try_recv().is_ok() || start_time.elapsed() >= max_duration {
            break;
        }

        let frame_start = Instant::now();
        match capture::capture_window(window) {
            Ok(image) if image.width() <= MAX_GIF_DIMENSION && image.height() <= MAX_GIF_DIMENSION => {
                let frame_size = (image.width() as usize)
                    .saturating_mul(image.height() as usize)
                    .saturating_mul(4);
                if frames.len() >= MAX_FRAMES || total_memory.saturating_add(frame_size) > max_memory {
                    tracing::warn!("Frame budget exhausted for window {}", window);
                    break;
                }
                total_memory = total_memory.saturating_add(frame_size);
                frames.push(image);
            }
            Ok(_) => tracing::debug!("Skipping oversized frame from window {}", window),
            Err(e) => tracing::debug!("Frame capture failed for window {}: {}", window, e),
        }

        let elapsed = frame_start.elapsed();
        if elapsed < frame_duration {
            thread::sleep(frame_duration - elapsed);
        }
    }

    frames
}

fn save_gif(frames: &[RgbaImage], fps: u32, path: &Path) -> Result<()> {
    let first = frames.first().ok_or_else(|| anyhow!("No frames captured"))?;
    let (orig_width, orig_height) = (first.width(), first.height());
    if orig_width == 0 || orig_height == 0 {
        return Err(anyhow!("Image has zero dimension"));
    }
    if orig_width > MAX_GIF_DIMENSION || orig_height > MAX_GIF_DIMENSION {
        return Err(anyhow!("Image dimensions exceed GIF safety limit"));
    }
    let width = orig_width as u16;
    let height = orig_height as u16;

    let file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)?;
    let mut encoder = Encoder::new(file, width, height, &[])?;
    encoder.set_repeat(Repeat::Infinite)?;

    let delay = (100.0 / fps as f64).clamp(2.0, 100.0) as u16;

    for captured in frames {
        // Windows can be resized mid-recording; every GIF frame shares one size.
        let resized = if captured.width() != orig_width || captured.height() != orig_height {
            image::imageops::resize(captured, orig_width, orig_height, image::imageops::FilterType::Nearest)
        } else {
            captured.clone()
        };

        let rgb_data: Vec<u8> = resized
            .into_raw()
            .chunks_exact(4)
            .flat_map(|px| [px[0], px[1], px[2]])
            .collect();

        let mut frame = Frame::from_rgb(width, height, &rgb_data);
        frame.delay = delay;
        encoder.write_frame(&frame)?;
    }

    Ok(())
}
