mod console;

pub use console::{run_console, run_status, spawn_input_reader};

use anyhow::Result;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;

use crate::capture::WindowHandle;
use crate::config::Config;
use crate::recording::{RecorderBackend, RecordingSession};

const FINISH_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HarnessState {
    Recording,
    Stopped,
    Exiting,
}

impl HarnessState {
    pub fn label(&self) -> &'static str {
        match self {
            HarnessState::Recording => "Recording",
            HarnessState::Stopped => "Stopped  ",
            HarnessState::Exiting => "Exiting  ",
        }
    }
}

/// Elapsed-time counter that only advances while running.
#[derive(Debug, Default)]
pub struct Stopwatch {
    accumulated: Duration,
    started: Option<Instant>,
}

impl Stopwatch {
    pub fn started() -> Self {
        Self {
            accumulated: Duration::ZERO,
            started: Some(Instant::now()),
        }
    }

    pub fn start(&mut self) {
        if self.started.is_none() {
            self.started = Some(Instant::now());
        }
    }

    pub fn stop(&mut self) {
        if let Some(started) = self.started.take() {
            self.accumulated += started.elapsed();
        }
    }

    #[cfg(test)]
    pub fn is_running(&self) -> bool {
        self.started.is_some()
    }

    pub fn elapsed(&self) -> Duration {
        self.accumulated + self.started.map(|s| s.elapsed()).unwrap_or_default()
    }
}

/// State shared between the console, the status line and the cycle loop.
/// Only the console side writes the state; the cycle loop watches it.
pub struct Controls {
    state: watch::Sender<HarnessState>,
    stopwatch: Mutex<Stopwatch>,
    instances: AtomicUsize,
}

impl Controls {
    pub fn new(initial: HarnessState) -> Arc<Self> {
        let (state, _) = watch::channel(initial);
        let stopwatch = if initial == HarnessState::Recording {
            Stopwatch::started()
        } else {
            Stopwatch::default()
        };
        Arc::new(Self {
            state,
            stopwatch: Mutex::new(stopwatch),
            instances: AtomicUsize::new(0),
        })
    }

    pub fn subscribe(&self) -> watch::Receiver<HarnessState> {
        self.state.subscribe()
    }

    pub fn state(&self) -> HarnessState {
        *self.state.borrow()
    }

    /// Flips between recording and stopped. Has no effect once exiting.
    pub fn toggle(&self) -> HarnessState {
        let mut stopwatch = self.stopwatch.lock().unwrap_or_else(|e| e.into_inner());
        let next = match self.state() {
            HarnessState::Recording => {
                stopwatch.stop();
                HarnessState::Stopped
            }
            HarnessState::Stopped => {
                stopwatch.start();
                HarnessState::Recording
            }
            HarnessState::Exiting => return HarnessState::Exiting,
        };
        self.state.send_replace(next);
        tracing::info!("Harness {}", next.label().trim_end());
        next
    }

    pub fn exit(&self) {
        self.stopwatch.lock().unwrap_or_else(|e| e.into_inner()).stop();
        self.state.send_replace(HarnessState::Exiting);
    }

    pub fn next_instance(&self) -> usize {
        self.instances.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn instances(&self) -> usize {
        self.instances.load(Ordering::SeqCst)
    }

    pub fn elapsed(&self) -> Duration {
        self.stopwatch.lock().unwrap_or_else(|e| e.into_inner()).elapsed()
    }

    pub fn status_line(&self) -> String {
        let secs = self.elapsed().as_secs();
        format!(
            "Elapsed: {:02}:{:02}:{:02} - {} #{}",
            secs / 3600,
            (secs / 60) % 60,
            secs % 60,
            self.state().label(),
            self.instances()
        )
    }
}

async fn wait_for_exit(state: &mut watch::Receiver<HarnessState>) {
    let _ = state.wait_for(|s| *s == HarnessState::Exiting).await;
}

/// Starts a session, lets it run for one cycle and stops it, for as long as
/// the harness is in the recording state. Returns when the console exits.
pub async fn run_cycles(
    config: Config,
    backend: Arc<dyn RecorderBackend>,
    window: WindowHandle,
    controls: Arc<Controls>,
) -> Result<()> {
    let mut state = controls.subscribe();
    let cycle = config.harness.cycle();
    let idle_poll = config.harness.idle_poll();

    loop {
        let current = *state.borrow_and_update();
        match current {
            HarnessState::Exiting => break,
            HarnessState::Stopped => {
                tokio::select! {
                    _ = tokio::time::sleep(idle_poll) => {}
                    changed = state.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                }
            }
            HarnessState::Recording => {
                let instance = controls.next_instance();
                tracing::info!("Starting recording #{}", instance);
                let mut session = RecordingSession::start(window, &config, Arc::clone(&backend))?;
                tracing::debug!(
                    "Recording #{} is session #{}: {} (log {})",
                    instance,
                    session.id(),
                    session.video_path().display(),
                    session.log_path().display()
                );

                tokio::select! {
                    _ = tokio::time::sleep(cycle) => {}
                    _ = wait_for_exit(&mut state) => {}
                }

                session.stop()?;
                let session = tokio::task::spawn_blocking(move || {
                    session.finish(FINISH_TIMEOUT);
                    session
                })
                .await?;
                match session.ended_at() {
                    Some(ended) => tracing::info!(
                        "Recording #{} finished after {} ms",
                        instance,
                        (ended - session.started_at()).num_milliseconds()
                    ),
                    None => tracing::warn!("Recording #{} did not complete", instance),
                }
            }
        }
    }

    tracing::info!("Recording loop finished after {} recordings", controls.instances());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recording::DryRunBackend;
    use tempfile::TempDir;

    fn config_in(dir: &std::path::Path) -> Config {
        let mut config = Config::default();
        config.output.directory = dir.join("Recordings");
        config.harness.cycle_secs = 1;
        config
    }

    #[tokio::test(start_paused = true)]
    async fn test_stopwatch_only_counts_while_running() {
        let mut stopwatch = Stopwatch::started();
        tokio::time::advance(Duration::from_secs(3)).await;
        stopwatch.stop();
        tokio::time::advance(Duration::from_secs(10)).await;
        assert_eq!(stopwatch.elapsed(), Duration::from_secs(3));

        stopwatch.start();
        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(stopwatch.is_running());
        assert_eq!(stopwatch.elapsed(), Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_toggle_and_status_line() {
        let controls = Controls::new(HarnessState::Recording);
        tokio::time::advance(Duration::from_secs(3725)).await;

        assert_eq!(controls.toggle(), HarnessState::Stopped);
        assert_eq!(controls.status_line(), "Elapsed: 01:02:05 - Stopped   #0");

        assert_eq!(controls.toggle(), HarnessState::Recording);
        controls.exit();
        assert_eq!(controls.toggle(), HarnessState::Exiting);
        assert_eq!(controls.state(), HarnessState::Exiting);
    }

    #[tokio::test]
    async fn test_exit_while_stopped_ends_loop() {
        let dir = TempDir::new().unwrap();
        let controls = Controls::new(HarnessState::Stopped);
        let handle = tokio::spawn(run_cycles(
            config_in(dir.path()),
            Arc::new(DryRunBackend),
            WindowHandle(1),
            Arc::clone(&controls),
        ));

        controls.exit();
        handle.await.unwrap().unwrap();

        assert_eq!(controls.instances(), 0);
    }

    #[tokio::test]
    async fn test_recording_cycles_produce_numbered_sessions() {
        let dir = TempDir::new().unwrap();
        let controls = Controls::new(HarnessState::Recording);
        let handle = tokio::spawn(run_cycles(
            config_in(dir.path()),
            Arc::new(DryRunBackend),
            WindowHandle(1),
            Arc::clone(&controls),
        ));

        while controls.instances() < 2 {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        controls.exit();
        handle.await.unwrap().unwrap();

        assert!(controls.instances() >= 2);
        let recordings = dir.path().join("Recordings");
        let videos = std::fs::read_dir(&recordings)
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.path().extension().map(|x| x == "mp4").unwrap_or(false))
            .count();
        assert!(videos >= 1);
    }
}
