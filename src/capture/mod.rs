#[cfg(feature = "capture")]
mod window;

#[cfg(feature = "capture")]
pub use window::{capture_window, XcapWindowFinder};

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::process::{Child, Command};
use std::time::Duration;

const WINDOW_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Opaque id of the window being recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WindowHandle(pub u32);

impl fmt::Display for WindowHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

pub trait WindowFinder: Send + Sync {
    /// Returns the main window of process `pid` (started from `application`)
    /// once it is visible.
    fn find_main_window(&self, pid: u32, application: &str) -> Result<Option<WindowHandle>>;
}

/// Finder used when no capture backend is compiled in: the process id stands
/// in for the window handle as soon as the process is running.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessWindowFinder;

impl WindowFinder for ProcessWindowFinder {
    fn find_main_window(&self, pid: u32, _application: &str) -> Result<Option<WindowHandle>> {
        Ok(Some(WindowHandle(pid)))
    }
}

#[cfg(feature = "capture")]
pub fn default_finder() -> Box<dyn WindowFinder> {
    Box::new(XcapWindowFinder)
}

#[cfg(not(feature = "capture"))]
pub fn default_finder() -> Box<dyn WindowFinder> {
    Box::new(ProcessWindowFinder)
}

/// Application name used to match windows, e.g. `mspaint` for `C:\Windows\mspaint.exe`.
#[cfg(any(feature = "capture", test))]
pub fn application_name(application: &str) -> String {
    std::path::Path::new(application)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| application.to_string())
}

pub fn launch(application: &str) -> Result<Child> {
    tracing::info!("Starting target application {}", application);
    Command::new(application)
        .spawn()
        .with_context(|| format!("Failed to start {}", application))
}

/// Polls `finder` until the launched process shows its main window.
pub async fn wait_for_window(
    finder: &dyn WindowFinder,
    child: &mut Child,
    application: &str,
    timeout: Duration,
) -> Result<WindowHandle> {
    tokio::time::timeout(timeout, poll_window(finder, child, application))
        .await
        .map_err(|_| anyhow!("No window for {} after {:?}", application, timeout))?
}

async fn poll_window(finder: &dyn WindowFinder, child: &mut Child, application: &str) -> Result<WindowHandle> {
    let pid = child.id();
    loop {
        if let Some(status) = child.try_wait()? {
            return Err(anyhow!("{} exited with {} before showing a window", application, status));
        }
        if let Some(handle) = finder.find_main_window(pid, application)? {
            tracing::info!("Found window {} for {} (pid {})", handle, application, pid);
            return Ok(handle);
        }
        tokio::time::sleep(WINDOW_POLL_INTERVAL).await;
    }
}
