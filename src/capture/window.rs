use anyhow::{anyhow, Result};
use image::RgbaImage;
use xcap::Window;

use super::{application_name, WindowFinder, WindowHandle};

const MIN_WINDOW_SIZE: u32 = 50;

/// Finds a launched application's window by matching its application name or
/// title against the executable name.
#[derive(Debug, Default, Clone, Copy)]
pub struct XcapWindowFinder;

impl WindowFinder for XcapWindowFinder {
    fn find_main_window(&self, _pid: u32, application: &str) -> Result<Option<WindowHandle>> {
        let needle = application_name(application).to_lowercase();
        let windows = Window::all()?;
        let found = windows
            .into_iter()
            .filter(|w| {
                !w.title().is_empty()
                    && w.width() > MIN_WINDOW_SIZE
                    && w.height() > MIN_WINDOW_SIZE
                    && !w.is_minimized()
            })
            .find(|w| {
                w.app_name().to_lowercase().contains(&needle) || w.title().to_lowercase().contains(&needle)
            })
            .map(|w| WindowHandle(w.id()));
        Ok(found)
    }
}

fn find_window(handle: WindowHandle) -> Result<Window> {
    let windows = Window::all()?;
    windows
        .into_iter()
        .find(|w| w.id() == handle.0)
        .ok_or_else(|| anyhow!("Window {} not found", handle))
}

pub fn capture_window(handle: WindowHandle) -> Result<RgbaImage> {
    let window = find_window(handle)?;
    let img = window.capture_image()?;
    Ok(img)
}
