mod capture;
mod config;
mod files;
mod harness;
mod logging;
mod recording;

use anyhow::Result;
use std::sync::Arc;

use crate::capture::WindowHandle;
use crate::config::Config;
use crate::harness::{Controls, HarnessState};

#[tokio::main]
async fn main() -> Result<()> {
    let (config, config_error) = match Config::load() {
        Ok(config) => (config, None),
        Err(e) => (Config::default(), Some(e)),
    };

    let output_dir = files::ensure_exists(&config.output.directory);
    let _log_guard = logging::init(&output_dir);
    match config_error {
        Some(e) => tracing::warn!("Invalid configuration, using defaults: {:#}", e),
        None => write_default_config(&config),
    }

    let window = match config.harness.window_id {
        Some(id) => WindowHandle(id),
        None => {
            let application = &config.harness.target_application;
            let mut child = capture::launch(application)?;
            let finder = capture::default_finder();
            capture::wait_for_window(finder.as_ref(), &mut child, application, config.harness.window_timeout()).await?
        }
    };

    let backend = recording::default_backend();
    tracing::info!("Recording window {} with the {} backend", window, backend.name());

    let initial = if config.harness.start_recording {
        HarnessState::Recording
    } else {
        HarnessState::Stopped
    };
    let controls = Controls::new(initial);

    println!("Press ENTER to start/stop recording, q + ENTER or Ctrl+C to exit");

    let cycles = tokio::spawn({
        let controls = Arc::clone(&controls);
        async move {
            let result = harness::run_cycles(config, backend, window, Arc::clone(&controls)).await;
            controls.exit();
            result
        }
    });
    let status = tokio::spawn(harness::run_status(Arc::clone(&controls)));

    harness::run_console(Arc::clone(&controls), harness::spawn_input_reader()).await;

    match cycles.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::error!("Exception thrown while running screen recordings: {:#}", e),
        Err(e) => tracing::error!("Recording loop panicked: {}", e),
    }
    let _ = status.await;

    Ok(())
}

/// Leaves an editable copy of the settings behind on first run.
fn write_default_config(config: &Config) {
    let Some(path) = Config::config_path() else {
        return;
    };
    if path.exists() {
        return;
    }
    match config.save() {
        Ok(()) => tracing::info!("Wrote default configuration to {}", path.display()),
        Err(e) => tracing::warn!("Could not write configuration to {}: {:#}", path.display(), e),
    }
}
