#![cfg_attr(not(debug_assertions), windows_subsystem = "windows")]

mod args;
mod config;
mod error;
mod model_download;
mod pipeline;
mod types;
mod ui;

use anyhow::Result;
use clap::Parser;
use gpui::Application;

use args::Args;
use config::AppConfig;

fn main() -> Result<()> {
    env_logger::init();

    let args = Args::parse();
    let mut config = AppConfig::load(args.config.as_deref())?;
    config.apply_args(&args);

    // Fail fast: a camera that cannot be opened never gets a pipeline.
    let camera = pipeline::probe_camera(config.capture.camera_index);
    match &camera {
        Ok(label) => log::info!("using camera {label}"),
        Err(err) => log::error!("{err}"),
    }

    Application::new()
        .with_assets(gpui_component_assets::Assets)
        .run(move |app| {
            gpui_component::init(app);

            if let Err(err) = ui::launch_ui(app, config, camera) {
                log::error!("failed to launch ui: {err:?}");
            }
        });

    Ok(())
}
