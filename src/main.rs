#![cfg_attr(not(debug_assertions), windows_subsystem = "windows")]

mod config;
mod model_download;
mod pipeline;
mod types;
mod ui;

use anyhow::{Context, Result};
use clap::Parser;
use gpui::Application;

use config::AppConfig;

fn main() -> Result<()> {
    env_logger::init();
    let config = AppConfig::parse();

    if config.list {
        let cameras = pipeline::available_cameras().context("failed to list cameras")?;
        if cameras.is_empty() {
            println!("no cameras found");
        }
        for camera in cameras {
            println!("{}: {}", camera.index, camera.label);
        }
        return Ok(());
    }

    log::info!(
        "starting {:?} pipeline on camera {}",
        config.mode,
        config.camera_index
    );

    Application::new()
        .with_assets(gpui_component_assets::Assets)
        .run(move |app| {
            gpui_component::init(app);

            if let Err(err) = ui::launch_ui(app, config) {
                log::error!("failed to launch ui: {err:?}");
            }
        });

    Ok(())
}
