mod app;
mod color;
mod config;
mod data;
mod engine;
mod error;
mod params;
mod session;
mod state;
mod ui;
mod workflow;

use app::RustyMaldiApp;
use config::AppConfig;
use eframe::egui;

fn main() -> eframe::Result {
    env_logger::init();
    let config = AppConfig::load();

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([1280.0, 860.0])
            .with_min_inner_size([720.0, 480.0]),
        ..Default::default()
    };

    eframe::run_native(
        "Rusty MALDI – Template Workflow",
        options,
        Box::new(|_cc| Ok(Box::new(RustyMaldiApp::new(config)))),
    )
}
