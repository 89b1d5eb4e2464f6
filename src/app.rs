use std::time::Duration;

use eframe::egui;

use crate::config::AppConfig;
use crate::state::{AppState, Tab};
use crate::ui::{panels, tabs};

// ---------------------------------------------------------------------------
// eframe App implementation
// ---------------------------------------------------------------------------

pub struct RustyMaldiApp {
    pub state: AppState,
}

impl RustyMaldiApp {
    pub fn new(config: AppConfig) -> Self {
        Self {
            state: AppState::new(config),
        }
    }
}

impl eframe::App for RustyMaldiApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.state.poll();
        // keep polling the worker and the elapsed-time label alive
        if self.state.is_running() || self.state.engine_available.is_none() {
            ctx.request_repaint_after(Duration::from_millis(200));
        }

        // ---- Top panel: menu bar and tabs ----
        egui::TopBottomPanel::top("top_bar").show(ctx, |ui| {
            panels::top_bar(ui, &mut self.state);
        });

        // ---- Left side panel: parameters and status ----
        egui::SidePanel::left("settings_panel")
            .default_width(260.0)
            .resizable(true)
            .show(ctx, |ui| {
                panels::side_panel(ui, &mut self.state);
            });

        // ---- Central panel: active tab ----
        egui::CentralPanel::default().show(ctx, |ui| {
            panels::notices(ui, &self.state);
            if !self.state.notices.is_empty() {
                ui.separator();
            }
            match self.state.tab {
                Tab::Upload => {
                    egui::ScrollArea::vertical()
                        .auto_shrink([false, false])
                        .show(ui, |ui| tabs::upload_tab(ui, &mut self.state));
                }
                Tab::Results => {
                    egui::ScrollArea::vertical()
                        .auto_shrink([false, false])
                        .show(ui, |ui| tabs::results_tab(ui, &mut self.state));
                }
                Tab::Visualization => tabs::visualization_tab(ui, &self.state),
            }
        });
    }
}
