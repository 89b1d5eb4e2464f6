use std::path::Path;

use anyhow::Context;

use eframe::egui::{self, Color32, RichText, ScrollArea, Slider, Ui};

use crate::data::export;
use crate::data::model::Dataset;
use crate::params::{ParameterMode, ProcessingParameters, HALF_WINDOW, ITERATIONS, SNR, TOLERANCE};
use crate::session::WorkflowState;
use crate::state::{phase_label, AppState, Level, Tab};

// ---------------------------------------------------------------------------
// Left side panel – parameters, engine and workflow status
// ---------------------------------------------------------------------------

/// Render the left settings panel.
pub fn side_panel(ui: &mut Ui, state: &mut AppState) {
    ScrollArea::vertical()
        .auto_shrink([false, false])
        .show(ui, |ui: &mut Ui| {
            ui.heading("Parameters");
            ui.separator();
            parameter_controls(ui, state);

            ui.add_space(8.0);
            ui.heading("Engine");
            ui.separator();
            engine_status(ui, state);

            ui.add_space(8.0);
            ui.heading("Workflow");
            ui.separator();
            workflow_status(ui, state);
        });
}

fn parameter_controls(ui: &mut Ui, state: &mut AppState) {
    let locked = state.is_running();
    let mut auto = state.params.mode == ParameterMode::Auto;
    if ui
        .add_enabled(!locked, egui::Checkbox::new(&mut auto, "Auto-estimate from spectra"))
        .changed()
    {
        state.params.mode = if auto {
            ParameterMode::Auto
        } else {
            ParameterMode::Manual
        };
    }

    let p = state.params.manual;
    let mut hw = p.half_window_size as f64;
    let mut snr = p.snr;
    let mut tol = p.tolerance;
    let mut it = p.iterations as f64;

    let mut changed = false;
    ui.add_enabled_ui(!auto && !locked, |ui: &mut Ui| {
        changed |= ui
            .add(Slider::new(&mut hw, HALF_WINDOW.range()).step_by(HALF_WINDOW.step).text("halfWindowSize"))
            .on_hover_text("Smoothing / baseline window (points)")
            .changed();
        changed |= ui
            .add(Slider::new(&mut snr, SNR.range()).step_by(SNR.step).text("SNR"))
            .on_hover_text("Signal-to-noise threshold for peak detection")
            .changed();
        changed |= ui
            .add(
                Slider::new(&mut tol, TOLERANCE.range())
                    .step_by(TOLERANCE.step)
                    .fixed_decimals(3)
                    .text("tolerance"),
            )
            .on_hover_text("Relative m/z tolerance for peak binning")
            .changed();
        changed |= ui
            .add(Slider::new(&mut it, ITERATIONS.range()).step_by(ITERATIONS.step).text("iterations"))
            .on_hover_text("SNIP baseline iterations")
            .changed();
    });
    if changed {
        state.params.manual = ProcessingParameters::clamped(hw, snr, tol, it);
    }

    if auto {
        ui.label(RichText::new("Values are derived from the uploaded spectra when phase 1 starts.").weak());
    }
    if let Some(t) = state.session.template() {
        ui.label(
            RichText::new(format!(
                "Phase 2 reuses the template parameters (SNR {}, tolerance {}).",
                t.parameters.snr, t.parameters.tolerance
            ))
            .weak(),
        );
    }
}

fn engine_status(ui: &mut Ui, state: &mut AppState) {
    let program = state.invoker.program().to_string();
    match state.engine_available {
        None => {
            ui.horizontal(|ui: &mut Ui| {
                ui.spinner();
                ui.label(format!("Checking {program}…"));
            });
        }
        Some(true) => {
            ui.label(RichText::new(format!("✔ {program} available")).color(Color32::DARK_GREEN));
        }
        Some(false) => {
            ui.label(RichText::new(format!("✖ {program} not found")).color(Color32::RED));
            ui.label(RichText::new("Runs can still be attempted.").weak());
        }
    }
    if ui.small_button("Re-check").clicked() {
        state.start_preflight();
    }
    ui.label(format!("Timeout: {} s", state.invoker.timeout().as_secs()));
}

fn workflow_status(ui: &mut Ui, state: &mut AppState) {
    let running = state.is_running();
    let mut discard = false;
    match state.session.state() {
        WorkflowState::NoTemplate => {
            ui.label("No template. Run phase 1 on a training set.");
        }
        WorkflowState::TemplateReady(t) => {
            ui.label(
                RichText::new(format!(
                    "Template ready: {} features from {} samples",
                    t.features.len(),
                    t.training_samples
                ))
                .color(Color32::DARK_GREEN),
            );
            ui.label(format!("Groups: {}", t.groups.join(", ")));
            discard = ui
                .add_enabled(!running, egui::Button::new("Discard template"))
                .on_hover_text("Return to the initial state so phase 1 can run again")
                .clicked();
        }
    }
    if discard {
        state.discard_template();
    }

    if let Some(job) = &state.job {
        ui.add_space(4.0);
        let elapsed = job.started.elapsed().as_secs();
        ui.horizontal(|ui: &mut Ui| {
            ui.spinner();
            ui.label(format!("{}: {elapsed} s", phase_label(job.phase)));
        });
        if ui.button("Cancel").clicked() {
            state.cancel_job();
        }
    }
}

// ---------------------------------------------------------------------------
// Top bar
// ---------------------------------------------------------------------------

/// Render the top menu / toolbar.
pub fn top_bar(ui: &mut Ui, state: &mut AppState) {
    egui::menu::bar(ui, |ui: &mut Ui| {
        ui.menu_button("File", |ui: &mut Ui| {
            if ui.button("Open result file…").clicked() {
                open_file_dialog(state);
                ui.close_menu();
            }
            if ui.button("Use demo data").clicked() {
                state.load_demo();
                ui.close_menu();
            }
            ui.separator();
            export_menu(ui, state);
        });

        ui.separator();

        ui.selectable_value(&mut state.tab, Tab::Upload, "Upload");
        ui.selectable_value(&mut state.tab, Tab::Results, "Processing & Results");
        ui.selectable_value(&mut state.tab, Tab::Visualization, "Visualization");
    });
}

/// Messages from the last user action.
pub fn notices(ui: &mut Ui, state: &AppState) {
    for notice in &state.notices {
        let (prefix, color) = match notice.level {
            Level::Info => ("ℹ", ui.visuals().text_color()),
            Level::Warning => ("⚠", Color32::from_rgb(0xd0, 0x8c, 0x00)),
            Level::Error => ("✖", Color32::RED),
        };
        ui.label(RichText::new(format!("{prefix} {}", notice.text)).color(color));
    }
}

fn export_menu(ui: &mut Ui, state: &mut AppState) {
    let mut chosen = None;
    ui.menu_button("Export", |ui: &mut Ui| {
        for what in Export::ALL {
            if ui
                .add_enabled(what.available(state), egui::Button::new(what.file_name()))
                .clicked()
            {
                chosen = Some(what);
                ui.close_menu();
            }
        }
    });
    if let Some(what) = chosen {
        export(state, what);
    }
}

// ---------------------------------------------------------------------------
// Exports
// ---------------------------------------------------------------------------

/// A downloadable artefact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Export {
    Matrix(Dataset),
    Parameters,
    Spectrum,
    Template,
}

impl Export {
    pub const ALL: [Export; 5] = [
        Export::Matrix(Dataset::Training),
        Export::Matrix(Dataset::Validation),
        Export::Parameters,
        Export::Spectrum,
        Export::Template,
    ];

    pub fn file_name(&self) -> &'static str {
        match self {
            Export::Matrix(dataset) => dataset.export_file_name(),
            Export::Parameters => export::PARAMETERS_FILE,
            Export::Spectrum => export::SPECTRUM_FILE,
            Export::Template => export::TEMPLATE_FILE,
        }
    }

    pub fn available(&self, state: &AppState) -> bool {
        let results = state.results.as_ref();
        match self {
            Export::Matrix(dataset) => results.and_then(|r| r.matrix(*dataset)).is_some(),
            Export::Parameters => results.and_then(|r| r.params).is_some(),
            Export::Spectrum => results.and_then(|r| r.spectrum.as_ref()).is_some(),
            Export::Template => state.session.has_template(),
        }
    }

    fn render(&self, state: &AppState) -> anyhow::Result<Vec<u8>> {
        let results = state.results.as_ref();
        match self {
            Export::Matrix(dataset) => {
                let matrix = results
                    .and_then(|r| r.matrix(*dataset))
                    .with_context(|| format!("no {dataset} results"))?;
                export::matrix_csv(matrix)
            }
            Export::Parameters => {
                let params = results.and_then(|r| r.params).context("no parameters")?;
                export::parameters_csv(&params)
            }
            Export::Spectrum => {
                let spectrum = results
                    .and_then(|r| r.spectrum.as_ref())
                    .context("no averaged spectrum")?;
                export::spectrum_csv(spectrum)
            }
            Export::Template => {
                let template = state.session.require_template()?;
                Ok(template.to_json()?.into_bytes())
            }
        }
    }
}

/// Ask for a destination and write the artefact there.
pub fn export(state: &mut AppState, what: Export) {
    let Some(path) = rfd::FileDialog::new()
        .set_title("Save export")
        .set_file_name(what.file_name())
        .save_file()
    else {
        return;
    };

    let written = what
        .render(state)
        .and_then(|bytes| std::fs::write(&path, bytes).context("writing export"));
    match written {
        Ok(()) => {
            log::info!("Exported {} to {}", what.file_name(), path.display());
            state.notify(Level::Info, format!("Saved {}", path.display()));
        }
        Err(e) => {
            log::error!("Export failed: {e:#}");
            state.notify(Level::Error, format!("Error: {e:#}"));
        }
    }
}

// ---------------------------------------------------------------------------
// File dialogs
// ---------------------------------------------------------------------------

pub fn open_file_dialog(state: &mut AppState) {
    let file = rfd::FileDialog::new()
        .set_title("Open intensity matrix")
        .add_filter("Supported files", &["csv", "parquet", "pq"])
        .add_filter("CSV", &["csv"])
        .add_filter("Parquet", &["parquet", "pq"])
        .pick_file();

    if let Some(path) = file {
        state.open_result_file(&path);
    }
}

/// Pick one zip archive for the training or validation slot.
pub fn pick_archive(state: &mut AppState, is_training: bool) {
    let title = if is_training {
        "Open training archive"
    } else {
        "Open validation archive"
    };
    let Some(path) = rfd::FileDialog::new()
        .set_title(title)
        .add_filter("Zip archive", &["zip"])
        .pick_file()
    else {
        return;
    };

    match std::fs::read(&path) {
        Ok(bytes) => {
            let name = file_name(&path);
            if is_training {
                state.load_training_archive(name, &bytes);
            } else {
                state.load_validation_archive(name, &bytes);
            }
        }
        Err(e) => {
            log::error!("Failed to read {}: {e}", path.display());
            state.notify(Level::Error, format!("Error: cannot read {}: {e}", path.display()));
        }
    }
}

/// Pick loose `.txt` spectra (and, for training, one spreadsheet).
pub fn pick_files(state: &mut AppState, is_training: bool) {
    let mut dialog = rfd::FileDialog::new().set_title("Open spectra");
    dialog = if is_training {
        dialog
            .add_filter("Spectra and labels", &["txt", "xlsx", "xls"])
            .add_filter("Spectra", &["txt"])
    } else {
        dialog.add_filter("Spectra", &["txt"])
    };
    let Some(paths) = dialog.pick_files() else {
        return;
    };

    let mut files = Vec::with_capacity(paths.len());
    for path in paths {
        match std::fs::read(&path) {
            Ok(bytes) => files.push((file_name(&path), bytes)),
            Err(e) => log::warn!("Skipping {}: {e}", path.display()),
        }
    }
    state.load_files(files, is_training);
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
