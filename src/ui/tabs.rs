use eframe::egui::{self, Color32, RichText, Ui};

use crate::data::filter::table_view;
use crate::data::model::Dataset;
use crate::state::{AppState, ResultOrigin, Upload};
use crate::ui::panels::{self, Export};
use crate::ui::{plot, table};

/// Sample names listed before collapsing into "... and N more".
const LISTED_SAMPLES: usize = 10;

// ---------------------------------------------------------------------------
// Upload
// ---------------------------------------------------------------------------

pub fn upload_tab(ui: &mut Ui, state: &mut AppState) {
    let locked = state.is_running();

    ui.columns(2, |cols: &mut [Ui]| {
        let (left, right) = cols.split_at_mut(1);
        let left = &mut left[0];
        let right = &mut right[0];

        left.heading("Training set");
        left.label("Zip with .txt spectra and one .xlsx/.xls label table (columns: file, group).");
        left.add_enabled_ui(!locked, |ui: &mut Ui| {
            ui.horizontal(|ui: &mut Ui| {
                if ui.button("Open archive…").clicked() {
                    panels::pick_archive(state, true);
                }
                if ui.button("Pick files…").clicked() {
                    panels::pick_files(state, true);
                }
            });
        });

        right.heading("Validation set");
        right.label("Zip with .txt spectra only. Processed with the training template.");
        right.add_enabled_ui(!locked, |ui: &mut Ui| {
            ui.horizontal(|ui: &mut Ui| {
                if ui.button("Open archive…").clicked() {
                    panels::pick_archive(state, false);
                }
                if ui.button("Pick files…").clicked() {
                    panels::pick_files(state, false);
                }
            });
        });

        if let Some(upload) = &state.training {
            upload_details(left, "training", upload);
            label_details(left, upload);
        }
        if let Some(upload) = &state.validation {
            upload_details(right, "validation", upload);
        }
    });

    ui.separator();
    upload_summary(ui, state);

    ui.separator();
    sample_preview(ui, state);
}

fn upload_details(ui: &mut Ui, id: &str, upload: &Upload) {
    ui.add_space(6.0);
    ui.label(RichText::new(&upload.origin).strong());
    let names: Vec<&str> = upload.contents.sample_names().collect();
    egui::CollapsingHeader::new(format!("{} spectra", names.len()))
        .id_salt(("samples", id))
        .default_open(false)
        .show(ui, |ui: &mut Ui| {
            for name in names.iter().take(LISTED_SAMPLES) {
                ui.label(*name);
            }
            if names.len() > LISTED_SAMPLES {
                ui.label(format!("... and {} more", names.len() - LISTED_SAMPLES));
            }
        });
}

fn label_details(ui: &mut Ui, upload: &Upload) {
    if let Some(source) = &upload.contents.label_source {
        ui.label(format!("Label table: {}", source.name));
    }
    if let Some(preview) = &upload.label_preview {
        egui::CollapsingHeader::new("Label table preview")
            .default_open(true)
            .show(ui, |ui: &mut Ui| {
                table::raw_table(ui, "label_preview", preview);
            });
    }
    match &upload.training {
        Some(Ok(input)) => {
            let colors = upload.group_colors().unwrap_or_default();
            ui.horizontal_wrapped(|ui: &mut Ui| {
                ui.label(format!("{} samples |", input.labels.sample_count()));
                for (group, color) in colors.legend_entries() {
                    ui.label(RichText::new(group).color(color).strong());
                }
            });
            if input.consistency.is_clean() {
                ui.label(RichText::new("✔ Labels match the uploaded spectra").color(Color32::DARK_GREEN));
            }
        }
        Some(Err(e)) => {
            let color = if e.is_warning() {
                Color32::from_rgb(0xd0, 0x8c, 0x00)
            } else {
                Color32::RED
            };
            ui.label(RichText::new(e.to_string()).color(color));
        }
        None => {}
    }
}

fn upload_summary(ui: &mut Ui, state: &AppState) {
    let count = |u: &Option<Upload>| u.as_ref().map_or(0, |u| u.contents.samples.len());
    let has_labels = state
        .training
        .as_ref()
        .is_some_and(|u| u.contents.label_source.is_some());

    egui::Grid::new("upload_summary")
        .num_columns(2)
        .show(ui, |ui: &mut Ui| {
            ui.label("Training spectra");
            ui.label(count(&state.training).to_string());
            ui.end_row();
            ui.label("Training label tables");
            ui.label(if has_labels { "1" } else { "0" });
            ui.end_row();
            ui.label("Validation spectra");
            ui.label(count(&state.validation).to_string());
            ui.end_row();
        });
}

fn sample_preview(ui: &mut Ui, state: &mut AppState) {
    let Some(upload) = &state.training else {
        return;
    };
    let names: Vec<String> = upload.contents.sample_names().map(str::to_string).collect();
    if names.is_empty() {
        return;
    }
    let colors = upload.group_colors();
    let group_of = |name: &str| -> Option<String> {
        let input = upload.training_input()?;
        let stem = name.strip_suffix(".txt").unwrap_or(name);
        input
            .labels
            .rows
            .iter()
            .find(|r| r.file == name || r.file == stem)
            .map(|r| r.group.clone())
    };

    ui.heading("Raw spectrum preview");
    let current = state.preview_sample.min(names.len() - 1);
    let mut selected = current;
    egui::ComboBox::from_id_salt("preview_sample")
        .selected_text(&names[current])
        .show_ui(ui, |ui: &mut Ui| {
            for (i, name) in names.iter().enumerate() {
                ui.selectable_value(&mut selected, i, name);
            }
        });
    let group = group_of(&names[selected]);
    let color = match (&colors, &group) {
        (Some(cm), Some(g)) => cm.color_for(g),
        _ => Color32::LIGHT_BLUE,
    };
    state.preview_sample = selected;

    match state.preview_spectrum() {
        Some((name, spectrum)) if !spectrum.is_empty() => {
            let label = match group {
                Some(g) => format!("{name} ({g})"),
                None => name,
            };
            plot::sample_plot(ui, &label, &spectrum, color);
        }
        _ => {
            ui.label("This file has no numeric m/z, intensity pairs.");
        }
    }
}

// ---------------------------------------------------------------------------
// Processing & results
// ---------------------------------------------------------------------------

pub fn results_tab(ui: &mut Ui, state: &mut AppState) {
    ui.horizontal(|ui: &mut Ui| {
        let idle = !state.is_running();
        if ui
            .add_enabled(idle, egui::Button::new("▶ Phase 1: build template"))
            .on_hover_text("Detect peaks on the training set and freeze the feature list")
            .clicked()
        {
            state.start_phase1();
        }
        if ui
            .add_enabled(idle, egui::Button::new("▶ Phase 2: apply template"))
            .on_hover_text("Measure the validation set at the template's m/z positions")
            .clicked()
        {
            state.start_phase2();
        }
        if ui.button("Use demo data").clicked() {
            state.load_demo();
        }
    });

    if let Some(output) = &state.engine_log {
        egui::CollapsingHeader::new("Engine output")
            .default_open(false)
            .show(ui, |ui: &mut Ui| {
                egui::ScrollArea::vertical()
                    .id_salt("engine_log")
                    .max_height(200.0)
                    .show(ui, |ui: &mut Ui| {
                        ui.monospace(output);
                    });
            });
    }
    ui.separator();

    let Some(results) = &state.results else {
        ui.label("No results yet. Run phase 1, open a result file or use the demo data.");
        return;
    };

    match &results.origin {
        ResultOrigin::Engine => {}
        ResultOrigin::Demo => {
            ui.label(RichText::new("Showing demo data").italics());
        }
        ResultOrigin::File(path) => {
            ui.label(RichText::new(format!("Showing {path}")).italics());
        }
    }

    // ---- summary metrics ----
    if let Some(train) = &results.train {
        let summary = train.summary();
        let validation = results
            .validation
            .as_ref()
            .map_or("N/A".to_string(), |v| v.n_samples().to_string());
        egui::Grid::new("summary_metrics")
            .num_columns(5)
            .spacing([24.0, 4.0])
            .show(ui, |ui: &mut Ui| {
                for h in ["Training samples", "Validation samples", "Features", "Total intensity", "Mean intensity"] {
                    ui.label(RichText::new(h).weak());
                }
                ui.end_row();
                ui.heading(summary.samples.to_string());
                ui.heading(validation);
                ui.heading(summary.features.to_string());
                ui.heading(format!("{:.2}", summary.total_intensity));
                ui.heading(format!("{:.2}", summary.mean_intensity));
                ui.end_row();
            });
    }

    if let Some(params) = &results.params {
        egui::CollapsingHeader::new("Processing parameters")
            .default_open(false)
            .show(ui, |ui: &mut Ui| table::parameters_grid(ui, params));
    }
    ui.separator();

    // ---- table view ----
    let has_validation = results.validation.is_some();
    let max_rows = state.table_matrix().map_or(1, |m| m.n_samples().max(1));
    ui.horizontal(|ui: &mut Ui| {
        ui.label("Dataset");
        egui::ComboBox::from_id_salt("table_dataset")
            .selected_text(state.table_dataset.to_string())
            .show_ui(ui, |ui: &mut Ui| {
                ui.selectable_value(&mut state.table_dataset, Dataset::Training, Dataset::Training.to_string());
                if has_validation {
                    ui.selectable_value(
                        &mut state.table_dataset,
                        Dataset::Validation,
                        Dataset::Validation.to_string(),
                    );
                }
            });

        ui.label("Rows");
        ui.add(egui::DragValue::new(&mut state.table_query.rows).range(1..=max_rows));
        ui.label("Search m/z");
        ui.text_edit_singleline(&mut state.table_query.search);
    });

    let Some(matrix) = state.table_matrix() else {
        return;
    };
    let view = table_view(matrix, &state.table_query);
    if view.matched == Some(0) {
        ui.label(
            RichText::new(format!("No feature matches '{}'", state.table_query.search.trim()))
                .color(Color32::from_rgb(0xd0, 0x8c, 0x00)),
        );
    }
    ui.label(
        RichText::new(format!(
            "{} of {} rows, {} of {} features",
            view.rows,
            matrix.n_samples(),
            view.columns.len(),
            matrix.n_features()
        ))
        .weak(),
    );
    table::matrix_table(ui, matrix, &view);

    egui::CollapsingHeader::new("Feature statistics")
        .default_open(false)
        .show(ui, |ui: &mut Ui| table::describe_table(ui, matrix));

    ui.separator();
    download_buttons(ui, state);
}

fn download_buttons(ui: &mut Ui, state: &mut AppState) {
    let mut chosen = None;
    ui.horizontal_wrapped(|ui: &mut Ui| {
        ui.label("Download:");
        for what in Export::ALL {
            if ui
                .add_enabled(what.available(state), egui::Button::new(what.file_name()))
                .clicked()
            {
                chosen = Some(what);
            }
        }
    });
    if let Some(what) = chosen {
        panels::export(state, what);
    }
}

// ---------------------------------------------------------------------------
// Visualization
// ---------------------------------------------------------------------------

pub fn visualization_tab(ui: &mut Ui, state: &AppState) {
    let Some(results) = &state.results else {
        ui.centered_and_justified(|ui: &mut Ui| {
            ui.heading("No results to visualise yet");
        });
        return;
    };

    egui::ScrollArea::vertical()
        .auto_shrink([false, false])
        .show(ui, |ui: &mut Ui| {
            ui.heading("Average spectrum");
            match (&results.spectrum, &results.train) {
                (Some(spectrum), _) => plot::spectrum_plot(ui, spectrum),
                (None, Some(train)) => plot::profile_plot(ui, train),
                (None, None) => {
                    ui.label("No spectrum available.");
                }
            }

            let Some(matrix) = state.table_matrix() else {
                return;
            };
            ui.add_space(8.0);
            ui.heading(format!("Top {} features ({})", plot::HEATMAP_FEATURES, state.table_dataset));
            plot::heatmap(ui, matrix);

            ui.add_space(8.0);
            ui.heading("Intensity distribution");
            plot::histogram_plot(ui, matrix);
        });
}
