use eframe::egui::{self, Color32, Pos2, Rect, Sense, Ui, Vec2};
use egui_plot::{Bar, BarChart, Line, Plot, PlotPoints};

use crate::color::heat_color;
use crate::data::matrix::IntensityMatrix;
use crate::data::spectrum::Spectrum;

/// Features shown in the heatmap.
pub const HEATMAP_FEATURES: usize = 50;
/// Bins of the intensity histogram.
pub const HISTOGRAM_BINS: usize = 50;

// ---------------------------------------------------------------------------
// Spectra
// ---------------------------------------------------------------------------

fn spectrum_points(spectrum: &Spectrum) -> Vec<[f64; 2]> {
    spectrum
        .mz
        .iter()
        .zip(&spectrum.intensity)
        .map(|(&x, &y)| [x, y])
        .collect()
}

/// Averaged spectrum across m/z.
pub fn spectrum_plot(ui: &mut Ui, spectrum: &Spectrum) {
    Plot::new("average_spectrum")
        .height(300.0)
        .x_axis_label("m/z")
        .y_axis_label("Intensity")
        .allow_boxed_zoom(true)
        .allow_drag(true)
        .allow_scroll(true)
        .allow_zoom(true)
        .show(ui, |plot_ui| {
            plot_ui.line(
                Line::new(PlotPoints::from(spectrum_points(spectrum)))
                    .name("Average spectrum")
                    .color(Color32::LIGHT_BLUE)
                    .width(1.5),
            );
        });
}

/// One raw uploaded spectrum.
pub fn sample_plot(ui: &mut Ui, name: &str, spectrum: &Spectrum, color: Color32) {
    Plot::new("sample_preview")
        .height(250.0)
        .legend(egui_plot::Legend::default())
        .x_axis_label("m/z")
        .y_axis_label("Intensity")
        .show(ui, |plot_ui| {
            plot_ui.line(
                Line::new(PlotPoints::from(spectrum_points(spectrum)))
                    .name(name)
                    .color(color)
                    .width(1.5),
            );
        });
}

/// Mean intensity per feature, for results that come without an averaged
/// spectrum.
pub fn profile_plot(ui: &mut Ui, matrix: &IntensityMatrix) {
    let profile = matrix.mean_profile();
    if profile.is_empty() {
        ui.label("Feature names carry no m/z values.");
        return;
    }
    Plot::new("mean_profile")
        .height(300.0)
        .x_axis_label("m/z")
        .y_axis_label("Mean intensity")
        .show(ui, |plot_ui| {
            plot_ui.line(
                Line::new(PlotPoints::from(profile))
                    .name("Mean feature intensity")
                    .color(Color32::LIGHT_BLUE),
            );
        });
}

// ---------------------------------------------------------------------------
// Distribution
// ---------------------------------------------------------------------------

/// Histogram of every finite intensity in the matrix.
pub fn histogram_plot(ui: &mut Ui, matrix: &IntensityMatrix) {
    let Some(hist) = matrix.histogram(HISTOGRAM_BINS) else {
        ui.label("No finite intensities to plot.");
        return;
    };
    let bars: Vec<Bar> = hist
        .counts
        .iter()
        .enumerate()
        .map(|(i, &count)| Bar::new(hist.bin_center(i), count as f64).width(hist.bin_width))
        .collect();

    Plot::new("intensity_histogram")
        .height(250.0)
        .x_axis_label("Intensity")
        .y_axis_label("Count")
        .show(ui, |plot_ui| {
            plot_ui.bar_chart(
                BarChart::new(bars)
                    .name("Intensity distribution")
                    .color(Color32::from_rgb(0x4c, 0x9a, 0xd8)),
            );
        });
}

// ---------------------------------------------------------------------------
// Heatmap
// ---------------------------------------------------------------------------

/// Samples × top features by total intensity, one painted cell per value.
pub fn heatmap(ui: &mut Ui, matrix: &IntensityMatrix) {
    let columns = matrix.top_features(HEATMAP_FEATURES);
    let rows = matrix.n_samples();
    if columns.is_empty() || rows == 0 {
        ui.label("Nothing to show.");
        return;
    }

    let (lo, hi) = columns
        .iter()
        .flat_map(|&c| matrix.column(c))
        .filter(|v| v.is_finite())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
            (lo.min(v), hi.max(v))
        });
    let span = if hi > lo { hi - lo } else { 1.0 };

    let cell = Vec2::new(
        (ui.available_width() / columns.len() as f32).clamp(4.0, 24.0),
        (300.0 / rows as f32).clamp(3.0, 18.0),
    );
    let size = Vec2::new(cell.x * columns.len() as f32, cell.y * rows as f32);
    let (rect, response) = ui.allocate_exact_size(size, Sense::hover());
    let painter = ui.painter_at(rect);

    for (r, row) in matrix.values.iter().enumerate() {
        for (i, &c) in columns.iter().enumerate() {
            let value = row.get(c).copied().unwrap_or(f64::NAN);
            let min = Pos2::new(rect.min.x + i as f32 * cell.x, rect.min.y + r as f32 * cell.y);
            painter.rect_filled(
                Rect::from_min_size(min, cell),
                0.0,
                heat_color((value - lo) / span),
            );
        }
    }

    if let Some(pos) = response.hover_pos() {
        let i = ((pos.x - rect.min.x) / cell.x) as usize;
        let r = ((pos.y - rect.min.y) / cell.y) as usize;
        if let (Some(&c), Some(row)) = (columns.get(i), matrix.values.get(r)) {
            let value = row.get(c).copied().unwrap_or(f64::NAN);
            response.on_hover_ui_at_pointer(|ui: &mut Ui| {
                ui.label(format!(
                    "{}\n{}\n{value:.2}",
                    matrix.row_ids[r], matrix.features[c]
                ));
            });
        }
    }

    ui.horizontal(|ui: &mut Ui| {
        ui.label(format!("{lo:.1}"));
        let (bar, _) = ui.allocate_exact_size(Vec2::new(160.0, 12.0), Sense::hover());
        let steps = 32;
        let w = bar.width() / steps as f32;
        for s in 0..steps {
            let x = bar.min.x + s as f32 * w;
            ui.painter().rect_filled(
                Rect::from_min_size(Pos2::new(x, bar.min.y), Vec2::new(w + 0.5, bar.height())),
                0.0,
                heat_color(s as f64 / (steps - 1) as f64),
            );
        }
        ui.label(format!("{hi:.1}"));
    });
    ui.add_space(2.0);
    ui.label(
        egui::RichText::new(format!(
            "{rows} samples × top {} features by total intensity",
            columns.len()
        ))
        .weak(),
    );
}
