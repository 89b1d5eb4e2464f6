use eframe::egui::{self, RichText, ScrollArea, Ui};
use egui_extras::{Column, TableBuilder};

use crate::data::filter::TableView;
use crate::data::labels::RawTable;
use crate::data::matrix::IntensityMatrix;
use crate::params::ProcessingParameters;

const ROW_HEIGHT: f32 = 18.0;

fn fmt_value(v: f64) -> String {
    if v.is_nan() {
        String::new()
    } else {
        format!("{v:.2}")
    }
}

/// Intensity matrix restricted to a [`TableView`]; the identifier column is
/// always first.
pub fn matrix_table(ui: &mut Ui, matrix: &IntensityMatrix, view: &TableView) {
    ScrollArea::horizontal()
        .id_salt("matrix_table_scroll")
        .show(ui, |ui: &mut Ui| {
            TableBuilder::new(ui)
                .id_salt("matrix_table")
                .striped(true)
                .resizable(true)
                .column(Column::auto().at_least(80.0))
                .columns(Column::initial(90.0).at_least(50.0), view.columns.len())
                .header(ROW_HEIGHT + 2.0, |mut header| {
                    header.col(|ui: &mut Ui| {
                        ui.strong(&matrix.id_column);
                    });
                    for &c in &view.columns {
                        header.col(|ui: &mut Ui| {
                            ui.strong(&matrix.features[c]);
                        });
                    }
                })
                .body(|body| {
                    body.rows(ROW_HEIGHT, view.rows, |mut row| {
                        let r = row.index();
                        row.col(|ui: &mut Ui| {
                            ui.label(&matrix.row_ids[r]);
                        });
                        for &c in &view.columns {
                            row.col(|ui: &mut Ui| {
                                ui.label(fmt_value(matrix.values[r][c]));
                            });
                        }
                    });
                });
        });
}

/// Describe-style per-feature statistics, one row per feature.
pub fn describe_table(ui: &mut Ui, matrix: &IntensityMatrix) {
    const HEADERS: [&str; 9] = ["feature", "count", "mean", "std", "min", "25%", "50%", "75%", "max"];
    let stats = matrix.describe();

    TableBuilder::new(ui)
        .id_salt("describe_table")
        .striped(true)
        .max_scroll_height(300.0)
        .column(Column::auto().at_least(100.0))
        .columns(Column::auto().at_least(60.0), HEADERS.len() - 1)
        .header(ROW_HEIGHT + 2.0, |mut header| {
            for h in HEADERS {
                header.col(|ui: &mut Ui| {
                    ui.strong(h);
                });
            }
        })
        .body(|body| {
            body.rows(ROW_HEIGHT, stats.len(), |mut row| {
                let s = &stats[row.index()];
                row.col(|ui: &mut Ui| {
                    ui.label(&s.feature);
                });
                row.col(|ui: &mut Ui| {
                    ui.label(s.count.to_string());
                });
                for v in [s.mean, s.std, s.min, s.q25, s.median, s.q75, s.max] {
                    row.col(|ui: &mut Ui| {
                        ui.label(fmt_value(v));
                    });
                }
            });
        });
}

/// Spreadsheet preview as parsed, before validation.
pub fn raw_table(ui: &mut Ui, id: &str, table: &RawTable) {
    let n_cols = table.headers.len().max(1);
    ScrollArea::horizontal().id_salt(id).show(ui, |ui: &mut Ui| {
        TableBuilder::new(ui)
            .id_salt(id)
            .striped(true)
            .columns(Column::auto().at_least(60.0), n_cols)
            .header(ROW_HEIGHT + 2.0, |mut header| {
                for h in &table.headers {
                    header.col(|ui: &mut Ui| {
                        ui.strong(h);
                    });
                }
            })
            .body(|body| {
                body.rows(ROW_HEIGHT, table.rows.len(), |mut row| {
                    let cells = &table.rows[row.index()];
                    for c in 0..n_cols {
                        row.col(|ui: &mut Ui| {
                            ui.label(cells.get(c).map(String::as_str).unwrap_or(""));
                        });
                    }
                });
            });
    });
}

/// Two-column `parameter | value` grid.
pub fn parameters_grid(ui: &mut Ui, params: &ProcessingParameters) {
    egui::Grid::new("parameters_grid")
        .num_columns(2)
        .striped(true)
        .show(ui, |ui: &mut Ui| {
            ui.label(RichText::new("parameter").strong());
            ui.label(RichText::new("value").strong());
            ui.end_row();
            for (name, value) in params.table() {
                ui.label(name);
                ui.label(value);
                ui.end_row();
            }
        });
}
