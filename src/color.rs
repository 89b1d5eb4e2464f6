use std::collections::BTreeMap;

use eframe::egui::Color32;
use palette::{Hsl, IntoColor, Srgb};

fn to_color32(rgb: Srgb) -> Color32 {
    Color32::from_rgb(
        (rgb.red.clamp(0.0, 1.0) * 255.0) as u8,
        (rgb.green.clamp(0.0, 1.0) * 255.0) as u8,
        (rgb.blue.clamp(0.0, 1.0) * 255.0) as u8,
    )
}

// ---------------------------------------------------------------------------
// Color palette generator
// ---------------------------------------------------------------------------

/// Generates `n` visually distinct colours using evenly spaced hues.
pub fn generate_palette(n: usize) -> Vec<Color32> {
    if n == 0 {
        return Vec::new();
    }
    (0..n)
        .map(|i| {
            let hue = (i as f32 / n as f32) * 360.0;
            to_color32(Hsl::new(hue, 0.75, 0.55).into_color())
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Heatmap scale
// ---------------------------------------------------------------------------

/// Sequential scale for `t` in `[0, 1]`: dark blue through teal to yellow.
/// Non-finite input maps to transparent.
pub fn heat_color(t: f64) -> Color32 {
    if !t.is_finite() {
        return Color32::TRANSPARENT;
    }
    let t = t.clamp(0.0, 1.0) as f32;
    let hsl = Hsl::new(250.0 - 190.0 * t, 0.65 + 0.25 * t, 0.22 + 0.38 * t);
    to_color32(hsl.into_color())
}

// ---------------------------------------------------------------------------
// Color mapping: group label → Color32
// ---------------------------------------------------------------------------

/// Maps group labels to distinct colours, assigned in the order given.
#[derive(Debug, Clone, Default)]
pub struct ColorMap {
    mapping: BTreeMap<String, Color32>,
    order: Vec<String>,
}

impl ColorMap {
    pub fn new<S: AsRef<str>>(groups: &[S]) -> Self {
        let palette = generate_palette(groups.len());
        let order: Vec<String> = groups.iter().map(|g| g.as_ref().to_string()).collect();
        let mapping = order.iter().cloned().zip(palette).collect();
        ColorMap { mapping, order }
    }

    pub fn color_for(&self, group: &str) -> Color32 {
        self.mapping.get(group).copied().unwrap_or(Color32::GRAY)
    }

    /// Legend entries in assignment order.
    pub fn legend_entries(&self) -> Vec<(String, Color32)> {
        self.order
            .iter()
            .map(|g| (g.clone(), self.color_for(g)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn palette_colours_are_distinct() {
        let p = generate_palette(6);
        assert_eq!(p.len(), 6);
        for (i, a) in p.iter().enumerate() {
            for b in &p[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn heat_scale_ends_differ_and_nan_is_transparent() {
        assert_ne!(heat_color(0.0), heat_color(1.0));
        assert_eq!(heat_color(-3.0), heat_color(0.0));
        assert_eq!(heat_color(f64::NAN), Color32::TRANSPARENT);
    }

    #[test]
    fn unknown_group_is_gray() {
        let cm = ColorMap::new(&["control", "case"]);
        assert_eq!(cm.legend_entries()[0].0, "control");
        assert_ne!(cm.color_for("case"), Color32::GRAY);
        assert_eq!(cm.color_for("other"), Color32::GRAY);
    }
}
