use anyhow::{bail, Result};

use super::model::SampleRecord;

// ---------------------------------------------------------------------------
// Spectrum – decoded two-column text sample
// ---------------------------------------------------------------------------

/// A decoded raw spectrum: m/z axis and intensity axis of equal length.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Spectrum {
    pub mz: Vec<f64>,
    pub intensity: Vec<f64>,
}

impl Spectrum {
    pub fn len(&self) -> usize {
        self.mz.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mz.is_empty()
    }
}

/// Decode instrument text exports: one `m/z intensity` pair per line,
/// separated by whitespace, tab, comma or semicolon. Header and comment
/// lines (anything whose first two fields are not numbers) are skipped.
pub fn parse_spectrum(record: &SampleRecord) -> Result<Spectrum> {
    let text = String::from_utf8_lossy(&record.content);
    let mut spectrum = Spectrum::default();

    for line in text.lines() {
        let mut fields = line
            .split(|c: char| c.is_whitespace() || c == ',' || c == ';')
            .filter(|f| !f.is_empty());
        let (Some(a), Some(b)) = (fields.next(), fields.next()) else {
            continue;
        };
        let (Ok(mz), Ok(intensity)) = (a.parse::<f64>(), b.parse::<f64>()) else {
            continue;
        };
        spectrum.mz.push(mz);
        spectrum.intensity.push(intensity);
    }

    if spectrum.is_empty() {
        bail!("{}: no numeric m/z-intensity pairs found", record.name);
    }
    Ok(spectrum)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_mixed_separators_and_skips_headers() {
        let rec = SampleRecord::new(
            "s.txt",
            b"# exported\nmz\tintensity\n2000.5\t10\n2001.0, 12.5\n2001.5;3\n".to_vec(),
        );
        let sp = parse_spectrum(&rec).unwrap();
        assert_eq!(sp.mz, vec![2000.5, 2001.0, 2001.5]);
        assert_eq!(sp.intensity, vec![10.0, 12.5, 3.0]);
    }

    #[test]
    fn text_without_numbers_is_an_error() {
        let rec = SampleRecord::new("empty.txt", b"nothing here\n".to_vec());
        assert!(parse_spectrum(&rec).is_err());
    }
}
