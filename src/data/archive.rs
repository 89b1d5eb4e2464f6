use std::collections::HashSet;
use std::io::{Cursor, Read};

use zip::ZipArchive;

use super::model::{LabelSource, SampleRecord};
use crate::error::{ArchiveFormatError, MissingEntry};

/// Entries below this prefix are platform artefacts (macOS resource forks).
pub const RESERVED_PREFIX: &str = "__MACOSX";

// ---------------------------------------------------------------------------
// Entry classification
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EntryKind {
    Sample,
    LabelTable,
    Ignored,
}

fn classify(path: &str) -> EntryKind {
    if path.starts_with(RESERVED_PREFIX) {
        return EntryKind::Ignored;
    }
    let lower = path.to_ascii_lowercase();
    if lower.ends_with(".txt") {
        EntryKind::Sample
    } else if lower.ends_with(".xlsx") || lower.ends_with(".xls") {
        EntryKind::LabelTable
    } else {
        EntryKind::Ignored
    }
}

/// Strip any directory components (zip paths always use `/`).
fn base_name(path: &str) -> &str {
    path.rsplit(['/', '\\']).next().unwrap_or(path)
}

// ---------------------------------------------------------------------------
// Intake result
// ---------------------------------------------------------------------------

/// What one upload yielded: the spectra in enumeration order and at most one
/// label spreadsheet (the first one seen).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IntakeContents {
    pub samples: Vec<SampleRecord>,
    pub label_source: Option<LabelSource>,
}

impl IntakeContents {
    fn push(&mut self, path: &str, content: Vec<u8>) {
        match classify(path) {
            EntryKind::Sample => self
                .samples
                .push(SampleRecord::new(base_name(path), content)),
            EntryKind::LabelTable if self.label_source.is_none() => {
                self.label_source = Some(LabelSource {
                    name: base_name(path).to_string(),
                    content,
                });
            }
            EntryKind::LabelTable | EntryKind::Ignored => {}
        }
    }

    /// Categories this upload lacks. Empty when both are present.
    pub fn missing(&self) -> Vec<MissingEntry> {
        let mut missing = Vec::new();
        if self.samples.is_empty() {
            missing.push(MissingEntry::Samples);
        }
        if self.label_source.is_none() {
            missing.push(MissingEntry::LabelTable);
        }
        missing
    }

    pub fn sample_names(&self) -> impl Iterator<Item = &str> {
        self.samples.iter().map(|s| s.name.as_str())
    }

    /// Names carried by more than one spectrum once paths are stripped.
    /// Only the first of each reaches the engine.
    pub fn duplicate_names(&self) -> Vec<&str> {
        let mut seen = HashSet::new();
        let mut dupes = Vec::new();
        for name in self.sample_names() {
            if !seen.insert(name) && !dupes.contains(&name) {
                dupes.push(name);
            }
        }
        dupes
    }
}

// ---------------------------------------------------------------------------
// Public entry-points
// ---------------------------------------------------------------------------

/// Scan a zip bundle and pull out spectra and the label spreadsheet.
///
/// Only an unreadable container is an error; an archive with no matching
/// entries yields empty contents and the caller reports
/// [`IntakeContents::missing`].
pub fn ingest_archive(bytes: &[u8]) -> Result<IntakeContents, ArchiveFormatError> {
    let mut zip = ZipArchive::new(Cursor::new(bytes))?;
    let mut contents = IntakeContents::default();

    for i in 0..zip.len() {
        let mut file = zip.by_index(i)?;
        if file.is_dir() {
            continue;
        }
        let path = file.name().to_string();
        if classify(&path) == EntryKind::Ignored {
            continue;
        }
        if classify(&path) == EntryKind::LabelTable && contents.label_source.is_some() {
            log::debug!("Skipping extra spreadsheet '{path}'");
            continue;
        }
        let mut buf = Vec::with_capacity(file.size() as usize);
        file.read_to_end(&mut buf).map_err(zip::result::ZipError::Io)?;
        contents.push(&path, buf);
    }

    log::info!(
        "Archive intake: {} spectra, label table: {}",
        contents.samples.len(),
        contents
            .label_source
            .as_ref()
            .map(|l| l.name.as_str())
            .unwrap_or("none")
    );
    Ok(contents)
}

/// Same classification rules as [`ingest_archive`] for individually picked
/// files, given as `(file name, bytes)` pairs.
pub fn ingest_files<I>(files: I) -> IntakeContents
where
    I: IntoIterator<Item = (String, Vec<u8>)>,
{
    let mut contents = IntakeContents::default();
    for (name, bytes) in files {
        contents.push(&name, bytes);
    }
    contents
}

#[cfg(test)]
pub(crate) mod tests {
    use std::io::Write;

    use proptest::prelude::*;
    use zip::write::SimpleFileOptions;
    use zip::ZipWriter;

    use super::*;

    pub(crate) fn build_zip(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        for (name, data) in entries {
            writer
                .start_file(*name, SimpleFileOptions::default())
                .unwrap();
            writer.write_all(data).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }

    #[test]
    fn training_bundle_with_macos_artefacts() {
        let bytes = build_zip(&[
            ("a.txt", b"1000 1\n"),
            ("b.txt", b"1000 2\n"),
            ("meta.xlsx", b"xlsx-bytes"),
            ("__MACOSX/.DS_Store", b"junk"),
            ("__MACOSX/._a.txt", b"junk"),
        ]);
        let contents = ingest_archive(&bytes).unwrap();
        let names: Vec<_> = contents.sample_names().collect();
        assert_eq!(names, vec!["a.txt", "b.txt"]);
        let label = contents.label_source.unwrap();
        assert_eq!(label.name, "meta.xlsx");
        assert_eq!(label.content, b"xlsx-bytes");
    }

    #[test]
    fn suffix_match_is_case_insensitive_and_paths_are_stripped() {
        let bytes = build_zip(&[
            ("train/Sample1.TXT", b"x"),
            ("train/labels.XLS", b"y"),
            ("train/readme.md", b"z"),
        ]);
        let contents = ingest_archive(&bytes).unwrap();
        assert_eq!(contents.samples[0].name, "Sample1.TXT");
        assert_eq!(contents.label_source.unwrap().name, "labels.XLS");
    }

    #[test]
    fn first_spreadsheet_wins() {
        let bytes = build_zip(&[("first.xlsx", b"1"), ("second.xls", b"2")]);
        let contents = ingest_archive(&bytes).unwrap();
        assert_eq!(contents.label_source.unwrap().name, "first.xlsx");
    }

    #[test]
    fn empty_categories_are_reported_not_raised() {
        let validation = build_zip(&[("v1.txt", b"1"), ("v2.txt", b"2")]);
        let contents = ingest_archive(&validation).unwrap();
        assert_eq!(contents.missing(), vec![MissingEntry::LabelTable]);

        let only_sheet = build_zip(&[("labels.xlsx", b"1")]);
        let contents = ingest_archive(&only_sheet).unwrap();
        assert_eq!(contents.missing(), vec![MissingEntry::Samples]);

        let nothing = build_zip(&[("notes.md", b"1")]);
        assert_eq!(ingest_archive(&nothing).unwrap().missing().len(), 2);
    }

    #[test]
    fn same_base_name_in_two_folders_is_reported() {
        let bytes = build_zip(&[
            ("d1/a.txt", b"1"),
            ("d2/a.txt", b"2"),
            ("d3/a.txt", b"3"),
            ("b.txt", b"4"),
        ]);
        let contents = ingest_archive(&bytes).unwrap();
        assert_eq!(contents.samples.len(), 4);
        assert_eq!(contents.duplicate_names(), vec!["a.txt"]);
        assert!(ingest_archive(&build_zip(&[("a.txt", b"1")]))
            .unwrap()
            .duplicate_names()
            .is_empty());
    }

    #[test]
    fn garbage_bytes_are_an_archive_error() {
        assert!(ingest_archive(b"definitely not a zip").is_err());
    }

    #[test]
    fn loose_files_follow_archive_rules() {
        let contents = ingest_files(vec![
            ("s1.txt".to_string(), b"1".to_vec()),
            ("labels.xlsx".to_string(), b"2".to_vec()),
            ("__MACOSX/s2.txt".to_string(), b"3".to_vec()),
            ("other.xlsx".to_string(), b"4".to_vec()),
        ]);
        assert_eq!(contents.samples.len(), 1);
        assert_eq!(contents.label_source.unwrap().name, "labels.xlsx");
    }

    proptest! {
        #[test]
        fn sample_count_is_independent_of_entry_order(
            n_txt in 0usize..8,
            with_sheet in any::<bool>(),
            n_reserved in 0usize..3,
            seed in any::<u64>(),
        ) {
            let mut names: Vec<String> = (0..n_txt).map(|i| format!("dir/s{i}.txt")).collect();
            if with_sheet {
                names.push("labels.xlsx".to_string());
            }
            for i in 0..n_reserved {
                names.push(format!("__MACOSX/._s{i}.txt"));
            }
            // cheap deterministic shuffle
            let len = names.len().max(1);
            names.rotate_left((seed as usize) % len);
            if seed % 2 == 0 {
                names.reverse();
            }

            let entries: Vec<(&str, &[u8])> =
                names.iter().map(|n| (n.as_str(), b"0".as_slice())).collect();
            let contents = ingest_archive(&build_zip(&entries)).unwrap();
            prop_assert_eq!(contents.samples.len(), n_txt);
            prop_assert_eq!(contents.label_source.is_some(), with_sheet);
        }
    }
}
