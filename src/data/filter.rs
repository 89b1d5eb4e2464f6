use super::matrix::IntensityMatrix;

// ---------------------------------------------------------------------------
// Table view predicate: row cap + m/z substring search
// ---------------------------------------------------------------------------

/// What the table preview should show.
/// An empty `search` means "no column filter" (show every feature).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableQuery {
    pub rows: usize,
    pub search: String,
}

impl TableQuery {
    pub fn new(rows: usize) -> Self {
        Self {
            rows,
            search: String::new(),
        }
    }
}

/// Result of applying a [`TableQuery`]. The identifier column is implicit
/// and always shown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableView {
    /// Number of leading rows to show.
    pub rows: usize,
    /// Feature column indices to show.
    pub columns: Vec<usize>,
    /// `Some(n)` when a search was applied and matched `n` features.
    pub matched: Option<usize>,
}

/// Apply the query.
///
/// * `rows` is clamped to `[1, n_samples]` (0 for an empty matrix)
/// * A feature column passes the search when its header contains the text
/// * A search with no match falls back to every column and reports
///   `matched == Some(0)`
pub fn table_view(matrix: &IntensityMatrix, query: &TableQuery) -> TableView {
    let n = matrix.n_samples();
    let rows = if n == 0 { 0 } else { query.rows.clamp(1, n) };
    let all: Vec<usize> = (0..matrix.n_features()).collect();

    let needle = query.search.trim();
    if needle.is_empty() {
        return TableView {
            rows,
            columns: all,
            matched: None,
        };
    }

    let columns: Vec<usize> = matrix
        .features
        .iter()
        .enumerate()
        .filter(|(_, name)| name.contains(needle))
        .map(|(i, _)| i)
        .collect();

    let matched = Some(columns.len());
    TableView {
        rows,
        columns: if columns.is_empty() { all } else { columns },
        matched,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::matrix::tests::small;

    #[test]
    fn row_cap_is_clamped() {
        let m = small();
        assert_eq!(table_view(&m, &TableQuery::new(0)).rows, 1);
        assert_eq!(table_view(&m, &TableQuery::new(99)).rows, 2);
    }

    #[test]
    fn search_keeps_matching_features() {
        let m = small();
        let q = TableQuery {
            rows: 5,
            search: "000".into(),
        };
        let view = table_view(&m, &q);
        assert_eq!(view.columns, vec![0, 1, 2]);
        assert_eq!(view.matched, Some(3));

        let q = TableQuery {
            rows: 5,
            search: "2000".into(),
        };
        let view = table_view(&m, &q);
        assert_eq!(view.columns, vec![2]);
        assert_eq!(view.matched, Some(1));
    }

    #[test]
    fn no_match_shows_everything_and_reports_zero() {
        let q = TableQuery {
            rows: 1,
            search: "9999".into(),
        };
        let view = table_view(&small(), &q);
        assert_eq!(view.columns.len(), 3);
        assert_eq!(view.matched, Some(0));
    }
}
