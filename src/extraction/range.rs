//! Catalogue index-range validation.
//!
//! The catalogue is addressed either by a single row or by a half-open row
//! span. Out-of-range requests degrade to an empty load with a warning;
//! they never abort a run.

use log::warn;

/// Requested catalogue rows: one row, or the half-open span `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CatalogueIndex {
    Single(usize),
    Span { start: usize, end: usize },
}

/// A request validated against the catalogue size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolvedRange {
    /// No request: load every centre.
    All,
    /// Load rows `[start, end)`.
    Rows { start: usize, end: usize },
    /// Nothing to load; a warning explains why.
    Empty,
}

fn note(warnings: &mut Vec<String>, msg: String) {
    warn!("{msg}");
    warnings.push(msg);
}

pub fn resolve(
    requested: Option<CatalogueIndex>,
    num_centres: usize,
    warnings: &mut Vec<String>,
) -> ResolvedRange {
    match requested {
        None => ResolvedRange::All,
        Some(CatalogueIndex::Single(i)) => {
            if i >= num_centres {
                note(
                    warnings,
                    format!(
                        "catalogue index {i} out of range ({num_centres} centres); loading nothing"
                    ),
                );
                ResolvedRange::Empty
            } else {
                ResolvedRange::Rows {
                    start: i,
                    end: i + 1,
                }
            }
        }
        Some(CatalogueIndex::Span { start, end }) => {
            if end < start {
                note(
                    warnings,
                    format!("catalogue range {start}..{end} is decreasing; loading nothing"),
                );
                return ResolvedRange::Empty;
            }
            if start >= num_centres {
                note(
                    warnings,
                    format!(
                        "catalogue range {start}..{end} entirely out of range ({num_centres} centres); loading nothing"
                    ),
                );
                return ResolvedRange::Empty;
            }
            let end = if end > num_centres {
                note(
                    warnings,
                    format!(
                        "catalogue range upper bound {end} beyond catalogue size; clamping to {num_centres}"
                    ),
                );
                num_centres
            } else {
                end
            };
            if start == end {
                // an empty span degrades to a single-row load
                return ResolvedRange::Rows {
                    start,
                    end: start + 1,
                };
            }
            ResolvedRange::Rows { start, end }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_request_loads_all() {
        let mut w = Vec::new();
        assert_eq!(resolve(None, 10, &mut w), ResolvedRange::All);
        assert!(w.is_empty());
    }

    #[test]
    fn valid_single_index() {
        let mut w = Vec::new();
        assert_eq!(
            resolve(Some(CatalogueIndex::Single(3)), 10, &mut w),
            ResolvedRange::Rows { start: 3, end: 4 }
        );
        assert!(w.is_empty());
    }

    #[test]
    fn single_index_out_of_range_loads_nothing() {
        let mut w = Vec::new();
        assert_eq!(
            resolve(Some(CatalogueIndex::Single(10)), 10, &mut w),
            ResolvedRange::Empty
        );
        assert_eq!(w.len(), 1);
        assert!(w[0].contains("out of range"));
    }

    #[test]
    fn upper_bound_is_clamped_with_warning() {
        let mut w = Vec::new();
        assert_eq!(
            resolve(Some(CatalogueIndex::Span { start: 4, end: 20 }), 10, &mut w),
            ResolvedRange::Rows { start: 4, end: 10 }
        );
        assert_eq!(w.len(), 1);
        assert!(w[0].contains("clamping"));
    }

    #[test]
    fn span_entirely_above_loads_nothing() {
        let mut w = Vec::new();
        assert_eq!(
            resolve(
                Some(CatalogueIndex::Span {
                    start: 10,
                    end: 20
                }),
                10,
                &mut w
            ),
            ResolvedRange::Empty
        );
        assert_eq!(w.len(), 1);
    }

    #[test]
    fn decreasing_span_is_rejected() {
        let mut w = Vec::new();
        assert_eq!(
            resolve(Some(CatalogueIndex::Span { start: 7, end: 2 }), 10, &mut w),
            ResolvedRange::Empty
        );
        assert!(w[0].contains("decreasing"));
    }

    #[test]
    fn collapsed_span_becomes_single_row() {
        let mut w = Vec::new();
        assert_eq!(
            resolve(Some(CatalogueIndex::Span { start: 5, end: 5 }), 10, &mut w),
            ResolvedRange::Rows { start: 5, end: 6 }
        );
    }

    #[test]
    fn valid_span_passes_through() {
        let mut w = Vec::new();
        assert_eq!(
            resolve(Some(CatalogueIndex::Span { start: 2, end: 8 }), 10, &mut w),
            ResolvedRange::Rows { start: 2, end: 8 }
        );
        assert!(w.is_empty());
    }
}
