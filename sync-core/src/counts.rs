//! Population counts.

use fieldsync_types::CountSummary;

/// Active / voided split of a population, as a store reports it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VoidSplit {
    /// Rows not voided.
    pub active: u64,
    /// Voided or retired rows.
    pub voided: u64,
}

/// Build the summary for a scope.
///
/// `ignored` is carried only when optimize was requested; `None` must stay
/// `None` so that clients omit the field instead of showing 0.
pub fn summarize(split: VoidSplit, ignored: Option<u64>) -> CountSummary {
    let summary = CountSummary::new(split.active, split.voided);
    match ignored {
        Some(ignored) => summary.with_ignored(ignored),
        None => summary,
    }
}
