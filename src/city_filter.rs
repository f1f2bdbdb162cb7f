//! Client-side list filtering for the city screens.
//!
//! Filtering is a linear case-insensitive substring scan over name and
//! country, recomputed on every query change.

use tokio::sync::watch;

use crate::city_mapping::map_snapshot;
use crate::local_db_model::CityRow;
use crate::remote_collection::RemoteDocument;

/// Whether `row` matches an already lower-cased, non-empty `needle`.
fn matches(row: &CityRow, needle: &str) -> bool {
    row.name.to_lowercase().contains(needle) || row.country.to_lowercase().contains(needle)
}

/// Rows whose name or country contains `query`, ignoring case.
///
/// An empty query returns every row. The input order is
/// preserved.
///
/// ```rust
/// use city_mirror_core::city_filter::filter_cities;
/// use city_mirror_core::local_db_model::CityRow;
///
/// let rows = vec![
///     CityRow::new("1", "Antwerp", "Belgium", ""),
///     CityRow::new("2", "Gent", "Belgium", ""),
/// ];
/// assert_eq!(filter_cities(&rows, "belg").len(), 2);
/// assert_eq!(filter_cities(&rows, "antw")[0].name, "Antwerp");
/// ```
pub fn filter_cities(rows: &[CityRow], query: &str) -> Vec<CityRow> {
    let needle = query.to_lowercase();
    if needle.is_empty() {
        return rows.to_vec();
    }
    rows.iter().filter(|row| matches(row, &needle)).cloned().collect()
}

/// Sorts by name ignoring case, ties broken by id.
pub fn sort_by_name(rows: &mut [CityRow]) {
    rows.sort_by(|a, b| {
        a.name
            .to_lowercase()
            .cmp(&b.name.to_lowercase())
            .then_with(|| a.id.cmp(&b.id))
    });
}

/// Filters a remote reflection directly, without going through the store.
/// Malformed documents are left out.
pub fn filter_documents(documents: &[RemoteDocument], query: &str) -> Vec<CityRow> {
    let mapped = map_snapshot(documents);
    filter_cities(&mapped.rows, query)
}

/// Reactive view over the local store for a searchable list screen.
pub struct CityListBinding {
    rows: watch::Receiver<Vec<CityRow>>,
    query: String,
}

impl CityListBinding {
    pub fn new(rows: watch::Receiver<Vec<CityRow>>) -> Self {
        Self {
            rows,
            query: String::new(),
        }
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn set_query(&mut self, query: impl Into<String>) {
        self.query = query.into();
    }

    /// Whether the store published new rows since the last `visible` call.
    pub fn has_changed(&self) -> bool {
        self.rows.has_changed().unwrap_or(false)
    }

    /// Current rows, sorted by name then filtered by the query. Marks the
    /// store value as seen.
    pub fn visible(&mut self) -> Vec<CityRow> {
        let mut rows = self.rows.borrow_and_update().clone();
        sort_by_name(&mut rows);
        filter_cities(&rows, &self.query)
    }
}
