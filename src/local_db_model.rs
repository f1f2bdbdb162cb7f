//! Row shape of the local city mirror.
//!
//! The local table has exactly one row shape, [`CityRow`]. Rows are keyed by
//! [`CityRow::id`], which is the opaque document id assigned by the remote
//! collection, and are stored as JSON values in LMDB.

use serde::{Deserialize, Serialize};

/// A single city as persisted in the local mirror store.
///
/// All fields are plain strings. Fields that were absent on the remote
/// document are stored as empty strings, so a row read back from the store is
/// always fully populated.
///
/// # Examples
///
/// ```rust
/// use city_mirror_core::local_db_model::CityRow;
///
/// let row = CityRow::new("c1", "Paris", "France", "City of light");
/// assert_eq!(row.id, "c1");
///
/// let json = serde_json::to_string(&row)?;
/// let back: CityRow = serde_json::from_str(&json)?;
/// assert_eq!(row, back);
/// # Ok::<(), serde_json::Error>(())
/// ```
///
/// # Field Constraints
///
/// - `id` must not be empty. LMDB rejects zero-length keys, and the store
///   validates this before opening a write transaction.
/// - `name`, `country` and `description` may be empty.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq, Hash)]
pub struct CityRow {
    /// Remote document id, used as the primary key.
    pub id: String,

    pub name: String,

    pub country: String,

    pub description: String,
}

impl CityRow {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        country: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            country: country.into(),
            description: description.into(),
        }
    }
}
