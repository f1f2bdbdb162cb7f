//! Mapping from remote documents to local rows.
//!
//! Every string field is optional on the remote side. Absent and `null`
//! fields become empty strings. A field with any other JSON type, or a
//! document whose id is empty or too long for an LMDB key, is malformed: it
//! is logged and left out of the mapped snapshot instead of being coerced.

use serde::Deserialize;
use serde_json::Value as JsonValue;
use log::warn;

use crate::app_response::AppResponse;
use crate::local_db_model::CityRow;
use crate::local_db_state::MAX_KEY_BYTES;
use crate::remote_collection::RemoteDocument;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RemoteCityFields {
    name: Option<String>,
    country: Option<String>,
    description: Option<String>,
}

/// Result of mapping one snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MappedSnapshot {
    pub rows: Vec<CityRow>,
    /// Ids of malformed documents that were left out.
    pub skipped: Vec<String>,
}

/// Maps a single document, failing with a validation error when it is
/// malformed.
pub fn map_document(document: &RemoteDocument) -> Result<CityRow, AppResponse> {
    if document.id.is_empty() {
        return Err(AppResponse::ValidationError("Document has an empty id".to_string()));
    }
    if document.id.len() > MAX_KEY_BYTES {
        return Err(AppResponse::ValidationError(format!(
            "Document id of {} bytes exceeds the {MAX_KEY_BYTES} byte key limit",
            document.id.len()
        )));
    }

    let fields: RemoteCityFields =
        serde_json::from_value(JsonValue::Object(document.fields.clone())).map_err(|e| {
            AppResponse::ValidationError(format!("Malformed document '{}': {e}", document.id))
        })?;

    Ok(CityRow {
        id: document.id.clone(),
        name: fields.name.unwrap_or_default(),
        country: fields.country.unwrap_or_default(),
        description: fields.description.unwrap_or_default(),
    })
}

/// Maps every document of a snapshot, in order, skipping malformed ones.
pub fn map_snapshot(documents: &[RemoteDocument]) -> MappedSnapshot {
    let mut mapped = MappedSnapshot {
        rows: Vec::with_capacity(documents.len()),
        skipped: Vec::new(),
    };

    for document in documents {
        match map_document(document) {
            Ok(row) => mapped.rows.push(row),
            Err(e) => {
                warn!("Skipping remote document: {}", e.message());
                mapped.skipped.push(document.id.clone());
            }
        }
    }

    mapped
}
