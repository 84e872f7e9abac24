use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Length of the hex prefix kept from the export fingerprint.
const EXPORT_ID_LEN: usize = 12;

/// Short, stable identifier of one export run.
///
/// Derived from the label, the export date and the creation instant, so two
/// runs started for the same label on the same day still get distinct ids.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct ExportId(String);

impl ExportId {
    pub fn derive(label: &str, export_date: NaiveDate, created_at: DateTime<Utc>) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(label.as_bytes());
        hasher.update(b":");
        hasher.update(export_date.to_string().as_bytes());
        hasher.update(b":");
        hasher.update(created_at.to_rfc3339().as_bytes());
        hasher.update(created_at.timestamp_subsec_nanos().to_le_bytes());

        let digest = hex::encode(hasher.finalize());
        Self(digest[..EXPORT_ID_LEN].to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ExportId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for ExportId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for ExportId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}
