//! Sample experiment records for seeding a store.

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

const STATUSES: &[&str] = &["draft", "running", "paused", "completed"];

/// An experiment record as stored under the watched prefix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExperimentRecord {
    pub id: i64,
    pub uuid: Uuid,
    #[serde(rename = "type")]
    pub kind: String,
    pub status: String,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
    pub last_updated_at: DateTime<Utc>,
}

impl ExperimentRecord {
    /// The `seq`-th record of a seeding run.
    pub fn generate(seq: usize) -> Self {
        let mut rng = rand::rng();
        let now = Utc::now();
        Self {
            id: rng.random_range(0..=seq as i64),
            uuid: Uuid::new_v4(),
            kind: format!("test-{}", seq),
            status: STATUSES[rng.random_range(0..STATUSES.len())].to_string(),
            enabled: true,
            created_at: now,
            last_updated_at: now,
        }
    }
}

/// Store key for a record: the prefix joined to the record uuid.
pub fn seed_key(prefix: &str, uuid: &Uuid) -> String {
    if prefix.ends_with('/') {
        format!("{}{}", prefix, uuid)
    } else {
        format!("{}/{}", prefix, uuid)
    }
}
