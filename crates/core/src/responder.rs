//! Responder profile model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::status::ResponderStatus;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Responder {
    pub id: i64,
    pub user_id: i64,
    /// Reference assigned at provisioning, e.g. RES-0042.
    pub responder_ref: String,
    pub phone: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub specialization: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub certification: Option<String>,
    pub status: ResponderStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_location: Option<String>,
    pub rating: f64,
    pub handled_incidents: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Responder {
    /// Reference derived from the owning user, used when the profile is
    /// provisioned lazily.
    pub fn ref_for_user(user_id: i64) -> String {
        format!("RES-{:04}", user_id)
    }

    /// Whether the responder may take a new incident right now. Availability
    /// alone; the single-active-assignment check is the store's.
    pub fn is_available(&self) -> bool {
        self.status == ResponderStatus::Available
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ref_format() {
        assert_eq!(Responder::ref_for_user(42), "RES-0042");
        assert_eq!(Responder::ref_for_user(12345), "RES-12345");
    }
}
