//! Minimal user surface consumed from the account system.
//!
//! The workflow core only needs enough of a user to resolve reporters and
//! notification recipients; registration, authentication and profile editing
//! live outside this crate.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    User,
    Seller,
    /// Facility managers receive severity-based incident notifications.
    Facility,
    Responder,
    Admin,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::User => "user",
            UserRole::Seller => "seller",
            UserRole::Facility => "facility",
            UserRole::Responder => "responder",
            UserRole::Admin => "admin",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "user" => Some(UserRole::User),
            "seller" => Some(UserRole::Seller),
            "facility" => Some(UserRole::Facility),
            "responder" => Some(UserRole::Responder),
            "admin" => Some(UserRole::Admin),
            _ => None,
        }
    }
}

impl std::fmt::Display for UserRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: i64,
    pub username: String,
    pub role: UserRole,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
}
