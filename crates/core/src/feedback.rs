//! Feedback left by users after an incident.
//!
//! Stored and listed only; moderation and replies happen in the surrounding
//! system.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::WorkflowError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackStatus {
    Pending,
    Approved,
    Replied,
    Resolved,
}

impl FeedbackStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FeedbackStatus::Pending => "pending",
            FeedbackStatus::Approved => "approved",
            FeedbackStatus::Replied => "replied",
            FeedbackStatus::Resolved => "resolved",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(FeedbackStatus::Pending),
            "approved" => Some(FeedbackStatus::Approved),
            "replied" => Some(FeedbackStatus::Replied),
            "resolved" => Some(FeedbackStatus::Resolved),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Feedback {
    pub id: i64,
    pub user_id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub incident_id: Option<i64>,
    pub rating: u8,
    pub message: String,
    pub status: FeedbackStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub replied_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewFeedback {
    pub user_id: i64,
    #[serde(default)]
    pub incident_id: Option<i64>,
    pub rating: u8,
    pub message: String,
}

impl NewFeedback {
    pub fn validate(&self) -> Result<(), WorkflowError> {
        if !(1..=5).contains(&self.rating) {
            return Err(WorkflowError::validation("Rating must be between 1 and 5"));
        }
        if self.message.trim().is_empty() {
            return Err(WorkflowError::validation("Feedback message is required"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rating_bounds() {
        let mut fb = NewFeedback {
            user_id: 1,
            incident_id: None,
            rating: 5,
            message: "Fast response".to_string(),
        };
        assert!(fb.validate().is_ok());

        fb.rating = 0;
        assert!(fb.validate().is_err());
        fb.rating = 6;
        assert!(fb.validate().is_err());
    }

    #[test]
    fn test_message_required() {
        let fb = NewFeedback {
            user_id: 1,
            incident_id: Some(2),
            rating: 3,
            message: "   ".to_string(),
        };
        assert!(fb.validate().is_err());
    }
}
