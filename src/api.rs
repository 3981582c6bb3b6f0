//! JSON bodies exchanged between the browser client and the leaderboard server.

use serde::{Deserialize, Serialize};

use crate::record::{RankingRecord, Submission, ValidationError};

/// `POST /api/rankings` body. Fields stay loose so the server can answer
/// every malformed shape with a [`ValidationError`] instead of a framework error.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SubmitRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub score: Option<serde_json::Value>,
    #[serde(default)]
    pub level: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device: Option<String>,
}

impl SubmitRequest {
    pub fn from_submission(submission: &Submission) -> Self {
        Self {
            name: Some(submission.name.clone()),
            score: Some(submission.score.into()),
            level: Some(submission.level.into()),
            device: Some(submission.device.as_str().to_string()),
        }
    }

    pub fn validate(self) -> Result<Submission, ValidationError> {
        let integer = |value: Option<serde_json::Value>| -> Result<Option<i64>, ValidationError> {
            match value {
                None | Some(serde_json::Value::Null) => Ok(None),
                Some(v) => v.as_i64().map(Some).ok_or(ValidationError::OutOfRange),
            }
        };
        Submission::from_parts(self.name, integer(self.score)?, integer(self.level)?, self.device)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitResponse {
    pub success: bool,
    pub rank: u32,
    pub id: String,
    #[serde(default)]
    pub message: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankingsResponse {
    pub success: bool,
    pub rankings: Vec<RankingRecord>,
    pub total: usize,
    pub date: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthResponse {
    pub success: bool,
    pub status: String,
    pub timestamp: i64,
    pub date: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StatsResponse {
    pub success: bool,
    pub date: String,
    pub total_players: i64,
    pub highest_score: Option<i64>,
    pub highest_level: Option<i64>,
    pub average_score: Option<f64>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    #[serde(default)]
    pub success: bool,
    pub error: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: error.into(),
        }
    }
}
