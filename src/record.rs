//! Leaderboard records and the rules shared by the client and the server:
//! submission validation, ranking order, and record ids.

use std::cmp::Ordering;

use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::clock::calendar_day;
use crate::config::{FRESH_ENTRY_WINDOW_MS, LEVEL_MAX, NAME_MAX_CHARS, SCORE_MAX};

/// A stored game result. Immutable once written.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(not(target_arch = "wasm32"), derive(sqlx::FromRow))]
pub struct RankingRecord {
    pub id: String,
    pub name: String,
    pub score: u32,
    pub level: u32,
    pub timestamp: i64,
    #[serde(default = "unknown_device")]
    pub device: String,
    #[serde(default)]
    pub date: String,
}

fn unknown_device() -> String {
    DeviceCategory::Unknown.as_str().to_string()
}

impl RankingRecord {
    pub fn from_submission(submission: &Submission, id: String, timestamp: i64) -> Self {
        Self {
            id,
            name: submission.name.clone(),
            score: submission.score,
            level: submission.level,
            timestamp,
            device: submission.device.as_str().to_string(),
            date: calendar_day(timestamp),
        }
    }

    /// Whether this is the entry `name` just submitted (highlighted in views).
    pub fn is_fresh_entry_of(&self, name: &str, now_ms: i64) -> bool {
        self.name == name && (self.timestamp - now_ms).abs() < FRESH_ENTRY_WINDOW_MS
    }
}

/// Leaderboard order: score desc, level desc, earlier timestamp first.
pub fn ranking_order(a: &RankingRecord, b: &RankingRecord) -> Ordering {
    b.score
        .cmp(&a.score)
        .then_with(|| b.level.cmp(&a.level))
        .then_with(|| a.timestamp.cmp(&b.timestamp))
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeviceCategory {
    Mobile,
    Tablet,
    Desktop,
    Unknown,
}

impl DeviceCategory {
    pub fn from_user_agent(user_agent: &str) -> Self {
        if user_agent.contains("Mobile") {
            Self::Mobile
        } else if user_agent.contains("Tablet") {
            Self::Tablet
        } else {
            Self::Desktop
        }
    }

    /// Lenient parse of a submitted label; anything unrecognised is `Unknown`.
    pub fn parse(label: &str) -> Self {
        match label {
            "Mobile" => Self::Mobile,
            "Tablet" => Self::Tablet,
            "Desktop" => Self::Desktop,
            _ => Self::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mobile => "Mobile",
            Self::Tablet => "Tablet",
            Self::Desktop => "Desktop",
            Self::Unknown => "Unknown",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Invalid data: name, score, and level are required")]
    MissingFields,
    #[error("Name must be 1-{} characters", NAME_MAX_CHARS)]
    NameLength,
    #[error("Invalid score or level range")]
    OutOfRange,
    #[error("Invalid request body: {0}")]
    Malformed(String),
}

/// A finished game ready to be ranked.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Submission {
    pub name: String,
    pub score: u32,
    pub level: u32,
    pub device: DeviceCategory,
}

impl Submission {
    pub fn new(
        name: impl Into<String>,
        score: u32,
        level: u32,
        device: DeviceCategory,
    ) -> Result<Self, ValidationError> {
        Self::from_parts(
            Some(name.into()),
            Some(i64::from(score)),
            Some(i64::from(level)),
            Some(device.as_str().to_string()),
        )
    }

    /// Validate loosely-typed fields as they arrive over the wire.
    pub fn from_parts(
        name: Option<String>,
        score: Option<i64>,
        level: Option<i64>,
        device: Option<String>,
    ) -> Result<Self, ValidationError> {
        let (Some(name), Some(score), Some(level)) = (name, score, level) else {
            return Err(ValidationError::MissingFields);
        };
        if name.is_empty() {
            return Err(ValidationError::MissingFields);
        }
        validate_name(&name)?;
        if !(0..=i64::from(SCORE_MAX)).contains(&score)
            || !(1..=i64::from(LEVEL_MAX)).contains(&level)
        {
            return Err(ValidationError::OutOfRange);
        }
        Ok(Self {
            name,
            score: score as u32,
            level: level as u32,
            device: device
                .as_deref()
                .map(DeviceCategory::parse)
                .unwrap_or(DeviceCategory::Unknown),
        })
    }
}

/// Player names are 1 to 10 characters.
pub fn validate_name(name: &str) -> Result<(), ValidationError> {
    let chars = name.chars().count();
    if chars == 0 || chars > NAME_MAX_CHARS {
        return Err(ValidationError::NameLength);
    }
    Ok(())
}

/// Time-prefixed base36 id: sortable by creation, random suffix against collisions.
pub fn generate_record_id<R: Rng + ?Sized>(now_ms: i64, rng: &mut R) -> String {
    const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    let mut prefix = Vec::new();
    let mut n = now_ms.max(0) as u64;
    loop {
        prefix.push(DIGITS[(n % 36) as usize]);
        n /= 36;
        if n == 0 {
            break;
        }
    }
    prefix.reverse();
    let mut id = String::from_utf8_lossy(&prefix).into_owned();
    for _ in 0..11 {
        id.push(DIGITS[rng.gen_range(0..36)] as char);
    }
    id
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn record(score: u32, level: u32, timestamp: i64) -> RankingRecord {
        RankingRecord {
            id: format!("{score}-{level}-{timestamp}"),
            name: "p".into(),
            score,
            level,
            timestamp,
            device: "Desktop".into(),
            date: calendar_day(timestamp),
        }
    }

    #[test]
    fn order_is_score_then_level_then_earliest() {
        let mut records = vec![
            record(50, 1, 1),
            record(80, 1, 2),
            record(80, 2, 3),
            record(80, 2, 0),
        ];
        records.sort_by(ranking_order);
        let keys: Vec<(u32, u32, i64)> = records
            .iter()
            .map(|r| (r.score, r.level, r.timestamp))
            .collect();
        assert_eq!(keys, vec![(80, 2, 0), (80, 2, 3), (80, 1, 2), (50, 1, 1)]);
    }

    #[test]
    fn validation_matches_server_contract() {
        assert!(Submission::new("kim", 0, 1, DeviceCategory::Mobile).is_ok());
        assert!(Submission::new("abcdefghij", 100_000, 1_000, DeviceCategory::Desktop).is_ok());
        assert_eq!(
            Submission::new("abcdefghijk", 10, 1, DeviceCategory::Desktop),
            Err(ValidationError::NameLength)
        );
        assert_eq!(
            Submission::new("kim", 100_001, 1, DeviceCategory::Desktop),
            Err(ValidationError::OutOfRange)
        );
        assert_eq!(
            Submission::from_parts(Some("kim".into()), Some(5), Some(0), None),
            Err(ValidationError::OutOfRange)
        );
        assert_eq!(
            Submission::from_parts(Some("kim".into()), Some(-1), Some(3), None),
            Err(ValidationError::OutOfRange)
        );
        assert_eq!(
            Submission::from_parts(None, Some(5), Some(3), None),
            Err(ValidationError::MissingFields)
        );
        assert_eq!(
            Submission::from_parts(Some(String::new()), Some(5), Some(3), None),
            Err(ValidationError::MissingFields)
        );
    }

    #[test]
    fn name_length_counts_characters_not_bytes() {
        assert!(validate_name("색상구분마스터링게임").is_ok());
        assert!(validate_name("").is_err());
    }

    #[test]
    fn device_labels() {
        let cases = [
            ("Mozilla/5.0 (iPhone) Mobile/15E148", DeviceCategory::Mobile),
            ("Mozilla/5.0 (Android; Tablet)", DeviceCategory::Tablet),
            ("Mozilla/5.0 (X11; Linux x86_64)", DeviceCategory::Desktop),
        ];
        for (agent, expected) in cases {
            assert_eq!(DeviceCategory::from_user_agent(agent), expected);
        }
        assert_eq!(DeviceCategory::parse("Toaster"), DeviceCategory::Unknown);
        let sub = Submission::from_parts(Some("a".into()), Some(1), Some(1), None).unwrap();
        assert_eq!(sub.device, DeviceCategory::Unknown);
    }

    #[test]
    fn fresh_entry_window() {
        let r = record(10, 1, 100_000);
        assert!(r.is_fresh_entry_of("p", 120_000));
        assert!(!r.is_fresh_entry_of("p", 130_000));
        assert!(!r.is_fresh_entry_of("q", 100_000));
    }

    #[test]
    fn ids_are_time_prefixed_and_unique() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let a = generate_record_id(1_700_000_000_000, &mut rng);
        let b = generate_record_id(1_700_000_000_000, &mut rng);
        assert_ne!(a, b);
        assert!(a.starts_with("loyw3v28"), "{a}");
        assert_eq!(a.len(), 8 + 11);
        assert!(a.chars().all(|c| c.is_ascii_digit() || c.is_ascii_lowercase()));
    }

    #[test]
    fn legacy_local_records_without_date_still_parse() {
        let json = r#"{"id":"x","name":"n","score":3,"level":1,"timestamp":5}"#;
        let rec: RankingRecord = serde_json::from_str(json).unwrap();
        assert_eq!(rec.device, "Unknown");
        assert_eq!(rec.date, "");
    }
}
