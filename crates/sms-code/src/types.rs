//! Message records and lookup types.

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Store-assigned record identifier.
pub type RecordId = i64;

/// An SMS as forwarded by the capture agent, before extraction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewMessage {
    /// Originating short code or number
    #[serde(rename = "from")]
    pub sender: String,

    #[serde(default)]
    pub contact_name: Option<String>,

    #[serde(default)]
    pub phone_area: Option<String>,

    /// Raw message text
    #[serde(rename = "sms")]
    pub body: String,

    /// Carrier slot descriptor, e.g. "SIM1(15012345678)"
    #[serde(rename = "sim_slot", default)]
    pub sim_slot_descriptor: Option<String>,

    #[serde(default)]
    pub sim_sub_id: Option<String>,

    #[serde(default)]
    pub device_name: Option<String>,

    /// Receive time reported by the device
    #[serde(deserialize_with = "deserialize_receive_time")]
    pub receive_time: DateTime<Utc>,
}

/// Naive layouts accepted after RFC 3339; read as UTC.
const NAIVE_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

/// Epoch values above this are milliseconds rather than seconds.
const EPOCH_MILLIS_THRESHOLD: f64 = 2e10;

#[derive(Deserialize)]
#[serde(untagged)]
enum RawTime {
    Text(String),
    Epoch(f64),
}

/// Parse a device-reported time.
///
/// Accepts RFC 3339, ISO 8601 without an offset (`T` or space separator,
/// taken as UTC), or a Unix epoch number in seconds or milliseconds.
pub fn parse_receive_time(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();
    if let Ok(time) = DateTime::parse_from_rfc3339(text) {
        return Some(time.with_timezone(&Utc));
    }
    NAIVE_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(text, format).ok())
        .map(|naive| naive.and_utc())
}

fn from_epoch(value: f64) -> Option<DateTime<Utc>> {
    if !value.is_finite() {
        return None;
    }
    let millis = if value.abs() > EPOCH_MILLIS_THRESHOLD {
        value
    } else {
        value * 1000.0
    };
    Utc.timestamp_millis_opt(millis.round() as i64).single()
}

fn deserialize_receive_time<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    match RawTime::deserialize(deserializer)? {
        RawTime::Text(text) => parse_receive_time(&text).ok_or_else(|| {
            serde::de::Error::custom(format!("invalid receive_time: {:?}", text))
        }),
        RawTime::Epoch(value) => from_epoch(value).ok_or_else(|| {
            serde::de::Error::custom(format!("receive_time out of range: {}", value))
        }),
    }
}

impl NewMessage {
    /// Create a message with only the required fields set.
    pub fn new(sender: impl Into<String>, body: impl Into<String>, receive_time: DateTime<Utc>) -> Self {
        Self {
            sender: sender.into(),
            contact_name: None,
            phone_area: None,
            body: body.into(),
            sim_slot_descriptor: None,
            sim_sub_id: None,
            device_name: None,
            receive_time,
        }
    }

    /// Set the carrier slot descriptor.
    pub fn with_sim_slot(mut self, sim_slot: impl Into<String>) -> Self {
        self.sim_slot_descriptor = Some(sim_slot.into());
        self
    }
}

/// A message ready for insertion: the raw fields plus the values extracted
/// from them at ingestion time.
#[derive(Debug, Clone)]
pub struct NewRecord {
    pub message: NewMessage,
    pub extracted_code: Option<String>,
    pub extracted_phone_number: Option<String>,
}

/// A persisted message. Never mutated after insertion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageRecord {
    pub id: RecordId,

    #[serde(rename = "from")]
    pub sender: String,

    pub contact_name: Option<String>,

    pub phone_area: Option<String>,

    #[serde(rename = "sms")]
    pub body: String,

    #[serde(rename = "sim_slot")]
    pub sim_slot_descriptor: Option<String>,

    pub sim_sub_id: Option<String>,

    pub device_name: Option<String>,

    pub receive_time: DateTime<Utc>,

    /// Verification code found in the body, if any
    pub extracted_code: Option<String>,

    /// Phone number found in the sim slot descriptor, if any
    #[serde(rename = "phone_number")]
    pub extracted_phone_number: Option<String>,
}

impl MessageRecord {
    /// Build the stored form of `record` under the given id.
    pub fn from_new(id: RecordId, record: NewRecord) -> Self {
        let NewRecord {
            message,
            extracted_code,
            extracted_phone_number,
        } = record;

        Self {
            id,
            sender: message.sender,
            contact_name: message.contact_name,
            phone_area: message.phone_area,
            body: message.body,
            sim_slot_descriptor: message.sim_slot_descriptor,
            sim_sub_id: message.sim_sub_id,
            device_name: message.device_name,
            receive_time: message.receive_time,
            extracted_code,
            extracted_phone_number,
        }
    }

    /// First `max_chars` characters of the body.
    pub fn excerpt(&self, max_chars: usize) -> String {
        self.body.chars().take(max_chars).collect()
    }
}

/// Filters for [`RecordStore::query`](crate::RecordStore::query).
///
/// Results are ordered newest first by `receive_time`, ties broken by
/// descending id. Substring filters are case-sensitive.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordQuery {
    /// Inclusive lower bound on `receive_time`
    pub received_after: Option<DateTime<Utc>>,
    /// Inclusive upper bound on `receive_time`
    pub received_before: Option<DateTime<Utc>>,
    /// Exact match on `extracted_phone_number`
    pub phone_number_eq: Option<String>,
    /// Substring of `sim_slot_descriptor`
    pub sim_slot_contains: Option<String>,
    /// Substring of `body`
    pub body_contains: Option<String>,
    pub limit: Option<usize>,
}

impl RecordQuery {
    /// Check a record against every filter except `limit`.
    pub fn matches(&self, record: &MessageRecord) -> bool {
        if let Some(after) = self.received_after {
            if record.receive_time < after {
                return false;
            }
        }
        if let Some(before) = self.received_before {
            if record.receive_time > before {
                return false;
            }
        }
        if let Some(phone) = &self.phone_number_eq {
            if record.extracted_phone_number.as_deref() != Some(phone.as_str()) {
                return false;
            }
        }
        if let Some(needle) = &self.sim_slot_contains {
            match &record.sim_slot_descriptor {
                Some(slot) if slot.contains(needle.as_str()) => {}
                _ => return false,
            }
        }
        if let Some(needle) = &self.body_contains {
            if !record.body.contains(needle.as_str()) {
                return false;
            }
        }
        true
    }
}

/// Which candidate query produced a resolved code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchSet {
    /// Extracted phone number matched exactly
    Primary,
    /// Sim slot descriptor contained the phone number
    Secondary,
}

/// A code found by the resolver together with its source record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub code: String,
    pub record: MessageRecord,
    pub match_set: MatchSet,
}

/// Terminal state of a bounded wait.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LookupOutcome {
    Found(Resolution),
    TimedOut,
}

impl LookupOutcome {
    pub fn is_found(&self) -> bool {
        matches!(self, LookupOutcome::Found(_))
    }

    /// The resolved code, if any.
    pub fn code(&self) -> Option<&str> {
        match self {
            LookupOutcome::Found(resolution) => Some(&resolution.code),
            LookupOutcome::TimedOut => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn message_at(receive_time: serde_json::Value) -> Result<NewMessage, serde_json::Error> {
        serde_json::from_value(json!({
            "from": "10086",
            "sms": "code 123456",
            "receive_time": receive_time,
        }))
    }

    fn expected() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2023, 3, 15, 14, 30, 0).unwrap()
    }

    #[test]
    fn test_receive_time_with_offset() {
        assert_eq!(message_at(json!("2023-03-15T14:30:00Z")).unwrap().receive_time, expected());
        assert_eq!(
            message_at(json!("2023-03-15T22:30:00+08:00")).unwrap().receive_time,
            expected()
        );
    }

    #[test]
    fn test_naive_receive_time_is_utc() {
        assert_eq!(message_at(json!("2023-03-15T14:30:00")).unwrap().receive_time, expected());
        assert_eq!(message_at(json!("2023-03-15 14:30:00")).unwrap().receive_time, expected());
        assert_eq!(
            message_at(json!("2023-03-15 14:30:00.250")).unwrap().receive_time,
            expected() + chrono::Duration::milliseconds(250)
        );
    }

    #[test]
    fn test_epoch_receive_time() {
        let seconds = expected().timestamp();
        assert_eq!(message_at(json!(seconds)).unwrap().receive_time, expected());
        assert_eq!(message_at(json!(seconds * 1000)).unwrap().receive_time, expected());
    }

    #[test]
    fn test_unparseable_receive_time() {
        assert!(message_at(json!("yesterday")).is_err());
        assert!(message_at(json!("2023-03-15")).is_err());
        assert!(message_at(json!(null)).is_err());
    }
}
