//! Audit record of a moderation action

use crate::events::{ActionKind, ActionOutcome};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};

/// Persisted audit entry, written when the audit subscriber processes an action
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModActionRecord {
    pub guild_id: u64,
    pub action_id: u64,
    pub action_kind: ActionKind,
    pub moderator_id: u64,
    pub user_id: Option<u64>,
    pub role_id: Option<u64>,
    /// base64 of the JSON-encoded reason text
    pub reason: String,
    pub message_id: Option<u64>,
    pub channel_id: Option<u64>,
    /// Records written before outcomes were stored read back as succeeded
    #[serde(default)]
    pub outcome: ActionOutcome,
}

impl ModActionRecord {
    /// Encode a reason for storage
    #[must_use]
    pub fn encode_reason(reason: &str) -> String {
        let json = serde_json::to_string(reason).unwrap_or_else(|_| format!("{reason:?}"));
        STANDARD.encode(json)
    }

    /// Decode the stored reason, if it is well-formed
    #[must_use]
    pub fn decoded_reason(&self) -> Option<String> {
        let bytes = STANDARD.decode(&self.reason).ok()?;
        serde_json::from_slice(&bytes).ok()
    }

    /// Replace the stored reason
    pub fn set_reason(&mut self, reason: &str) {
        self.reason = Self::encode_reason(reason);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> ModActionRecord {
        ModActionRecord {
            guild_id: 1,
            action_id: 3,
            action_kind: ActionKind::Ban,
            moderator_id: 10,
            user_id: Some(20),
            role_id: None,
            reason: ModActionRecord::encode_reason("raiding"),
            message_id: Some(30),
            channel_id: Some(40),
            outcome: ActionOutcome::Succeeded,
        }
    }

    #[test]
    fn test_reason_is_opaque() {
        let record = record();
        assert!(!record.reason.contains("raiding"));
        assert_eq!(record.decoded_reason().as_deref(), Some("raiding"));
    }

    #[test]
    fn test_set_reason() {
        let mut record = record();
        record.set_reason("line one\n\"quoted\"");
        assert_eq!(
            record.decoded_reason().as_deref(),
            Some("line one\n\"quoted\"")
        );
    }

    #[test]
    fn test_failed_outcome_survives_storage() {
        let mut record = record();
        record.outcome = ActionOutcome::Failed("Missing Permissions".to_string());
        let encoded = serde_json::to_vec(&record).unwrap();
        let decoded: ModActionRecord = serde_json::from_slice(&encoded).unwrap();
        assert!(decoded.outcome.is_failure());
        assert_eq!(decoded, record);
    }

    #[test]
    fn test_garbage_reason_decodes_to_none() {
        let mut record = record();
        record.reason = "%%%".to_string();
        assert!(record.decoded_reason().is_none());
    }

    #[test]
    fn test_unknown_kind_survives_storage() {
        let raw = r#"{"guild_id":1,"action_id":2,"action_kind":42,"moderator_id":3,
            "user_id":null,"role_id":null,"reason":"","message_id":null,"channel_id":null}"#;
        let record: ModActionRecord = serde_json::from_str(raw).unwrap();
        assert_eq!(record.action_kind, ActionKind::Unknown(42));
        assert_eq!(record.outcome, ActionOutcome::Succeeded);
        let encoded = serde_json::to_string(&record).unwrap();
        assert!(encoded.contains(r#""action_kind":42"#));
    }
}
