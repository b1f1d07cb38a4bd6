//! Per-user conversation state and the session-store port.
//!
//! The state is a step tag plus a free-form string bag. Whichever handler owns
//! the current step mutates it in place; the dispatcher persists it once per
//! event as a full overwrite.

use std::{
    collections::HashMap,
    sync::Mutex,
    time::{Duration, Instant},
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{domain::UserId, errors::Error, Result};

pub mod steps {
    pub const IDLE: &str = "";
    pub const COMPLETED: &str = "completed";

    pub const FIRST_NAME: &str = "first_name";
    pub const LAST_NAME: &str = "last_name";
    pub const AGE: &str = "age";
    pub const GENDER: &str = "gender";
    pub const EMAIL: &str = "email";
    pub const EMAIL_VERIFICATION: &str = "email_verification";

    pub const TICKET_REPLY: &str = "ticket_reply";
    pub const TICKET_USER_REPLY: &str = "ticket_user_reply";
    pub const DOC_RESPONSE: &str = "doc_response";
    pub const SEND_NEWS: &str = "send_news";
    pub const MOODLE_TOKEN: &str = "moodle_token";
    pub const REMINDER_CREATE: &str = "reminder_create";
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConversationState {
    #[serde(default)]
    pub last_command: String,
    pub last_updated: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub step: String,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub data: HashMap<String, String>,
}

impl ConversationState {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            last_command: String::new(),
            last_updated: now,
            step: String::new(),
            data: HashMap::new(),
        }
    }

    /// `""` and `"completed"` both mean no flow owns the next message.
    pub fn is_idle(&self) -> bool {
        self.step == steps::IDLE || self.step == steps::COMPLETED
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.data.get(key).map(String::as_str)
    }

    pub fn set(&mut self, key: &str, value: impl Into<String>) {
        self.data.insert(key.to_string(), value.into());
    }

    /// Enter a flow step, keeping whatever the bag already holds.
    pub fn enter(&mut self, step: &str) {
        self.step = step.to_string();
    }

    /// Leave any flow: step back to idle and an empty bag.
    pub fn reset(&mut self) {
        self.step.clear();
        self.data.clear();
    }
}

/// Externally persisted per-user state. Expiry belongs to the store.
///
/// There is no concurrency token: two overlapping read-modify-write cycles for
/// the same user end with the later save winning. Callers serialize per user.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn get_state(&self, user_id: UserId) -> Result<Option<ConversationState>>;
    async fn save_state(&self, user_id: UserId, state: &ConversationState) -> Result<()>;
}

struct StoredRecord {
    payload: String,
    expires_at: Instant,
}

/// Process-local store with the same key layout and JSON encoding as the
/// Redis adapter. Used when no Redis URL is configured, and by tests.
pub struct InMemorySessionStore {
    prefix: String,
    ttl: Duration,
    records: Mutex<HashMap<String, StoredRecord>>,
}

impl InMemorySessionStore {
    pub fn new(prefix: impl Into<String>, ttl: Duration) -> Self {
        Self {
            prefix: prefix.into(),
            ttl,
            records: Mutex::new(HashMap::new()),
        }
    }

    pub fn key(&self, user_id: UserId) -> String {
        format!("{}{}", self.prefix, user_id)
    }

    /// Raw stored payload, for inspecting the wire format.
    pub fn raw(&self, user_id: UserId) -> Option<String> {
        let key = self.key(user_id);
        let records = self.records.lock().ok()?;
        records
            .get(&key)
            .filter(|r| r.expires_at > Instant::now())
            .map(|r| r.payload.clone())
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn get_state(&self, user_id: UserId) -> Result<Option<ConversationState>> {
        let key = self.key(user_id);
        let payload = {
            let mut records = self
                .records
                .lock()
                .map_err(|_| Error::Store("session map poisoned".to_string()))?;
            match records.get(&key) {
                Some(r) if r.expires_at > Instant::now() => r.payload.clone(),
                Some(_) => {
                    records.remove(&key);
                    return Ok(None);
                }
                None => return Ok(None),
            }
        };
        Ok(Some(serde_json::from_str(&payload)?))
    }

    async fn save_state(&self, user_id: UserId, state: &ConversationState) -> Result<()> {
        let payload = serde_json::to_string(state)?;
        let key = self.key(user_id);
        let mut records = self
            .records
            .lock()
            .map_err(|_| Error::Store("session map poisoned".to_string()))?;
        records.insert(
            key,
            StoredRecord {
                payload,
                expires_at: Instant::now() + self.ttl,
            },
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> InMemorySessionStore {
        InMemorySessionStore::new("unibot:user:", Duration::from_secs(3600))
    }

    #[tokio::test]
    async fn absent_user_reads_none() {
        assert!(store().get_state(UserId(1)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn save_then_get_returns_same_state() {
        let s = store();
        let mut state = ConversationState::new(Utc::now());
        state.enter(steps::AGE);
        state.set("first_name", "Ann");

        s.save_state(UserId(7), &state).await.unwrap();
        assert_eq!(s.get_state(UserId(7)).await.unwrap(), Some(state));
    }

    #[tokio::test]
    async fn later_save_wins() {
        let s = store();
        let mut first = ConversationState::new(Utc::now());
        first.enter(steps::EMAIL);
        let mut second = first.clone();
        second.enter(steps::GENDER);

        s.save_state(UserId(3), &first).await.unwrap();
        s.save_state(UserId(3), &second).await.unwrap();

        let got = s.get_state(UserId(3)).await.unwrap().unwrap();
        assert_eq!(got.step, steps::GENDER);
    }

    #[tokio::test]
    async fn expired_record_reads_absent() {
        let s = InMemorySessionStore::new("p:", Duration::ZERO);
        s.save_state(UserId(1), &ConversationState::new(Utc::now()))
            .await
            .unwrap();
        assert!(s.get_state(UserId(1)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn idle_record_omits_step_and_data() {
        let s = store();
        s.save_state(UserId(9), &ConversationState::new(Utc::now()))
            .await
            .unwrap();
        let raw = s.raw(UserId(9)).unwrap();
        assert!(raw.contains("\"last_command\""));
        assert!(!raw.contains("\"step\""));
        assert!(!raw.contains("\"data\""));
        assert_eq!(s.key(UserId(9)), "unibot:user:9");
    }

    #[test]
    fn missing_data_defaults_to_empty_bag() {
        let state: ConversationState = serde_json::from_str(
            r#"{"last_command":"/register","last_updated":"2024-01-01T00:00:00Z","step":"age"}"#,
        )
        .unwrap();
        assert_eq!(state.step, "age");
        assert!(state.data.is_empty());
    }

    #[test]
    fn completed_counts_as_idle() {
        let mut state = ConversationState::new(Utc::now());
        assert!(state.is_idle());
        state.enter(steps::COMPLETED);
        assert!(state.is_idle());
        state.enter(steps::SEND_NEWS);
        assert!(!state.is_idle());
    }
}
