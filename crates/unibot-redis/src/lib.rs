//! Redis-backed session store.
//!
//! One key per user, `<prefix><user id>`, holding the JSON-encoded
//! conversation state. Every save rewrites the whole value and refreshes the
//! expiry.

use std::time::Duration;

use async_trait::async_trait;
use redis::{aio::ConnectionManager, AsyncCommands};
use tracing::{debug, info};
use unibot_core::{
    domain::UserId,
    state::{ConversationState, SessionStore},
    Error, Result,
};

pub struct RedisSessionStore {
    manager: ConnectionManager,
    prefix: String,
    ttl_secs: u64,
}

fn store_err(context: &str, e: redis::RedisError) -> Error {
    Error::Store(format!("{context}: {e}"))
}

fn ttl_secs(ttl: Duration) -> u64 {
    ttl.as_secs().max(1)
}

impl RedisSessionStore {
    /// Open a managed connection and check it with `PING`.
    pub async fn connect(url: &str, prefix: impl Into<String>, ttl: Duration) -> Result<Self> {
        let client = redis::Client::open(url)
            .map_err(|e| store_err("failed to open redis client", e))?;
        let manager = client
            .get_connection_manager()
            .await
            .map_err(|e| store_err("failed to connect to redis", e))?;
        let store = Self {
            manager,
            prefix: prefix.into(),
            ttl_secs: ttl_secs(ttl),
        };
        store.ping().await?;
        info!(prefix = %store.prefix, ttl_secs = store.ttl_secs, "connected to redis");
        Ok(store)
    }

    pub async fn ping(&self) -> Result<()> {
        let mut conn = self.manager.clone();
        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|e| store_err("redis ping failed", e))?;
        Ok(())
    }

    pub fn key(&self, user_id: UserId) -> String {
        key(&self.prefix, user_id)
    }
}

fn key(prefix: &str, user_id: UserId) -> String {
    format!("{prefix}{user_id}")
}

#[async_trait]
impl SessionStore for RedisSessionStore {
    async fn get_state(&self, user_id: UserId) -> Result<Option<ConversationState>> {
        let key = self.key(user_id);
        let mut conn = self.manager.clone();
        let raw: Option<String> = conn
            .get(&key)
            .await
            .map_err(|e| store_err(&format!("failed to read {key}"), e))?;
        match raw {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    async fn save_state(&self, user_id: UserId, state: &ConversationState) -> Result<()> {
        let key = self.key(user_id);
        let payload = serde_json::to_string(state)?;
        let mut conn = self.manager.clone();
        conn.set_ex::<_, _, ()>(&key, payload, self.ttl_secs)
            .await
            .map_err(|e| store_err(&format!("failed to write {key}"), e))?;
        debug!(%key, step = %state.step, "state saved");
        Ok(())
    }
}
