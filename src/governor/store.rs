//! Persisted rate-limit state
//!
//! The governor's counter is the only durable shared mutable resource in
//! the engine. State lives behind a narrow async store trait so tests and
//! degraded operation can swap in an in-memory store.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::sync::RwLock;

use crate::error::{Error, Result};

/// Shared rate limiter + circuit breaker state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitState {
    /// Unix seconds at which the current rolling window opened
    pub window_start: i64,
    /// Calls reserved inside the current window
    pub call_count: u32,
    /// Whether the circuit breaker is tripped
    pub circuit_breaker_active: bool,
    /// Unix seconds until which the breaker rejects unconditionally
    pub circuit_breaker_until: i64,
}

impl RateLimitState {
    pub fn fresh(now: i64) -> Self {
        Self {
            window_start: now,
            call_count: 0,
            circuit_breaker_active: false,
            circuit_breaker_until: 0,
        }
    }
}

/// One usage telemetry sample, appended after each governor decision
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageRecord {
    pub at: chrono::DateTime<chrono::Utc>,
    pub allowed: bool,
    pub reason: Option<String>,
    pub call_count: u32,
    pub degraded: bool,
}

/// Durable store for rate-limit state and usage telemetry
#[async_trait]
pub trait RateLimitStore: Send + Sync {
    async fn load(&self) -> Result<Option<RateLimitState>>;
    async fn save(&self, state: &RateLimitState) -> Result<()>;
    /// Append a telemetry sample. Callers must treat failures as
    /// non-fatal; this is never on the critical path.
    async fn append_usage(&self, record: &UsageRecord) -> Result<()>;
}

/// JSON-file-backed store
pub struct FileStateStore {
    state_path: PathBuf,
    usage_path: Option<PathBuf>,
}

impl FileStateStore {
    pub fn new(state_path: impl Into<PathBuf>, usage_path: Option<PathBuf>) -> Self {
        Self {
            state_path: state_path.into(),
            usage_path,
        }
    }
}

#[async_trait]
impl RateLimitStore for FileStateStore {
    async fn load(&self) -> Result<Option<RateLimitState>> {
        if !self.state_path.exists() {
            return Ok(None);
        }

        let data = tokio::fs::read_to_string(&self.state_path)
            .await
            .map_err(|e| Error::Io(e.to_string()))?;

        let state: RateLimitState =
            serde_json::from_str(&data).map_err(|e| Error::Deserialization(e.to_string()))?;

        Ok(Some(state))
    }

    async fn save(&self, state: &RateLimitState) -> Result<()> {
        let data = serde_json::to_string_pretty(state)
            .map_err(|e| Error::Serialization(e.to_string()))?;

        tokio::fs::write(&self.state_path, data)
            .await
            .map_err(|e| Error::Io(e.to_string()))?;

        Ok(())
    }

    async fn append_usage(&self, record: &UsageRecord) -> Result<()> {
        let Some(path) = &self.usage_path else {
            return Ok(());
        };

        let mut line =
            serde_json::to_string(record).map_err(|e| Error::Serialization(e.to_string()))?;
        line.push('\n');

        use tokio::io::AsyncWriteExt;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await
            .map_err(|e| Error::Io(e.to_string()))?;

        file.write_all(line.as_bytes())
            .await
            .map_err(|e| Error::Io(e.to_string()))?;

        Ok(())
    }
}

/// In-memory store, used directly in tests and as the explicit degraded
/// fallback when the durable store is unreachable.
#[derive(Default)]
pub struct MemoryStateStore {
    state: RwLock<Option<RateLimitState>>,
    usage: RwLock<Vec<UsageRecord>>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-seed state, for tests
    pub async fn seed(&self, state: RateLimitState) {
        *self.state.write().await = Some(state);
    }

    pub async fn usage_records(&self) -> Vec<UsageRecord> {
        self.usage.read().await.clone()
    }
}

#[async_trait]
impl RateLimitStore for MemoryStateStore {
    async fn load(&self) -> Result<Option<RateLimitState>> {
        Ok(self.state.read().await.clone())
    }

    async fn save(&self, state: &RateLimitState) -> Result<()> {
        *self.state.write().await = Some(state.clone());
        Ok(())
    }

    async fn append_usage(&self, record: &UsageRecord) -> Result<()> {
        self.usage.write().await.push(record.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_file_store_roundtrip() {
        let dir = tempdir().unwrap();
        let store = FileStateStore::new(dir.path().join("governor.json"), None);

        assert!(store.load().await.unwrap().is_none());

        let state = RateLimitState {
            window_start: 1_700_000_000,
            call_count: 17,
            circuit_breaker_active: true,
            circuit_breaker_until: 1_700_000_300,
        };
        store.save(&state).await.unwrap();

        let loaded = store.load().await.unwrap().unwrap();
        assert_eq!(loaded.call_count, 17);
        assert!(loaded.circuit_breaker_active);
        assert_eq!(loaded.circuit_breaker_until, 1_700_000_300);
    }

    #[tokio::test]
    async fn test_file_store_appends_usage_lines() {
        let dir = tempdir().unwrap();
        let usage_path = dir.path().join("usage.jsonl");
        let store = FileStateStore::new(dir.path().join("governor.json"), Some(usage_path.clone()));

        for i in 0..3 {
            store
                .append_usage(&UsageRecord {
                    at: chrono::Utc::now(),
                    allowed: true,
                    reason: None,
                    call_count: i,
                    degraded: false,
                })
                .await
                .unwrap();
        }

        let contents = tokio::fs::read_to_string(&usage_path).await.unwrap();
        assert_eq!(contents.lines().count(), 3);
    }
}
