//! Synchronized database: cross-round accumulator shared by behaviours
//!
//! Round behaviours read what earlier rounds wrote (pulled memes,
//! collected feedback, tx hashes, selected keeper) within and across
//! periods. The engine never reads it to route; it only hands the handle
//! to the behaviour of the round currently running.

use lockstep_types::{LockstepError, LockstepResult};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Debug, Default)]
struct DbInner {
    data: BTreeMap<String, Value>,
    version: u64,
}

/// Shared key-value store of JSON values
#[derive(Clone, Debug, Default)]
pub struct SynchronizedDb {
    inner: Arc<RwLock<DbInner>>,
}

impl SynchronizedDb {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a database from initial values
    pub fn with_data(data: impl IntoIterator<Item = (String, Value)>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(DbInner {
                data: data.into_iter().collect(),
                version: 0,
            })),
        }
    }

    pub async fn read(&self, key: &str) -> Option<Value> {
        self.inner.read().await.data.get(key).cloned()
    }

    /// Read a value and decode it into `T`
    pub async fn read_as<T: DeserializeOwned>(&self, key: &str) -> LockstepResult<Option<T>> {
        match self.read(key).await {
            Some(value) => serde_json::from_value(value)
                .map(Some)
                .map_err(|e| LockstepError::Database(format!("{}: {}", key, e))),
            None => Ok(None),
        }
    }

    pub async fn write<T: Serialize>(&self, key: impl Into<String>, value: T) -> LockstepResult<()> {
        let key = key.into();
        let value = to_value(&key, value)?;
        let mut inner = self.inner.write().await;
        inner.data.insert(key, value);
        inner.version += 1;
        Ok(())
    }

    /// Write several keys at once, as a single version bump
    pub async fn update(&self, values: Map<String, Value>) {
        if values.is_empty() {
            return;
        }
        let mut inner = self.inner.write().await;
        inner.data.extend(values);
        inner.version += 1;
    }

    /// Append to the list stored at `key`, creating it if absent.
    ///
    /// Returns the new list length.
    pub async fn append<T: Serialize>(&self, key: impl Into<String>, value: T) -> LockstepResult<usize> {
        let key = key.into();
        let value = to_value(&key, value)?;
        let mut inner = self.inner.write().await;

        let len = match inner.data.entry(key.clone()).or_insert_with(|| Value::Array(Vec::new())) {
            Value::Array(items) => {
                items.push(value);
                items.len()
            }
            other => {
                return Err(LockstepError::Database(format!(
                    "{} holds {} and cannot be appended to",
                    key,
                    json_kind(other)
                )))
            }
        };
        inner.version += 1;
        Ok(len)
    }

    pub async fn contains(&self, key: &str) -> bool {
        self.inner.read().await.data.contains_key(key)
    }

    pub async fn keys(&self) -> Vec<String> {
        self.inner.read().await.data.keys().cloned().collect()
    }

    /// A copy of every value, as a JSON object
    pub async fn snapshot(&self) -> Value {
        let inner = self.inner.read().await;
        Value::Object(inner.data.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
    }

    /// Monotonic write counter
    pub async fn version(&self) -> u64 {
        self.inner.read().await.version
    }
}

fn to_value<T: Serialize>(key: &str, value: T) -> LockstepResult<Value> {
    serde_json::to_value(value).map_err(|e| LockstepError::Database(format!("{}: {}", key, e)))
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_write_and_read() {
        let db = SynchronizedDb::new();
        db.write("final_tx_hash", "0xabc").await.unwrap();

        assert_eq!(db.read("final_tx_hash").await, Some(json!("0xabc")));
        let hash: Option<String> = db.read_as("final_tx_hash").await.unwrap();
        assert_eq!(hash.as_deref(), Some("0xabc"));
        assert!(db.read("missing").await.is_none());
        assert_eq!(db.version().await, 1);
    }

    #[tokio::test]
    async fn test_read_as_wrong_type() {
        let db = SynchronizedDb::new();
        db.write("period_count", "seven").await.unwrap();
        assert!(matches!(
            db.read_as::<u64>("period_count").await,
            Err(LockstepError::Database(_))
        ));
    }

    #[tokio::test]
    async fn test_append_accumulates() {
        let db = SynchronizedDb::new();
        assert_eq!(db.append("tweets", json!({"id": 1})).await.unwrap(), 1);
        assert_eq!(db.append("tweets", json!({"id": 2})).await.unwrap(), 2);
        assert_eq!(
            db.read("tweets").await,
            Some(json!([{"id": 1}, {"id": 2}]))
        );

        db.write("keeper", "agent-0").await.unwrap();
        assert!(matches!(
            db.append("keeper", "agent-1").await,
            Err(LockstepError::Database(_))
        ));
    }

    #[tokio::test]
    async fn test_update_is_one_version() {
        let db = SynchronizedDb::new();
        let mut values = Map::new();
        values.insert("a".into(), json!(1));
        values.insert("b".into(), json!(2));
        db.update(values).await;

        assert_eq!(db.version().await, 1);
        assert_eq!(db.keys().await, vec!["a".to_string(), "b".to_string()]);
        assert!(db.contains("b").await);
        assert_eq!(db.snapshot().await, json!({"a": 1, "b": 2}));
    }

    #[tokio::test]
    async fn test_clones_share_state() {
        let db = SynchronizedDb::with_data([("seed".to_string(), json!(true))]);
        let other = db.clone();
        other.write("x", 1).await.unwrap();
        assert!(db.contains("x").await);
        assert!(db.contains("seed").await);
    }
}
