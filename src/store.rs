//! Key-value persistence for sessions.

use crate::core::error::ShuperError;
use crate::session::Session;
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use std::time::Duration;
use tokio::task::JoinHandle;

const SESSIONS_KEY: &str = "shuper_sessions";
pub const DEFAULT_FLUSH_DELAY: Duration = Duration::from_millis(500);

#[async_trait]
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Option<Value>;

    /// Stores a value. Durable writes may be deferred until [`flush`](Self::flush).
    fn set(&self, key: &str, value: Value);

    async fn flush(&self) -> Result<(), ShuperError>;
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    values: RwLock<HashMap<String, Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Option<Value> {
        let values = self.values.read().unwrap_or_else(|e| e.into_inner());
        values.get(key).cloned()
    }

    fn set(&self, key: &str, value: Value) {
        let mut values = self.values.write().unwrap_or_else(|e| e.into_inner());
        values.insert(key.to_string(), value);
    }

    async fn flush(&self) -> Result<(), ShuperError> {
        Ok(())
    }
}

struct FileInner {
    path: PathBuf,
    values: Mutex<Map<String, Value>>,
    pending: Mutex<Option<JoinHandle<()>>>,
}

impl FileInner {
    fn values(&self) -> MutexGuard<'_, Map<String, Value>> {
        self.values.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> Result<(), ShuperError> {
        let json = serde_json::to_string_pretty(&Value::Object(self.values().clone()))?;
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(&self.path, json)?;
        Ok(())
    }
}

/// JSON-file store. Each `set` restarts a short timer and the file is
/// rewritten once writes go quiet.
#[derive(Clone)]
pub struct FileStore {
    inner: Arc<FileInner>,
    delay: Duration,
}

impl FileStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, ShuperError> {
        Self::with_delay(path, DEFAULT_FLUSH_DELAY)
    }

    pub fn with_delay(path: impl AsRef<Path>, delay: Duration) -> Result<Self, ShuperError> {
        let path = path.as_ref().to_path_buf();
        let values = if path.exists() {
            let contents = std::fs::read_to_string(&path)?;
            if contents.trim().is_empty() {
                Map::new()
            } else {
                match serde_json::from_str::<Value>(&contents)? {
                    Value::Object(map) => map,
                    _ => {
                        return Err(ShuperError::Storage(format!(
                            "{} does not hold a JSON object",
                            path.display()
                        )));
                    }
                }
            }
        } else {
            Map::new()
        };

        Ok(Self {
            inner: Arc::new(FileInner {
                path,
                values: Mutex::new(values),
                pending: Mutex::new(None),
            }),
            delay,
        })
    }

    fn schedule_flush(&self) {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            if let Err(e) = self.inner.write() {
                tracing::warn!("Failed to persist {}: {}", self.inner.path.display(), e);
            }
            return;
        };

        let inner = Arc::clone(&self.inner);
        let delay = self.delay;
        let task = handle.spawn(async move {
            tokio::time::sleep(delay).await;
            if let Err(e) = inner.write() {
                tracing::warn!("Failed to persist {}: {}", inner.path.display(), e);
            }
        });

        let mut pending = self.inner.pending.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(previous) = pending.replace(task) {
            previous.abort();
        }
    }
}

#[async_trait]
impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Option<Value> {
        self.inner.values().get(key).cloned()
    }

    fn set(&self, key: &str, value: Value) {
        self.inner.values().insert(key.to_string(), value);
        self.schedule_flush();
    }

    async fn flush(&self) -> Result<(), ShuperError> {
        let pending = self
            .inner
            .pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(task) = pending {
            task.abort();
        }
        self.inner.write()
    }
}

/// Typed view over a [`KeyValueStore`] holding sessions by id.
pub struct SessionStore {
    kv: Arc<dyn KeyValueStore>,
}

impl SessionStore {
    pub fn new(kv: Arc<dyn KeyValueStore>) -> Self {
        Self { kv }
    }

    fn all(&self) -> Map<String, Value> {
        match self.kv.get(SESSIONS_KEY) {
            Some(Value::Object(map)) => map,
            _ => Map::new(),
        }
    }

    pub fn load(&self, id: &str) -> Option<Session> {
        let value = self.all().remove(id)?;
        match serde_json::from_value(value) {
            Ok(session) => Some(session),
            Err(e) => {
                tracing::warn!("Discarding unreadable session {}: {}", id, e);
                None
            }
        }
    }

    /// Sessions ordered by most recent activity.
    pub fn list(&self) -> Vec<Session> {
        let mut sessions: Vec<Session> = self
            .all()
            .into_iter()
            .filter_map(|(_, v)| serde_json::from_value(v).ok())
            .collect();
        sessions.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        sessions
    }

    pub fn save(&self, session: &Session) -> Result<(), ShuperError> {
        let mut all = self.all();
        all.insert(session.id.clone(), serde_json::to_value(session)?);
        self.kv.set(SESSIONS_KEY, Value::Object(all));
        Ok(())
    }

    pub fn remove(&self, id: &str) -> bool {
        let mut all = self.all();
        let removed = all.remove(id).is_some();
        if removed {
            self.kv.set(SESSIONS_KEY, Value::Object(all));
        }
        removed
    }

    pub async fn flush(&self) -> Result<(), ShuperError> {
        self.kv.flush().await
    }
}
