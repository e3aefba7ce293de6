use crate::prompt::{GenerationSpec, TargetFormat};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tokio::fs;

/// Script-so-far of a cancelled run, flat enough for any store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InterruptedSnapshot {
    pub script: String,
    pub tone: String,
    pub format: TargetFormat,
    pub duration: String,
    pub target_minutes: f64,
    pub saved_at: DateTime<Utc>,
}

impl InterruptedSnapshot {
    pub fn capture(spec: &GenerationSpec, script: impl Into<String>) -> Self {
        Self {
            script: script.into(),
            tone: spec.tone.clone(),
            format: spec.format,
            duration: spec.duration.clone(),
            target_minutes: spec.target_minutes(),
            saved_at: Utc::now(),
        }
    }
}

/// Where interrupted sessions are kept. The relay only produces snapshots;
/// callers decide whether and where to save them.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    async fn save(&self, snapshot: &InterruptedSnapshot) -> Result<()>;
    async fn load(&self) -> Result<Option<InterruptedSnapshot>>;
    async fn clear(&self) -> Result<()>;
}

pub struct JsonFileSnapshotStore {
    path: PathBuf,
}

impl JsonFileSnapshotStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl SnapshotStore for JsonFileSnapshotStore {
    async fn save(&self, snapshot: &InterruptedSnapshot) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .await
                    .with_context(|| format!("Failed to create dir {}", parent.display()))?;
            }
        }
        let body = serde_json::to_vec_pretty(snapshot)?;
        fs::write(&self.path, body)
            .await
            .with_context(|| format!("write snapshot: {}", self.path.display()))?;
        Ok(())
    }

    async fn load(&self) -> Result<Option<InterruptedSnapshot>> {
        let content = match fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(e).with_context(|| format!("read snapshot: {}", self.path.display()));
            }
        };
        let snapshot = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse snapshot {}", self.path.display()))?;
        Ok(Some(snapshot))
    }

    async fn clear(&self) -> Result<()> {
        match fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("remove snapshot: {}", self.path.display())),
        }
    }
}

#[derive(Default)]
pub struct MemorySnapshotStore {
    slot: Mutex<Option<InterruptedSnapshot>>,
}

#[async_trait]
impl SnapshotStore for MemorySnapshotStore {
    async fn save(&self, snapshot: &InterruptedSnapshot) -> Result<()> {
        *self.slot.lock().unwrap_or_else(|e| e.into_inner()) = Some(snapshot.clone());
        Ok(())
    }

    async fn load(&self) -> Result<Option<InterruptedSnapshot>> {
        Ok(self.slot.lock().unwrap_or_else(|e| e.into_inner()).clone())
    }

    async fn clear(&self) -> Result<()> {
        *self.slot.lock().unwrap_or_else(|e| e.into_inner()) = None;
        Ok(())
    }
}
