//! Background compiles started by `/thread`

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use devins_compiler::{CapabilityResult, CompiledResult, SpawnRequest, TaskSpawner};

use crate::error::{Error, Result};

/// Bookkeeping for one background compile
#[derive(Debug, Clone)]
pub struct ThreadInfo {
    /// Task identifier returned to the document
    pub id: String,

    /// Instruction file being compiled
    pub name: String,

    /// Depth the compile started at
    pub depth: usize,

    /// When the task was started
    pub started_at: chrono::DateTime<chrono::Utc>,
}

struct ThreadEntry {
    info: ThreadInfo,
    handle: JoinHandle<CompiledResult>,
}

/// Runs `/thread` compiles on the tokio runtime and keeps their handles
#[derive(Clone, Default)]
pub struct ThreadManager {
    threads: Arc<Mutex<HashMap<String, ThreadEntry>>>,
}

impl ThreadManager {
    /// Create a manager with no tasks
    pub fn new() -> Self {
        Self::default()
    }

    /// Info for every task not yet joined, oldest first
    pub async fn list(&self) -> Vec<ThreadInfo> {
        let mut infos: Vec<ThreadInfo> = self
            .threads
            .lock()
            .await
            .values()
            .map(|entry| entry.info.clone())
            .collect();
        infos.sort_by_key(|info| info.started_at);
        infos
    }

    /// Wait for task `id` and take its result
    pub async fn join(&self, id: &str) -> Result<CompiledResult> {
        let entry = self
            .threads
            .lock()
            .await
            .remove(id)
            .ok_or_else(|| anyhow::anyhow!("no background task with id '{id}'"))?;
        entry
            .handle
            .await
            .map_err(|e| Error::msg(format!("background task '{id}' failed: {e}")))
    }

    /// Wait for every task, returning `(id, result)` pairs
    pub async fn wait_all(&self) -> Vec<(String, Result<CompiledResult>)> {
        let entries: Vec<(String, ThreadEntry)> = self.threads.lock().await.drain().collect();
        let mut results = Vec::with_capacity(entries.len());
        for (id, entry) in entries {
            let result = entry
                .handle
                .await
                .map_err(|e| Error::msg(format!("background task '{id}' failed: {e}")));
            results.push((id, result));
        }
        results
    }
}

#[async_trait]
impl TaskSpawner for ThreadManager {
    async fn spawn(&self, request: SpawnRequest) -> CapabilityResult<String> {
        let id = uuid::Uuid::new_v4().to_string();
        let info = ThreadInfo {
            id: id.clone(),
            name: request.name.clone(),
            depth: request.depth,
            started_at: chrono::Utc::now(),
        };
        tracing::info!(id = %id, name = %request.name, depth = request.depth, "starting background compile");

        let SpawnRequest {
            source,
            compiler,
            options,
            variables,
            depth,
            cancel,
            ..
        } = request;
        let handle = tokio::spawn(async move {
            compiler
                .compile_at(&source, options, variables, depth, cancel)
                .await
        });

        self.threads
            .lock()
            .await
            .insert(id.clone(), ThreadEntry { info, handle });
        Ok(id)
    }
}
