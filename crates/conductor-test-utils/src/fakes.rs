//! Recording fakes for the collaborators the engine supplies.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use conductor_core::{CoreError, Definition, DefinitionRepository, WorkflowLoader, WorkflowRegistry};

/// Loader and registry that records every definition handed to it
#[derive(Debug, Default)]
pub struct RecordingWorkflowLoader {
    loaded: Mutex<Vec<(String, i32)>>,
    deregistered: Mutex<Vec<(String, i32)>>,
    failing: Mutex<HashSet<String>>,
}

impl RecordingWorkflowLoader {
    /// Empty loader
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject any later load of `definition_id`
    pub fn fail_for(&self, definition_id: &str) {
        self.failing.lock().insert(definition_id.to_string());
    }

    /// `(id, version)` pairs loaded so far, in order
    pub fn loaded(&self) -> Vec<(String, i32)> {
        self.loaded.lock().clone()
    }

    /// `(id, version)` pairs deregistered so far, in order
    pub fn deregistered(&self) -> Vec<(String, i32)> {
        self.deregistered.lock().clone()
    }

    /// Number of successful loads
    pub fn load_count(&self) -> usize {
        self.loaded.lock().len()
    }

    /// Wait until at least `count` loads have happened. Returns false on timeout.
    pub async fn wait_for_loads(&self, count: usize, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if self.load_count() >= count {
                return true;
            }
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}

impl WorkflowLoader for RecordingWorkflowLoader {
    fn load_definition(&self, definition: &Definition) -> Result<(), CoreError> {
        if self.failing.lock().contains(&definition.id) {
            return Err(CoreError::ValidationError(format!(
                "Loader rejected {}",
                definition.key()
            )));
        }
        self.loaded
            .lock()
            .push((definition.id.clone(), definition.version));
        Ok(())
    }
}

impl WorkflowRegistry for RecordingWorkflowLoader {
    fn is_registered(&self, id: &str, version: i32) -> bool {
        let deregistered = self.deregistered.lock();
        let loads = self
            .loaded
            .lock()
            .iter()
            .filter(|(i, v)| i == id && *v == version)
            .count();
        let removals = deregistered
            .iter()
            .filter(|(i, v)| i == id && *v == version)
            .count();
        loads > removals
    }

    fn deregister_workflow(&self, id: &str, version: i32) -> bool {
        if !self.is_registered(id, version) {
            return false;
        }
        self.deregistered.lock().push((id.to_string(), version));
        true
    }
}

/// Definition repository wrapper that counts lookups and can be switched off
pub struct CountingDefinitionRepository {
    inner: Arc<dyn DefinitionRepository>,
    find_calls: AtomicUsize,
    unavailable: AtomicBool,
}

impl CountingDefinitionRepository {
    /// Wrap `inner`
    pub fn new(inner: Arc<dyn DefinitionRepository>) -> Self {
        Self {
            inner,
            find_calls: AtomicUsize::new(0),
            unavailable: AtomicBool::new(false),
        }
    }

    /// Calls to `find(id, version)` so far
    pub fn find_calls(&self) -> usize {
        self.find_calls.load(Ordering::SeqCst)
    }

    /// Make every call fail with `StateStoreError`
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), CoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(CoreError::StateStoreError(
                "Definition store unavailable".to_string(),
            ))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl DefinitionRepository for CountingDefinitionRepository {
    async fn find_latest(&self, id: &str) -> Result<Option<Definition>, CoreError> {
        self.check()?;
        self.inner.find_latest(id).await
    }

    async fn find(&self, id: &str, version: i32) -> Result<Option<Definition>, CoreError> {
        self.find_calls.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        self.inner.find(id, version).await
    }

    async fn get_latest_version(&self, id: &str) -> Result<Option<i32>, CoreError> {
        self.check()?;
        self.inner.get_latest_version(id).await
    }

    async fn get_all(&self) -> Result<Vec<Definition>, CoreError> {
        self.check()?;
        self.inner.get_all().await
    }

    async fn save(&self, definition: &Definition) -> Result<(), CoreError> {
        self.check()?;
        self.inner.save(definition).await
    }

    async fn delete(&self, id: &str) -> Result<(), CoreError> {
        self.check()?;
        self.inner.delete(id).await
    }
}
