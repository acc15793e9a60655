//! Hub-side view of the target list
//!
//! Wraps the storage backend with the validation rules for creating targets
//! and derives the [`TargetSet`] that agents are synchronised to.

use std::fmt;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::info;

use crate::storage::{StorageBackend, StorageError};
use crate::targets::{NewTarget, Target, TargetError, TargetSet, validate_new_target};

#[derive(Debug)]
pub enum RegistryError {
    /// The request was rejected by validation
    Rejected(TargetError),

    Storage(StorageError),
}

impl fmt::Display for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegistryError::Rejected(err) => write!(f, "{}", err),
            RegistryError::Storage(err) => write!(f, "{}", err),
        }
    }
}

impl std::error::Error for RegistryError {}

impl From<StorageError> for RegistryError {
    fn from(err: StorageError) -> Self {
        RegistryError::Storage(err)
    }
}

impl From<TargetError> for RegistryError {
    fn from(err: TargetError) -> Self {
        RegistryError::Rejected(err)
    }
}

#[derive(Clone)]
pub struct TargetRegistry {
    backend: Arc<dyn StorageBackend>,

    /// Serialises check-then-insert so two requests cannot create the same name
    write_lock: Arc<Mutex<()>>,
}

impl TargetRegistry {
    pub fn new(backend: Arc<dyn StorageBackend>) -> Self {
        Self {
            backend,
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn backend(&self) -> &Arc<dyn StorageBackend> {
        &self.backend
    }

    /// Every target ever created, including disabled ones
    pub async fn all(&self) -> Result<Vec<Target>, StorageError> {
        self.backend.list_targets().await
    }

    pub async fn enabled(&self) -> Result<Vec<Target>, StorageError> {
        let mut targets = self.backend.list_targets().await?;
        targets.retain(|t| t.enabled);
        Ok(targets)
    }

    /// The set agents should be running
    pub async fn current_set(&self) -> Result<TargetSet, StorageError> {
        Ok(TargetSet::from_targets(self.backend.list_targets().await?))
    }

    pub async fn create(&self, new: NewTarget) -> Result<Target, RegistryError> {
        let _guard = self.write_lock.lock().await;

        let enabled = self.enabled().await?;
        validate_new_target(&enabled, &new)?;

        let target = self.backend.insert_target(&new).await?;
        info!("target {} '{}' added ({})", target.id, target.name, target.address);
        Ok(target)
    }

    /// Soft-disable a target; returns `false` for an unknown id
    pub async fn disable(&self, id: u64) -> Result<bool, StorageError> {
        let _guard = self.write_lock.lock().await;

        let found = self.backend.disable_target(id).await?;
        if found {
            info!("target {} disabled", id);
        }
        Ok(found)
    }
}
