pub mod http;

use crate::shared::error::{DaemonError, DaemonResult};
use crate::shared::types::{InstanceDescriptor, LifecycleState, Platform};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

/// Control-plane lookup of instances by id.
#[async_trait]
pub trait InstanceDirectory: Send + Sync {
    /// Fetch the current descriptor, `None` when the instance does not exist
    async fn find(&self, instance_id: &str) -> DaemonResult<Option<InstanceDescriptor>>;

    /// Ask the control plane to reboot the instance
    async fn reboot(&self, instance_id: &str) -> DaemonResult<()>;
}

/// A resolved instance: its descriptor plus the control-plane reboot.
#[derive(Clone)]
pub struct Instance {
    descriptor: InstanceDescriptor,
    directory: Arc<dyn InstanceDirectory>,
}

impl Instance {
    pub async fn resolve(
        directory: Arc<dyn InstanceDirectory>,
        instance_id: &str,
    ) -> DaemonResult<Option<Self>> {
        let descriptor = directory.find(instance_id).await?;
        Ok(descriptor.map(|descriptor| Self {
            descriptor,
            directory,
        }))
    }

    pub fn id(&self) -> &str {
        &self.descriptor.id
    }

    pub fn platform(&self) -> &Platform {
        &self.descriptor.platform
    }

    pub fn lifecycle_state(&self) -> LifecycleState {
        self.descriptor.lifecycle_state
    }

    pub async fn reboot(&self) -> DaemonResult<()> {
        self.directory.reboot(&self.descriptor.id).await
    }
}

/// In-memory implementation of the instance directory
#[derive(Clone, Default)]
pub struct InMemoryInstanceDirectory {
    storage: Arc<RwLock<HashMap<String, InstanceDescriptor>>>,
    lookups: Arc<RwLock<Vec<String>>>,
    reboots: Arc<RwLock<Vec<String>>>,
    fail_reboots: Arc<AtomicBool>,
}

impl InMemoryInstanceDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, descriptor: InstanceDescriptor) -> DaemonResult<()> {
        let mut storage = self.storage.write().map_err(|_| lock_poisoned())?;
        storage.insert(descriptor.id.clone(), descriptor);
        Ok(())
    }

    pub fn remove(&self, instance_id: &str) -> DaemonResult<bool> {
        let mut storage = self.storage.write().map_err(|_| lock_poisoned())?;
        Ok(storage.remove(instance_id).is_some())
    }

    /// Make every subsequent reboot call fail.
    pub fn fail_reboots(&self, fail: bool) {
        self.fail_reboots.store(fail, Ordering::SeqCst);
    }

    pub fn lookups(&self) -> Vec<String> {
        self.lookups.read().map(|l| l.clone()).unwrap_or_default()
    }

    pub fn reboots(&self) -> Vec<String> {
        self.reboots.read().map(|r| r.clone()).unwrap_or_default()
    }

    pub fn reboot_count(&self, instance_id: &str) -> usize {
        self.reboots()
            .iter()
            .filter(|id| id.as_str() == instance_id)
            .count()
    }
}

#[async_trait]
impl InstanceDirectory for InMemoryInstanceDirectory {
    async fn find(&self, instance_id: &str) -> DaemonResult<Option<InstanceDescriptor>> {
        self.lookups
            .write()
            .map_err(|_| lock_poisoned())?
            .push(instance_id.to_string());
        let storage = self.storage.read().map_err(|_| lock_poisoned())?;
        Ok(storage.get(instance_id).cloned())
    }

    async fn reboot(&self, instance_id: &str) -> DaemonResult<()> {
        self.reboots
            .write()
            .map_err(|_| lock_poisoned())?
            .push(instance_id.to_string());

        if self.fail_reboots.load(Ordering::SeqCst) {
            return Err(DaemonError::Directory(format!(
                "reboot of {instance_id} rejected"
            )));
        }

        let storage = self.storage.read().map_err(|_| lock_poisoned())?;
        if storage.contains_key(instance_id) {
            Ok(())
        } else {
            Err(DaemonError::Directory(format!(
                "instance {instance_id} not found"
            )))
        }
    }
}

fn lock_poisoned() -> DaemonError {
    DaemonError::StorageError("Lock poisoned".to_string())
}
