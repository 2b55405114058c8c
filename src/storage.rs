//! Durable membership storage seam.
//!
//! The persistence layer is out of scope for this crate; it only has to be
//! able to load and store the latest committed [`Configuration`]. Log
//! segments, snapshots and compaction live elsewhere.

use std::sync::Arc;
use std::sync::Mutex;

use crate::configuration::Configuration;
use crate::error::StorageError;
use crate::member::MemberId;

/// Stores the latest committed cluster configuration durably.
///
/// Called only from the owning server's execution context.
pub trait ConfigurationStore<ID>: Send + 'static
where ID: MemberId
{
    /// Load the persisted configuration, if one exists.
    fn load(&mut self) -> Result<Option<Configuration<ID>>, StorageError>;

    /// Replace the persisted configuration.
    fn store(&mut self, configuration: &Configuration<ID>) -> Result<(), StorageError>;
}

/// In-memory configuration store for tests and single-process setups.
#[derive(Debug, Clone, Default)]
pub struct MemConfigurationStore<ID>
where ID: MemberId
{
    inner: Arc<Mutex<Option<Configuration<ID>>>>,
}

impl<ID> MemConfigurationStore<ID>
where ID: MemberId
{
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(None)),
        }
    }

    /// Pre-seed a persisted configuration, e.g. to simulate a restart.
    pub fn seed(&self, configuration: Configuration<ID>) {
        let mut guard = self.inner.lock().unwrap();
        *guard = Some(configuration);
    }

    /// Read back what is currently persisted.
    pub fn persisted(&self) -> Option<Configuration<ID>> {
        self.inner.lock().unwrap().clone()
    }
}

impl<ID> ConfigurationStore<ID> for MemConfigurationStore<ID>
where ID: MemberId
{
    fn load(&mut self) -> Result<Option<Configuration<ID>>, StorageError> {
        Ok(self.inner.lock().unwrap().clone())
    }

    fn store(&mut self, configuration: &Configuration<ID>) -> Result<(), StorageError> {
        let mut guard = self.inner.lock().unwrap();
        *guard = Some(configuration.clone());
        Ok(())
    }
}
