//! Per-package mutual exclusion

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::OwnedMutexGuard;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::errors::ProvisionerError;

type PackageMutex = Arc<tokio::sync::Mutex<()>>;

/// Serializes runs that share a package ID
#[derive(Clone, Default)]
pub struct PackageLocks {
    inner: Arc<Mutex<HashMap<String, PackageMutex>>>,
}

/// Held for the duration of a run
pub struct PackageGuard {
    package_id: String,
    locks: PackageLocks,
    guard: Option<OwnedMutexGuard<()>>,
}

impl PackageLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `package_id`
    pub async fn acquire(
        &self,
        package_id: &str,
        cancel: &CancellationToken,
    ) -> Result<PackageGuard, ProvisionerError> {
        let mutex = {
            let mut map = self.lock_map()?;
            map.entry(package_id.to_string()).or_default().clone()
        };

        if mutex.try_lock().is_err() {
            debug!(package_id, "waiting for an earlier run of this package");
        }

        let acquired = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            guard = mutex.clone().lock_owned() => Some(guard),
        };
        drop(mutex);

        match acquired {
            Some(guard) => Ok(PackageGuard {
                package_id: package_id.to_string(),
                locks: self.clone(),
                guard: Some(guard),
            }),
            None => {
                self.release(package_id);
                Err(ProvisionerError::Cancelled(format!(
                    "waiting for package {}",
                    package_id
                )))
            }
        }
    }

    /// Number of packages with a live lock entry
    pub fn len(&self) -> usize {
        self.inner.lock().map(|map| map.len()).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock_map(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, PackageMutex>>, ProvisionerError> {
        self.inner
            .lock()
            .map_err(|_| ProvisionerError::Internal("package lock map poisoned".to_string()))
    }

    fn release(&self, package_id: &str) {
        if let Ok(mut map) = self.inner.lock() {
            // Only the map holds the mutex once nobody waits on it
            if map.get(package_id).is_some_and(|m| Arc::strong_count(m) == 1) {
                map.remove(package_id);
            }
        }
    }
}

impl Drop for PackageGuard {
    fn drop(&mut self) {
        drop(self.guard.take());
        self.locks.release(&self.package_id);
    }
}
