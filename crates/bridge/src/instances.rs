//! Installed wallet instances, as seen from the driver.

use crate::{
    bridge::MessageBridge,
    error::InstallationError,
    message::InstallWalletResult,
};
use headless_wallet::SecurityViolation;
use parking_lot::RwLock;
use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
    time::SystemTime,
};

/// One installed wallet.
#[derive(Clone, Debug)]
pub struct WalletInstance {
    pub instance_id: String,
    pub page_id: String,
    pub context_id: String,
    pub test_id: Option<String>,
    pub bridge: Arc<MessageBridge>,
    pub installation: InstallWalletResult,
    pub installed_at: SystemTime,
}

#[derive(Debug, Default)]
struct Slots {
    installed: HashMap<String, WalletInstance>,
    /// Ids of installs in flight.
    reserved: HashSet<String>,
}

/// Every installed instance by id, bounded by `max_instances`.
#[derive(Debug)]
pub struct InstanceRegistry {
    max_instances: usize,
    slots: RwLock<Slots>,
}

impl InstanceRegistry {
    pub fn new(max_instances: usize) -> Self {
        Self { max_instances, slots: Default::default() }
    }

    /// Claims `instance_id` for an install.
    ///
    /// The id counts as taken until the returned [`Reservation`] is committed or dropped, so a
    /// concurrent install of the same id fails even with `override_existing`.
    pub fn reserve(
        &self,
        instance_id: &str,
        override_existing: bool,
    ) -> Result<Reservation<'_>, InstallationError> {
        let mut slots = self.slots.write();
        let existing = slots.installed.get(instance_id).cloned();
        if slots.reserved.contains(instance_id) || (existing.is_some() && !override_existing) {
            return Err(InstallationError::DuplicateInstance(instance_id.to_string()));
        }
        let others = slots.installed.len() + slots.reserved.len() - usize::from(existing.is_some());
        if others >= self.max_instances {
            return Err(SecurityViolation::InstanceLimitExceeded { max: self.max_instances }.into());
        }
        slots.reserved.insert(instance_id.to_string());
        Ok(Reservation { registry: self, instance_id: instance_id.to_string(), existing })
    }

    pub fn remove(&self, instance_id: &str) -> Option<WalletInstance> {
        self.slots.write().installed.remove(instance_id)
    }

    pub fn get(&self, instance_id: &str) -> Option<WalletInstance> {
        self.slots.read().installed.get(instance_id).cloned()
    }

    /// Ids of the instances installed into `page_id`.
    pub fn on_page(&self, page_id: &str) -> Vec<String> {
        self.slots
            .read()
            .installed
            .values()
            .filter(|instance| instance.page_id == page_id)
            .map(|instance| instance.instance_id.clone())
            .collect()
    }

    /// Sorted ids of every instance.
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<_> = self.slots.read().installed.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Number of installed instances, installs in flight excluded.
    pub fn len(&self) -> usize {
        self.slots.read().installed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.read().installed.is_empty()
    }
}

/// An id claimed by [`InstanceRegistry::reserve`]. Dropping it releases the id.
#[derive(Debug)]
#[must_use = "the id is released when the reservation is dropped"]
pub struct Reservation<'a> {
    registry: &'a InstanceRegistry,
    instance_id: String,
    existing: Option<WalletInstance>,
}

impl Reservation<'_> {
    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    /// The installed instance this install replaces.
    pub fn existing(&self) -> Option<&WalletInstance> {
        self.existing.as_ref()
    }

    /// Stores `instance` under the reserved id, returning the one it replaced.
    pub fn commit(self, instance: WalletInstance) -> Option<WalletInstance> {
        debug_assert_eq!(instance.instance_id, self.instance_id);
        let mut slots = self.registry.slots.write();
        slots.reserved.remove(&self.instance_id);
        slots.installed.insert(self.instance_id.clone(), instance)
    }
}

impl Drop for Reservation<'_> {
    fn drop(&mut self) {
        self.registry.slots.write().reserved.remove(&self.instance_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reserved_ids_are_taken_until_released() {
        let registry = InstanceRegistry::new(2);
        let first = registry.reserve("w", false).unwrap();
        let err = registry.reserve("w", true).unwrap_err();
        assert_eq!(err.code(), "INSTANCE_EXISTS");

        let second = registry.reserve("v", false).unwrap();
        let err = registry.reserve("u", false).unwrap_err();
        assert_eq!(err.code(), "SECURITY_VIOLATION");
        assert!(registry.is_empty());

        drop(first);
        drop(second);
        let _again = registry.reserve("w", false).unwrap();
    }
}
