use std::collections::BTreeMap;
use shared::types::ServiceRecord;

/// Every discovered service, and the subset that has been resolved, keyed by name.
///
/// Both maps are ordered by name so listings are stable between mutations.
/// A name is only ever present in `resolved` while it is also in `discovered`.
#[derive(Debug, Default)]
pub struct Registry {
    discovered: BTreeMap<String, ServiceRecord>,
    resolved: BTreeMap<String, ServiceRecord>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn upsert_discovered(&mut self, record: ServiceRecord) {
        self.discovered.insert(record.name.clone(), record);
    }

    /// Stores a resolved record. The discovered entry is refreshed with the same
    /// data so the resolved set never outgrows the discovered one.
    pub fn upsert_resolved(&mut self, record: ServiceRecord) {
        self.discovered.insert(record.name.clone(), record.clone());
        self.resolved.insert(record.name.clone(), record);
    }

    /// Removes `name` from both maps. Returns whether anything was removed;
    /// removing an unknown name is a no-op.
    pub fn remove_by_name(&mut self, name: &str) -> bool {
        let discovered = self.discovered.remove(name).is_some();
        let resolved = self.resolved.remove(name).is_some();
        discovered || resolved
    }

    /// Drops `name` from the resolved set only, keeping it discovered.
    pub fn demote(&mut self, name: &str) -> Option<ServiceRecord> {
        self.resolved.remove(name)
    }

    pub fn get_discovered(&self, name: &str) -> Option<&ServiceRecord> {
        self.discovered.get(name)
    }

    /// Snapshot of all discovered services, sorted by name
    pub fn list_discovered(&self) -> Vec<ServiceRecord> {
        self.discovered.values().cloned().collect()
    }

    /// Snapshot of all resolved services, sorted by name
    pub fn list_resolved(&self) -> Vec<ServiceRecord> {
        self.resolved.values().cloned().collect()
    }

    pub fn discovered_len(&self) -> usize {
        self.discovered.len()
    }

    pub fn resolved_len(&self) -> usize {
        self.resolved.len()
    }

    pub fn clear(&mut self) {
        self.discovered.clear();
        self.resolved.clear();
    }

    #[cfg(test)]
    pub(crate) fn resolved_within_discovered(&self) -> bool {
        self.resolved.keys().all(|name| self.discovered.contains_key(name))
    }
}
