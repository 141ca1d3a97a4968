//! Partitioned, per-speaker variable storage.

use crate::types::{SpeakerId, Value};
use std::collections::BTreeMap;

#[derive(Debug, Default)]
pub struct Memory {
    partitions: BTreeMap<SpeakerId, BTreeMap<String, Value>>,
    sealed: BTreeMap<SpeakerId, std::collections::BTreeSet<String>>,
}

impl Memory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Idempotent: ensures an empty partition exists for `owner`.
    /// Calling this twice for the same owner is a no-op — it never clears
    /// an existing partition.
    pub fn create_partition(&mut self, owner: SpeakerId) {
        self.partitions.entry(owner).or_default();
        self.sealed.entry(owner).or_default();
    }

    pub fn has_partition(&self, owner: SpeakerId) -> bool {
        self.partitions.contains_key(&owner)
    }

    pub fn read(&self, owner: SpeakerId, name: &str) -> Option<Value> {
        self.partitions.get(&owner)?.get(name).cloned()
    }

    /// Writes into `caller`'s own partition. Returns `(wrote, prior_value)`.
    /// `wrote` is false only if the caller has no partition at all — sealed
    /// rejection is handled one layer up, since sealing is a façade-level
    /// concept: write ownership holds because the façade rejects
    /// cross-partition writes before reaching here.
    pub fn write(&mut self, caller: SpeakerId, name: &str, value: Value) -> (bool, Option<Value>) {
        match self.partitions.get_mut(&caller) {
            None => (false, None),
            Some(partition) => {
                let prior = partition.insert(name.to_string(), value);
                (true, prior)
            }
        }
    }

    pub fn list(&self, owner: SpeakerId) -> Vec<String> {
        self.partitions
            .get(&owner)
            .map(|p| p.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn seal(&mut self, owner: SpeakerId, name: &str) {
        self.sealed.entry(owner).or_default().insert(name.to_string());
    }

    pub fn is_sealed(&self, owner: SpeakerId, name: &str) -> bool {
        self.sealed
            .get(&owner)
            .map(|names| names.contains(name))
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_partition_is_idempotent() {
        let mut memory = Memory::new();
        memory.create_partition(1);
        memory.write(1, "x", Value::Int(1));
        memory.create_partition(1);
        assert_eq!(memory.read(1, "x"), Some(Value::Int(1)));
    }

    #[test]
    fn write_without_partition_fails() {
        let mut memory = Memory::new();
        let (wrote, prior) = memory.write(7, "x", Value::Int(1));
        assert!(!wrote);
        assert_eq!(prior, None);
    }

    #[test]
    fn write_returns_prior_value() {
        let mut memory = Memory::new();
        memory.create_partition(1);
        let (wrote, prior) = memory.write(1, "x", Value::Int(1));
        assert!(wrote);
        assert_eq!(prior, None);
        let (wrote, prior) = memory.write(1, "x", Value::Int(2));
        assert!(wrote);
        assert_eq!(prior, Some(Value::Int(1)));
    }

    #[test]
    fn sealed_variable_is_tracked_per_owner() {
        let mut memory = Memory::new();
        memory.create_partition(1);
        memory.seal(1, "quota");
        assert!(memory.is_sealed(1, "quota"));
        assert!(!memory.is_sealed(1, "other"));
        assert!(!memory.is_sealed(2, "quota"));
    }
}
