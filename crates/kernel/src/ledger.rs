//! Append-only, hash-chained ledger.

use crate::clock::{Clock, Timestamp};
use crate::types::{BreakReason, EntryId, LedgerEntry, SpeakerId, Status, Value};
use sha3::{Digest, Sha3_256};

pub const GENESIS: &str = "genesis";

/// Everything needed to append one entry. Separate from `LedgerEntry` itself
/// because `entry_id`, `prev_hash`, `timestamp` and `entry_hash` are
/// computed by the ledger, not supplied by the caller.
#[derive(Debug, Clone, Default)]
pub struct AppendFields {
    pub speaker_id: SpeakerId,
    pub operation: String,
    pub condition: Option<String>,
    pub condition_result: Option<bool>,
    pub action: String,
    pub status: Option<Status>,
    pub state_before: Option<Value>,
    pub state_after: Option<Value>,
    pub break_reason: Option<BreakReason>,
}

#[derive(Debug, Default)]
pub struct Ledger {
    entries: Vec<LedgerEntry>,
    hash_hex_len: usize,
}

impl Ledger {
    pub fn new(hash_hex_len: usize) -> Self {
        Self {
            entries: Vec::new(),
            hash_hex_len,
        }
    }

    fn last_hash(&self) -> String {
        self.entries
            .last()
            .map(|e| e.entry_hash.clone())
            .unwrap_or_else(|| GENESIS.to_string())
    }

    /// Computes the entry hash. Every field is rendered to its canonical
    /// decimal/string form and fed into the hasher in a fixed field order, so
    /// two kernels fed the same sequence of operations produce byte-identical
    /// chains.
    pub fn compute_hash(
        entry_id: EntryId,
        speaker_id: SpeakerId,
        operation: &str,
        action: &str,
        timestamp: Timestamp,
        prev_hash: &str,
        hex_len: usize,
    ) -> String {
        let input = format!("{entry_id}:{speaker_id}:{operation}:{action}:{timestamp}:{prev_hash}");
        let mut hasher = Sha3_256::new();
        hasher.update(input.as_bytes());
        let digest = hasher.finalize();
        let hex = hex_encode(&digest);
        hex[..hex_len.min(hex.len())].to_string()
    }

    pub fn append(&mut self, fields: AppendFields, clock: &dyn Clock) -> LedgerEntry {
        let entry_id = self.entries.len() as EntryId;
        let prev_hash = self.last_hash();
        let timestamp = clock.now();
        let entry_hash = Self::compute_hash(
            entry_id,
            fields.speaker_id,
            &fields.operation,
            &fields.action,
            timestamp,
            &prev_hash,
            self.hash_hex_len,
        );

        let entry = LedgerEntry {
            entry_id,
            speaker_id: fields.speaker_id,
            operation: fields.operation,
            condition: fields.condition,
            condition_result: fields.condition_result,
            action: fields.action,
            status: fields.status,
            state_before: fields.state_before,
            state_after: fields.state_after,
            timestamp,
            prev_hash,
            entry_hash,
            break_reason: fields.break_reason,
        };

        tracing::debug!(entry_id, operation = %entry.operation, "ledger append");
        self.entries.push(entry.clone());
        entry
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Half-open range `[from, to)`, clamped to the ledger bounds.
    pub fn read(&self, from: usize, to: usize) -> Vec<LedgerEntry> {
        let len = self.entries.len();
        let from = from.min(len);
        let to = to.min(len);
        if from >= to {
            return Vec::new();
        }
        self.entries[from..to].to_vec()
    }

    #[allow(clippy::too_many_arguments)]
    pub fn search(
        &self,
        speaker: Option<SpeakerId>,
        operation: Option<&str>,
        action: Option<&str>,
        from_time: Option<Timestamp>,
        to_time: Option<Timestamp>,
    ) -> Vec<LedgerEntry> {
        self.entries
            .iter()
            .filter(|e| speaker.map_or(true, |s| e.speaker_id == s))
            .filter(|e| operation.map_or(true, |op| e.operation == op))
            .filter(|e| action.map_or(true, |a| e.action == a))
            .filter(|e| from_time.map_or(true, |t| e.timestamp >= t))
            .filter(|e| to_time.map_or(true, |t| e.timestamp <= t))
            .cloned()
            .collect()
    }

    /// Walks the chain, verifying every `prev_hash` link and every
    /// recomputed `entry_hash`. An empty ledger verifies true.
    pub fn verify(&self) -> bool {
        let mut expected_prev = GENESIS.to_string();
        for entry in &self.entries {
            if entry.prev_hash != expected_prev {
                return false;
            }
            let recomputed = Self::compute_hash(
                entry.entry_id,
                entry.speaker_id,
                &entry.operation,
                &entry.action,
                entry.timestamp,
                &entry.prev_hash,
                self.hash_hex_len,
            );
            if recomputed != entry.entry_hash {
                return false;
            }
            expected_prev = entry.entry_hash.clone();
        }
        true
    }
}

fn hex_encode(bytes: &[u8]) -> String {
    use std::fmt::Write;
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        write!(out, "{b:02x}").unwrap();
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SimulatedClock;

    fn fields(op: &str, action: &str) -> AppendFields {
        AppendFields {
            speaker_id: 0,
            operation: op.to_string(),
            action: action.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn empty_ledger_verifies() {
        let ledger = Ledger::new(16);
        assert!(ledger.verify());
    }

    #[test]
    fn genesis_prev_hash() {
        let mut ledger = Ledger::new(16);
        let clock = SimulatedClock::new();
        let entry = ledger.append(fields("boot", "boot"), &clock);
        assert_eq!(entry.prev_hash, GENESIS);
        assert_eq!(entry.entry_hash.len(), 16);
    }

    #[test]
    fn chain_links_and_verifies() {
        let mut ledger = Ledger::new(16);
        let clock = SimulatedClock::new();
        ledger.append(fields("boot", "boot"), &clock);
        clock.advance(1);
        let e1 = ledger.append(fields("write", "write:x"), &clock);
        clock.advance(1);
        let e2 = ledger.append(fields("write", "write:y"), &clock);

        assert_eq!(e2.prev_hash, e1.entry_hash);
        assert!(ledger.verify());
    }

    #[test]
    fn tamper_breaks_verification() {
        let mut ledger = Ledger::new(16);
        let clock = SimulatedClock::new();
        ledger.append(fields("boot", "boot"), &clock);
        clock.advance(1);
        ledger.append(fields("write", "write:x"), &clock);
        assert!(ledger.verify());

        ledger.entries[0].action = "tampered".to_string();
        assert!(!ledger.verify());
    }

    #[test]
    fn read_clamps_to_bounds() {
        let mut ledger = Ledger::new(16);
        let clock = SimulatedClock::new();
        for i in 0..5 {
            ledger.append(fields("write", &format!("write:{i}")), &clock);
        }
        assert_eq!(ledger.read(0, 100).len(), 5);
        assert_eq!(ledger.read(3, 2).len(), 0);
        assert_eq!(ledger.read(2, 4).len(), 2);
    }
}
