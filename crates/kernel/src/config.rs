//! Configuration for the kernel.

/// Kernel tunables. Mirrors the nested, `Default`-backed configuration
/// structs the rest of the stack uses rather than free-floating constants.
#[derive(Debug, Clone)]
pub struct KernelConfig {
    /// Length, in hex characters, that an entry hash is truncated to.
    /// Fixed at 16 by default.
    pub hash_hex_len: usize,
    /// Safety bound applied by the evaluator's loop path when a caller
    /// does not otherwise supply one. The compiler (crates/lang) rejects
    /// `while` statements lacking an explicit `max` clause, so in practice
    /// every loop that reaches the kernel already carries its own bound —
    /// this is the fallback for direct kernel API callers.
    pub default_loop_max: u64,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            hash_hex_len: 16,
            default_loop_max: 10_000,
        }
    }
}
