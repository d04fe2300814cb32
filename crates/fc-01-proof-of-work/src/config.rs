//! Configuration for the proof-of-work engine

/// Proof-of-work parameters.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PowConfig {
    /// Number of leading zero bits a block hash must have.
    /// The target is `1 << (256 - difficulty_bits)`.
    pub difficulty_bits: u32,

    /// Nonces tried between two polls of the interrupt flag.
    pub interrupt_check_interval: u64,
}

impl Default for PowConfig {
    fn default() -> Self {
        Self {
            difficulty_bits: 16,
            interrupt_check_interval: 4096,
        }
    }
}

impl PowConfig {
    /// Low difficulty for tests and local networks.
    pub fn for_testing() -> Self {
        Self {
            difficulty_bits: 4,
            interrupt_check_interval: 64,
        }
    }
}
