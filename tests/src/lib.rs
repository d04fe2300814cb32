//! # Forge-Chain Test Suite
//!
//! ## Structure
//!
//! ```text
//! tests/
//! ├── src/integration/   # Whole nodes wired over in-memory transports
//! └── benches/           # Criterion benchmarks for the hot paths
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test -p fc-tests
//! cargo test -p fc-tests integration::chain_sync
//!
//! # Benchmarks
//! cargo bench -p fc-tests
//! ```

pub mod integration;
