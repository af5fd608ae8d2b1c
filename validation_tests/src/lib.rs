//! Validation infrastructure for the PBF solver.
//!
//! Provides utilities for:
//! - Running headless solver scenarios (no renderer attached)
//! - Recording particle trajectories over time
//! - Exporting results to CSV/JSON
//! - Checking trajectories against analytic expectations
//!
//! # Usage
//!
//! ```bash
//! cargo run -p ripple_validation -- --scenario all
//! cargo run -p ripple_validation -- --scenario free_fall --output-dir results
//! ```

pub mod harness;
pub mod metrics;
pub mod scenarios;

pub use harness::*;
pub use metrics::*;
