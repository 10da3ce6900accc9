//! Stress-testing harness for `rcu-core`.
//!
//! Drives the concrete multi-threaded scenarios used to exercise the GP
//! engine and the hash table under contention, emitting structured JSONL
//! through [`structured_log`] so a run's outcome can be machine-checked.

#![deny(unsafe_code)]

pub mod scenarios;
pub mod structured_log;

pub use scenarios::{run_scenario, Scenario, ScenarioReport};
