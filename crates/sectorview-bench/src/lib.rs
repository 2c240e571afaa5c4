//! Timing harness behind the `bench-runner` binary.

pub mod report;
pub mod runner;
pub mod scenes;
