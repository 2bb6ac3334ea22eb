pub mod error_harness;
pub mod report;
