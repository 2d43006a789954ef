//! Document intake and review for SiSU admissions candidates.

pub mod config;
pub mod error;
pub mod telemetry;
pub mod workflows;
