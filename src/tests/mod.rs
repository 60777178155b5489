//! Scenario testing module
//!
//! Drives the audio stage through scripted ports:
//! - Input pump sequencing, backpressure and timestamps
//! - Format negotiation and fallback reporting
//! - Full source to sink runs with the reference ports

pub mod fixtures;
