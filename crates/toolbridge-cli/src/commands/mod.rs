//! CLI command implementations.

pub mod call;
pub mod doctor;
pub mod servers;
pub mod tools;
