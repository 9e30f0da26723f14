//! pgoload - synthetic hot/cold branch workload for PGO profile capture
//!
//! This library runs a bounded, deterministic computation with a controlled
//! mix of predictable and rare branches, so CPU profiles captured around it
//! have a stable, reproducible shape for profile-guided optimization.

pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
pub mod handler;
pub mod params;
pub mod profile;
pub mod strategy;
