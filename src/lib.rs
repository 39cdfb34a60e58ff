//! Geogate - Distributed Sliding-Window Admission Control
//!
//! This crate implements the admission controller that guards an IP geolocation
//! lookup service. Independent service instances agree on per-caller request
//! budgets by sharing one-second bucket counters in a networked store (Redis),
//! without coordinating with each other directly.

pub mod config;
pub mod error;
pub mod ratelimit;
pub mod store;
