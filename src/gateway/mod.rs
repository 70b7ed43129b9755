//! # Gateway Orchestration Core
//!
//! Single bootstrap path that wires security hardening, service discovery,
//! health monitoring, circuit breakers, request routing, and the background
//! job queue into one facade. Every entry point (binaries, embedding crates,
//! tests) constructs a [`GatewayCore`] and talks to the same components.

pub mod core;

pub use core::GatewayCore;
