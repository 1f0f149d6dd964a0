//! looproom - Collaborative Step-Sequencer Session Engine
//!
//! This crate implements the transport clock and session-state engine for
//! collaborative step-sequencer rooms: a clock-offset handshake, per-room
//! authoritative state behind single-writer relay actors, a shared step
//! derivation formula, and an event relay with optional Redis-backed
//! cross-instance fan-out.

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;
pub mod protocol;
