//! Transport Hub: owns the per-session client connection handle and gives
//! every other crate a safe, non-blocking way to talk to it (spec §4.3).

mod hub;
mod queue;

pub use hub::{OutboundSink, TransportHub};
