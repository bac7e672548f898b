//! assetlink-core: wire format, payload bodies, and configuration.
//! The client crate and the tooling depend on this one.

pub mod config;
pub mod payload;
pub mod wire;

pub use wire::{ErrorType, FileType, Packet, PacketHeader, PacketType, WireError};
