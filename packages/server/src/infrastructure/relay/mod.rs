//! Relay transports.
//!
//! Implementations of the domain [`Relay`](crate::domain::Relay) trait.

pub mod memory;
pub mod noop;
pub mod peer;

pub use memory::MemoryRelay;
pub use noop::NoopRelay;
pub use peer::PeerRelay;
