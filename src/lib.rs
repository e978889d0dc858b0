//! SRTLA Receiver Library
//!
//! The receiver side of SRTLA (SRT transport proxy with link aggregation):
//! accepts one UDP flow per sender link, demultiplexes each aggregated
//! session onto a single upstream socket toward an SRT listener, and fans
//! return traffic back across the member links.

// Use mimalloc as the global allocator for tests (non-Windows only)
#[cfg(not(windows))]
#[cfg(test)]
#[global_allocator]
static ALLOC: mimalloc::MiMalloc = mimalloc::MiMalloc;

pub mod bootstrap;
pub mod group;
pub mod protocol;
pub mod receiver;
pub mod utils;

// Test helpers module - available when test-internals feature is enabled
#[cfg(any(test, feature = "test-internals"))]
pub mod test_helpers;

#[cfg(test)]
pub mod tests;

// Re-export commonly used items
pub use group::{ConnGroup, GroupRegistry, SrtlaConn};
pub use protocol::*;
pub use receiver::ReceiverCtx;
pub use utils::{const_time_eq, now_secs};
