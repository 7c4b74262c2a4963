//! Test support for `tandem`.
//!
//! Provides an in-memory signaling channel with fault injection, a manual
//! clock, a recording surface, log capture, metric assertions, and a harness
//! that runs an agent and a customer session back to back.
//!
//! ```rust
//! use tandem::port::SignalingPort;
//! use tandem_testing::MemoryPort;
//!
//! # async fn example() {
//! let (agent, mut customer) = MemoryPort::pair(6_000);
//! agent.port.send("tab-changed", "{}".into()).await.unwrap();
//! assert!(customer.inbound.recv().await.is_some());
//! # }
//! ```

pub mod logging;
pub mod memory_port;
pub mod metrics;
pub mod peers;

pub use logging::{LoggerHandle, logger};
pub use memory_port::{MemoryPort, PortEnd};
pub use metrics::counter_total;
pub use peers::{CHANNEL_LIMIT, Peer, PeerPair, settle, spawn_dispatch};
pub use tandem::test_helpers::{ManualClock, RecordingPort, RecordingSurface};

/// Result type for fallible test bodies.
pub type TestResult<T = ()> = Result<T, Box<dyn std::error::Error + Send + Sync>>;
