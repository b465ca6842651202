//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection on the shared socket
//!     → listener.rs (accept, connection limits)
//!     → demux.rs (accept-and-route loop, one sniff task per connection)
//!     → sniff.rs (classify opening bytes: RPC / HTTP/1 / reject)
//!     → stream.rs (replay sniffed bytes to the chosen server)
//!     → rpc listener or http listener
//! ```
//!
//! # Design Decisions
//! - Bounded accept via semaphore prevents resource exhaustion
//! - Sniffing never blocks the accept loop
//! - No application bytes are lost: the sniffed prefix is replayed

pub mod connection;
pub mod demux;
pub mod listener;
pub mod sniff;
pub mod stream;

pub use connection::{ConnectionClass, ConnectionId};
pub use demux::{Demux, DerivedListener, PeerAddr};
pub use listener::{Listener, ListenerError};
pub use stream::SniffedStream;
