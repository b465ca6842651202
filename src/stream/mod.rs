//! Server-push streaming sessions.
//!
//! A handler opens a session, returns the response right away and keeps the
//! [`Publisher`] to push values; one writer task per session owns the
//! connection.
//!
//! ```ignore
//! async fn events(State(ctx): State<AppState>) -> Response {
//!     let (publisher, response) = stream::open::<Tick>(ctx.stream_options());
//!     tokio::spawn(async move {
//!         while publisher.send(next_tick().await).await.is_ok() {}
//!     });
//!     response
//! }
//! ```

pub mod frame;
pub mod publisher;
pub mod session;
pub mod sink;

pub use publisher::{Publisher, SessionClosed};
pub use session::{open, open_with_sink, SessionEnd, SessionHandle, SessionOptions};
pub use sink::{ChannelSink, FrameSink};
