//! HTTP Server Module
//!
//! The network face of EmberKV: a two-route HTTP API over the store.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       axum Router                           │
//! │                                                             │
//! │   GET /get?key=K                POST /set?key=K&expire=E    │
//! │        │                                 │                  │
//! │        ▼                                 ▼                  │
//! │  ┌───────────────┐              ┌────────────────┐          │
//! │  │ spawn_blocking│              │ spawn_blocking │          │
//! │  │  stream_get   │              │      set       │          │
//! │  └───────┬───────┘              └────────────────┘          │
//! │          │ ChannelSink chunks                               │
//! │          ▼                                                  │
//! │   streaming response body                                   │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! The store never learns it is serving HTTP: it writes into an
//! `std::io::Write` sink, and the sink happens to feed the response body.

pub mod http;
pub mod sink;

// Re-export commonly used types
pub use http::router;
pub use sink::ChannelSink;
