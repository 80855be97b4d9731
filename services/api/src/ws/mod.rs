//! WebSocket Session Management
//!
//! - `protocol`: the JSON message format between browser and server.
//! - `session`: the connection lifecycle, from `init` handshake to close.
//! - `browser`: audio and speech outputs that live in the browser.

pub mod browser;
pub mod protocol;
pub mod session;

pub use session::ws_handler;
