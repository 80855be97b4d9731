//! PetPal API Library Crate
//!
//! Application state, REST handlers, WebSocket sessions and routing for the
//! pet companion service. The `api` binary is a thin wrapper around this library.

pub mod config;
pub mod handlers;
pub mod models;
pub mod router;
pub mod state;
pub mod ws;
