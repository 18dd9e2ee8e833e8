//! SSH client that runs an interactive shell and relays the server's X11 connections to
//! the local display, all from one polling loop.
#![cfg(unix)]

pub mod cli;
pub mod client;
pub mod crypto;
pub mod display;
pub mod error;
pub mod relay;
pub mod terminal;

pub use error::{RelayError, RelayResult};
