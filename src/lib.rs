mod api;
pub mod app;
pub mod args;
pub mod codec;
pub mod commands;
mod config;
mod error;
pub mod filter;
pub mod gate;
mod mcp;
pub mod model;
mod utils;

#[cfg(test)]
mod test;

pub use api::{BatchOutcome, IdentityProvider, Ledger, Mode, Session, User};
pub use app::App;
pub use config::{Config, FirebaseConfig};
pub use error::{Error, ErrorType, Result};
