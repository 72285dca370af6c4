//! Authoritative party session server library.

pub mod colors;
pub mod config;
pub mod error;
pub mod gamemodes;
pub mod phase;
pub mod registry;
pub mod scheduler;
pub mod server;
pub mod session;
pub mod teams;
pub mod voting;

// Re-export commonly used types
pub use config::Config;
pub use error::{ErrorKind, Rejection, SessionError};
pub use server::{run, start, ServerHandle, SessionCommand};
pub use session::{Envelope, Session, Target};
