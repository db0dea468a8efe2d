// REPL adapter: process transport, response framing, and the session API.
pub mod config;
pub mod error;
pub mod session;
pub mod transport;

pub use config::ReplConfig;
pub use error::ReplError;
pub use session::{Evolver, EvolverBuilder, EvolveStats};
pub use transport::{ProcessReplTransport, ReplTransport};
