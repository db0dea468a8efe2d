//! Driver for Ken Brakke's Surface Evolver command-line REPL.
//!
//! Spawns the `evolver` executable as a child process and frames its
//! stdout into discrete responses bounded by prompt strings, exposing a
//! synchronous command/response API on top:
//!
//! ```no_run
//! use evolver_driver::Evolver;
//!
//! # async fn demo() -> anyhow::Result<()> {
//! let mut session = Evolver::spawn("evolver").await?;
//! session.run_command("foo := 3").await?;
//! let output = session.run_command("print foo").await?;
//! println!("{output}"); // prints the string 3
//! session.close().await?;
//! # Ok(())
//! # }
//! ```
//!
//! The machinery is not Evolver-specific: any line-oriented REPL child
//! can be driven by overriding the prompt strings in [`ReplConfig`].

pub mod datafile;
pub mod repl;

pub use repl::config::ReplConfig;
pub use repl::error::ReplError;
pub use repl::session::{Evolver, EvolverBuilder, EvolveStats};
pub use repl::transport::{ProcessReplTransport, ReplTransport};
