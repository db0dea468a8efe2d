use std::time::Duration;

use thiserror::Error;

/// REPL driver errors.
#[derive(Debug, Error)]
pub enum ReplError {
    #[error("initialization failed, output was <{output}>")]
    Initialization { output: String },

    #[error("failed to spawn child process: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("delimiter {delimiter:?} not seen within {waited:?}")]
    Stall { delimiter: String, waited: Duration },

    #[error("child process closed stdout before the expected delimiter")]
    ChildExited,

    #[error("malformed response while {context}: <{response}>")]
    Parse { context: String, response: String },

    #[error("I/O error on child pipe: {0}")]
    Io(#[from] std::io::Error),
}
