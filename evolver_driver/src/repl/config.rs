use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default prompt Evolver shows at startup and after quitting a datafile.
pub const DATAFILE_PROMPT: &str = "Enter new datafile name (none to continue, q to quit):";

/// Default prompt Evolver shows between commands.
pub const COMMAND_PROMPT: &str = "Enter command:";

/// Marker Evolver emits after echoing a datafile's contents.
pub const END_OF_INPUT: &str = "Enter command: //End Of Input";

/// Tunables for one REPL session.
///
/// The prompt strings are a property of the child binary's version and
/// configuration; the defaults match Surface Evolver's known prompts, and
/// callers driving a different REPL supply their own.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplConfig {
    /// How long each poll of the child's stdout may block before the
    /// response deadline is re-checked.
    pub poll_interval: Duration,
    /// Overall deadline for one response. `None` waits indefinitely,
    /// matching the original driver's unbounded read loop.
    pub response_timeout: Option<Duration>,
    /// Prompt marking readiness for a new datafile name.
    pub datafile_prompt: String,
    /// Prompt marking readiness for the next command.
    pub command_prompt: String,
    /// Marker emitted once a datafile has been read in.
    pub end_of_input: String,
}

impl Default for ReplConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            response_timeout: Some(Duration::from_secs(60)),
            datafile_prompt: DATAFILE_PROMPT.to_string(),
            command_prompt: COMMAND_PROMPT.to_string(),
            end_of_input: END_OF_INPUT.to_string(),
        }
    }
}
