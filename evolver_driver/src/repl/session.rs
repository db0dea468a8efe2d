use std::time::Duration;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tracing::{debug, info, trace, warn};

use super::config::ReplConfig;
use super::error::ReplError;
use super::transport::{ProcessReplTransport, ReplTransport};

/// The three values Evolver reports after each `g` iteration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EvolveStats {
    pub area: f64,
    pub energy: f64,
    pub scale: f64,
}

/// One live Evolver session: a child process plus the single piece of
/// mutable state the driver tracks, the currently open datafile.
///
/// At most one datafile is considered open at a time. The flag is
/// caller-enforced; it is never verified against the child's real state.
#[derive(Debug)]
pub struct Evolver<T: ReplTransport> {
    transport: T,
    config: ReplConfig,
    working_file: Option<String>,
}

impl Evolver<ProcessReplTransport> {
    /// Spawn `executable` with default configuration and wait for it to
    /// become ready for commands.
    pub async fn spawn(executable: &str) -> Result<Self> {
        EvolverBuilder::new(executable).connect().await
    }
}

impl<T: ReplTransport> Evolver<T> {
    /// Run the startup handshake over an already-spawned transport.
    ///
    /// Evolver prints a banner and then asks for a datafile name; an empty
    /// line makes it continue to the command prompt. Anything the child
    /// emits between those two prompts means it is not the REPL we expect,
    /// so the child is killed and the session fails.
    pub async fn initialize(mut transport: T, config: ReplConfig) -> Result<Self> {
        debug!("Waiting for initialization.");
        match Self::startup_handshake(&mut transport, &config).await {
            Ok(()) => {
                debug!("Initialized.");
                Ok(Self {
                    transport,
                    config,
                    working_file: None,
                })
            }
            Err(e) => {
                if let Err(kill_err) = transport.shutdown().await {
                    warn!("Failed to kill child after bad startup: {}", kill_err);
                }
                // Whatever went wrong before readiness (garbage output,
                // stall, early exit) is an initialization failure.
                Err(match e.downcast::<ReplError>() {
                    Ok(init @ ReplError::Initialization { .. }) => init.into(),
                    Ok(other) => ReplError::Initialization {
                        output: other.to_string(),
                    }
                    .into(),
                    Err(other) => other,
                })
            }
        }
    }

    async fn startup_handshake(transport: &mut T, config: &ReplConfig) -> Result<()> {
        // Banner content before the first prompt is discarded.
        transport.read_until(&config.datafile_prompt).await?;
        transport.send_line("").await?;
        let check = transport.read_until(&config.command_prompt).await?;
        if !check.is_empty() {
            return Err(ReplError::Initialization { output: check }.into());
        }
        Ok(())
    }

    /// Send `command` and return its output up to the command prompt.
    ///
    /// This is the primitive every other operation is built on. The
    /// returned response is whitespace-trimmed and never contains the
    /// delimiter.
    pub async fn run_command(&mut self, command: &str) -> Result<String> {
        let delimiter = self.config.command_prompt.clone();
        self.run_command_with_delimiter(command, &delimiter).await
    }

    /// Like [`run_command`](Self::run_command) but framed by a custom
    /// delimiter, for the places where the child's prompt differs
    /// contextually (datafile open/close).
    pub async fn run_command_with_delimiter(
        &mut self,
        command: &str,
        delimiter: &str,
    ) -> Result<String> {
        debug!("Running command <{}> with delimiter <{}>", command, delimiter);
        self.transport.send_line(command).await?;
        let response = self.transport.read_until(delimiter).await?;
        trace!("Response: <{}>", response);
        Ok(response)
    }

    /// Load a datafile. A no-op when one is already open.
    pub async fn open_file(&mut self, data_file: &str) -> Result<()> {
        if let Some(open) = &self.working_file {
            warn!("File already opened: {}", open);
            return Ok(());
        }
        let marker = self.config.end_of_input.clone();
        self.run_command_with_delimiter(data_file, &marker).await?;
        self.working_file = Some(data_file.to_string());
        info!("Opened file: {}", data_file);
        Ok(())
    }

    /// Evolve `repeats` times and return the area, energy, and scale from
    /// the final iteration's report line.
    pub async fn evolve(&mut self, repeats: usize) -> Result<EvolveStats> {
        let command = format!("g {repeats}");
        let mut output = self.run_command(&command).await?;
        if output.split_whitespace().next().is_none() {
            // The report sometimes lags behind the first prompt; read once
            // more against the command prompt before giving up.
            debug!("Empty evolve report, retrying read once.");
            let delimiter = self.config.command_prompt.clone();
            output = self.transport.read_until(&delimiter).await?;
        }
        parse_evolve_report(&output, repeats)
    }

    /// Refine the mesh `repeats` times. Returns the raw response.
    pub async fn refine(&mut self, repeats: usize) -> Result<String> {
        self.run_command(&format!("r {repeats}")).await
    }

    /// Average vertices `repeats` times. Returns the raw response.
    pub async fn vertex_average(&mut self, repeats: usize) -> Result<String> {
        self.run_command(&format!("V {repeats}")).await
    }

    /// Ask the child to dump its state to disk. The response is discarded;
    /// the dump file itself is the child's side effect.
    pub async fn dump(&mut self) -> Result<()> {
        self.run_command("dump").await?;
        Ok(())
    }

    /// Quit back to the datafile prompt and clear the open-file flag.
    pub async fn close_file(&mut self) -> Result<()> {
        let prompt = self.config.datafile_prompt.clone();
        self.run_command_with_delimiter("q", &prompt).await?;
        if let Some(closed) = self.working_file.take() {
            info!("Closed file: {}", closed);
        }
        Ok(())
    }

    /// The currently open datafile, if any.
    pub fn working_file(&self) -> Option<&str> {
        self.working_file.as_deref()
    }

    /// OS pid of the child process, where the transport has one.
    pub fn process_id(&self) -> Option<u32> {
        self.transport.process_id()
    }

    /// Terminate the child and reap it. Dropping the session without
    /// calling this still kills the child, just without reaping errors
    /// surfaced.
    pub async fn close(mut self) -> Result<()> {
        debug!("Closing Evolver session");
        self.transport.shutdown().await
    }
}

fn parse_evolve_report(output: &str, repeats: usize) -> Result<EvolveStats> {
    let tokens: Vec<&str> = output.split_whitespace().collect();
    // Report lines are assumed to be seven whitespace-separated tokens per
    // iteration: `N. area: <a> energy: <e> scale: <s>`. The values for the
    // last iteration sit at fixed offsets from its start.
    let base = repeats.saturating_sub(1) * 7;
    let field = |offset: usize| -> Result<f64, ReplError> {
        let token = tokens.get(base + offset).ok_or_else(|| ReplError::Parse {
            context: format!("extracting evolve token {}", base + offset),
            response: output.to_string(),
        })?;
        token.parse::<f64>().map_err(|_| ReplError::Parse {
            context: format!("parsing evolve token {token:?} as a number"),
            response: output.to_string(),
        })
    };
    Ok(EvolveStats {
        area: field(2)?,
        energy: field(4)?,
        scale: field(6)?,
    })
}

/// Builder for an Evolver session over a spawned child process.
pub struct EvolverBuilder {
    executable: String,
    args: Vec<String>,
    config: ReplConfig,
}

impl EvolverBuilder {
    pub fn new(executable: impl Into<String>) -> Self {
        Self {
            executable: executable.into(),
            args: Vec::new(),
            config: ReplConfig::default(),
        }
    }

    /// Extra arguments for the child process.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Replace the whole configuration.
    pub fn config(mut self, config: ReplConfig) -> Self {
        self.config = config;
        self
    }

    /// How often the read loop re-checks the response deadline.
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.config.poll_interval = interval;
        self
    }

    /// Overall per-response deadline. `None` waits forever.
    pub fn response_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.config.response_timeout = timeout;
        self
    }

    /// Spawn the child and run the startup handshake.
    pub async fn connect(self) -> Result<Evolver<ProcessReplTransport>> {
        let mut command = Command::new(&self.executable);
        command.args(&self.args);
        let transport = ProcessReplTransport::spawn(
            command,
            self.config.poll_interval,
            self.config.response_timeout,
        )?;
        Evolver::initialize(transport, self.config).await
    }
}
