use std::process::Stdio;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tracing::{debug, error, trace, warn};

use super::error::ReplError;

/// Byte-stream seam between the session and whatever produces the REPL
/// output. The process-backed implementation below is the only one used
/// outside of tests.
#[async_trait]
pub trait ReplTransport: Send {
    /// Write one command line (newline appended) and flush it.
    async fn send_line(&mut self, line: &str) -> Result<()>;

    /// Consume output until `delimiter` appears. Returns everything before
    /// the delimiter, whitespace-trimmed; the delimiter itself is excluded
    /// and anything after it in the same chunk is discarded.
    async fn read_until(&mut self, delimiter: &str) -> Result<String>;

    /// Terminate the child unconditionally. No graceful handshake.
    async fn shutdown(&mut self) -> Result<()>;

    /// OS pid of the child, where one exists.
    fn process_id(&self) -> Option<u32>;
}

/// Transport backed by a spawned child process with piped stdio.
///
/// The child's stdin and stdout are exclusively owned here; stderr is
/// drained by a background task so the child can never block on a full
/// stderr pipe.
#[derive(Debug)]
pub struct ProcessReplTransport {
    child: Child,
    stdin: ChildStdin,
    stdout: ChildStdout,
    poll_interval: Duration,
    response_timeout: Option<Duration>,
}

impl ProcessReplTransport {
    /// Spawn `command` with piped stdin/stdout/stderr and take ownership
    /// of its streams. `kill_on_drop` guarantees the child is terminated
    /// on every exit path, including panics.
    pub fn spawn(
        mut command: Command,
        poll_interval: Duration,
        response_timeout: Option<Duration>,
    ) -> Result<Self> {
        command
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        debug!("Spawning REPL child: {:?}", command);
        let mut child = command.spawn().map_err(ReplError::Spawn)?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| anyhow!("Failed to get stdin handle from child process"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| anyhow!("Failed to get stdout handle from child process"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| anyhow!("Failed to get stderr handle from child process"))?;

        debug!("REPL child spawned with pid {:?}", child.id());

        // Drain stderr in the background, surfacing it through the log.
        tokio::spawn(async move {
            let mut reader = BufReader::new(stderr);
            let mut line = String::new();
            loop {
                match reader.read_line(&mut line).await {
                    Ok(0) => {
                        debug!("Child stderr stream closed");
                        break;
                    }
                    Ok(_) => {
                        warn!("[child stderr] {}", line.trim_end());
                        line.clear();
                    }
                    Err(e) => {
                        error!("Error reading child stderr: {}", e);
                        break;
                    }
                }
            }
        });

        Ok(Self {
            child,
            stdin,
            stdout,
            poll_interval,
            response_timeout,
        })
    }
}

#[async_trait]
impl ReplTransport for ProcessReplTransport {
    async fn send_line(&mut self, line: &str) -> Result<()> {
        trace!("Sending line: <{}>", line);
        // The trailing newline is what makes the child execute the command.
        self.stdin.write_all(line.as_bytes()).await?;
        self.stdin.write_all(b"\n").await?;
        self.stdin.flush().await?;
        Ok(())
    }

    async fn read_until(&mut self, delimiter: &str) -> Result<String> {
        let started = Instant::now();
        let mut accumulated = String::new();
        // Where the next delimiter scan begins. Backed up before each new
        // chunk so a delimiter straddling a chunk boundary is still found.
        let mut scan_from = 0usize;
        let mut buf = [0u8; 4096];

        loop {
            if let Some(limit) = self.response_timeout {
                if started.elapsed() >= limit {
                    warn!(
                        "No delimiter {:?} within {:?}; giving up. Buffered output: <{}>",
                        delimiter,
                        limit,
                        accumulated.trim()
                    );
                    return Err(ReplError::Stall {
                        delimiter: delimiter.to_string(),
                        waited: started.elapsed(),
                    }
                    .into());
                }
            }

            // Bounded poll: wake up at least every poll_interval to
            // re-check the deadline.
            let n = match tokio::time::timeout(self.poll_interval, self.stdout.read(&mut buf)).await
            {
                Ok(Ok(0)) => {
                    warn!(
                        "Child closed stdout while waiting for {:?}. Buffered output: <{}>",
                        delimiter,
                        accumulated.trim()
                    );
                    return Err(ReplError::ChildExited.into());
                }
                Ok(Ok(n)) => n,
                Ok(Err(e)) => return Err(ReplError::Io(e).into()),
                Err(_) => continue, // nothing readable this poll
            };

            let chunk = String::from_utf8_lossy(&buf[..n]);
            trace!("Got output: <{}>", chunk);
            accumulated.push_str(&chunk);

            if let Some(pos) = accumulated[scan_from..]
                .find(delimiter)
                .map(|p| p + scan_from)
            {
                trace!("Delimiter present. Stopping.");
                return Ok(accumulated[..pos].trim().to_string());
            }

            scan_from = accumulated
                .len()
                .saturating_sub(delimiter.len().saturating_sub(1));
            while !accumulated.is_char_boundary(scan_from) {
                scan_from -= 1;
            }
        }
    }

    async fn shutdown(&mut self) -> Result<()> {
        debug!("Shutting down REPL child pid {:?}", self.child.id());
        if let Err(e) = self.child.start_kill() {
            // Already-exited children make start_kill fail; nothing to do.
            debug!("start_kill returned error (child may have exited): {}", e);
        }
        let status = self.child.wait().await?;
        debug!("REPL child reaped with status {:?}", status);
        Ok(())
    }

    fn process_id(&self) -> Option<u32> {
        self.child.id()
    }
}
