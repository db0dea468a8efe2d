use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;
use evolver_driver::{Evolver, ReplConfig, ReplError, ReplTransport};

const DATAFILE_PROMPT: &str = "Enter new datafile name (none to continue, q to quit):";
const COMMAND_PROMPT: &str = "Enter command:";
const END_OF_INPUT: &str = "Enter command: //End Of Input";

// Scripted transport: each read_until pops the next canned chunk of child
// output and frames it against the requested delimiter, so session logic
// can be exercised without a real process.
#[derive(Debug, Default)]
struct ScriptState {
    script: VecDeque<String>,
    sent_lines: Vec<String>,
    shutdown_calls: usize,
}

#[derive(Debug, Clone)]
struct ScriptedTransport {
    state: Arc<Mutex<ScriptState>>,
}

impl ScriptedTransport {
    fn new<S: AsRef<str>>(script: &[S]) -> Self {
        Self {
            state: Arc::new(Mutex::new(ScriptState {
                script: script.iter().map(|s| s.as_ref().to_string()).collect(),
                ..Default::default()
            })),
        }
    }

    fn sent_lines(&self) -> Vec<String> {
        self.state.lock().unwrap().sent_lines.clone()
    }

    fn shutdown_calls(&self) -> usize {
        self.state.lock().unwrap().shutdown_calls
    }
}

#[async_trait]
impl ReplTransport for ScriptedTransport {
    async fn send_line(&mut self, line: &str) -> Result<()> {
        self.state.lock().unwrap().sent_lines.push(line.to_string());
        Ok(())
    }

    async fn read_until(&mut self, delimiter: &str) -> Result<String> {
        let chunk = self
            .state
            .lock()
            .unwrap()
            .script
            .pop_front()
            .ok_or(ReplError::ChildExited)?;
        match chunk.find(delimiter) {
            Some(pos) => Ok(chunk[..pos].trim().to_string()),
            None => Err(ReplError::Stall {
                delimiter: delimiter.to_string(),
                waited: std::time::Duration::from_secs(0),
            }
            .into()),
        }
    }

    async fn shutdown(&mut self) -> Result<()> {
        self.state.lock().unwrap().shutdown_calls += 1;
        Ok(())
    }

    fn process_id(&self) -> Option<u32> {
        None
    }
}

fn startup_script() -> Vec<String> {
    vec![
        format!("Surface Evolver banner\n{DATAFILE_PROMPT}"),
        COMMAND_PROMPT.to_string(),
    ]
}

async fn session_with<S: AsRef<str>>(
    script: &[S],
) -> (Evolver<ScriptedTransport>, ScriptedTransport) {
    let mut full: Vec<String> = startup_script();
    full.extend(script.iter().map(|s| s.as_ref().to_string()));
    let transport = ScriptedTransport::new(&full);
    let handle = transport.clone();
    let session = Evolver::initialize(transport, ReplConfig::default())
        .await
        .expect("startup handshake should succeed");
    (session, handle)
}

#[tokio::test]
async fn responses_are_trimmed_and_exclude_the_delimiter() -> Result<()> {
    let (mut session, _) =
        session_with(&["  total energy: 5.1  \nEnter command: leftover ignored"]).await;
    let response = session.run_command("print total_energy").await?;
    assert_eq!(response, "total energy: 5.1");
    assert!(!response.contains(COMMAND_PROMPT));
    Ok(())
}

#[tokio::test]
async fn unexpected_startup_output_fails_initialization_and_kills_the_child() {
    // The probe after the datafile prompt comes back with noise.
    let transport = ScriptedTransport::new(&[
        &format!("banner\n{DATAFILE_PROMPT}"),
        &format!("unexpected garbage\n{COMMAND_PROMPT}"),
    ]);
    let handle = transport.clone();

    let err = Evolver::initialize(transport, ReplConfig::default())
        .await
        .expect_err("noisy startup must fail");
    match err.downcast_ref::<ReplError>() {
        Some(ReplError::Initialization { output }) => {
            assert!(output.contains("unexpected garbage"));
        }
        other => panic!("expected Initialization error, got {other:?}"),
    }
    assert_eq!(handle.shutdown_calls(), 1);
}

#[tokio::test]
async fn startup_stall_also_fails_initialization() {
    // Child never emits the datafile prompt at all.
    let transport = ScriptedTransport::new(&["this is not the prompt you are looking for"]);
    let handle = transport.clone();

    let err = Evolver::initialize(transport, ReplConfig::default())
        .await
        .expect_err("promptless child must fail");
    assert!(matches!(
        err.downcast_ref::<ReplError>(),
        Some(ReplError::Initialization { .. })
    ));
    assert_eq!(handle.shutdown_calls(), 1);
}

#[tokio::test]
async fn open_file_sets_the_flag_and_reopening_is_inert() -> Result<()> {
    let (mut session, handle) = session_with(&[&format!("reading in file\n{END_OF_INPUT}")]).await;

    assert_eq!(session.working_file(), None);
    session.open_file("mound.fe").await?;
    assert_eq!(session.working_file(), Some("mound.fe"));

    let sends_before = handle.sent_lines().len();
    // Second open: no child interaction, flag unchanged.
    session.open_file("other.fe").await?;
    assert_eq!(handle.sent_lines().len(), sends_before);
    assert_eq!(session.working_file(), Some("mound.fe"));
    Ok(())
}

#[tokio::test]
async fn close_file_clears_the_flag_after_the_quit_round_trip() -> Result<()> {
    let (mut session, handle) = session_with(&[
        &format!("reading in file\n{END_OF_INPUT}"),
        &format!("quitting\n{DATAFILE_PROMPT}"),
    ])
    .await;

    session.open_file("mound.fe").await?;
    session.close_file().await?;
    assert_eq!(session.working_file(), None);
    assert_eq!(handle.sent_lines().last().map(String::as_str), Some("q"));
    Ok(())
}

#[tokio::test]
async fn evolve_extracts_stats_from_the_final_iteration() -> Result<()> {
    let report = format!(
        "1. area: 5.1 energy: 5.0 scale: 0.2\n2. area: 4.9 energy: 4.8 scale: 0.1\n{COMMAND_PROMPT}"
    );
    let (mut session, handle) = session_with(&[&report]).await;

    let stats = session.evolve(2).await?;
    assert_eq!(stats.area, 4.9);
    assert_eq!(stats.energy, 4.8);
    assert_eq!(stats.scale, 0.1);
    assert_eq!(handle.sent_lines().last().map(String::as_str), Some("g 2"));
    Ok(())
}

#[tokio::test]
async fn evolve_retries_the_read_once_when_the_report_lags() -> Result<()> {
    let (mut session, handle) = session_with(&[
        // First read hits the prompt with nothing before it.
        COMMAND_PROMPT,
        &format!("1. area: 5.1 energy: 5.0 scale: 0.2\n{COMMAND_PROMPT}"),
    ])
    .await;

    let stats = session.evolve(1).await?;
    assert_eq!(stats.area, 5.1);
    // The retry is a bare re-read: `g 1` went out exactly once.
    let sends: Vec<String> = handle
        .sent_lines()
        .into_iter()
        .filter(|l| l == "g 1")
        .collect();
    assert_eq!(sends.len(), 1);
    Ok(())
}

#[tokio::test]
async fn dump_discards_the_response() -> Result<()> {
    let (mut session, handle) = session_with(&[&format!("dumped to mound.fe.dmp\n{COMMAND_PROMPT}")]).await;
    session.dump().await?;
    assert_eq!(handle.sent_lines().last().map(String::as_str), Some("dump"));
    Ok(())
}

#[tokio::test]
async fn stalled_reads_surface_as_errors() {
    let (mut session, _) = session_with(&["output with no prompt in it"]).await;
    let err = session.run_command("g 1").await.expect_err("must stall");
    assert!(matches!(
        err.downcast_ref::<ReplError>(),
        Some(ReplError::Stall { .. })
    ));
}
