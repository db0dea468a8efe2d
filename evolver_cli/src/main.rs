//! Drives one Surface Evolver session through the classic workflow:
//! open a datafile, evolve, refine, vertex-average, evolve again, close.
//!
//! Usage: `evolver_cli [EXECUTABLE] [DATAFILE]`
//! (defaults: `evolver`, `mound.fe`)

use anyhow::Result;
use evolver_driver::Evolver;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let mut args = std::env::args().skip(1);
    let executable = args.next().unwrap_or_else(|| "evolver".to_string());
    let data_file = args.next().unwrap_or_else(|| "mound.fe".to_string());

    info!("Starting evolver session with executable {:?}", executable);
    let mut session = Evolver::spawn(&executable).await?;

    session.open_file(&data_file).await?;

    let stats = session.evolve(1).await?;
    println!("{}", serde_json::to_string(&stats)?);

    let refined = session.refine(1).await?;
    println!("{refined}");

    let averaged = session.vertex_average(1).await?;
    println!("{averaged}");

    let stats = session.evolve(1).await?;
    println!("{}", serde_json::to_string(&stats)?);

    session.close_file().await?;
    session.close().await?;
    info!("Session finished.");
    Ok(())
}
