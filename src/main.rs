use clap::{Parser, ValueEnum};
use serde::Serialize;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tracing_subscriber::EnvFilter;

use spool_lite::config::ServerConfig;
use spool_lite::dashboard::{run_dashboard, DashboardState};
use spool_lite::protocol::{encode_submission, Response};
use spool_lite::scheduler::Submission;
use spool_lite::shutdown::wait_for_shutdown;
use spool_lite::{SpoolError, Spooler};

#[derive(Parser, Debug)]
#[command(name = "spool-lite")]
#[command(version)]
#[command(about = "A quantum-driven print job scheduler with deadlock recovery")]
#[command(propagate_version = true)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Start the spooler server
    Server(ServerArgs),

    /// Submit a print job and wait for it to finish
    Submit(SubmitArgs),
}

// =============================================================================
// Server Arguments
// =============================================================================

#[derive(Parser, Debug)]
struct ServerArgs {
    /// Address to bind the job listener on
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Port for job submissions
    #[arg(long, default_value = "5000")]
    port: u16,

    /// Length of one scheduling quantum in milliseconds
    #[arg(long, default_value = "500")]
    quantum_ms: u64,

    /// Directory for the session journal and stop snapshots
    #[arg(long, default_value = "logs")]
    logs_dir: PathBuf,

    /// Port for the control dashboard (optional)
    #[arg(long)]
    dashboard_port: Option<u16>,

    /// Start processing immediately instead of waiting for the begin command
    #[arg(long)]
    begin: bool,
}

// =============================================================================
// Submit Arguments
// =============================================================================

#[derive(Parser, Debug)]
struct SubmitArgs {
    /// Spooler address
    #[arg(long, short = 'a', default_value = "127.0.0.1:5000")]
    addr: String,

    /// Resource type named in the request header
    #[arg(long, default_value = "paper")]
    resource: String,

    /// Return after the acknowledgement instead of waiting for completion
    #[arg(long)]
    no_wait: bool,

    /// Output format
    #[arg(long, short = 'o', default_value = "table")]
    output: OutputFormat,

    /// Lines to print
    #[arg(required = true)]
    lines: Vec<String>,
}

#[derive(Debug, Clone, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
}

#[derive(Serialize)]
struct SubmitOutput {
    queue_number: u64,
    elapsed_quanta: Option<u64>,
    operations_processed: Option<u64>,
    last_line: Option<String>,
}

// =============================================================================
// Server Implementation
// =============================================================================

async fn run_server(args: ServerArgs) -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let listen_addr: SocketAddr = format!("{}:{}", args.host, args.port).parse()?;
    let dashboard_addr: Option<SocketAddr> = match args.dashboard_port {
        Some(p) => Some(format!("{}:{}", args.host, p).parse()?),
        None => None,
    };

    let config = ServerConfig::new(listen_addr)
        .with_quantum(Duration::from_millis(args.quantum_ms))
        .with_logs_dir(args.logs_dir);

    tracing::info!(
        listen_addr = %config.listen_addr,
        dashboard_addr = ?dashboard_addr,
        quantum_ms = args.quantum_ms,
        logs_dir = %config.logs_dir.display(),
        "Starting spool-lite"
    );

    let spooler = Arc::new(Spooler::new(config));
    spooler.start_server().await?;
    if args.begin {
        spooler.begin_processing().await;
    }

    if let Some(dashboard_addr) = dashboard_addr {
        let state = DashboardState {
            spooler: spooler.clone(),
        };
        tokio::spawn(async move {
            run_dashboard(dashboard_addr, state).await;
        });
    }

    wait_for_shutdown().await?;

    if let Some(path) = spooler.stop_server().await? {
        tracing::info!(path = %path.display(), "Session log saved");
    }
    Ok(())
}

// =============================================================================
// Client Implementation
// =============================================================================

async fn handle_submit(args: SubmitArgs) -> Result<(), Box<dyn std::error::Error>> {
    // The spooler drops malformed requests without a reply, so catch them here.
    let payload = encode_submission(&args.resource, &args.lines);
    Submission::parse(&payload).map_err(SpoolError::from)?;

    let stream = TcpStream::connect(&args.addr).await?;
    let (read_half, mut write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half).lines();

    write_half
        .write_all(payload.as_bytes())
        .await?;

    let queue_number = match reader.next_line().await?.as_deref().and_then(Response::parse) {
        Some(Response::Received { queue_number }) => queue_number,
        _ => return Err("spooler did not acknowledge the request".into()),
    };

    let mut output = SubmitOutput {
        queue_number,
        elapsed_quanta: None,
        operations_processed: None,
        last_line: None,
    };

    if !args.no_wait {
        if matches!(args.output, OutputFormat::Table) {
            println!("Request accepted, queue number {}. Waiting...", queue_number);
        }
        while let Some(line) = reader.next_line().await? {
            if let Some(Response::Completed(done)) = Response::parse(&line) {
                if done.queue_number == queue_number {
                    output.elapsed_quanta = Some(done.elapsed_quanta);
                    output.operations_processed = Some(done.operations_processed);
                    output.last_line = Some(done.last_line);
                    break;
                }
            }
        }
        if output.elapsed_quanta.is_none() {
            return Err("connection closed before the request finished".into());
        }
    }

    match args.output {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        OutputFormat::Table => {
            println!("Queue Number:   {}", output.queue_number);
            if let Some(elapsed) = output.elapsed_quanta {
                println!("Elapsed Quanta: {}", elapsed);
            }
            if let Some(ops) = output.operations_processed {
                println!("Lines Printed:  {}", ops);
            }
            if let Some(last) = &output.last_line {
                println!("Last Line:      {}", last);
            }
        }
    }
    Ok(())
}

// =============================================================================
// Main Entry Point
// =============================================================================

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    match args.command {
        Commands::Server(server_args) => {
            run_server(server_args).await?;
        }
        Commands::Submit(submit_args) => {
            handle_submit(submit_args).await?;
        }
    }

    Ok(())
}
