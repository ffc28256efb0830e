//! DPoS Simulator server
//!
//! Hosts a multi-player RollDPoS simulation and lets an external driver
//! initialize players and inject messages over line-delimited JSON.

use clap::Parser;
use dposim_env::{HarnessContext, TokioContext};
use dposim_sim::{SimContext, SimServer, Simulator, SimulatorOptions};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "dposim")]
#[command(about = "Serve a multi-player RollDPoS simulation to an external driver", long_about = None)]
struct Args {
    /// Address to listen on
    #[arg(short, long, default_value = "127.0.0.1:50051")]
    listen: String,

    /// Base player configuration (TOML); built-in defaults when omitted
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Directory for per-player ledgers
    #[arg(short, long, default_value = "./dposim-data")]
    data_dir: PathBuf,

    /// Master seed for determinism (0 = wall clock and OS entropy)
    #[arg(short, long, default_value = "0")]
    seed: u64,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    // Initialize logging; RUST_LOG overrides --verbose
    let default_level = if args.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("DPoS Simulator v{}", env!("CARGO_PKG_VERSION"));

    let options = SimulatorOptions {
        config_path: args.config,
        data_dir: args.data_dir,
    };
    if args.seed == 0 {
        run(TokioContext::shared(), options, &args.listen).await;
    } else {
        run(SimContext::shared(args.seed), options, &args.listen).await;
    }
}

async fn run<C: HarnessContext>(ctx: Arc<C>, options: SimulatorOptions, listen: &str) {
    let seed = ctx.seed();
    let simulator = Arc::new(Simulator::new(ctx, options));

    let server = match SimServer::bind(listen, simulator.clone()).await {
        Ok(server) => server,
        Err(e) => {
            error!(listen, error = %e, "Failed to bind listener");
            std::process::exit(1);
        }
    };
    match server.local_addr() {
        Ok(addr) => info!(%addr, seed, "Listening for drivers"),
        Err(e) => info!(listen, seed, error = %e, "Listening for drivers"),
    }

    tokio::select! {
        result = server.serve() => {
            if let Err(e) = result {
                error!(error = %e, "Listener failed");
                simulator.shutdown().await;
                std::process::exit(1);
            }
        }
        _ = tokio::signal::ctrl_c() => info!("Interrupted, shutting down"),
    }
    simulator.shutdown().await;
}
