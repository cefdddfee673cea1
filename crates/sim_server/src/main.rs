//! Command-line entry point: load a world file and simulate it.

use std::path::PathBuf;

use anyhow::{Result, bail};
use clap::Parser;
use sim_server::{Server, ServerConfig};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "sim_server", about = "Multi-world simulation server")]
struct Args {
    /// World description file; an empty default world if omitted
    #[arg(short, long)]
    file: Option<PathBuf>,

    /// Number of steps to take per world (0 = until interrupted)
    #[arg(short, long, default_value_t = 0)]
    iterations: u64,

    /// Steps per second, overriding the worlds' physics settings
    #[arg(short = 'z', long)]
    update_rate: Option<f64>,

    /// Start unpaused
    #[arg(short, long)]
    run: bool,

    /// Directory holding fetched remote resources
    #[arg(long)]
    resource_cache: Option<PathBuf>,

    /// Extra resource search paths, searched before SIM_RESOURCE_PATH
    #[arg(long = "resource-path")]
    resource_paths: Vec<PathBuf>,

    /// Resolve includes in the background while the world starts
    #[arg(long)]
    parallel_download: bool,

    /// Record world statistics
    #[arg(long)]
    record: bool,

    /// Directory for recorded statistics (implies --record)
    #[arg(long)]
    record_path: Option<PathBuf>,

    /// Log at debug level
    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    fn config(&self) -> ServerConfig {
        let mut config = ServerConfig::new().with_download_in_parallel(self.parallel_download);
        if let Some(file) = &self.file {
            config = config.with_file(file);
        }
        if let Some(hz) = self.update_rate {
            config = config.with_update_rate(hz);
        }
        if let Some(dir) = &self.resource_cache {
            config = config.with_resource_cache(dir);
        }
        for path in &self.resource_paths {
            config = config.with_resource_path(path);
        }
        if self.record || self.record_path.is_some() {
            config = config.with_log_record(self.record_path.clone());
        }
        config
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    let level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive(format!("sim_server={level}").parse()?)
                .add_directive(format!("sim_system={level}").parse()?),
        )
        .init();

    let server = Server::new(args.config());
    if !server.initialized() {
        bail!("server failed to initialize");
    }
    let worlds = server.publish_world_names();
    info!(server = %server.id(), ?worlds, "server ready");

    if !server.run(true, args.iterations, !args.run) {
        bail!("server failed to run");
    }

    for index in 0..server.world_count() {
        info!(
            world = index,
            iterations = server.iteration_count(index).unwrap_or_default(),
            entities = server.entity_count(index).unwrap_or_default(),
            "final world state"
        );
    }
    Ok(())
}
