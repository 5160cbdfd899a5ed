mod cli;
mod errors;
mod fs;
mod handlers;
mod normalize;
mod paths;
mod shadow;
mod state;
mod times;

use anyhow::{Context, Result};
use clap::Parser;
use fuser::MountOption;
use tracing::info;
use tracing_subscriber::EnvFilter;

use cli::Cli;
use fs::JsonFs;
use state::MountState;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let state = MountState::load(&cli.json_file)?;
    info!(
        source = %state.source_path.display(),
        mount_point = %cli.mount_point.display(),
        "mounting"
    );

    let mut options = vec![MountOption::FSName("jsonfs".to_string())];
    if cli.allow_other {
        options.push(MountOption::AllowOther);
    }
    if cli.auto_unmount {
        options.push(MountOption::AutoUnmount);
    }

    fuser::mount2(JsonFs::new(state), &cli.mount_point, &options)
        .with_context(|| format!("Failed to mount on {}", cli.mount_point.display()))?;
    Ok(())
}
