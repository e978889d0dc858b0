use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

// Use mimalloc as the global allocator for the binary (non-Windows only)
#[cfg(not(windows))]
#[global_allocator]
static ALLOC: mimalloc::MiMalloc = mimalloc::MiMalloc;

mod bootstrap;
mod group;
mod protocol;
mod receiver;
mod utils;

#[derive(Parser, Debug)]
#[command(
    name = "srtla_rec",
    author,
    version,
    disable_version_flag = true,
    about = "SRTLA receiver CLI",
    override_usage = "srtla_rec [OPTIONS]"
)]
struct Cli {
    /// Print the version and exit
    #[arg(short = 'v', long = "version", action = clap::ArgAction::SetTrue)]
    print_version: bool,

    /// Port to bind the SRTLA socket to
    #[arg(long = "srtla_port", default_value_t = 5000)]
    srtla_port: u16,
    /// Hostname of the downstream SRT server
    #[arg(long = "srt_hostname", default_value = "127.0.0.1")]
    srt_hostname: String,
    /// Port of the downstream SRT server
    #[arg(long = "srt_port", default_value_t = 4001)]
    srt_port: u16,

    /// Enable verbose logging
    #[arg(long = "verbose")]
    verbose: bool,
}

// The core is a single-threaded readiness loop; a multi-threaded runtime
// buys nothing here.
#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Cli::parse();

    let filter = if args.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    if args.print_version {
        let version = env!("CARGO_PKG_VERSION");
        let git_hash = env!("GIT_HASH");
        let git_branch = env!("GIT_BRANCH");
        let git_dirty = env!("GIT_DIRTY");

        println!(
            "{} ({}@{}{}) [{}]",
            version,
            git_branch,
            git_hash,
            git_dirty,
            env!("CARGO_PKG_NAME")
        );
        return Ok(());
    }

    receiver::run_receiver(args.srtla_port, &args.srt_hostname, args.srt_port)
        .await
        .context("srtla_rec failed")
}
