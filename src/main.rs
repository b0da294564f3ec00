mod cli;
mod commands;
mod config;
mod error;
mod harness;
mod labels;
mod model;
mod scorer;
mod store;
mod truth_data;
mod util;

use anyhow::Result;
use clap::Parser;
use tracing::error;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Commands};
use crate::config::HarnessConfig;

fn main() {
    init_tracing();

    if let Err(err) = run() {
        error!(error = %err, "command failed");
        for cause in err.chain().skip(1) {
            error!(cause = %cause, "caused by");
        }
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    let config = HarnessConfig::resolve(&cli.global)?;
    let one_line = cli.global.one_line;

    match cli.command {
        Commands::Load(args) => commands::load::run(&config, args, one_line),
        Commands::Init(args) => commands::session::init(&config, args, one_line),
        Commands::Start => commands::session::start(&config, one_line),
        Commands::Step(args) => commands::session::step(&config, args, one_line),
        Commands::Stop(args) => commands::session::stop(&config, args, one_line),
        Commands::Score(args) => commands::score::run(&config, args),
        Commands::Status => commands::status::run(&config, one_line),
        Commands::Demo(args) => commands::demo::run(&config, args, one_line),
    }
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}
