mod cli;
mod commands;

use clap::Parser;
use cli::{Cli, Commands};

fn main() -> anyhow::Result<()> {
    // Logs go to stderr so JSON output on stdout stays clean
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Init { owner } => commands::init::run(&owner),
        Commands::Append {
            owner,
            section,
            role,
            content,
        } => commands::append::run(&owner, &section, &role, &content),
        Commands::Compress(args) => commands::compress::run(&args),
        Commands::Show { owner, json } => commands::show::run(owner.as_deref(), json),
        Commands::History {
            owner,
            stats,
            limit,
        } => commands::history::run(&owner, stats, limit),
        Commands::Version => commands::version::run(),
    }
}
