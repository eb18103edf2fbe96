use clap::Parser;
use slack_history_export::{Cli, Commands};
use tracing_subscriber::EnvFilter;

#[tokio::main(flavor = "current_thread")]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Some(Commands::FixCsv {
            input,
            output,
            validate,
            backup,
        }) => slack_history_export::commands::run_fix_csv(&input, output, validate, backup),
        None => slack_history_export::commands::run_fetch(cli.fetch).await,
    };

    if let Err(e) = result {
        tracing::error!("{}", e);
        std::process::exit(1);
    }
}
