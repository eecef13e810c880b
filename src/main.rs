//! NetPulse - command-line entry point
//!
//! Measures ping, download and upload throughput against the nearest
//! speed-test server and prints the result in the requested format.

use clap::{CommandFactory, FromArgMatches};
use netpulse::{
    cli::Cli,
    config::{display_config_summary, load_config, EnvManager},
    error::{ErrorReporter, Result},
    App, ConsoleSink,
};
use std::process;
use std::sync::Arc;

#[tokio::main]
async fn main() {
    std::panic::set_hook(Box::new(|panic_info| {
        eprintln!("Application panic: {}", panic_info);
        process::exit(99);
    }));

    let matches = Cli::command()
        .after_long_help(EnvManager::display_env_help())
        .get_matches();
    let cli = Cli::from_arg_matches(&matches).unwrap_or_else(|e| e.exit());

    if cli.version {
        println!("{}", Cli::version_line());
        return;
    }

    let reporter = ErrorReporter::new(!cli.no_color, cli.verbose || cli.debug);

    if let Err(e) = run_application(cli).await {
        reporter.report_error(&e);
        process::exit(e.exit_code());
    }
}

async fn run_application(cli: Cli) -> Result<()> {
    let config = load_config(cli)?;

    if config.verbose || config.debug {
        for warning in EnvManager::validate_current_env() {
            eprintln!("Warning: {}", warning);
        }
    }

    if config.debug {
        eprintln!(
            "{} (commit {}, built {} for {})",
            Cli::version_line(),
            env!("GIT_COMMIT"),
            env!("BUILD_TIME"),
            env!("TARGET_TRIPLE")
        );
        eprintln!("Configuration Summary:");
        eprintln!("{}", display_config_summary(&config));
        eprintln!();
    }

    let app = App::new(config).await?;
    app.run(Arc::new(ConsoleSink::new())).await?;
    Ok(())
}
