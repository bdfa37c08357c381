use std::path::Path;

use color_eyre::eyre::eyre;
use pgreconcile::{
    cli::{Cli, Commands},
    commands::{execute_init, execute_order, execute_run, RunOptions},
    error::{format_error_chain, suggest_fix, ReconcileError, Result},
    logging,
    output::CliOutputHandler,
    schema::target::recruiting_schema,
};
use tracing::{debug, info};

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    // A missing .env is fine; real environment variables still apply
    dotenvy::dotenv().ok();

    let cli = Cli::parse_args();

    // Verbosity: 0 = warn, 1 = info, 2 = debug, 3+ = trace
    logging::init(cli.verbose).map_err(|e| eyre!("failed to initialize logging: {}", e))?;

    info!("Starting pgreconcile v{}", env!("CARGO_PKG_VERSION"));
    debug!("Command: {:?}", cli.command);

    match run(cli).await {
        Ok(code) if code != 0 => std::process::exit(code),
        Ok(_) => Ok(()),
        Err(e) => {
            if matches!(e, ReconcileError::Connection { .. }) {
                logging::output::error("could not connect to the database; no steps were run");
            }
            logging::output::error(format_error_chain(&e));

            if let Some(suggestion) = suggest_fix(&e) {
                logging::output::info(suggestion);
            }

            std::process::exit(e.exit_code());
        }
    }
}

/// Dispatch the parsed command and return the process exit code
async fn run(cli: Cli) -> Result<i32> {
    let output = CliOutputHandler;
    let schema = recruiting_schema();

    match cli.command {
        Commands::Init => {
            logging::output::step("Generating sample configuration file...");
            execute_init(Path::new("."), &output)?;
            Ok(0)
        }

        Commands::Order { output_graph } => {
            execute_order(&schema, output_graph.as_deref(), &output)?;
            Ok(0)
        }

        Commands::Run { phase, json, verbose_report } => {
            if !json {
                logging::output::header(format!("Reconciling schema {}", schema.name));
            }

            let options = RunOptions {
                selection: phase.into(),
                json,
                verbose_report,
            };
            let report = execute_run(&schema, &options, &output).await?;

            if report.interrupted {
                Ok(ReconcileError::Interrupted.exit_code())
            } else {
                Ok(0)
            }
        }
    }
}
