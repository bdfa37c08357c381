use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::config::ReconcileConfig;
use crate::db::connection::{ConnectionManager, DatabaseConfig};
use crate::error::Result;
use crate::output::OutputHandler;
use crate::pipeline::{deploy, CancellationFlag, DeploymentPipeline, PhaseSelection, PipelineReport};
use crate::schema::TargetSchema;

#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    pub selection: PhaseSelection,
    pub json: bool,
    pub verbose_report: bool,
}

/// Stop between steps on Ctrl-C; the returned task is aborted once the run is over
fn install_interrupt_handler(flag: CancellationFlag) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, stopping after the current step");
            flag.store(true, Ordering::SeqCst);
        }
    })
}

/// Plan, connect, run every step, report and disconnect.
///
/// Schema and configuration errors surface before any connection is made;
/// after that only a connection failure is returned as an error. Step
/// failures are in the report.
pub async fn execute_run(
    schema: &TargetSchema,
    options: &RunOptions,
    output: &dyn OutputHandler,
) -> Result<PipelineReport> {
    let config = match ReconcileConfig::load_from_file()? {
        Some(config) => {
            info!("Loaded configuration from pgreconcile.toml");
            config
        }
        None => {
            debug!("No configuration file found, using defaults");
            ReconcileConfig::default()
        }
    };

    let cancel: CancellationFlag = Arc::new(AtomicBool::new(false));
    let pipeline = DeploymentPipeline::plan(schema, options.selection)?.with_cancellation(cancel.clone());
    info!(
        "Planned {} steps; table order: {}",
        pipeline.steps().len(),
        pipeline.creation_order().join(" -> ")
    );

    let database = DatabaseConfig::from_env()?.merge_tls_config(config.build_tls_config()?);
    let manager = ConnectionManager::new(database, config.retry_policy())?
        .with_statement_timeout(config.statement_timeout());

    let interrupt_handler = install_interrupt_handler(cancel);
    let result = deploy(&manager, &pipeline).await;
    interrupt_handler.abort();
    let report = result?;

    if options.json {
        output.data(&report.to_json()?);
    } else {
        report.render(output, options.verbose_report);
    }

    Ok(report)
}
