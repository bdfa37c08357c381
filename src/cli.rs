use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::pipeline::Phase;

#[derive(Parser, Clone)]
#[command(name = "pgreconcile")]
#[command(about = "Bring a PostgreSQL database to its target schema, idempotently")]
#[command(version)]
pub struct Cli {
    /// Increase verbosity level (can be used multiple times)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Clone, Debug)]
pub enum Commands {
    /// Generate a sample configuration file
    Init,

    /// Reconcile the database with the target schema, then repair invalid data
    Run {
        /// Run a single phase instead of the whole pipeline
        #[arg(long, value_enum)]
        phase: Option<Phase>,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,

        /// Also list steps that changed nothing
        #[arg(long)]
        verbose_report: bool,
    },

    /// Print the table creation order without connecting
    Order {
        /// Write the dependency graph in Graphviz DOT format to the specified file
        #[arg(long)]
        output_graph: Option<PathBuf>,
    },
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
