use std::path::{Path, PathBuf};

use crate::config::{ReconcileConfig, CONFIG_FILE_NAME};
use crate::error::Result;
use crate::output::OutputHandler;

/// Write `pgreconcile.toml.example` into `dir`
pub fn execute_init(dir: &Path, output: &dyn OutputHandler) -> Result<PathBuf> {
    let path = ReconcileConfig::write_sample_config(dir)?;
    output.success(&format!(
        "Created {} - rename to {} to use",
        path.display(),
        CONFIG_FILE_NAME
    ));
    Ok(path)
}
