use std::path::PathBuf;
use thiserror::Error;
use tokio_postgres::error::ErrorPosition;

/// Main error type for pgreconcile
#[derive(Error, Debug)]
pub enum ReconcileError {
    // Database Connection Errors
    #[error("Failed to connect to database after {attempts} attempt(s): {message}")]
    Connection {
        attempts: u32,
        message: String,
        #[source]
        source: Option<tokio_postgres::Error>,
    },

    #[error("Invalid connection string: {0}")]
    InvalidConnectionString(String),

    #[error("Database error: {message}")]
    Database {
        message: String,
        #[source]
        source: tokio_postgres::Error,
    },

    // Target Schema Errors
    #[error("Circular dependency detected: {0}")]
    CircularDependency(String),

    #[error("Missing dependency: {table} depends on {dependency} which is not in the target schema")]
    MissingDependency {
        table: String,
        dependency: String,
    },

    #[error("Invalid target schema: {0}")]
    InvalidSchema(String),

    // Reconciliation Errors
    #[error("Schema change failed for {object}: {message}")]
    Schema {
        object: String,
        message: String,
    },

    #[error("Unsupported operation on {object}: {message}")]
    UnsupportedOperation {
        object: String,
        message: String,
    },

    // Configuration Errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Failed to load configuration from {path}: {message}")]
    ConfigLoad {
        path: PathBuf,
        message: String,
    },

    #[error("Failed to write {path}: {message}")]
    FileWrite {
        path: PathBuf,
        message: String,
        #[source]
        source: std::io::Error,
    },

    // General Errors
    #[error("Run interrupted before all steps executed")]
    Interrupted,

    #[error("{0}")]
    Other(String),
}

impl ReconcileError {
    /// Fatal errors stop the whole run; everything else becomes a `Failed` step
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ReconcileError::Connection { .. }
                | ReconcileError::InvalidConnectionString(_)
                | ReconcileError::CircularDependency(_)
                | ReconcileError::MissingDependency { .. }
                | ReconcileError::InvalidSchema(_)
                | ReconcileError::Configuration(_)
                | ReconcileError::ConfigLoad { .. }
        )
    }

    /// Process exit code for an error that escaped the run
    pub fn exit_code(&self) -> i32 {
        match self {
            ReconcileError::Connection { .. } => 2,
            ReconcileError::InvalidConnectionString(_)
            | ReconcileError::CircularDependency(_)
            | ReconcileError::MissingDependency { .. }
            | ReconcileError::InvalidSchema(_)
            | ReconcileError::Configuration(_)
            | ReconcileError::ConfigLoad { .. } => 3,
            ReconcileError::Interrupted => 130,
            _ => 1,
        }
    }

    pub fn schema(object: impl Into<String>, message: impl Into<String>) -> Self {
        ReconcileError::Schema {
            object: object.into(),
            message: message.into(),
        }
    }
}

impl From<tokio_postgres::Error> for ReconcileError {
    fn from(err: tokio_postgres::Error) -> Self {
        let message = match extract_postgres_error_details(&err) {
            Some(details) => details.summary(),
            None => err.to_string(),
        };
        ReconcileError::Database {
            message,
            source: err,
        }
    }
}

impl From<url::ParseError> for ReconcileError {
    fn from(err: url::ParseError) -> Self {
        ReconcileError::InvalidConnectionString(err.to_string())
    }
}

/// Result type alias for pgreconcile operations
pub type Result<T> = std::result::Result<T, ReconcileError>;

/// Helper trait for attaching the schema object a statement was acting on
pub trait ErrorContext<T> {
    fn object_context(self, object: &str) -> Result<T>;
}

impl<T, E> ErrorContext<T> for std::result::Result<T, E>
where
    E: Into<ReconcileError>,
{
    fn object_context(self, object: &str) -> Result<T> {
        self.map_err(|e| match e.into() {
            ReconcileError::Database { message, .. } => ReconcileError::schema(object, message),
            ReconcileError::Other(message) => ReconcileError::schema(object, message),
            err => err,
        })
    }
}

/// Helper function to format error with all its causes
pub fn format_error_chain(err: &ReconcileError) -> String {
    use std::error::Error;

    let mut output = format!("Error: {}", err);

    let mut current_err: &dyn Error = err;
    while let Some(source) = current_err.source() {
        output.push_str(&format!("\n  Caused by: {}", source));
        current_err = source;
    }

    output
}

/// Helper function to suggest fixes for common errors
pub fn suggest_fix(err: &ReconcileError) -> Option<String> {
    match err {
        ReconcileError::Connection { .. } => Some(
            "Could not connect; no schema changes were attempted.\n\
             - Check if PostgreSQL is running\n\
             - Verify DATABASE_URL or DB_HOST/DB_PORT/DB_USER/DB_PASSWORD/DB_NAME\n\
             - In production mode the server must accept TLS connections".to_string()
        ),
        ReconcileError::InvalidConnectionString(_) => Some(
            "Connection string should be in format:\n\
             postgres://[user[:password]@][host][:port][/dbname][?sslmode=...]".to_string()
        ),
        ReconcileError::CircularDependency(details) => Some(
            format!("Tables reference each other in a cycle: {}\n\
                    - Break the cycle by making one reference a later ensure-foreign-key step\n\
                    - Or remove the reference from the target schema", details)
        ),
        ReconcileError::MissingDependency { table, dependency } => Some(
            format!("Table '{}' depends on '{}' which is not declared.\n\
                    - Add '{}' to the target schema\n\
                    - Check for typos in table names", table, dependency, dependency)
        ),
        _ => None,
    }
}

#[derive(Debug)]
pub struct PostgresErrorDetails {
    pub message: String,
    pub detail: Option<String>,
    pub hint: Option<String>,
    pub position: Option<usize>,
    pub code: String,
    pub severity: String,
}

impl PostgresErrorDetails {
    /// One-line form suitable for a `Failed` step reason
    pub fn summary(&self) -> String {
        let mut out = format!("{} [{}]", self.message, self.code);
        if let Some(detail) = &self.detail {
            out.push_str(&format!(": {}", detail));
        }
        if let Some(hint) = &self.hint {
            out.push_str(&format!(" (hint: {})", hint));
        }
        out
    }
}

/// Extract detailed error information from a PostgreSQL error
pub fn extract_postgres_error_details(err: &tokio_postgres::Error) -> Option<PostgresErrorDetails> {
    let db_err = err.as_db_error()?;
    Some(PostgresErrorDetails {
        message: db_err.message().to_string(),
        detail: db_err.detail().map(|s| s.to_string()),
        hint: db_err.hint().map(|s| s.to_string()),
        position: db_err.position().map(|pos| match pos {
            ErrorPosition::Original(pos) => *pos as usize,
            ErrorPosition::Internal { position, .. } => *position as usize,
        }),
        code: db_err.code().code().to_string(),
        severity: db_err.severity().to_string(),
    })
}
