use std::io::IsTerminal;
use tracing::Level;
use tracing_subscriber::{
    fmt::{format::FmtSpan, time::UtcTime},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

/// Initialize the logging and error reporting infrastructure
pub fn init(verbosity: u8) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // Install color-eyre panic and error handlers if available
    #[cfg(feature = "cli")]
    color_eyre::install()?;

    // Set up the logging level based on verbosity
    let log_level = match verbosity {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    // Create the env filter, allowing RUST_LOG to override
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("pgreconcile={},tokio_postgres=warn", log_level)));

    // Logs go to stderr so stdout stays clean for reports
    let is_terminal = std::io::stderr().is_terminal();

    // Set up the formatting layer
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_ansi(is_terminal)
        .with_writer(std::io::stderr)
        .with_timer(UtcTime::rfc_3339())
        .with_span_events(FmtSpan::CLOSE);

    // Combine layers and set as global subscriber
    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();

    Ok(())
}

/// Format output for CLI with colors
#[cfg(feature = "cli")]
pub mod output {
    use console::{style, Emoji};
    use std::fmt::Display;

    static CROSS: Emoji<'_, '_> = Emoji("✗ ", "[FAIL] ");
    static ARROW: Emoji<'_, '_> = Emoji("→ ", "-> ");
    static INFO: Emoji<'_, '_> = Emoji("ℹ ", "[INFO] ");

    pub fn error(message: impl Display) {
        eprintln!("{} {}", style(CROSS).red(), style(message).red());
    }

    pub fn info(message: impl Display) {
        println!("{} {}", style(INFO).blue(), message);
    }

    pub fn step(message: impl Display) {
        println!("{} {}", style(ARROW).cyan(), message);
    }

    pub fn header(message: impl Display) {
        println!("\n{}", style(message).bold().underlined());
    }
}

/// Helper to format durations in human-readable format
pub fn format_duration(duration: std::time::Duration) -> String {
    let secs = duration.as_secs();
    let millis = duration.subsec_millis();

    if secs == 0 {
        format!("{}ms", millis)
    } else if secs < 60 {
        format!("{}.{:03}s", secs, millis)
    } else {
        let mins = secs / 60;
        let secs = secs % 60;
        format!("{}m {}s", mins, secs)
    }
}
