use std::sync::Mutex;

/// Where run reports and command results go, for both CLI and library usage
pub trait OutputHandler: Send + Sync {
    /// Display a success message
    fn success(&self, message: &str);

    /// Display an error message
    fn error(&self, message: &str);

    /// Display an info message
    fn info(&self, message: &str);

    /// Display a warning message
    fn warning(&self, message: &str);

    /// Display a heading/section title
    fn heading(&self, message: &str);

    /// One report line, e.g. `created [tables] jobs`
    fn status(&self, action: &str, message: &str);

    /// Display debug information (may be ignored in production)
    fn debug(&self, message: &str);

    /// Machine-readable payload (JSON reports, DOT graphs), written unstyled
    fn data(&self, payload: &str);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputLevel {
    Success,
    Error,
    Info,
    Warning,
    Heading,
    Status,
    Debug,
    Data,
}

/// Library output handler that collects messages
#[derive(Default)]
pub struct LibraryOutputHandler {
    messages: Mutex<Vec<(OutputLevel, String)>>,
}

impl LibraryOutputHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_messages(&self) -> Vec<(OutputLevel, String)> {
        self.messages
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Messages at one level, in order
    pub fn messages_at(&self, level: OutputLevel) -> Vec<String> {
        self.get_messages()
            .into_iter()
            .filter(|(l, _)| *l == level)
            .map(|(_, message)| message)
            .collect()
    }

    fn add_message(&self, level: OutputLevel, message: &str) {
        self.messages
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push((level, message.to_string()));
    }
}

impl OutputHandler for LibraryOutputHandler {
    fn success(&self, message: &str) {
        self.add_message(OutputLevel::Success, message);
    }

    fn error(&self, message: &str) {
        self.add_message(OutputLevel::Error, message);
    }

    fn info(&self, message: &str) {
        self.add_message(OutputLevel::Info, message);
    }

    fn warning(&self, message: &str) {
        self.add_message(OutputLevel::Warning, message);
    }

    fn heading(&self, message: &str) {
        self.add_message(OutputLevel::Heading, message);
    }

    fn status(&self, action: &str, message: &str) {
        self.add_message(OutputLevel::Status, &format!("{} {}", action, message));
    }

    fn debug(&self, message: &str) {
        self.add_message(OutputLevel::Debug, message);
    }

    fn data(&self, payload: &str) {
        self.add_message(OutputLevel::Data, payload);
    }
}

/// CLI output handler that prints to stdout with colors
#[cfg(feature = "cli")]
pub struct CliOutputHandler;

#[cfg(feature = "cli")]
impl OutputHandler for CliOutputHandler {
    fn success(&self, message: &str) {
        use owo_colors::OwoColorize;
        println!("{} {}", "✓".green(), message);
    }

    fn error(&self, message: &str) {
        use owo_colors::OwoColorize;
        println!("{} {}", "✗".red(), message.red());
    }

    fn info(&self, message: &str) {
        println!("{}", message);
    }

    fn warning(&self, message: &str) {
        use owo_colors::OwoColorize;
        println!("{} {}", "⚠".yellow(), message);
    }

    fn heading(&self, message: &str) {
        use owo_colors::OwoColorize;
        println!("\n{}", message.bold());
    }

    fn status(&self, action: &str, message: &str) {
        use owo_colors::OwoColorize;
        let action = format!("{:>10}", action);
        match action.trim() {
            "created" => println!("{} {}", action.green().bold(), message),
            "repaired" => println!("{} {}", action.cyan().bold(), message),
            _ => println!("{} {}", action.dimmed(), message),
        }
    }

    fn debug(&self, message: &str) {
        use tracing::debug;
        debug!("{}", message);
    }

    fn data(&self, payload: &str) {
        println!("{}", payload);
    }
}

/// Silent output handler that discards all output
pub struct SilentOutputHandler;

impl OutputHandler for SilentOutputHandler {
    fn success(&self, _message: &str) {}
    fn error(&self, _message: &str) {}
    fn info(&self, _message: &str) {}
    fn warning(&self, _message: &str) {}
    fn heading(&self, _message: &str) {}
    fn status(&self, _action: &str, _message: &str) {}
    fn debug(&self, _message: &str) {}
    fn data(&self, _payload: &str) {}
}
