//! Output formatting utilities for the command line

use colored::Colorize;

/// User-facing messages printed to stdout.
///
/// # Example
///
/// ```rust
/// use chart_repo::output::Output;
///
/// Output::success("Synced 42 charts from stable");
/// Output::warning("2 asset jobs failed");
/// ```
pub struct Output;

impl Output {
    pub fn success(msg: &str) {
        println!("{} {}", "✅".green(), msg);
    }

    pub fn warning(msg: &str) {
        println!("{} {}", "⚠️".yellow(), msg);
    }

    pub fn info(msg: &str) {
        println!("{} {}", "ℹ️".blue(), msg);
    }

    /// Prints data without prefix so it stays parseable.
    pub fn result(msg: &str) {
        println!("{msg}");
    }

    pub fn list_item(msg: &str) {
        println!("  • {msg}");
    }
}

/// Progress updates printed to stderr.
pub struct Progress;

impl Progress {
    pub fn start(operation: &str) {
        eprintln!("{} {}...", "🔄".cyan(), operation);
    }

    pub fn step(msg: &str) {
        eprintln!("  {}", msg.dimmed());
    }
}

/// `repo/chart` style identifier in green
pub fn format_repo(name: &str) -> String {
    name.green().to_string()
}

pub fn format_url(url: &str) -> String {
    url.bright_blue().to_string()
}
