//! CLI error handling with recovery suggestions

use crate::error::*;
use colored::Colorize;
use std::error::Error;

/// Trait for providing user-friendly error messages with recovery suggestions
pub trait CliError {
    fn user_message(&self) -> String;
    fn recovery_suggestion(&self) -> Option<String>;
}

impl CliError for ChartRepoError {
    fn user_message(&self) -> String {
        match self {
            ChartRepoError::Config(e) => format!("{} Configuration Error: {}", "⚙️".red(), e),
            ChartRepoError::Index(e) => format!("{} Repository Index Error: {}", "📇".red(), e),
            ChartRepoError::Asset(e) => format!("{} Asset Error: {}", "🖼️".red(), e),
            ChartRepoError::Storage(e) => format!("{} Storage Error: {}", "💾".red(), e),
            ChartRepoError::Io(e) => format!("{} File System Error: {}", "📁".red(), e),
            ChartRepoError::Network(e) => format!("{} Network Error: {}", "🌐".red(), e),
            ChartRepoError::Json(e) => format!("{} JSON Error: {}", "📝".red(), e),
            ChartRepoError::TomlDe(e) => format!("{} TOML Parse Error: {}", "📝".red(), e),
            ChartRepoError::TomlSer(e) => format!("{} TOML Write Error: {}", "📝".red(), e),
            ChartRepoError::Join(e) => format!("{} Internal Error: {}", "🔧".red(), e),
        }
    }

    fn recovery_suggestion(&self) -> Option<String> {
        match self {
            ChartRepoError::Config(e) => e.recovery_suggestion(),
            ChartRepoError::Index(e) => e.recovery_suggestion(),
            ChartRepoError::Storage(e) => e.recovery_suggestion(),
            ChartRepoError::Network(e) => {
                if e.is_timeout() {
                    Some(format!(
                        "{} Request timed out\n{} Increase [http] timeout in chart-repo.toml or CHART_REPO_HTTP_TIMEOUT",
                        "💡".yellow(),
                        "💡".yellow()
                    ))
                } else if e.is_connect() {
                    Some(format!(
                        "{} Cannot connect to the repository server\n{} Check the repository URL and your network settings",
                        "💡".yellow(),
                        "💡".yellow()
                    ))
                } else {
                    None
                }
            }
            ChartRepoError::Io(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
                Some(format!(
                    "{} Check file permissions of the database directory",
                    "💡".yellow()
                ))
            }
            _ => None,
        }
    }
}

impl CliError for ConfigError {
    fn user_message(&self) -> String {
        self.to_string()
    }

    fn recovery_suggestion(&self) -> Option<String> {
        match self {
            ConfigError::InvalidFile { path } => Some(format!(
                "{} Check that {} exists and is a valid TOML file",
                "💡".yellow(),
                path.display().to_string().bright_white()
            )),
            ConfigError::InvalidCaBundle { path, .. } => Some(format!(
                "{} {} must contain PEM encoded certificates",
                "💡".yellow(),
                path.display().to_string().bright_white()
            )),
            _ => None,
        }
    }
}

impl CliError for IndexError {
    fn user_message(&self) -> String {
        self.to_string()
    }

    fn recovery_suggestion(&self) -> Option<String> {
        match self {
            IndexError::InvalidRepoUrl { url } => Some(format!(
                "{} Check the repository URL: {}\n{} The URL must be absolute, e.g. https://charts.example.com",
                "💡".yellow(),
                url.bright_white(),
                "💡".yellow()
            )),
            IndexError::RepoIndexRequestFailed { status, .. } if *status == 401 || *status == 403 => {
                Some(format!(
                    "{} The repository requires credentials\n{} Set AUTHORIZATION_HEADER, e.g. \"Bearer <token>\"",
                    "💡".yellow(),
                    "💡".yellow()
                ))
            }
            IndexError::EmptyIndex { .. } => Some(format!(
                "{} The index lists no usable charts; the catalog was left unchanged",
                "💡".yellow()
            )),
            _ => None,
        }
    }
}

impl CliError for StorageError {
    fn user_message(&self) -> String {
        self.to_string()
    }

    fn recovery_suggestion(&self) -> Option<String> {
        match self {
            StorageError::InitializationFailed { .. } | StorageError::NotReady { .. } => {
                Some(format!(
                    "{} Check --database or CHART_REPO_DATABASE_PATH points to a writable location",
                    "💡".yellow()
                ))
            }
            _ => None,
        }
    }
}

/// Get exit code for error type
pub fn get_exit_code(error: &ChartRepoError) -> i32 {
    match error {
        ChartRepoError::Index(IndexError::InvalidRepoUrl { .. }) => 2,
        ChartRepoError::Network(_)
        | ChartRepoError::Index(IndexError::RepoIndexRequestFailed { .. }) => 3,
        ChartRepoError::Index(IndexError::IndexParseError { .. })
        | ChartRepoError::Index(IndexError::EmptyIndex { .. }) => 4,
        ChartRepoError::Config(_) | ChartRepoError::TomlDe(_) => 5,
        ChartRepoError::Storage(_) => 6,
        _ => 1,
    }
}

/// Print error with recovery suggestions
pub fn print_error_with_suggestions(error: &ChartRepoError) {
    log_error_details(error);

    eprintln!("{}", error.user_message());

    if let Some(suggestion) = error.recovery_suggestion() {
        eprintln!("\n{suggestion}");
    }

    eprintln!(
        "\n{} Run 'chart-repo --help' for more information",
        "ℹ️".blue()
    );

    if std::env::var("RUST_LOG")
        .map(|s| s.contains("debug"))
        .unwrap_or(false)
    {
        eprintln!("\n{} Debug information:", "🔧".dimmed());
        print_error_chain(error);
    }
}

fn log_error_details(error: &ChartRepoError) {
    let error_type = match error {
        ChartRepoError::Config(_) => "configuration",
        ChartRepoError::Index(_) => "index",
        ChartRepoError::Asset(_) => "asset",
        ChartRepoError::Storage(_) => "storage",
        ChartRepoError::Io(_) => "io",
        ChartRepoError::Network(_) => "network",
        ChartRepoError::Json(_) => "json",
        ChartRepoError::TomlDe(_) => "toml_deserialize",
        ChartRepoError::TomlSer(_) => "toml_serialize",
        ChartRepoError::Join(_) => "task",
    };

    tracing::error!(
        error_type = error_type,
        error_message = %error,
        "chart-repo operation failed"
    );

    if let ChartRepoError::Network(e) = error {
        tracing::error!(
            is_timeout = e.is_timeout(),
            is_connect = e.is_connect(),
            is_request = e.is_request(),
            "Network error details"
        );
    }
}

fn print_error_chain(error: &ChartRepoError) {
    eprintln!("• {error}");

    let mut source = error.source();
    let mut depth = 1;
    while let Some(err) = source {
        eprintln!("{}↳ {err}", "  ".repeat(depth));
        source = err.source();
        depth += 1;

        if depth > 10 {
            eprintln!("{}↳ ...", "  ".repeat(depth));
            break;
        }
    }
}
