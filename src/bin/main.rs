//! chart-repo CLI binary

use chart_repo::cli;

#[tokio::main]
async fn main() {
    human_panic::setup_panic!();
    // Exit codes:
    // 0 - Success
    // 1 - General error
    // 2 - Invalid arguments or repository URL
    // 3 - Network error or failed index request
    // 4 - Unparsable or empty repository index
    // 5 - Configuration error
    // 6 - Storage error

    if cli::run().await.is_err() {
        // cli::run() already reported the error and picked the exit code
        std::process::exit(1);
    }
}
