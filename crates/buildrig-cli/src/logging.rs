// Logging setup for the buildrig binary

use tracing::Level;
use tracing_subscriber::fmt;

/// Initialize the tracing subscriber; logs go to stderr so stdout stays
/// free for mirrored child output
pub fn init_logging(verbose: bool, quiet: bool) {
    let level = if quiet {
        Level::WARN
    } else if verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    fmt()
        .with_max_level(level)
        .with_target(verbose)
        .with_line_number(verbose)
        .with_writer(std::io::stderr)
        .init();
}
