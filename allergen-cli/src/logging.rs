//! Tracing setup for the CLI

use tracing::Level;
use tracing_subscriber::EnvFilter;

/// Level selected by the number of `-v` flags
pub fn level_for(verbosity: u8) -> Level {
    match verbosity {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    }
}

/// Install a stderr subscriber; `RUST_LOG` overrides the verbosity flags
pub fn init(verbosity: u8) {
    let filter = build_env_filter(level_for(verbosity));
    // A second init (tests) leaves the first subscriber in place
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn build_env_filter(level: Level) -> EnvFilter {
    let level = level.as_str().to_lowercase();
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        // Dependencies stay at warn
        EnvFilter::new(format!("warn,allergen={level},allergen_core={level}"))
    })
}
