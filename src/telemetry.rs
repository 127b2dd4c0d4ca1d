use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::EnvFilter;

/// Environment variable holding a filter directive that overrides everything else.
pub const LOG_ENV_VAR: &str = "TREE_MIRROR_LOG";

/// Install the global tracing subscriber, writing to stderr.
///
/// `default_level` is the configured level; each `-v` raises it one step past
/// that. `TREE_MIRROR_LOG` wins over both. Calling this more than once is
/// harmless: later calls leave the first subscriber in place.
pub fn init(verbosity: u8, default_level: &str) {
    let filter = EnvFilter::builder()
        .with_default_directive(level_from_verbosity(verbosity, default_level).into())
        .with_env_var(LOG_ENV_VAR)
        .from_env_lossy();

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn level_from_verbosity(verbosity: u8, default_level: &str) -> LevelFilter {
    let configured = default_level.parse().unwrap_or(LevelFilter::INFO);
    match verbosity {
        0 => configured,
        1 => configured.max(LevelFilter::DEBUG),
        _ => LevelFilter::TRACE,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_from_verbosity() {
        assert_eq!(level_from_verbosity(0, "warn"), LevelFilter::WARN);
        assert_eq!(level_from_verbosity(0, "bogus"), LevelFilter::INFO);
        assert_eq!(level_from_verbosity(1, "warn"), LevelFilter::DEBUG);
        assert_eq!(level_from_verbosity(1, "trace"), LevelFilter::TRACE);
        assert_eq!(level_from_verbosity(3, "error"), LevelFilter::TRACE);
    }

    #[test]
    fn test_init_twice() {
        init(0, "info");
        init(2, "debug");
    }
}
