//! Logging integration for the girder migration crates.
//!
//! Provides a helper for configuring [`tracing`]-based logging and for
//! creating per-migration spans around executor work.

/// Options for [`setup_logging`].
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// An `EnvFilter` directive string, e.g. "info" or "girder=debug".
    pub filter: String,
    /// When true, use the pretty human-readable format with file/line
    /// locations; otherwise emit structured JSON.
    pub verbose: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
            verbose: true,
        }
    }
}

/// Sets up the global tracing subscriber.
///
/// Safe to call more than once; later calls are no-ops if a subscriber is
/// already installed.
pub fn setup_logging(config: &LogConfig) {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_new(&config.filter).unwrap_or_else(|_| EnvFilter::new("info"));

    if config.verbose {
        fmt::Subscriber::builder()
            .with_env_filter(filter)
            .with_target(true)
            .with_file(true)
            .with_line_number(true)
            .pretty()
            .try_init()
            .ok();
    } else {
        fmt::Subscriber::builder()
            .with_env_filter(filter)
            .with_target(true)
            .json()
            .try_init()
            .ok();
    }
}

/// Creates a tracing span covering the application of one migration.
///
/// # Examples
///
/// ```
/// use girder_core::logging::migration_span;
///
/// let span = migration_span("0001_initial", false);
/// let _guard = span.enter();
/// tracing::info!("applying");
/// ```
pub fn migration_span(name: &str, backwards: bool) -> tracing::Span {
    tracing::info_span!("migration", name = name, backwards = backwards)
}
