use tracing_subscriber::{fmt, EnvFilter};

/// Used when `RUST_LOG` is unset. Electrum and TLS clients log every
/// request at info, which drowns out sync progress.
const DEFAULT_DIRECTIVES: &str = "info,electrum_client=warn,bdk_electrum=warn,rustls=warn,hyper=warn,reqwest=warn";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Compact,
    Pretty,
    Json,
}

impl LogFormat {
    /// `LIGHTKEEPER_LOG_FORMAT` (`compact`, `pretty`, `json`); `LIGHTKEEPER_LOG_JSON=1`
    /// still selects JSON.
    pub fn from_env() -> Self {
        if let Some(format) = std::env::var("LIGHTKEEPER_LOG_FORMAT").ok().and_then(|v| Self::parse(&v)) {
            return format;
        }
        match std::env::var("LIGHTKEEPER_LOG_JSON").as_deref() {
            Ok("1") => LogFormat::Json,
            _ => LogFormat::default(),
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Some(LogFormat::Compact),
            "pretty" => Some(LogFormat::Pretty),
            "json" => Some(LogFormat::Json),
            _ => None,
        }
    }
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVES))
}

/// Install the global subscriber on stderr in the format chosen by the
/// environment. Safe to call twice.
pub fn init_logging() {
    init_logging_as(LogFormat::from_env());
}

pub fn init_logging_as(format: LogFormat) {
    let builder = fmt::Subscriber::builder().with_env_filter(env_filter()).with_writer(std::io::stderr);
    let _ = match format {
        LogFormat::Json => builder.json().with_current_span(false).try_init(),
        LogFormat::Pretty => builder.pretty().try_init(),
        LogFormat::Compact => builder.compact().with_target(false).try_init(),
    };
}
