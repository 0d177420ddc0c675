//! Logging setup
//!
//! Everything goes to stderr through `tracing`; stdout carries the streamed
//! output of remote commands and stays untouched. Settings are resolved and
//! validated up front by [`LogSettings`], so a typo in `DOCKSHELL_LOG` or an
//! unknown format is reported instead of silently replaced.
//!
//! | Variable                    | Effect                                          |
//! |-----------------------------|-------------------------------------------------|
//! | `DOCKSHELL_LOG_FORMAT`      | `text` or `json` when no format is given        |
//! | `DOCKSHELL_LOG`             | filter directives, ahead of `RUST_LOG`          |
//! | `RUST_LOG`                  | fallback filter directives                      |
//! | `DOCKSHELL_LOG_SPAN_EVENTS` | span lifecycle events (`new,close`, `full`, ..) |

use anyhow::{anyhow, bail, Context, Result};
use std::fmt;
use std::io::{self, IsTerminal};
use std::str::FromStr;
use std::sync::Once;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

static INIT: Once = Once::new();

/// Output format of log records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Compact human-readable lines, colored on a terminal
    #[default]
    Text,
    /// One JSON object per record
    Json,
}

impl LogFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Json => "json",
        }
    }

    fn default_span_events(self) -> FmtSpan {
        match self {
            Self::Text => FmtSpan::NONE,
            Self::Json => FmtSpan::NEW | FmtSpan::CLOSE,
        }
    }
}

impl FromStr for LogFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            other => Err(anyhow!("unknown log format '{}' (expected text or json)", other)),
        }
    }
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Validated logging configuration
#[derive(Debug, Clone, PartialEq)]
pub struct LogSettings {
    pub format: LogFormat,
    /// `EnvFilter` directives, already known to parse
    pub filter: String,
    pub span_events: FmtSpan,
}

impl LogSettings {
    /// Resolve settings from the process environment
    ///
    /// An explicit `format` wins over `DOCKSHELL_LOG_FORMAT`. `default_filter`
    /// applies when neither `DOCKSHELL_LOG` nor `RUST_LOG` is set.
    pub fn from_env(format: Option<&str>, default_filter: &str) -> Result<Self> {
        Self::resolve(format, default_filter, |key| std::env::var(key).ok())
    }

    fn resolve<F>(format: Option<&str>, default_filter: &str, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let format = match format.map(str::to_string).or_else(|| lookup("DOCKSHELL_LOG_FORMAT")) {
            Some(raw) => raw.parse().context("Invalid log format")?,
            None => LogFormat::default(),
        };

        let (source, filter) = match (lookup("DOCKSHELL_LOG"), lookup("RUST_LOG")) {
            (Some(spec), _) => ("DOCKSHELL_LOG", spec),
            (None, Some(spec)) => ("RUST_LOG", spec),
            (None, None) => ("default filter", default_filter.to_string()),
        };
        EnvFilter::try_new(&filter)
            .with_context(|| format!("Invalid {} directives '{}'", source, filter))?;

        let span_events = match lookup("DOCKSHELL_LOG_SPAN_EVENTS") {
            Some(raw) => parse_span_events(&raw)?,
            None => format.default_span_events(),
        };

        Ok(Self {
            format,
            filter,
            span_events,
        })
    }
}

fn parse_span_events(raw: &str) -> Result<FmtSpan> {
    let mut events = FmtSpan::NONE;
    for token in raw.split([',', '|']).map(str::trim).filter(|t| !t.is_empty()) {
        events |= match token.to_ascii_lowercase().as_str() {
            "none" => FmtSpan::NONE,
            "new" => FmtSpan::NEW,
            "close" => FmtSpan::CLOSE,
            "enter" => FmtSpan::ENTER,
            "exit" => FmtSpan::EXIT,
            "active" => FmtSpan::ACTIVE,
            "full" => FmtSpan::FULL,
            other => bail!("unknown span event '{}' in DOCKSHELL_LOG_SPAN_EVENTS", other),
        };
    }
    Ok(events)
}

/// Install the global subscriber
///
/// Only the first call installs anything; later calls return `Ok` and leave
/// the existing subscriber in place.
pub fn init(settings: &LogSettings) -> Result<()> {
    let filter = EnvFilter::try_new(&settings.filter)
        .with_context(|| format!("Invalid log filter '{}'", settings.filter))?;

    INIT.call_once(|| {
        let layer = tracing_subscriber::fmt::layer()
            .with_span_events(settings.span_events.clone())
            .with_writer(io::stderr);

        match settings.format {
            LogFormat::Json => tracing_subscriber::registry()
                .with(layer.json().with_target(true))
                .with(filter)
                .init(),
            LogFormat::Text => tracing_subscriber::registry()
                .with(
                    layer
                        .with_target(false)
                        .with_ansi(io::stderr().is_terminal()),
                )
                .with(filter)
                .init(),
        }

        tracing::debug!(format = %settings.format, filter = %settings.filter, "Logging initialized");
    });

    Ok(())
}

/// Whether a subscriber has been installed by [`init`]
pub fn is_initialized() -> bool {
    INIT.is_completed()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let settings = LogSettings::resolve(None, "dockshell=warn", env(&[])).unwrap();
        assert_eq!(settings.format, LogFormat::Text);
        assert_eq!(settings.filter, "dockshell=warn");
        assert_eq!(settings.span_events, FmtSpan::NONE);
    }

    #[test]
    fn test_format_precedence() {
        let lookup = env(&[("DOCKSHELL_LOG_FORMAT", "json")]);
        let settings = LogSettings::resolve(None, "info", &lookup).unwrap();
        assert_eq!(settings.format, LogFormat::Json);
        assert_eq!(settings.span_events, FmtSpan::NEW | FmtSpan::CLOSE);

        let settings = LogSettings::resolve(Some("text"), "info", &lookup).unwrap();
        assert_eq!(settings.format, LogFormat::Text);
    }

    #[test]
    fn test_unknown_format_is_rejected() {
        let err = LogSettings::resolve(None, "info", env(&[("DOCKSHELL_LOG_FORMAT", "yaml")]))
            .unwrap_err();
        assert!(format!("{:#}", err).contains("yaml"), "{:#}", err);
        assert!(LogSettings::resolve(Some("xml"), "info", env(&[])).is_err());
    }

    #[test]
    fn test_filter_precedence() {
        let settings = LogSettings::resolve(
            None,
            "info",
            env(&[("DOCKSHELL_LOG", "debug"), ("RUST_LOG", "trace")]),
        )
        .unwrap();
        assert_eq!(settings.filter, "debug");

        let settings =
            LogSettings::resolve(None, "info", env(&[("RUST_LOG", "dockshell_core=trace")]))
                .unwrap();
        assert_eq!(settings.filter, "dockshell_core=trace");
    }

    #[test]
    fn test_invalid_filter_is_rejected() {
        let err = LogSettings::resolve(None, "info", env(&[("DOCKSHELL_LOG", "dockshell=loud")]))
            .unwrap_err();
        assert!(format!("{:#}", err).contains("DOCKSHELL_LOG"), "{:#}", err);
    }

    #[test]
    fn test_span_events() {
        assert_eq!(parse_span_events("none").unwrap(), FmtSpan::NONE);
        assert_eq!(
            parse_span_events("new,close").unwrap(),
            FmtSpan::NEW | FmtSpan::CLOSE
        );
        assert_eq!(
            parse_span_events("NEW | exit").unwrap(),
            FmtSpan::NEW | FmtSpan::EXIT
        );
        assert_eq!(parse_span_events("full").unwrap(), FmtSpan::FULL);
        assert!(parse_span_events("bogus").is_err());

        let settings = LogSettings::resolve(
            Some("json"),
            "info",
            env(&[("DOCKSHELL_LOG_SPAN_EVENTS", "enter")]),
        )
        .unwrap();
        assert_eq!(settings.span_events, FmtSpan::ENTER);
    }

    #[test]
    fn test_init_multiple_calls_safe() {
        let settings = LogSettings::resolve(None, "info", env(&[])).unwrap();
        assert!(init(&settings).is_ok());
        let json = LogSettings::resolve(Some("json"), "info", env(&[])).unwrap();
        assert!(init(&json).is_ok());
        assert!(is_initialized());
    }
}
