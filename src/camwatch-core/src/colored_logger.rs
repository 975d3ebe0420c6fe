//! Colored log output with a per-component prefix
//!
//! The prefix is derived from the event's target, so poll, roster, and mock
//! service lines stay distinguishable when they share one terminal.

use owo_colors::{OwoColorize, Style};
use std::fmt;
use std::io;
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::fmt::{
    format::{FormatEvent, FormatFields, Writer},
    FmtContext,
};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Component {
    Main,
    Poll,
    Roster,
    Mock,
}

impl Component {
    pub fn as_str(&self) -> &'static str {
        match self {
            Component::Main => "MAIN",
            Component::Poll => "POLL",
            Component::Roster => "ROSTER",
            Component::Mock => "MOCK",
        }
    }

    pub fn color_style(&self) -> Style {
        match self {
            Component::Main => Style::new().cyan().bold(),
            Component::Poll => Style::new().green().bold(),
            Component::Roster => Style::new().yellow().bold(),
            Component::Mock => Style::new().magenta().bold(),
        }
    }

    /// Component owning a tracing target, if any
    pub fn from_target(target: &str) -> Option<Self> {
        if target.starts_with("camwatch_mock") {
            Some(Component::Mock)
        } else if target.starts_with("camwatch_core::scheduler") {
            Some(Component::Poll)
        } else if target.starts_with("camwatch_core::reconciler")
            || target.starts_with("camwatch_core::roster")
        {
            Some(Component::Roster)
        } else {
            None
        }
    }
}

/// Formatter writing `HH:MM:SS [PREFIX] LEVEL message`
pub struct ColoredFormatter {
    /// Used for targets that map to no component
    pub fallback: Component,
}

impl<S, N> FormatEvent<S, N> for ColoredFormatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        let metadata = event.metadata();

        let now = chrono::Local::now();
        write!(writer, "{} ", now.format("%H:%M:%S").dimmed())?;

        let component = Component::from_target(metadata.target()).unwrap_or(self.fallback);
        let prefix = format!("[{:6}]", component.as_str());
        write!(writer, "{} ", prefix.style(component.color_style()))?;

        match *metadata.level() {
            Level::ERROR => write!(writer, "{} ", "ERROR".red().bold())?,
            Level::WARN => write!(writer, "{} ", "WARN ".yellow().bold())?,
            Level::INFO => write!(writer, "{} ", "INFO ".green().bold())?,
            Level::DEBUG => write!(writer, "{} ", "DEBUG".blue().bold())?,
            Level::TRACE => write!(writer, "{} ", "TRACE".dimmed().bold())?,
        }

        ctx.field_format().format_fields(writer.by_ref(), event)?;

        writeln!(writer)
    }
}

/// Install the colored subscriber
///
/// `RUST_LOG` overrides the default level; `verbose` raises the default
/// to debug for this workspace's crates.
pub fn init_component_logger(fallback: Component, verbose: bool) -> anyhow::Result<()> {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    let default_directives = if verbose {
        "info,camwatch_core=debug,camwatch_client=debug,camwatch_mock=debug"
    } else {
        "info"
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives));

    let fmt_layer = tracing_subscriber::fmt::layer()
        .event_format(ColoredFormatter { fallback })
        .with_writer(io::stdout);

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init()?;

    Ok(())
}
