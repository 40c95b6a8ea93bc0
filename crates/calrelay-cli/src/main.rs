//! `calrelay` CLI -- resolve iCalendar feeds into scheduled-event drafts.
//!
//! ## Usage
//!
//! ```sh
//! # Resolve the next 30 days of a feed (stdin -> stdout)
//! curl -s https://example.com/club.ics | calrelay resolve
//!
//! # Resolve a fixed window from file to file
//! calrelay resolve -i club.ics -o drafts.json \
//!     --from 2024-03-01T00:00:00Z --to 2024-04-01T00:00:00Z
//!
//! # One JSON object per line, shorter descriptions
//! calrelay resolve -i club.ics --jsonl --max-description 200
//!
//! # Show what the parser made of a feed
//! calrelay inspect -i club.ics
//! ```
//!
//! Diagnostics go to stderr; set `RUST_LOG=calrelay_engine=debug` for detail.

use anyhow::{Context, Result};
use calrelay_engine::dst::DstPolicy;
use calrelay_engine::{
    parse_calendar_with, relay, resolve_with_options, CalendarComponent, ComponentKind,
    EventDraft, JsonLinesSink, ParseOptions, ResolverOptions, SinkPolicy, Window,
};
use chrono::{DateTime, Duration, Utc};
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::io::{self, Read};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "calrelay",
    version,
    about = "Resolve recurring calendar feeds into scheduled events"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve a feed into event drafts for a time window
    Resolve {
        #[command(flatten)]
        files: IoArgs,
        /// Window start, RFC 3339 (defaults to now)
        #[arg(long)]
        from: Option<String>,
        /// Window end, RFC 3339 (defaults to --from plus --days)
        #[arg(long)]
        to: Option<String>,
        /// Window length in days when --to is omitted
        #[arg(long, default_value_t = 30)]
        days: i64,
        /// Cap on occurrences expanded per recurring entry
        #[arg(long, default_value_t = ResolverOptions::default().max_instances)]
        max_instances: u16,
        /// Longest description passed on, in characters
        #[arg(long, default_value_t = SinkPolicy::default().max_description_len)]
        max_description: usize,
        /// Location used when an entry has none
        #[arg(long, default_value_t = SinkPolicy::default().default_location)]
        default_location: String,
        /// How feed-local times inside a DST gap are read
        #[arg(long, value_enum, default_value_t = GapPolicy::WallClock)]
        dst_policy: GapPolicy,
        /// Write one JSON object per line instead of a JSON array
        #[arg(long)]
        jsonl: bool,
    },
    /// Summarize the components of a feed
    Inspect {
        /// Input file (reads from stdin if omitted)
        #[arg(short, long)]
        input: Option<String>,
    },
}

#[derive(Args)]
struct IoArgs {
    /// Input file (reads from stdin if omitted)
    #[arg(short, long)]
    input: Option<String>,
    /// Output file (writes to stdout if omitted)
    #[arg(short, long)]
    output: Option<String>,
}

#[derive(Clone, Copy, ValueEnum)]
enum GapPolicy {
    Skip,
    ShiftForward,
    WallClock,
}

impl From<GapPolicy> for DstPolicy {
    fn from(policy: GapPolicy) -> Self {
        match policy {
            GapPolicy::Skip => DstPolicy::Skip,
            GapPolicy::ShiftForward => DstPolicy::ShiftForward,
            GapPolicy::WallClock => DstPolicy::WallClock,
        }
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Resolve {
            files,
            from,
            to,
            days,
            max_instances,
            max_description,
            default_location,
            dst_policy,
            jsonl,
        } => {
            let window = build_window(from.as_deref(), to.as_deref(), days)?;
            let text = read_input(files.input.as_deref())?;
            let components = parse_calendar_with(
                &text,
                &ParseOptions {
                    dst_policy: dst_policy.into(),
                },
            )
            .context("Failed to parse calendar")?;

            let options = ResolverOptions { max_instances };
            let events = resolve_with_options(&components, &window, &options)
                .context("Failed to resolve calendar")?;

            let policy = SinkPolicy {
                max_description_len: max_description,
                default_location,
            };

            let rendered = if jsonl {
                let mut sink = JsonLinesSink::new(Vec::new());
                relay(&events, &policy, &mut sink).context("Failed to write drafts")?;
                String::from_utf8(sink.into_inner()).context("Drafts are not valid UTF-8")?
            } else {
                let mut drafts: Vec<EventDraft> = Vec::new();
                relay(&events, &policy, &mut drafts)?;
                let mut json = serde_json::to_string_pretty(&drafts)?;
                json.push('\n');
                json
            };

            tracing::info!(events = events.len(), "resolved feed");
            write_output(files.output.as_deref(), &rendered)?;
        }
        Commands::Inspect { input } => {
            let text = read_input(input.as_deref())?;
            let components = parse_calendar_with(&text, &ParseOptions::default())
                .context("Failed to parse calendar")?;

            let summary: Vec<serde_json::Value> = components.iter().map(describe).collect();
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
    }

    Ok(())
}

/// Build the query window from the --from/--to/--days arguments.
///
/// - `--from` and `--to` are RFC 3339 and may use any offset
/// - `--from` alone spans `--days` days from it
/// - neither spans `--days` days from now
fn build_window(from: Option<&str>, to: Option<&str>, days: i64) -> Result<Window> {
    let start = match from {
        Some(raw) => parse_instant(raw)?,
        None => Utc::now(),
    };
    let end = match to {
        Some(raw) => parse_instant(raw)?,
        None => Duration::try_days(days)
            .and_then(|span| start.checked_add_signed(span))
            .with_context(|| format!("Window of {} days is out of range", days))?,
    };
    Window::new(start, end).context("Invalid window")
}

fn parse_instant(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .with_context(|| format!("Invalid RFC 3339 timestamp: '{}'", raw))
}

fn describe(component: &CalendarComponent) -> serde_json::Value {
    let kind = match component.kind {
        ComponentKind::Event => "event",
        ComponentKind::Todo => "todo",
        ComponentKind::Journal => "journal",
        ComponentKind::Other => "other",
    };

    serde_json::json!({
        "kind": kind,
        "summary": component.summary,
        "start": component.start,
        "recurring": component.is_recurring(),
        "rule": component.rule.as_ref().map(|rule| rule.to_string()),
        "exceptions": component.exceptions.len(),
        "overrides": component.overrides.len(),
    })
}

fn read_input(path: Option<&str>) -> Result<String> {
    match path {
        Some(path) => {
            std::fs::read_to_string(path).with_context(|| format!("Failed to read file: {}", path))
        }
        None => {
            let mut buf = String::new();
            io::stdin()
                .read_to_string(&mut buf)
                .context("Failed to read from stdin")?;
            Ok(buf)
        }
    }
}

fn write_output(path: Option<&str>, content: &str) -> Result<()> {
    match path {
        Some(path) => {
            std::fs::write(path, content)
                .with_context(|| format!("Failed to write file: {}", path))?;
        }
        None => {
            print!("{}", content);
        }
    }
    Ok(())
}
