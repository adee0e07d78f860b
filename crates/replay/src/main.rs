//! Trellis event-log replay.
//!
//! Feeds a JSON-lines log of server broadcasts through a fresh client session
//! and prints the resulting state as JSON. Useful for reproducing a
//! divergence reported from the field without a running server.

#![cfg_attr(test, allow(unused_crate_dependencies))]

use std::io::BufRead;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::Context;
use clap::Parser;
use tracing::{info, warn};
use trellis_proto::SessionId;
use trellis_sync::{Session, SessionConfig, SessionSnapshot};

/// Replay command line arguments.
#[derive(Parser, Debug)]
#[command(name = "trellis-replay")]
#[command(about = "Replay a flow event log through a client session")]
struct Args {
	/// JSON-lines file of inbound events
	#[arg(value_name = "EVENTS")]
	events: PathBuf,

	/// Local session id, overriding the config file
	#[arg(short, long)]
	session: Option<u64>,

	/// TOML session configuration
	#[arg(short, long, value_name = "PATH")]
	config: Option<PathBuf>,

	/// Simulated time between consecutive events, in milliseconds
	#[arg(long, default_value_t = 0)]
	step_ms: u64,

	/// Verbose logging
	#[arg(short, long)]
	verbose: bool,
}

/// Result of replaying a whole log.
#[derive(Debug)]
struct Replayed {
	snapshot: SessionSnapshot,
	events: usize,
	failures: usize,
}

fn main() -> anyhow::Result<()> {
	let args = Args::parse();
	setup_tracing(args.verbose);

	let mut config = match &args.config {
		Some(path) => {
			let source =
				std::fs::read_to_string(path).with_context(|| format!("reading config {}", path.display()))?;
			SessionConfig::from_toml_str(&source).with_context(|| format!("loading config {}", path.display()))?
		}
		None => SessionConfig::default(),
	};
	if let Some(session) = args.session {
		config.local_session = SessionId(session);
	}

	let file =
		std::fs::File::open(&args.events).with_context(|| format!("opening {}", args.events.display()))?;
	let replayed = replay(
		std::io::BufReader::new(file),
		config,
		Duration::from_millis(args.step_ms),
	)?;
	info!(
		events = replayed.events,
		failures = replayed.failures,
		"replay finished"
	);

	println!("{}", serde_json::to_string_pretty(&replayed.snapshot)?);
	Ok(())
}

/// Applies every non-empty line of `input` as one inbound event.
///
/// Lines starting with `#` are comments. A line that does not decode aborts
/// the replay; reconciliation failures are counted and logged.
fn replay(input: impl BufRead, config: SessionConfig, step: Duration) -> anyhow::Result<Replayed> {
	let mut session = Session::new(config);
	let mut now = Instant::now();
	let mut events = 0;
	let mut failures = 0;

	for (index, line) in input.lines().enumerate() {
		let line = line.with_context(|| format!("reading line {}", index + 1))?;
		let trimmed = line.trim();
		if trimmed.is_empty() || trimmed.starts_with('#') {
			continue;
		}

		let inbound = trellis_proto::decode_inbound(trimmed).with_context(|| format!("decoding line {}", index + 1))?;
		let report = session.apply(inbound, now);
		for err in &report.errors {
			warn!(line = index + 1, event = report.tag, error = %err, "event did not apply cleanly");
		}
		failures += report.errors.len();
		events += 1;

		// Due moves have nowhere to go in a replay; polling only advances debug holds.
		now += step;
		session.poll(now);
	}

	Ok(Replayed {
		snapshot: session.snapshot(),
		events,
		failures,
	})
}

fn setup_tracing(verbose: bool) {
	use tracing_subscriber::EnvFilter;

	let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
		if verbose {
			EnvFilter::new("trellis_sync=trace,trellis_replay=debug,info")
		} else {
			EnvFilter::new("warn,trellis_replay=info")
		}
	});
	tracing_subscriber::fmt()
		.with_env_filter(filter)
		.with_writer(std::io::stderr)
		.init();
}
