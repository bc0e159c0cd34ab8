//! Stream examples through a session

use anyhow::{Context, Result, bail};
use serde::Serialize;
use std::fs::File;
use std::io::{self, BufRead, BufReader, Write};
use std::path::Path;
use tracing::{info, warn};
use wabbit_bridge_core::{Bridge, BridgeConfig, ErrorEnvelope, Learner};

use crate::cli::app::RunArgs;

/// One output record in `--json` mode
#[derive(Debug, Serialize)]
struct Record<'a> {
    line: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    prediction: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<&'a ErrorEnvelope>,
}

/// Counts for a finished run
#[derive(Debug, Default, PartialEq)]
pub struct Summary {
    pub examples: usize,
    pub failures: usize,
}

/// Execute the run command
pub fn execute(args: RunArgs, config: &BridgeConfig) -> Result<()> {
    let bridge = Bridge::from_config(config)?;
    let mut learner = bridge
        .open(&args.options)
        .with_context(|| format!("Failed to open session with options {:?}", args.options))?;

    let reader = open_input(args.input.as_deref())?;
    let stdout = io::stdout();
    let summary = process(&mut learner, reader, &mut stdout.lock(), &args)?;
    learner.close().context("Failed to close session")?;

    info!(examples = summary.examples, failures = summary.failures, "run finished");
    if summary.failures > 0 {
        bail!("{} of {} examples failed", summary.failures, summary.examples);
    }
    Ok(())
}

fn open_input(path: Option<&Path>) -> Result<Box<dyn BufRead>> {
    match path {
        Some(path) if path != Path::new("-") => {
            let file = File::open(path)
                .with_context(|| format!("Failed to open input file {}", path.display()))?;
            Ok(Box::new(BufReader::new(file)))
        }
        _ => Ok(Box::new(BufReader::new(io::stdin()))),
    }
}

/// Run every non-blank line of `reader` through `learner`
pub fn process<R: BufRead, W: Write>(
    learner: &mut Learner,
    reader: R,
    out: &mut W,
    args: &RunArgs,
) -> Result<Summary> {
    let mut summary = Summary::default();

    for (index, line) in reader.lines().enumerate() {
        let line = line.context("Failed to read input")?;
        if line.trim().is_empty() {
            continue;
        }

        let number = index + 1;
        summary.examples += 1;
        let result = if args.learn { learner.learn(&line) } else { learner.predict(&line) };

        match result {
            Ok(prediction) => write_record(out, args.json, number, Some(prediction), None)?,
            Err(err) if args.keep_going => {
                warn!(line = number, kind = %err.kind, "example failed: {}", err.message);
                summary.failures += 1;
                write_record(out, args.json, number, None, Some(&err))?;
            }
            Err(err) => return Err(err).with_context(|| format!("Example on line {number} failed")),
        }
    }

    Ok(summary)
}

fn write_record<W: Write>(
    out: &mut W,
    json: bool,
    line: usize,
    prediction: Option<f32>,
    error: Option<&ErrorEnvelope>,
) -> Result<()> {
    if json {
        serde_json::to_writer(&mut *out, &Record { line, prediction, error })?;
        writeln!(out)?;
    } else if let Some(prediction) = prediction {
        writeln!(out, "{prediction}")?;
    } else if let Some(error) = error {
        writeln!(out, "error: {error}")?;
    }
    Ok(())
}
