//! Validate configuration strings

use anyhow::{Result, bail};
use std::io::{self, Write};
use tracing::debug;
use wabbit_bridge_core::{Bridge, BridgeConfig};

use crate::cli::app::CheckArgs;

const DEFAULT_OPTIONS: [&str; 2] = ["", "--quiet"];

/// Execute the check command
pub fn execute(args: CheckArgs, config: &BridgeConfig) -> Result<()> {
    let bridge = Bridge::from_config(config)?;
    let options = if args.options.is_empty() {
        DEFAULT_OPTIONS.iter().map(|s| s.to_string()).collect()
    } else {
        args.options
    };

    let failures = check_all(&bridge, &options, &mut io::stdout().lock())?;
    if failures > 0 {
        bail!("{failures} of {} configurations failed", options.len());
    }
    Ok(())
}

/// Open and close one session per configuration string, returning the failure count
pub fn check_all<W: Write>(bridge: &Bridge, options: &[String], out: &mut W) -> Result<usize> {
    let mut failures = 0;

    for config in options {
        let outcome = bridge.open(config).and_then(|learner| {
            let kind = learner.label_kind()?;
            learner.close()?;
            Ok(kind)
        });

        match outcome {
            Ok(kind) => writeln!(out, "ok    {:<10} {config:?}", kind.as_str())?,
            Err(err) => {
                debug!(config = config.as_str(), kind = %err.kind, "configuration rejected");
                failures += 1;
                writeln!(out, "fail  {config:?}: {err}")?;
            }
        }
    }

    Ok(failures)
}
