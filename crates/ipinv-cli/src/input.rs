//! Loading used ranges from arguments, files and stdin
//!
//! Every range keeps the source and line it came from so that a rejected
//! range can be reported precisely. Blank lines and `#` comments are ignored.

use anyhow::{bail, Context, Result};
use ipinv_cidr::CidrBlock;
use ipinv_set::{reserved, BlockSet};
use std::fs::File;
use std::io::{self, BufRead, BufReader};

/// One range as read from its source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangeInput {
    pub source: String,
    pub line: usize,
    pub text: String,
}

/// How the used set is assembled
#[derive(Debug, Clone, Copy)]
pub struct BuildOptions {
    /// Insert the private and loopback ranges first
    pub include_reserved: bool,
    /// Log and skip bad ranges instead of failing
    pub skip_invalid: bool,
}

/// Read one range per line
pub fn read_ranges<R: BufRead>(reader: R, source: &str) -> Result<Vec<RangeInput>> {
    let mut ranges = Vec::new();

    for (index, line) in reader.lines().enumerate() {
        let line = line.with_context(|| format!("Failed to read {}", source))?;
        let text = line.split('#').next().unwrap_or_default().trim();
        if text.is_empty() {
            continue;
        }

        ranges.push(RangeInput {
            source: source.to_string(),
            line: index + 1,
            text: text.to_string(),
        });
    }

    Ok(ranges)
}

/// Gather ranges from arguments and then from `file` (`-` for stdin)
///
/// With neither arguments nor a file, ranges are read from stdin only when
/// `stdin_by_default` is set.
pub fn collect_inputs(
    args: &[String],
    file: Option<&str>,
    stdin_by_default: bool,
) -> Result<Vec<RangeInput>> {
    let mut inputs: Vec<RangeInput> = args
        .iter()
        .enumerate()
        .map(|(index, text)| RangeInput {
            source: "argument".to_string(),
            line: index + 1,
            text: text.trim().to_string(),
        })
        .collect();

    match file {
        Some("-") => inputs.extend(read_stdin()?),
        Some(path) => {
            let reader = File::open(path).with_context(|| format!("Failed to open {}", path))?;
            inputs.extend(read_ranges(BufReader::new(reader), path)?);
        }
        None if args.is_empty() && stdin_by_default => inputs.extend(read_stdin()?),
        None => {}
    }

    tracing::debug!(count = inputs.len(), "collected ranges");
    Ok(inputs)
}

fn read_stdin() -> Result<Vec<RangeInput>> {
    tracing::debug!("reading ranges from stdin");
    read_ranges(io::stdin().lock(), "stdin")
}

/// Build the used set, reserved ranges first, then `inputs` in order
pub fn build_used_set(inputs: &[RangeInput], options: BuildOptions) -> Result<BlockSet> {
    let mut used = if options.include_reserved {
        reserved::private_ranges().context("Reserved ranges overlap")?
    } else {
        BlockSet::new()
    };

    for input in inputs {
        let inserted = CidrBlock::parse(&input.text)
            .map_err(anyhow::Error::from)
            .and_then(|block| used.insert(block).map_err(anyhow::Error::from));

        if let Err(e) = inserted {
            if options.skip_invalid {
                tracing::warn!(
                    source = %input.source,
                    line = input.line,
                    "skipping '{}': {}",
                    input.text,
                    e
                );
                continue;
            }
            bail!("{}:{}: '{}': {}", input.source, input.line, input.text, e);
        }
    }

    tracing::debug!(blocks = used.len(), "built used set");
    Ok(used)
}
