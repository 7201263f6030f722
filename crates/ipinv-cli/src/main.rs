use anyhow::{bail, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use colored::Colorize;
use ipinv_cidr::CidrBlock;
use ipinv_set::BlockSet;
use serde::Serialize;
use std::io::{self, Write};
use tracing_subscriber::EnvFilter;

mod input;

use input::BuildOptions;

/// Environment variable holding the log filter
const LOG_ENV: &str = "IPINV_LOG";

/// Free IPv4 space calculator: lists the CIDR blocks not covered by used ranges
#[derive(Parser)]
#[command(name = "ipinv")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Output format
    #[arg(short, long, value_enum, default_value = "plain", global = true)]
    output: OutputFormat,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the blocks covering every address outside the used ranges
    Invert(InvertArgs),
    /// Check whether a block is covered by the used ranges
    Query(QueryArgs),
}

#[derive(Args)]
struct UsedArgs {
    /// Used ranges (e.g., 100.64.0.0/10); `invert` reads stdin when none are given
    #[arg(value_name = "RANGE")]
    ranges: Vec<String>,

    /// File with one range per line (use '-' for stdin)
    #[arg(short, long, value_name = "FILE")]
    file: Option<String>,

    /// Do not pre-load the private and loopback ranges
    #[arg(long)]
    no_reserved: bool,
}

impl UsedArgs {
    fn options(&self, skip_invalid: bool) -> BuildOptions {
        BuildOptions {
            include_reserved: !self.no_reserved,
            skip_invalid,
        }
    }
}

#[derive(Parser)]
struct InvertArgs {
    #[command(flatten)]
    used: UsedArgs,

    /// Skip malformed or overlapping ranges instead of failing
    #[arg(long)]
    skip_invalid: bool,
}

#[derive(Parser)]
struct QueryArgs {
    /// Block or address to check
    #[arg(value_name = "TARGET")]
    target: String,

    #[command(flatten)]
    used: UsedArgs,
}

#[derive(Debug, Clone, ValueEnum)]
enum OutputFormat {
    /// One block per line in CIDR notation
    Plain,
    /// Human-readable table output
    Human,
    /// JSON output (pretty-printed)
    Json,
    /// JSON output (compact)
    JsonCompact,
    /// CSV output
    Csv,
}

#[derive(Serialize)]
struct BlockRow {
    cidr: CidrBlock,
    first: String,
    last: String,
    size: u64,
}

impl From<&CidrBlock> for BlockRow {
    fn from(block: &CidrBlock) -> Self {
        Self {
            cidr: *block,
            first: block.address().to_string(),
            last: std::net::Ipv4Addr::from(block.last()).to_string(),
            size: block.size(),
        }
    }
}

#[derive(Serialize)]
struct QueryResult {
    target: CidrBlock,
    contained: bool,
    overlaps: bool,
    exact_member: bool,
    overlapping: Option<CidrBlock>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Invert(args) => handle_invert(args, cli.output)?,
        Commands::Query(args) => handle_query(args, cli.output)?,
    }

    Ok(())
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn load_used(
    args: &UsedArgs,
    options: BuildOptions,
    stdin_by_default: bool,
) -> Result<BlockSet> {
    let inputs = input::collect_inputs(&args.ranges, args.file.as_deref(), stdin_by_default)?;
    input::build_used_set(&inputs, options)
}

fn handle_invert(args: InvertArgs, format: OutputFormat) -> Result<()> {
    let used = load_used(&args.used, args.used.options(args.skip_invalid), true)?;
    let free = used.complement();
    tracing::info!(used = used.len(), free = free.len(), "inverted ranges");

    print_blocks(&free, format)
}

fn handle_query(args: QueryArgs, format: OutputFormat) -> Result<()> {
    let target = CidrBlock::parse(&args.target)?;
    if !target.is_valid() {
        bail!("Target {} is not aligned to its prefix", target);
    }

    // Only the reserved set is checked when no ranges are given
    let used = load_used(&args.used, args.used.options(false), false)?;
    let result = query(&used, target);

    print_query(&result, format)
}

fn query(used: &BlockSet, target: CidrBlock) -> QueryResult {
    QueryResult {
        target,
        contained: used.contains_block(&target),
        overlaps: used.overlaps_any(&target),
        exact_member: used.has_exact_member(&target),
        overlapping: used.overlapping(&target),
    }
}

fn print_blocks(blocks: &BlockSet, format: OutputFormat) -> Result<()> {
    let rows: Vec<BlockRow> = blocks.iter().map(BlockRow::from).collect();

    match format {
        OutputFormat::Plain => write_plain(&mut io::stdout().lock(), blocks)?,
        OutputFormat::Human => print_blocks_human(blocks, &rows),
        OutputFormat::Json => print_json(&rows, true)?,
        OutputFormat::JsonCompact => print_json(&rows, false)?,
        OutputFormat::Csv => print_csv(&rows)?,
    }
    Ok(())
}

/// One block per line in CIDR notation
fn write_plain<W: Write>(out: &mut W, blocks: &BlockSet) -> io::Result<()> {
    for block in blocks {
        writeln!(out, "{}", block)?;
    }
    out.flush()
}

fn print_blocks_human(blocks: &BlockSet, rows: &[BlockRow]) {
    println!();
    println!("{}", "Free Address Blocks".bold().cyan());
    println!("{}", "─".repeat(64).dimmed());
    println!(
        "{:<20} {:<16} {:<16} {:>10}",
        "CIDR".bold(),
        "First".bold(),
        "Last".bold(),
        "Size".bold()
    );

    for row in rows {
        println!(
            "{:<20} {:<16} {:<16} {:>10}",
            row.cidr.to_string().green(),
            row.first,
            row.last,
            row.size
        );
    }

    let addresses = blocks.address_count();
    let share = addresses as f64 / (1u64 << 32) as f64 * 100.0;
    println!("{}", "─".repeat(64).dimmed());
    println!(
        "{} blocks, {} addresses ({:.2}% of IPv4)",
        blocks.len(),
        addresses,
        share
    );
    println!();
}

fn print_query(result: &QueryResult, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Plain => println!(
            "{} contained={} overlaps={}",
            result.target, result.contained, result.overlaps
        ),
        OutputFormat::Human => print_query_human(result),
        OutputFormat::Json => print_json(result, true)?,
        OutputFormat::JsonCompact => print_json(result, false)?,
        OutputFormat::Csv => {
            let mut wtr = csv::Writer::from_writer(std::io::stdout());
            wtr.write_record(["target", "contained", "overlaps", "exact_member", "overlapping"])?;
            wtr.write_record([
                result.target.to_string(),
                result.contained.to_string(),
                result.overlaps.to_string(),
                result.exact_member.to_string(),
                result.overlapping.map_or(String::new(), |b| b.to_string()),
            ])?;
            wtr.flush()?;
        }
    }
    Ok(())
}

fn print_query_human(result: &QueryResult) {
    let yes_no = |flag: bool| if flag { "yes".green() } else { "no".red() };

    println!();
    println!("{}", "Range Query Result".bold().cyan());
    println!("{}", "─".repeat(50).dimmed());
    println!("{:>15}: {}", "Target".bold(), result.target);
    println!("{:>15}: {}", "Contained".bold(), yes_no(result.contained));
    println!("{:>15}: {}", "Overlaps".bold(), yes_no(result.overlaps));
    println!("{:>15}: {}", "Exact member".bold(), yes_no(result.exact_member));

    if let Some(ref block) = result.overlapping {
        println!("{:>15}: {}", "Overlapping".bold(), block);
    }
    println!();
}

fn print_json<T: Serialize + ?Sized>(value: &T, pretty: bool) -> Result<()> {
    if pretty {
        println!("{}", serde_json::to_string_pretty(value)?);
    } else {
        println!("{}", serde_json::to_string(value)?);
    }
    Ok(())
}

fn print_csv(rows: &[BlockRow]) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(std::io::stdout());
    for row in rows {
        wtr.serialize(row)?;
    }
    wtr.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block(s: &str) -> CidrBlock {
        CidrBlock::parse(s).unwrap()
    }

    #[test]
    fn test_cli_parsing() {
        let cli = Cli::parse_from(["ipinv", "invert", "100.64.0.0/10"]);
        assert!(matches!(cli.output, OutputFormat::Plain));
        if let Commands::Invert(args) = cli.command {
            assert_eq!(args.used.ranges, ["100.64.0.0/10"]);
            assert!(args.used.file.is_none());
            assert!(args.used.options(args.skip_invalid).include_reserved);
        } else {
            panic!("Expected Invert command");
        }
    }

    #[test]
    fn test_output_format_json() {
        let cli = Cli::parse_from(["ipinv", "--output", "json-compact", "invert", "-f", "-"]);
        assert!(matches!(cli.output, OutputFormat::JsonCompact));
    }

    #[test]
    fn test_invert_flags() {
        let cli = Cli::parse_from([
            "ipinv",
            "invert",
            "--no-reserved",
            "--skip-invalid",
            "--file",
            "used.txt",
        ]);
        if let Commands::Invert(args) = cli.command {
            assert_eq!(args.used.file, Some("used.txt".to_string()));
            let options = args.used.options(args.skip_invalid);
            assert!(!options.include_reserved);
            assert!(options.skip_invalid);
        } else {
            panic!("Expected Invert command");
        }
    }

    #[test]
    fn test_query_command() {
        let cli = Cli::parse_from(["ipinv", "query", "192.0.0.0/8", "100.64.0.0/10", "-o", "csv"]);
        assert!(matches!(cli.output, OutputFormat::Csv));
        if let Commands::Query(args) = cli.command {
            assert_eq!(args.target, "192.0.0.0/8");
            assert_eq!(args.used.ranges, ["100.64.0.0/10"]);
        } else {
            panic!("Expected Query command");
        }
    }

    #[test]
    fn test_query_rejects_skip_invalid() {
        assert!(Cli::try_parse_from(["ipinv", "query", "10.3.0.0/16", "--skip-invalid"]).is_err());
    }

    #[test]
    fn test_write_plain_one_block_per_line() {
        let used = ipinv_set::reserved::private_ranges().unwrap();
        let free = used.complement();

        let mut out = Vec::new();
        write_plain(&mut out, &free).unwrap();
        let text = String::from_utf8(out).unwrap();

        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 36);
        assert_eq!(lines[..3], ["0.0.0.0/5", "8.0.0.0/7", "11.0.0.0/8"]);
        assert_eq!(lines.last(), Some(&"224.0.0.0/3"));
        assert!(text.ends_with("224.0.0.0/3\n"));

        let mut empty = Vec::new();
        write_plain(&mut empty, &BlockSet::new().complement()).unwrap();
        assert_eq!(empty, b"0.0.0.0/0\n");
    }

    #[test]
    fn test_verbose_flag() {
        let cli = Cli::parse_from(["ipinv", "-v", "invert", "1.1.1.1"]);
        assert!(cli.verbose);
    }

    #[test]
    fn test_query_against_private_ranges() {
        let used = ipinv_set::reserved::private_ranges().unwrap();

        let inside = query(&used, block("10.3.0.0/16"));
        assert!(inside.contained);
        assert!(inside.overlaps);
        assert!(!inside.exact_member);
        assert_eq!(inside.overlapping, Some(block("10.0.0.0/8")));

        let straddling = query(&used, block("192.0.0.0/8"));
        assert!(!straddling.contained);
        assert!(straddling.overlaps);
        assert_eq!(straddling.overlapping, Some(block("192.168.0.0/16")));
    }

    #[test]
    fn test_block_row() {
        let row = BlockRow::from(&block("224.0.0.0/3"));
        assert_eq!(row.first, "224.0.0.0");
        assert_eq!(row.last, "255.255.255.255");
        assert_eq!(row.size, 1 << 29);

        let json = serde_json::to_string(&row).unwrap();
        assert_eq!(
            json,
            r#"{"cidr":"224.0.0.0/3","first":"224.0.0.0","last":"255.255.255.255","size":536870912}"#
        );
    }
}
