use std::path::PathBuf;
use std::process;

use clap::{Parser, ValueEnum};
use talondb::wal::recovery::LogScanner;

const EXIT_OK: i32 = 0;
const EXIT_CORRUPTION_DETECTED: i32 = 10;
const EXIT_FATAL_ERROR: i32 = 20;

#[derive(Clone, Debug, ValueEnum)]
enum OutputFormatArg {
    Text,
    Json,
}

#[derive(Parser)]
#[command(name = "talondb-wal-inspect", about = "Inspect a talondb log file")]
struct Cli {
    /// Path to the log file (e.g. mydb.db-a.wal)
    wal: PathBuf,

    /// Output format
    #[arg(long, value_enum, default_value = "text")]
    format: OutputFormatArg,

    /// The data file's last durable transaction id. Remnants at or below
    /// it are reported as a clean post-checkpoint tail instead of
    /// corruption.
    #[arg(long, default_value_t = 0)]
    baseline_tx_id: u64,
}

#[derive(Debug)]
struct RecordSummary {
    offset: usize,
    tx_id: u64,
    page_aligned_tx_size: u64,
    tx_size: u64,
    pages: u64,
    flags: u32,
}

#[derive(Debug)]
struct InspectReport {
    records: Vec<RecordSummary>,
    scan_end: usize,
    file_size: usize,
    corruption: Option<String>,
}

impl InspectReport {
    fn exit_code(&self) -> i32 {
        if self.corruption.is_some() {
            EXIT_CORRUPTION_DETECTED
        } else {
            EXIT_OK
        }
    }
}

fn inspect(log: &[u8], baseline_tx_id: u64) -> InspectReport {
    let mut scanner = LogScanner::new(log, baseline_tx_id);
    let mut records = Vec::new();
    let corruption = loop {
        let offset = scanner.pos();
        match scanner.next_record() {
            Ok(Some(view)) => {
                let header = view.header();
                records.push(RecordSummary {
                    offset,
                    tx_id: header.tx_id,
                    page_aligned_tx_size: header.page_aligned_tx_size,
                    tx_size: header.tx_size,
                    pages: header.number_of_modified_pages,
                    flags: header.flags,
                });
            }
            Ok(None) => break None,
            Err(e) => break Some(e.to_string()),
        }
    };
    InspectReport {
        records,
        scan_end: scanner.pos(),
        file_size: log.len(),
        corruption,
    }
}

fn json_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 8);
    for ch in s.chars() {
        match ch {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c.is_control() => out.push_str(&format!("\\u{:04x}", c as u32)),
            c => out.push(c),
        }
    }
    out
}

fn build_json(report: &InspectReport) -> String {
    let records = report
        .records
        .iter()
        .map(|r| {
            format!(
                "{{\"offset\":{},\"tx_id\":{},\"page_aligned_tx_size\":{},\"tx_size\":{},\"pages\":{},\"flags\":{}}}",
                r.offset, r.tx_id, r.page_aligned_tx_size, r.tx_size, r.pages, r.flags
            )
        })
        .collect::<Vec<_>>()
        .join(",");
    let corruption = report
        .corruption
        .as_ref()
        .map(|msg| format!("\"{}\"", json_escape(msg)))
        .unwrap_or_else(|| "null".to_string());
    format!(
        "{{\"schema_version\":1,\"file_size\":{},\"scan_end\":{},\"records\":[{}],\"corruption\":{},\"status\":\"{}\",\"exit_code\":{}}}",
        report.file_size,
        report.scan_end,
        records,
        corruption,
        if report.corruption.is_some() { "corrupt" } else { "ok" },
        report.exit_code()
    )
}

fn print_text(report: &InspectReport) {
    println!("log inspection summary:");
    println!("  file size: {} bytes", report.file_size);
    println!("  records: {}", report.records.len());
    for r in &report.records {
        println!(
            "  - tx {} at {:>10}: {} bytes ({} used), {} pages, flags {:#x}",
            r.tx_id, r.offset, r.page_aligned_tx_size, r.tx_size, r.pages, r.flags
        );
    }
    println!("  scan ended at offset {}", report.scan_end);
    match &report.corruption {
        Some(msg) => println!("  CORRUPT: {}", msg),
        None => println!("  tail is clean"),
    }
}

fn main() {
    let cli = Cli::parse();

    let log = std::fs::read(&cli.wal).unwrap_or_else(|e| {
        eprintln!("ERROR: failed to read {}: {}", cli.wal.display(), e);
        process::exit(EXIT_FATAL_ERROR);
    });

    let report = inspect(&log, cli.baseline_tx_id);
    match cli.format {
        OutputFormatArg::Text => print_text(&report),
        OutputFormatArg::Json => println!("{}", build_json(&report)),
    }
    process::exit(report.exit_code());
}
