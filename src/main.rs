// Entry point and high-level CLI flow.
//
// A run consolidates every site-month folder under the data directory into
// the tabellone, then computes one delta table per requested date interval.
// Everything lands in a timestamped folder under `<directory>/exports`,
// together with the run log.
use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use chrono::Local;
use clap::Parser;
use serde::Serialize;
use tracing::{error, info};

use consolida::aggregate::{find_site_folders, load_loop_and_concat};
use consolida::cache::{flush_all_cache, Cache, CodeVersion};
use consolida::config::{ExtractionOptions, RunConfig};
use consolida::delta::{get_tabellone_delta, parse_month, DateInterval};
use consolida::error::{ConsolidaError, Result};
use consolida::logging::init_logging;
use consolida::output::{preview_table, write_csv, write_json};
use consolida::rules::{load_header_skip_rules, load_rewrite_rules};
use consolida::util::format_int;

/// Consolidate monthly site budgets into the tabellone and its deltas.
#[derive(Parser, Debug)]
#[command(name = "consolida")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Data directory holding the YYYY/<month>/<site> folders
    directory: Option<PathBuf>,

    /// TOML run configuration
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Delta interval as MM.YYYY-MM.YYYY (repeatable; prompted when absent)
    #[arg(short, long)]
    interval: Vec<String>,

    /// Skip the delta tables
    #[arg(long, conflicts_with = "interval")]
    no_delta: bool,

    /// Output folder (defaults to <directory>/exports)
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Site id to leave out (repeatable)
    #[arg(long = "exclude")]
    exclude: Vec<String>,

    /// CSV of category rewrite rules
    #[arg(long)]
    tipologie_fix: Option<PathBuf>,

    /// CSV of header rows not to read as categories
    #[arg(long)]
    tipologie_skip: Option<PathBuf>,

    /// Sum cost codes across phases
    #[arg(long)]
    sum_fasi: bool,

    /// Read every workbook again, ignoring cached results
    #[arg(long)]
    no_cache: bool,

    /// Keep cache files under this folder instead of next to the workbooks
    #[arg(long)]
    cache_root: Option<PathBuf>,

    /// Delete all cache folders before running
    #[arg(long)]
    flush_cache: bool,

    /// Rows shown in terminal previews
    #[arg(long, default_value_t = 10)]
    preview_rows: usize,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn run_config(&self) -> Result<RunConfig> {
        let mut cfg = match &self.config {
            Some(path) => RunConfig::load(path)?,
            None => RunConfig::default(),
        };
        if let Some(dir) = &self.directory {
            cfg.directory = dir.clone();
        }
        if cfg.directory.as_os_str().is_empty() {
            return Err(ConsolidaError::Config(
                "nessuna cartella dati: passare DIRECTORY o 'directory' nel file di configurazione".to_string(),
            ));
        }
        if self.output_dir.is_some() {
            cfg.output_dir = self.output_dir.clone();
        }
        cfg.excluded_commesse.extend(self.exclude.iter().cloned());
        if self.tipologie_fix.is_some() {
            cfg.tipologie_fix = self.tipologie_fix.clone();
        }
        if self.tipologie_skip.is_some() {
            cfg.tipologie_skip = self.tipologie_skip.clone();
        }
        cfg.sum_fasi |= self.sum_fasi;
        if self.no_cache {
            cfg.cache.enabled = false;
        }
        if self.cache_root.is_some() {
            cfg.cache.root = self.cache_root.clone();
        }
        Ok(cfg)
    }
}

/// Counts written to `summary.json` next to the exports.
#[derive(Debug, Serialize)]
struct RunSummary {
    directory: PathBuf,
    cartelle: usize,
    righe: usize,
    voci_incoerenti: usize,
    tipologie_corrette: usize,
    intervalli: Vec<String>,
    cache: bool,
}

/// Print `prompt` and read one trimmed line from stdin.
fn read_line(prompt: &str) -> String {
    print!("{}", prompt);
    let _ = io::stdout().flush();
    let mut buf = String::new();
    io::stdin().read_line(&mut buf).ok();
    buf.trim().to_string()
}

/// Ask for start/end months until the user stops adding intervals.
fn prompt_intervals() -> Result<Vec<DateInterval>> {
    let mut intervals = Vec::new();
    loop {
        let start = parse_month(&read_line("Inserire mese inizio in formato MM.AAAA: "))?;
        let end = parse_month(&read_line("Inserire mese fine in formato MM.AAAA: "))?;
        intervals.push(DateInterval::new(start, end, Local::now().date_naive())?);
        if read_line("Vuoi aggiungere un altro intervallo? (s/n): ").to_lowercase() != "s" {
            return Ok(intervals);
        }
    }
}

fn intervals(cli: &Cli) -> Result<Vec<DateInterval>> {
    if cli.no_delta {
        return Ok(Vec::new());
    }
    if cli.interval.is_empty() {
        return prompt_intervals();
    }
    cli.interval.iter().map(|s| DateInterval::parse_pair(s)).collect()
}

fn run(cli: &Cli) -> Result<()> {
    let cfg = cli.run_config()?;
    let intervals = intervals(cli)?;

    let tstamp = Local::now().format("%y%m%d-%H%M%S").to_string();
    let dest_dir = match intervals.as_slice() {
        [only] => cfg.exports_dir().join(format!("exported_{}_{}", only.label(), tstamp)),
        _ => cfg.exports_dir().join(format!("exported_{}", tstamp)),
    };
    let _guard = init_logging(&dest_dir, &format!("log_{}.txt", tstamp), cli.verbose)?;
    info!("Lancio estrazione da {}", cfg.directory.display());

    if cli.flush_cache {
        let root = cfg.cache.root.clone().unwrap_or_else(|| cfg.directory.clone());
        flush_all_cache(&root)?;
    }

    let skip_rules = match &cfg.tipologie_skip {
        Some(p) => load_header_skip_rules(&cfg.resolve(p))?,
        None => Default::default(),
    };
    let rewrite_rules = match &cfg.tipologie_fix {
        Some(p) => Some(load_rewrite_rules(&cfg.resolve(p))?),
        None => None,
    };
    let options = ExtractionOptions {
        sum_fasi: cfg.sum_fasi,
        skip_rules,
        ..Default::default()
    };
    let cache = Cache::new(cfg.cache.clone(), CodeVersion::current());

    let folders = find_site_folders(&cfg.directory, &cfg.excluded_commesse)?;
    info!("Cartelle da analizzare trovate: {}", format_int(folders.len()));

    let consolidation = load_loop_and_concat(&folders, &options, &cache, rewrite_rules.as_deref())?;

    let tabellone_file = dest_dir.join(format!("{}_tabellone.csv", tstamp));
    write_csv(&tabellone_file, &consolidation.records)?;
    preview_table("Tabellone", Some(&tabellone_file), &consolidation.records, cli.preview_rows);

    for interval in &intervals {
        let delta = get_tabellone_delta(&consolidation.records, interval);
        let file = dest_dir.join(format!("{}_delta_tabellone_{}.csv", tstamp, interval.label()));
        write_csv(&file, &delta)?;
        info!("Delta {}: {} righe", interval.label(), format_int(delta.len()));
        preview_table(&format!("Delta {}", interval.label()), Some(&file), &delta, cli.preview_rows);
    }

    if !consolidation.report.is_empty() {
        let file = dest_dir.join(format!("{}_voci-costo_fix_report.csv", tstamp));
        write_csv(&file, &consolidation.report)?;
        preview_table("Voci costo corrette", Some(&file), &consolidation.report, cli.preview_rows);
    }

    if let Some(rules) = &rewrite_rules {
        let file = dest_dir.join(format!("{}_report_fixed_tipologie.csv", tstamp));
        write_csv(&file, &consolidation.rewrites)?;
        write_csv(&dest_dir.join(format!("{}_tipologie-fix.csv", tstamp)), rules)?;
        preview_table("Tipologie corrette", Some(&file), &consolidation.rewrites, cli.preview_rows);
    }

    let summary = RunSummary {
        directory: cfg.directory.clone(),
        cartelle: folders.len(),
        righe: consolidation.records.len(),
        voci_incoerenti: consolidation.report.len(),
        tipologie_corrette: consolidation.rewrites.len(),
        intervalli: intervals.iter().map(|i| i.label()).collect(),
        cache: cfg.cache.enabled,
    };
    write_json(&dest_dir.join("summary.json"), &summary)?;

    info!("Esportato in {}", dest_dir.display());
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            eprintln!("Errore: {}", e);
            ExitCode::from(1)
        }
    }
}
