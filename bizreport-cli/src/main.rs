mod settings;

use std::fmt::Write;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{bail, Context, Result};
use clap::Parser;
use rust_decimal::Decimal;
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use bizreport_pipeline::aggregator::KpiValues;
use bizreport_pipeline::comparator::{CompareOptions, Pairing, PercentChange, Presence};
use bizreport_pipeline::report_loader::load_report_file;
use bizreport_pipeline::summary::money;
use bizreport_pipeline::types::DataWarning;
use bizreport_pipeline::{
    AnalysisOutput, ComparisonOutcome, DatasetStore, FilterSelection, PeriodComparisonPipeline, PeriodOrdering,
    ReportError, SchemaVariant, SessionState, TrafficMode,
};

use settings::{OrderKind, Settings};

// ---------------------------------------------------------------------------
// Command line
// ---------------------------------------------------------------------------

/// Compare Amazon Business Report exports period over period.
#[derive(Debug, Parser)]
#[command(name = "bizreport", version)]
struct Cli {
    /// Report CSV files, one per period.
    #[arg(required = true, value_name = "FILES")]
    files: Vec<PathBuf>,

    /// Use the B2B columns instead of the standard ones.
    #[arg(long)]
    b2b: bool,

    /// Only include these parent or child ASINs (repeatable).
    #[arg(long = "asin", value_name = "ASIN")]
    asins: Vec<String>,

    /// ASINs listed per period pair in the summary.
    #[arg(long, value_name = "N")]
    top: Option<usize>,

    /// Compare every period against the first one.
    #[arg(long)]
    baseline: bool,

    #[arg(long, value_enum)]
    order: Option<OrderKind>,

    /// Period labels to compare, in order (implies `--order explicit`).
    #[arg(long = "period", value_name = "LABEL")]
    periods: Vec<String>,

    /// A later file replaces an earlier one with the same label.
    #[arg(long)]
    replace: bool,

    /// Percent change at which an ASIN is flagged significant.
    #[arg(long, value_name = "PCT")]
    significance: Option<Decimal>,

    #[arg(long, value_name = "SYM")]
    currency: Option<String>,

    /// Settings file (default: ./bizreport.toml if present).
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Print JSON instead of text.
    #[arg(long)]
    json: bool,
}

impl Cli {
    /// Command line flags win over every other settings layer.
    fn apply_to(&self, settings: &mut Settings) {
        if self.b2b {
            settings.mode = TrafficMode::B2b;
        }
        if let Some(top) = self.top {
            settings.top_n = top;
        }
        if self.baseline {
            settings.pairing = Pairing::Baseline;
        }
        if let Some(order) = self.order {
            settings.order = order;
        } else if !self.periods.is_empty() {
            settings.order = OrderKind::Explicit;
        }
        if let Some(pct) = self.significance {
            settings.significance_pct = pct;
        }
        if let Some(currency) = &self.currency {
            settings.currency_symbol = currency.clone();
        }
    }

    fn ordering(&self, order: OrderKind) -> Result<PeriodOrdering> {
        Ok(match order {
            OrderKind::Insertion => PeriodOrdering::Insertion,
            OrderKind::Date => PeriodOrdering::FileDate,
            OrderKind::Explicit => {
                if self.periods.is_empty() {
                    bail!("explicit ordering needs at least one --period LABEL");
                }
                PeriodOrdering::Explicit(self.periods.clone())
            }
        })
    }
}

// ---------------------------------------------------------------------------
// JSON output contract
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct ReportJson<'a> {
    loaded: Vec<LoadedJson>,
    rejected: Vec<RejectedJson>,
    analysis: &'a AnalysisOutput,
}

#[derive(Serialize)]
struct LoadedJson {
    label: String,
    source_name: String,
    asins: usize,
    schema_variant: SchemaVariant,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    warnings: Vec<DataWarning>,
}

#[derive(Serialize)]
struct RejectedJson {
    file: String,
    error: String,
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

type Loaded = (DatasetStore, Vec<LoadedJson>, Vec<RejectedJson>);

/// Load every file. A file that cannot be read or parsed, or whose label is
/// taken, is logged and skipped.
fn load_files(cli: &Cli) -> Result<Loaded> {
    let mut store = DatasetStore::new();
    let mut loaded = Vec::new();
    let mut rejected = Vec::new();

    for path in &cli.files {
        let file = path.display().to_string();
        let report = match load_report_file(path) {
            Ok(report) => report,
            Err(e) if e.is_per_file() => {
                tracing::error!(file = %file, "{e}");
                rejected.push(RejectedJson {
                    file,
                    error: e.to_string(),
                });
                continue;
            }
            Err(e) => return Err(e).with_context(|| format!("loading {file}")),
        };

        for warning in &report.warnings {
            tracing::warn!(file = %file, "{warning}");
        }
        let dataset = report.dataset;
        let entry = LoadedJson {
            label: dataset.label.clone(),
            source_name: dataset.source_name.clone(),
            asins: dataset.len(),
            schema_variant: dataset.schema_variant,
            warnings: report.warnings,
        };

        if cli.replace {
            if store.add_or_replace(dataset).is_some() {
                loaded.retain(|l: &LoadedJson| l.label != entry.label);
            }
        } else {
            match store.add(dataset) {
                Ok(()) => {}
                Err(e @ ReportError::DuplicateLabel(_)) => {
                    tracing::error!(file = %file, "{e}");
                    rejected.push(RejectedJson {
                        file,
                        error: e.to_string(),
                    });
                    continue;
                }
                Err(e) => return Err(e).with_context(|| format!("loading {file}")),
            }
        }
        loaded.push(entry);
    }

    Ok((store, loaded, rejected))
}

// ---------------------------------------------------------------------------
// Human-readable output
// ---------------------------------------------------------------------------

fn rate(value: Option<Decimal>) -> String {
    value.map_or_else(|| "-".to_string(), |v| format!("{v:.2}"))
}

fn percent(change: &PercentChange) -> String {
    match change {
        PercentChange::Percent(pct) => format!("{pct:.2}%"),
        PercentChange::New => "new".to_string(),
    }
}

fn kpi_row(out: &mut String, label: &str, asins: usize, values: &KpiValues, currency: &str) {
    let _ = writeln!(
        out,
        "  {:<28} {:>6} {:>8} {:>16} {:>10} {:>8} {:>8} {:>8}",
        label,
        asins,
        values.ordered_units,
        money(values.revenue, currency),
        values.page_views,
        values.sessions_mobile,
        values.sessions_browser,
        rate(values.conversion_rate()),
    );
}

/// Period table, per-pair delta tables and the summary.
fn render_human(output: &AnalysisOutput, options: &CompareOptions, rejected: &[RejectedJson]) -> String {
    let currency = options.currency_symbol.as_str();
    let mut out = String::new();

    // Writing to a String cannot fail.
    let _ = writeln!(out);
    let _ = writeln!(out, "  Periods ({} traffic)", output.mode);
    let _ = writeln!(
        out,
        "  {:<28} {:>6} {:>8} {:>16} {:>10} {:>8} {:>8} {:>8}",
        "Label", "ASINs", "Units", "Revenue", "Views", "Mobile", "Browser", "Conv %"
    );
    for snapshot in &output.snapshots {
        let label = if snapshot.views_from_sessions {
            format!("{} (views = sessions)", snapshot.label)
        } else {
            snapshot.label.clone()
        };
        kpi_row(&mut out, &label, snapshot.per_asin.len(), &snapshot.total, currency);
    }
    for leaders in &output.leaders {
        if let Some(top) = &leaders.top {
            let flop = leaders.flop.as_deref().unwrap_or("-");
            let _ = writeln!(out, "  {}: top {top}, flop {flop}", leaders.label);
        }
    }

    match &output.outcome {
        ComparisonOutcome::NeedsMorePeriods { message, .. } => {
            let _ = writeln!(out);
            let _ = writeln!(out, "  {message}");
        }
        ComparisonOutcome::Compared(result) => {
            for pair in &result.pairs {
                let _ = writeln!(out);
                let _ = writeln!(out, "  {} -> {}", pair.previous_label, pair.current_label);
                let _ = writeln!(
                    out,
                    "  {:<14} {:<12} {:>8} {:>9} {:>16} {:>9} {:>8} {:>9}",
                    "ASIN", "", "Units", "", "Revenue", "", "Views", ""
                );
                for asin in &pair.asins {
                    let marker = match asin.presence {
                        Presence::Both if asin.significant => "*",
                        Presence::Both => "",
                        Presence::Appeared => "appeared",
                        Presence::Disappeared => "disappeared",
                    };
                    let _ = writeln!(
                        out,
                        "  {:<14} {:<12} {:>+8} {:>9} {:>16} {:>9} {:>+8} {:>9}",
                        asin.asin,
                        marker,
                        asin.deltas.ordered_units.delta,
                        percent(&asin.deltas.ordered_units.percent_change),
                        money(asin.deltas.revenue.delta, currency),
                        percent(&asin.deltas.revenue.percent_change),
                        asin.deltas.page_views.delta,
                        percent(&asin.deltas.page_views.percent_change),
                    );
                }
            }
            let _ = writeln!(out);
            for line in result.summary.lines() {
                let _ = writeln!(out, "  {line}");
            }
        }
    }

    if !rejected.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "  Skipped files:");
        for r in rejected {
            let _ = writeln!(out, "    {}: {}", r.file, r.error);
        }
    }
    out
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn init_tracing() {
    // Also routes `log` records from the pipeline crate.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();
}

/// Load, compare and render. Returns the text to print on stdout.
fn run(cli: &Cli) -> Result<String> {
    let mut settings = Settings::load(cli.config.as_deref())?;
    cli.apply_to(&mut settings);
    let ordering = cli.ordering(settings.order)?;
    let pipeline = PeriodComparisonPipeline::new(settings.compare_options());

    let (store, loaded, rejected) = load_files(cli)?;
    if store.is_empty() {
        bail!("none of the {} report files could be loaded", cli.files.len());
    }
    tracing::info!(periods = store.len(), skipped = rejected.len(), "reports loaded");

    let state = SessionState {
        store,
        selection: FilterSelection::new(&cli.asins),
        mode: settings.mode,
        ordering,
        generation: 0,
    };
    let output = pipeline.execute(&state).context("comparison failed")?;

    if cli.json {
        let report = ReportJson {
            loaded,
            rejected,
            analysis: &output,
        };
        return Ok(serde_json::to_string_pretty(&report)?);
    }
    Ok(render_human(&output, pipeline.options(), &rejected))
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing();

    match run(&cli) {
        Ok(text) => {
            println!("{text}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}
