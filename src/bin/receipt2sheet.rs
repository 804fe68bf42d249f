//! CLI binary for edgequake-receipts.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `ScanConfig` / `SheetsConfig`, asks for confirmation and prints results.

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use edgequake_receipts::pipeline::normalize;
use edgequake_receipts::{
    export_record, CategoryPolicy, Category, ColumnLayout, ExpenseRecord, ExpenseSink, FieldSet,
    GoogleSheetsSink, MemorySink, ReceiptError, ReceiptScanner, ScanConfig, ScanOutcome,
    SheetsConfig,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io::{self, BufRead, IsTerminal, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Read a receipt without saving it
  receipt2sheet scan ticket.jpg

  # Read, review and append to the expense sheet
  receipt2sheet add ticket.jpg --spreadsheet-id 1AbC... --access-token ya29...

  # Fix what the model got wrong, skip the prompt
  receipt2sheet add ticket.jpg --merchant "Farmacia Guadalajara" --amount 182.50 --yes

  # Pipe a photo from another tool
  some-camera-tool --stdout | receipt2sheet add - --yes

  # Sheet without the ingest timestamp column
  receipt2sheet add ticket.jpg --layout compact

  # Last 20 rows as JSON
  receipt2sheet history --limit 20 --json

COLUMN LAYOUTS:
  timestamped   ingest_timestamp, date, merchant, category, amount, currency (default)
  compact       date, merchant, category, amount, currency
  custom        comma-separated names, e.g. "date,merchant,amount,description"

ENVIRONMENT VARIABLES:
  GEMINI_API_KEY            Google Gemini API key (preferred when set)
  OPENAI_API_KEY            OpenAI API key
  ANTHROPIC_API_KEY         Anthropic API key
  EDGEQUAKE_LLM_PROVIDER    Override provider (gemini, openai, anthropic, ollama)
  EDGEQUAKE_MODEL           Override model ID
  RECEIPTS_SPREADSHEET_ID   Destination spreadsheet id
  RECEIPTS_WORKSHEET        Destination worksheet (default: Transacciones)
  GOOGLE_SHEETS_TOKEN       OAuth2 access token with the spreadsheets scope

SETUP:
  1. Set API key:       export GEMINI_API_KEY=...
  2. Point at a sheet:  export RECEIPTS_SPREADSHEET_ID=1AbC...
  3. Get a token:       export GOOGLE_SHEETS_TOKEN=$(gcloud auth print-access-token)
  4. Add a receipt:     receipt2sheet add ticket.jpg
"#;

/// Turn receipt photos into expense-sheet rows using Vision LLMs.
#[derive(Parser, Debug)]
#[command(
    name = "receipt2sheet",
    version,
    about = "Turn receipt photos into expense-sheet rows using Vision LLMs",
    long_about = "Read a photo of a purchase receipt with a Vision Language Model, normalise \
the extracted date, merchant, amount, currency and category, and append them as one row to a \
Google Sheet. Supports Google Gemini, OpenAI, Anthropic and any OpenAI-compatible endpoint.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// LLM model ID (e.g. gemini-2.0-flash, gpt-4.1-nano).
    #[arg(long, global = true, env = "EDGEQUAKE_MODEL")]
    model: Option<String>,

    /// LLM provider: gemini, openai, anthropic, ollama, azure.
    #[arg(long, global = true, env = "EDGEQUAKE_PROVIDER")]
    provider: Option<String>,

    /// Currency used when the receipt shows none.
    #[arg(long, global = true, env = "RECEIPTS_CURRENCY", default_value = "MXN")]
    default_currency: String,

    /// Sheet columns: timestamped, compact, or a comma-separated list.
    #[arg(long, global = true, env = "RECEIPTS_LAYOUT", default_value = "timestamped")]
    layout: ColumnLayout,

    /// Keys requested from the model.
    #[arg(long, global = true, env = "RECEIPTS_FIELDS", value_enum, default_value = "extended")]
    fields: FieldsArg,

    /// Keep categories outside the fixed list instead of replacing them with "Otros".
    #[arg(long, global = true, env = "RECEIPTS_KEEP_UNKNOWN_CATEGORY")]
    keep_unknown_category: bool,

    /// Path to a text file replacing the built-in extraction instruction.
    #[arg(long, global = true, env = "RECEIPTS_SYSTEM_PROMPT")]
    system_prompt: Option<PathBuf>,

    /// Max LLM output tokens.
    #[arg(long, global = true, env = "RECEIPTS_MAX_TOKENS", default_value_t = 1024)]
    max_tokens: usize,

    /// LLM temperature (0.0–2.0).
    #[arg(long, global = true, env = "RECEIPTS_TEMPERATURE", default_value_t = 0.1)]
    temperature: f32,

    /// LLM call timeout in seconds.
    #[arg(long, global = true, env = "RECEIPTS_API_TIMEOUT", default_value_t = 60)]
    api_timeout: u64,

    /// HTTP download timeout in seconds, for URL inputs.
    #[arg(long, global = true, env = "RECEIPTS_DOWNLOAD_TIMEOUT", default_value_t = 60)]
    download_timeout: u64,

    /// Longest image side sent to the model, in pixels.
    #[arg(long, global = true, env = "RECEIPTS_MAX_DIMENSION", default_value_t = 2000)]
    max_dimension: u32,

    /// Destination spreadsheet id (from its URL).
    #[arg(long, global = true, env = "RECEIPTS_SPREADSHEET_ID")]
    spreadsheet_id: Option<String>,

    /// Destination worksheet name.
    #[arg(long, global = true, env = "RECEIPTS_WORKSHEET", default_value = "Transacciones")]
    worksheet: String,

    /// OAuth2 access token for the Sheets API.
    #[arg(long, global = true, env = "GOOGLE_SHEETS_TOKEN", hide_env_values = true)]
    access_token: Option<String>,

    /// Output JSON instead of human-readable text.
    #[arg(long, global = true, env = "RECEIPTS_JSON")]
    json: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "RECEIPTS_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors and results.
    #[arg(short, long, global = true, env = "RECEIPTS_QUIET")]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Read a receipt and print the extracted fields. Nothing is saved.
    Scan {
        /// Image path, HTTP/HTTPS URL, or `-` for stdin.
        input: String,
    },
    /// Read a receipt, review it, and append it to the sheet.
    Add(AddArgs),
    /// Print the most recent rows of the sheet.
    History {
        /// Number of rows to show.
        #[arg(short, long, default_value_t = 10)]
        limit: usize,
    },
}

#[derive(Args, Debug)]
struct AddArgs {
    /// Image path, HTTP/HTTPS URL, or `-` for stdin.
    input: String,

    /// Save without asking for confirmation.
    #[arg(short, long, env = "RECEIPTS_YES")]
    yes: bool,

    /// Where to write the record as JSON if the sheet rejects it.
    #[arg(long, env = "RECEIPTS_EXPORT_DIR", default_value = "unsaved-receipts")]
    export_dir: PathBuf,

    /// Replace the extracted date (YYYY-MM-DD).
    #[arg(long, value_parser = parse_date)]
    date: Option<String>,

    /// Replace the extracted merchant.
    #[arg(long)]
    merchant: Option<String>,

    /// Replace the extracted total.
    #[arg(long, value_parser = parse_amount)]
    amount: Option<f64>,

    /// Replace the extracted currency code.
    #[arg(long)]
    currency: Option<String>,

    /// Replace the extracted category.
    #[arg(long, value_parser = parse_category)]
    category: Option<Category>,

    /// Replace the extracted description.
    #[arg(long)]
    description: Option<String>,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum FieldsArg {
    Basic,
    Extended,
}

impl From<FieldsArg> for FieldSet {
    fn from(v: FieldsArg) -> Self {
        match v {
            FieldsArg::Basic => FieldSet::Basic,
            FieldsArg::Extended => FieldSet::Extended,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The spinner gives all the feedback that matters, so library INFO logs
    // are hidden while it runs.
    let show_progress = !cli.quiet && !cli.json;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    match &cli.command {
        Command::Scan { input } => run_scan(&cli, input, show_progress).await,
        Command::Add(args) => run_add(&cli, args, show_progress).await,
        Command::History { limit } => run_history(&cli, *limit).await,
    }
}

// ── Commands ─────────────────────────────────────────────────────────────────

async fn run_scan(cli: &Cli, input: &str, show_progress: bool) -> Result<()> {
    let config = build_config(cli).await?;
    let scanner = ReceiptScanner::from_config(config, Arc::new(MemorySink::new()))
        .context("Could not set up the vision model")?;

    let outcome = read_receipt(&scanner, input, show_progress).await?;

    if cli.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&outcome).context("Failed to serialise result")?
        );
    } else {
        print_record(&outcome.record, &mut io::stdout())?;
        if !cli.quiet {
            print_stats(&outcome);
        }
    }
    Ok(())
}

async fn run_add(cli: &Cli, args: &AddArgs, show_progress: bool) -> Result<()> {
    if args.input == "-" && !args.yes {
        bail!("Reading the image from stdin leaves no way to confirm; pass --yes");
    }
    if !args.yes && !io::stdin().is_terminal() {
        bail!("stdin is not a terminal, cannot ask for confirmation; pass --yes");
    }

    // Fail on a missing sheet before paying for a model call.
    let sink = build_sheets_sink(cli)?;
    let config = build_config(cli).await?;
    let scanner = ReceiptScanner::from_config(config, Arc::new(sink))
        .context("Could not set up the vision model")?;

    let outcome = read_receipt(&scanner, &args.input, show_progress).await?;
    let record = apply_overrides(outcome.record.clone(), args);

    if !args.yes {
        let mut err = io::stderr();
        print_record(&record, &mut err)?;
        if !confirm(&scanner.destination())? {
            eprintln!("{} Not saved", dim("–"));
            return Ok(());
        }
    }

    match scanner.save(&record).await {
        Ok(saved) => {
            if cli.json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&saved).context("Failed to serialise result")?
                );
            } else if !cli.quiet {
                eprintln!(
                    "{} Saved {} {} {} to {}",
                    green("✔"),
                    bold(&record.merchant),
                    record.amount,
                    record.currency,
                    saved.destination
                );
            }
            Ok(())
        }
        Err(ReceiptError::NotSaved { record, source }) => {
            eprintln!("{} {}", red("✘"), red(&format!("Sheet rejected the row: {source}")));
            let path = export_record(&record, &args.export_dir)
                .context("Could not export the unsaved record either")?;
            eprintln!(
                "{} Record kept in {}; enter it by hand or retry later",
                cyan("⚠"),
                bold(&path.display().to_string())
            );
            Err(anyhow::Error::new(source).context("Receipt was not saved"))
        }
        Err(e) => Err(e).context("Receipt was not saved"),
    }
}

async fn run_history(cli: &Cli, limit: usize) -> Result<()> {
    let sink = build_sheets_sink(cli)?;
    let rows = sink
        .read_all_rows()
        .await
        .with_context(|| format!("Failed to read {}", sink.describe()))?;
    let recent = &rows[rows.len().saturating_sub(limit)..];

    if cli.json {
        println!(
            "{}",
            serde_json::to_string_pretty(recent).context("Failed to serialise rows")?
        );
        return Ok(());
    }

    let stdout = io::stdout();
    let mut out = stdout.lock();
    for row in recent {
        let cells: Vec<String> = row.cells().iter().map(|c| c.to_string()).collect();
        writeln!(out, "{}", cells.join("\t")).context("Failed to write to stdout")?;
    }
    if !cli.quiet {
        eprintln!(
            "{}",
            dim(&format!("{} of {} rows from {}", recent.len(), rows.len(), sink.describe()))
        );
    }
    Ok(())
}

// ── Helpers ──────────────────────────────────────────────────────────────────

/// Map CLI args to `ScanConfig`.
async fn build_config(cli: &Cli) -> Result<ScanConfig> {
    let mut builder = ScanConfig::builder()
        .temperature(cli.temperature)
        .max_tokens(cli.max_tokens)
        .api_timeout_secs(cli.api_timeout)
        .download_timeout_secs(cli.download_timeout)
        .max_image_dimension(cli.max_dimension)
        .fields(cli.fields.into())
        .default_currency(cli.default_currency.as_str())
        .column_layout(cli.layout.clone());

    if cli.keep_unknown_category {
        builder = builder.category_policy(CategoryPolicy::PassThrough);
    }
    if let Some(ref model) = cli.model {
        builder = builder.model(model.as_str());
    }
    if let Some(ref provider) = cli.provider {
        builder = builder.provider_name(provider.as_str());
    }
    if let Some(ref path) = cli.system_prompt {
        let prompt = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read system prompt from {:?}", path))?;
        builder = builder.system_prompt(prompt);
    }

    builder.build().context("Invalid configuration")
}

fn build_sheets_sink(cli: &Cli) -> Result<GoogleSheetsSink> {
    let Some(ref id) = cli.spreadsheet_id else {
        bail!("No spreadsheet configured; pass --spreadsheet-id or set RECEIPTS_SPREADSHEET_ID");
    };
    let Some(ref token) = cli.access_token else {
        bail!("No Sheets access token; pass --access-token or set GOOGLE_SHEETS_TOKEN");
    };
    let config = SheetsConfig::new(id.as_str(), token.as_str()).worksheet(cli.worksheet.as_str());
    GoogleSheetsSink::new(config).context("Invalid spreadsheet configuration")
}

async fn read_receipt(
    scanner: &ReceiptScanner,
    input: &str,
    show_progress: bool,
) -> Result<ScanOutcome> {
    let spinner = show_progress.then(|| {
        let bar = ProgressBar::new_spinner();
        bar.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]),
        );
        bar.set_prefix("Reading");
        bar.set_message(input.to_string());
        bar.enable_steady_tick(Duration::from_millis(80));
        bar
    });

    let result = scanner.scan(input).await;
    if let Some(bar) = spinner {
        bar.finish_and_clear();
    }
    result.with_context(|| format!("Could not read receipt '{input}'"))
}

fn apply_overrides(mut record: ExpenseRecord, args: &AddArgs) -> ExpenseRecord {
    if let Some(ref date) = args.date {
        record.date = date.clone();
    }
    if let Some(ref merchant) = args.merchant {
        record.merchant = merchant.trim().to_string();
    }
    if let Some(amount) = args.amount {
        record.amount = amount;
    }
    if let Some(ref currency) = args.currency {
        record.currency = currency.trim().to_uppercase();
    }
    if let Some(category) = args.category {
        record.category = category.to_string();
    }
    if let Some(ref description) = args.description {
        record.description = description.trim().to_string();
    }
    record
}

fn print_record(record: &ExpenseRecord, out: &mut impl Write) -> Result<()> {
    let merchant = if record.merchant.is_empty() {
        dim("(unknown)")
    } else {
        record.merchant.clone()
    };
    writeln!(out, "  {}  {}", dim("Date       "), record.date)?;
    writeln!(out, "  {}  {}", dim("Merchant   "), merchant)?;
    writeln!(out, "  {}  {:.2} {}", dim("Total      "), record.amount, record.currency)?;
    writeln!(out, "  {}  {}", dim("Category   "), record.category)?;
    if !record.description.is_empty() {
        writeln!(out, "  {}  {}", dim("Description"), record.description)?;
    }
    Ok(())
}

fn print_stats(outcome: &ScanOutcome) {
    eprintln!(
        "   {}x{} image  /  {} tokens in  /  {} tokens out  —  {}ms",
        outcome.image.width,
        outcome.image.height,
        dim(&outcome.extraction.input_tokens.to_string()),
        dim(&outcome.extraction.output_tokens.to_string()),
        outcome.duration_ms,
    );
}

fn confirm(destination: &str) -> Result<bool> {
    eprint!("{} Save to {}? [Y/n] ", cyan("?"), bold(destination));
    io::stderr().flush().ok();
    let mut answer = String::new();
    io::stdin()
        .lock()
        .read_line(&mut answer)
        .context("Failed to read answer")?;
    Ok(matches!(
        answer.trim().to_lowercase().as_str(),
        "" | "y" | "yes" | "s" | "si" | "sí"
    ))
}

// ── Value parsers ────────────────────────────────────────────────────────────

fn parse_date(s: &str) -> std::result::Result<String, String> {
    chrono::NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
        .map(|d| d.format("%Y-%m-%d").to_string())
        .map_err(|e| format!("expected YYYY-MM-DD: {e}"))
}

fn parse_amount(s: &str) -> std::result::Result<f64, String> {
    normalize::parse_amount(s).ok_or_else(|| {
        format!("expected a non-negative amount like 182.50 or 1,234.00, got '{s}'")
    })
}

fn parse_category(s: &str) -> std::result::Result<Category, String> {
    Category::parse(s).ok_or_else(|| {
        let names: Vec<&str> = Category::ALL.iter().map(|c| c.as_str()).collect();
        format!("unknown category '{s}'; expected one of {}", names.join(", "))
    })
}
