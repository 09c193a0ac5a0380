use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use estado_core::ExtractionResult;
use estado_finance::{
    ExpectedStatement, HttpLanguageModel, LanguageModel, StatementPipeline, evaluate, export_csv,
};
use estado_ingest::{
    DocumentClassifier, OcrTableExtractor, PdfDocument, PdftoppmRenderer, TesseractEngine,
    extract_text_layer, get_pdf_metadata, validate,
};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod auth;
mod config;
mod state;

use config::Config;

#[derive(Parser, Debug)]
#[command(
    name = "estado",
    version,
    long_version = concat!(env!("CARGO_PKG_VERSION"), " (", env!("ESTADO_BUILD_SHA"), ")"),
    about = "Extract and categorize Mexican credit card statements"
)]
struct Cli {
    /// Debug logging (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Extract metadata and categorized transactions from a statement PDF
    Process {
        pdf: PathBuf,

        /// Print the full result as JSON
        #[arg(long)]
        json: bool,

        /// Also write the transactions to a CSV file
        #[arg(long)]
        csv: Option<PathBuf>,

        /// Never call the language model
        #[arg(long)]
        no_llm: bool,
    },

    /// Check that a file is a readable PDF with at least one page
    Validate { pdf: PathBuf },

    /// Page count, size and document information of a PDF
    Info { pdf: PathBuf },

    /// Decide from the text layer whether a PDF is a CONDUSEF statement
    Classify { pdf: PathBuf },

    /// Categorize transaction descriptions
    Categorize {
        #[arg(required = true)]
        descriptions: Vec<String>,

        #[arg(long)]
        no_llm: bool,
    },

    /// Score an extraction against hand-checked expected values (JSON)
    Evaluate {
        pdf: PathBuf,

        #[arg(long)]
        expected: PathBuf,

        #[arg(long)]
        json: bool,

        #[arg(long)]
        no_llm: bool,
    },

    /// Manage ~/.estado/config.toml
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },

    /// Store language-model API keys in ~/.estado/auth.json
    Auth {
        #[command(subcommand)]
        command: AuthCommand,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigCommand {
    /// Write the default config unless one exists
    Init,
    /// Print the effective config and which external tools were found
    Show,
}

#[derive(Subcommand, Debug)]
enum AuthCommand {
    PasteOpenaiApiKey,
    PasteAnthropicToken,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Command::Process {
            pdf,
            json,
            csv,
            no_llm,
        } => {
            let config = config::load_config()?;
            let pipeline = build_pipeline(&config, no_llm)?;
            let result = pipeline.process_path(&pdf).await;

            if let Some(out) = &csv {
                export_csv(out, &result.transactions).with_context(|| format!("write {}", out.display()))?;
                info!(path = %out.display(), rows = result.transactions.len(), "transactions exported");
            }
            if json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                print_result(&pdf, &result);
            }
            return Ok(exit_code(result.success));
        }

        Command::Validate { pdf } => {
            let bytes = read_pdf(&pdf)?;
            let ok = validate(&bytes);
            println!("{}: {}", pdf.display(), if ok { "valid" } else { "invalid" });
            return Ok(exit_code(ok));
        }

        Command::Info { pdf } => {
            let bytes = read_pdf(&pdf)?;
            let meta = get_pdf_metadata(&bytes).with_context(|| format!("read {}", pdf.display()))?;
            println!("{}", serde_json::to_string_pretty(&meta)?);
        }

        Command::Classify { pdf } => {
            let bytes = read_pdf(&pdf)?;
            let doc = PdfDocument::load(&bytes).with_context(|| format!("load {}", pdf.display()))?;
            let layer = extract_text_layer(&doc);
            if !layer.has_text() {
                warn!("no text layer; scanned statements are only classified by `estado process`");
            }
            let classification = DocumentClassifier::new()?.classify(&layer.joined());
            println!("{}", serde_json::to_string_pretty(&classification)?);
        }

        Command::Categorize {
            descriptions,
            no_llm,
        } => {
            let config = config::load_config()?;
            let pipeline = build_pipeline(&config, no_llm)?;
            let refs: Vec<&str> = descriptions.iter().map(String::as_str).collect();
            let (assignments, _) = pipeline.categorizer().assign(&refs).await;
            for (desc, a) in descriptions.iter().zip(assignments) {
                println!(
                    "{:<40} {:<22} {:<14} {:.2}",
                    desc,
                    a.category.as_str(),
                    a.method.as_str(),
                    a.confidence
                );
            }
        }

        Command::Evaluate {
            pdf,
            expected,
            json,
            no_llm,
        } => {
            let text = std::fs::read_to_string(&expected)
                .with_context(|| format!("read {}", expected.display()))?;
            let want: ExpectedStatement =
                serde_json::from_str(&text).with_context(|| format!("parse {}", expected.display()))?;

            let config = config::load_config()?;
            let pipeline = build_pipeline(&config, no_llm)?;
            let result = pipeline.process_path(&pdf).await;
            let report = evaluate(&result, &want);

            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("customer     {:.1}%", report.customer.accuracy() * 100.0);
                println!("payment      {:.1}%", report.payment.accuracy() * 100.0);
                println!("balance      {:.1}%", report.balance.accuracy() * 100.0);
                let t = &report.transactions;
                println!(
                    "transactions {}/{} matched (precision {:.2}, recall {:.2}, f1 {:.2})",
                    t.matched, t.expected, t.precision, t.recall, t.f1
                );
                for m in report
                    .customer
                    .mismatches
                    .iter()
                    .chain(&report.payment.mismatches)
                    .chain(&report.balance.mismatches)
                {
                    println!(
                        "  {}: expected {}, got {}",
                        m.field,
                        m.expected,
                        m.extracted.as_deref().unwrap_or("-")
                    );
                }
                println!("overall      {:.1}%", report.overall * 100.0);
            }
        }

        Command::Config { command } => match command {
            ConfigCommand::Init => {
                let (path, written) = config::init_config()?;
                if written {
                    println!("Wrote {}", path.display());
                } else {
                    println!("Config already exists: {}", path.display());
                }
            }
            ConfigCommand::Show => {
                let config = config::load_config()?;
                println!("# {}", config::config_path()?.display());
                println!("{}", toml::to_string_pretty(&config)?);
                for tool in [
                    &config.ocr.tesseract_command,
                    &config.ocr.pdftoppm_command,
                    &config.ocr.pdftotext_command,
                ] {
                    match which::which(tool) {
                        Ok(path) => println!("# {tool}: {}", path.display()),
                        Err(_) => println!("# {tool}: not found"),
                    }
                }
                let key = auth::api_key(config.llm.provider)?;
                println!(
                    "# {} key: {}",
                    config.llm.provider.as_str(),
                    if key.is_some() { "present" } else { "missing" }
                );
            }
        },

        Command::Auth { command } => match command {
            AuthCommand::PasteOpenaiApiKey => auth::openai_paste_api_key()?,
            AuthCommand::PasteAnthropicToken => auth::anthropic_paste_token()?,
        },
    }

    Ok(ExitCode::SUCCESS)
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "estado=debug" } else { "estado=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn exit_code(ok: bool) -> ExitCode {
    if ok { ExitCode::SUCCESS } else { ExitCode::FAILURE }
}

fn read_pdf(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path).with_context(|| format!("read {}", path.display()))
}

fn build_pipeline(config: &Config, no_llm: bool) -> Result<StatementPipeline> {
    let ocr = OcrTableExtractor::new(
        Arc::new(PdftoppmRenderer::new(config.ocr.pdftoppm_command.clone())),
        Arc::new(TesseractEngine::new(config.ocr.tesseract_command.clone())),
    );
    let mut builder = StatementPipeline::builder()
        .config(config.pipeline_config(!no_llm))
        .ocr(ocr);
    if !no_llm && config.llm.enabled {
        if let Some(model) = language_model(config)? {
            builder = builder.language_model(model);
        }
    }
    builder.build().context("build extraction pipeline")
}

fn language_model(config: &Config) -> Result<Option<Arc<dyn LanguageModel>>> {
    let provider = config.llm.provider;
    let Some(key) = auth::api_key(provider)? else {
        warn!(
            provider = provider.as_str(),
            "no API key ({} or estado auth); language model disabled",
            auth::env_var(provider)
        );
        return Ok(None);
    };
    let mut model = HttpLanguageModel::new(provider, config.llm.model_name(), Some(key))
        .with_temperature(config.llm.temperature)
        .with_max_tokens(config.llm.max_tokens)
        .with_request_timeout(Duration::from_secs(config.pipeline.llm_timeout_secs));
    if let Some(url) = &config.llm.base_url {
        model = model.with_base_url(url.clone());
    }
    Ok(Some(Arc::new(model)))
}

fn print_result(pdf: &Path, result: &ExtractionResult) {
    println!("{}", pdf.display());
    println!(
        "  {} via {} (confidence {:.2})",
        if result.success { "extracted" } else { "FAILED" },
        result.method.as_str(),
        result.confidence
    );
    if let Some(error) = &result.error {
        println!("  error: {error}");
    }
    for warning in &result.warnings {
        println!("  warning: {warning}");
    }

    let m = &result.metadata;
    let field = |v: &Option<String>| v.clone().unwrap_or_else(|| "-".to_string());
    let money = |v: Option<f64>| v.map(|a| format!("{a:.2}")).unwrap_or_else(|| "-".to_string());
    let day = |v: Option<chrono::NaiveDate>| v.map(|d| d.to_string()).unwrap_or_else(|| "-".to_string());
    println!("  bank {} | card ...{} | customer {}", field(&m.bank_name), field(&m.card_last_four), field(&m.customer_name));
    println!(
        "  period {} to {} | cut {} | due {}",
        day(m.period_start),
        day(m.period_end),
        day(m.cut_date),
        day(m.due_date)
    );
    println!(
        "  pay no interest {} | minimum {} | balance {} | limit {}",
        money(m.pay_no_interest),
        money(m.minimum_payment),
        money(m.total_balance),
        money(m.credit_limit)
    );

    println!();
    for t in &result.transactions {
        println!(
            "  {} {:<40} {:>12.2} {:<22} {:<14} {}",
            t.operation_date,
            t.description,
            t.amount,
            t.effective_category().as_str(),
            t.categorization_method.as_str(),
            if t.is_recurring { "recurring" } else { "" }
        );
    }
    println!(
        "\n  {} transactions, charges {:.2}, payments {:.2}",
        result.transactions.len(),
        result.charges_total(),
        result.payments_total()
    );
}
