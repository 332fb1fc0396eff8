use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::Parser;
use subsidy_autofill::browser::ChromeLauncher;
use subsidy_autofill::config::{AutomationConfig, ConfigBuilder};
use subsidy_autofill::driver::{RunOutcome, StdinGate, SubmissionDriver};
use subsidy_autofill::form_map::FormMap;
use subsidy_autofill::progress::ConsoleObserver;
use subsidy_autofill::sink::{self, SubmissionRow};
use subsidy_autofill::{telemetry, ApplicantRecord, Error};

const DEFAULT_INPUT: &str = "applicant.json";

#[derive(Parser, Debug)]
#[command(
    name = "subsidy-autofill",
    about = "Fill the hosted subsidy application form from a JSON applicant record",
    version
)]
struct Cli {
    /// Applicant record (JSON)
    path: Option<PathBuf>,

    /// URL of the hosted application form
    #[arg(long)]
    form_url: Option<String>,

    /// JSON file replacing the built-in form selectors
    #[arg(long)]
    form_map: Option<PathBuf>,

    /// Show the browser window
    #[arg(long)]
    headed: bool,

    /// Append submitted rows to this CSV file
    #[arg(long)]
    sink_csv: Option<PathBuf>,

    /// POST submitted rows to this endpoint
    #[arg(long)]
    sink_url: Option<String>,

    /// Validate the record and print the summary, then stop
    #[arg(long, conflicts_with = "record_only")]
    check: bool,

    /// Record the row in the configured sinks without opening a browser
    #[arg(long)]
    record_only: bool,
}

impl Cli {
    fn apply(&self, config: AutomationConfig) -> AutomationConfig {
        let mut builder = ConfigBuilder::from_config(config);
        if let Some(url) = &self.form_url {
            builder = builder.form_url(url.clone());
        }
        if let Some(path) = &self.form_map {
            builder = builder.form_map_path(path.clone());
        }
        if self.headed {
            builder = builder.headless(false);
        }
        if let Some(path) = &self.sink_csv {
            builder = builder.csv_sink(path.clone());
        }
        if let Some(url) = &self.sink_url {
            builder = builder.webhook_sink(url.clone());
        }
        builder.build()
    }
}

pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = cli.apply(AutomationConfig::from_env().context("reading configuration")?);

    if let Err(e) = telemetry::init(&config.log_level) {
        eprintln!("warning: logging disabled: {e}");
    }

    let path = cli
        .path
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_INPUT));
    let record = load_record(&path)?;

    println!("=== 申請内容 ({}) ===", path.display());
    println!("{record}");
    println!();

    if cli.check {
        println!("入力内容に問題はありません。");
        return Ok(());
    }

    let sink = sink::from_config(&config.sink);

    if cli.record_only {
        let Some(sink) = sink else {
            bail!(Error::Config(
                "--record-only needs --sink-csv or --sink-url".into()
            ));
        };
        sink.deliver(&SubmissionRow::now(&record)).await?;
        println!("記録しました。");
        return Ok(());
    }

    let form_url = config.require_form_url()?.to_string();
    let map = match &config.form_map_path {
        Some(path) => FormMap::load(path)
            .with_context(|| format!("loading form map {}", path.display()))?,
        None => FormMap::default(),
    };

    let mut driver = SubmissionDriver::new(
        ChromeLauncher::new(config.browser.clone()),
        form_url,
        map,
        config.timings,
        Arc::new(StdinGate),
    )
    .with_observer(Arc::new(ConsoleObserver));
    if let Some(sink) = sink {
        driver = driver.with_sink(sink);
    }

    println!("フォームに入力しています...");
    match driver.run(&record).await? {
        RunOutcome::Submitted(receipt) => println!("送信しました。受付番号: {receipt}"),
        RunOutcome::Declined => println!("送信をキャンセルしました。"),
    }
    Ok(())
}

/// Read and validate the record; nothing else runs when this fails.
fn load_record(path: &Path) -> anyhow::Result<ApplicantRecord> {
    if !path.exists() {
        bail!(Error::InputInvalid(format!(
            "input file not found: {}",
            path.display()
        )));
    }
    Ok(ApplicantRecord::load(path)?)
}

/// 2 when the form may have accepted the data without showing a receipt,
/// 1 for every other failure.
fn exit_status(err: &anyhow::Error) -> u8 {
    match err.downcast_ref::<Error>().map(Error::root_cause) {
        Some(Error::ReceiptNotFound) => 2,
        _ => 1,
    }
}

pub fn exit_code(err: &anyhow::Error) -> ExitCode {
    ExitCode::from(exit_status(err))
}
