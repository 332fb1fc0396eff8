//! Where completed applications are recorded: one flattened row each.

use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Local};
use serde_json::json;
use tracing::{debug, warn};

use crate::config::SinkConfig;
use crate::error::{Error, Result};
use crate::record::ApplicantRecord;

/// Column headers, in row order.
pub const COLUMNS: [&str; 26] = [
    "タイムスタンプ",
    "申請者区分",
    "事業者名",
    "事業者名カナ",
    "代表者姓",
    "代表者名",
    "代表者姓カナ",
    "代表者名カナ",
    "郵便番号",
    "都道府県",
    "市区町村",
    "番地",
    "郵便番号2",
    "都道府県2",
    "市区町村2",
    "番地2",
    "労働者数",
    "申請方法",
    "担当者姓",
    "担当者名",
    "担当者姓カナ",
    "担当者名カナ",
    "電話番号",
    "メールアドレス",
    "代理人名",
    "申請理由",
];

/// Position of the contact email in a row.
pub const EMAIL_COLUMN: usize = 23;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionRow {
    values: Vec<String>,
}

impl SubmissionRow {
    pub fn new(record: &ApplicantRecord, timestamp: DateTime<Local>) -> Self {
        let rep = &record.representative;
        let primary = &record.primary_address;
        let secondary = record.secondary_address().cloned().unwrap_or_default();
        let contact = &record.contact;

        let values = vec![
            timestamp.format("%Y-%m-%d %H:%M:%S").to_string(),
            record.entity_type.label().to_string(),
            record.company.name.clone(),
            record.company.name_kana.clone(),
            rep.last_name.clone(),
            rep.first_name.clone(),
            rep.last_name_kana.clone(),
            rep.first_name_kana.clone(),
            primary.postal_code.clone(),
            primary.prefecture.clone(),
            primary.city.clone(),
            primary.street.clone(),
            secondary.postal_code,
            secondary.prefecture,
            secondary.city,
            secondary.street,
            record.worker_count.to_string(),
            record.application_method.label().to_string(),
            contact.name.last_name.clone(),
            contact.name.first_name.clone(),
            contact.name.last_name_kana.clone(),
            contact.name.first_name_kana.clone(),
            contact.phone.clone(),
            contact.email.clone(),
            record.agent_name().unwrap_or_default().to_string(),
            record.application_reason.label().to_string(),
        ];
        Self { values }
    }

    pub fn now(record: &ApplicantRecord) -> Self {
        Self::new(record, Local::now())
    }

    pub fn values(&self) -> &[String] {
        &self.values
    }

    pub fn email(&self) -> &str {
        &self.values[EMAIL_COLUMN]
    }
}

#[async_trait]
pub trait SubmissionSink: Send + Sync {
    /// Refuse a row before the application is filed. Accepts by default.
    async fn check(&self, _row: &SubmissionRow) -> Result<()> {
        Ok(())
    }

    async fn deliver(&self, row: &SubmissionRow) -> Result<()>;
}

/// Appends rows to a local CSV file, writing the header on first use.
#[derive(Debug, Clone)]
pub struct CsvSink {
    path: PathBuf,
    reject_duplicate_email: bool,
}

impl CsvSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            reject_duplicate_email: false,
        }
    }

    pub fn reject_duplicate_email(mut self, reject: bool) -> Self {
        self.reject_duplicate_email = reject;
        self
    }

    fn has_rows(&self) -> bool {
        std::fs::metadata(&self.path)
            .map(|meta| meta.len() > 0)
            .unwrap_or(false)
    }

    fn email_recorded(&self, email: &str) -> Result<bool> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_path(&self.path)
            .map_err(|e| Error::Sink(e.to_string()))?;
        for row in reader.records() {
            let row = row.map_err(|e| Error::Sink(e.to_string()))?;
            if row
                .get(EMAIL_COLUMN)
                .is_some_and(|recorded| recorded.trim().eq_ignore_ascii_case(email.trim()))
            {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn ensure_new(&self, row: &SubmissionRow) -> Result<()> {
        if self.reject_duplicate_email && self.has_rows() && self.email_recorded(row.email())? {
            return Err(Error::Sink(format!(
                "{} is already recorded in {}",
                row.email(),
                self.path.display()
            )));
        }
        Ok(())
    }

    fn append(&self, row: &SubmissionRow) -> Result<()> {
        self.ensure_new(row)?;
        let existing = self.has_rows();

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);
        if !existing {
            writer
                .write_record(COLUMNS)
                .map_err(|e| Error::Sink(e.to_string()))?;
        }
        writer
            .write_record(row.values())
            .map_err(|e| Error::Sink(e.to_string()))?;
        writer.flush()?;
        debug!(path = %self.path.display(), "row appended");
        Ok(())
    }

    /// Run file work for `row` on the blocking pool.
    async fn blocking<F>(&self, row: &SubmissionRow, work: F) -> Result<()>
    where
        F: FnOnce(&CsvSink, &SubmissionRow) -> Result<()> + Send + 'static,
    {
        let sink = self.clone();
        let row = row.clone();
        tokio::task::spawn_blocking(move || work(&sink, &row))
            .await
            .map_err(|e| Error::Sink(format!("csv task failed: {e}")))?
    }
}

#[async_trait]
impl SubmissionSink for CsvSink {
    async fn check(&self, row: &SubmissionRow) -> Result<()> {
        self.blocking(row, CsvSink::ensure_new).await
    }

    async fn deliver(&self, row: &SubmissionRow) -> Result<()> {
        self.blocking(row, CsvSink::append).await
    }
}

/// Posts rows as JSON to a web endpoint (e.g. a spreadsheet script).
pub struct WebhookSink {
    client: reqwest::Client,
    url: String,
    fire_and_forget: bool,
}

impl WebhookSink {
    pub fn new(client: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
            fire_and_forget: false,
        }
    }

    /// Return as soon as the request is spawned, without waiting for an
    /// acknowledgement.
    pub fn fire_and_forget(mut self, enabled: bool) -> Self {
        self.fire_and_forget = enabled;
        self
    }
}

#[async_trait]
impl SubmissionSink for WebhookSink {
    async fn deliver(&self, row: &SubmissionRow) -> Result<()> {
        let body = json!({ "columns": COLUMNS, "row": row.values() });
        let request = self.client.post(&self.url).json(&body);

        if self.fire_and_forget {
            let url = self.url.clone();
            tokio::spawn(async move {
                match request.send().await {
                    Ok(response) if !response.status().is_success() => {
                        warn!(%url, status = %response.status(), "sink rejected row")
                    }
                    Ok(_) => debug!(%url, "row delivered"),
                    Err(e) => warn!(%url, error = %e, "sink unreachable"),
                }
            });
            return Ok(());
        }

        let response = request
            .send()
            .await
            .map_err(|e| Error::Sink(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::Sink(format!("{} answered {status}", self.url)));
        }
        debug!(url = %self.url, "row delivered");
        Ok(())
    }
}

/// Delivers to several sinks; every sink is attempted and the first error
/// is reported.
pub struct FanoutSink {
    sinks: Vec<Arc<dyn SubmissionSink>>,
}

#[async_trait]
impl SubmissionSink for FanoutSink {
    async fn check(&self, row: &SubmissionRow) -> Result<()> {
        for sink in &self.sinks {
            sink.check(row).await?;
        }
        Ok(())
    }

    async fn deliver(&self, row: &SubmissionRow) -> Result<()> {
        let mut first_error = None;
        for sink in &self.sinks {
            if let Err(e) = sink.deliver(row).await {
                warn!(error = %e, "sink delivery failed");
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}

/// Build the configured sinks, if any.
pub fn from_config(config: &SinkConfig) -> Option<Arc<dyn SubmissionSink>> {
    let mut sinks: Vec<Arc<dyn SubmissionSink>> = Vec::new();
    if let Some(path) = &config.csv_path {
        sinks.push(Arc::new(
            CsvSink::new(path).reject_duplicate_email(config.reject_duplicate_email),
        ));
    }
    if let Some(url) = &config.webhook_url {
        sinks.push(Arc::new(
            WebhookSink::new(reqwest::Client::new(), url).fire_and_forget(config.fire_and_forget),
        ));
    }

    match sinks.len() {
        0 => None,
        1 => sinks.pop(),
        _ => Some(Arc::new(FanoutSink { sinks })),
    }
}
