//! Session lifecycle around the engine, with an operator confirmation
//! before anything irreversible happens.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{info, warn};

use crate::browser::{Launcher, Session};
use crate::config::Timings;
use crate::engine::{FormEngine, Receipt};
use crate::error::{Error, Result};
use crate::form_map::FormMap;
use crate::locator::wait_for_visible;
use crate::page::FormPage;
use crate::progress::{ProgressObserver, TracingObserver};
use crate::record::ApplicantRecord;
use crate::sink::{SubmissionRow, SubmissionSink};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Accept,
    Decline,
}

/// Asked once the form is filled, before confirm and submit.
#[async_trait]
pub trait ConfirmationGate: Send + Sync {
    async fn confirm(&self, record: &ApplicantRecord) -> Result<Decision>;
}

/// Asks on the terminal; only a literal `y` submits.
pub struct StdinGate;

#[async_trait]
impl ConfirmationGate for StdinGate {
    async fn confirm(&self, _record: &ApplicantRecord) -> Result<Decision> {
        let mut stdout = tokio::io::stdout();
        stdout
            .write_all("入力が完了しました。送信しますか？ (y/N): ".as_bytes())
            .await?;
        stdout.flush().await?;

        let mut line = String::new();
        BufReader::new(tokio::io::stdin()).read_line(&mut line).await?;
        Ok(parse_decision(&line))
    }
}

pub fn parse_decision(line: &str) -> Decision {
    if line.trim() == "y" {
        Decision::Accept
    } else {
        Decision::Decline
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Submitted(Receipt),
    Declined,
}

pub struct SubmissionDriver<L: Launcher> {
    launcher: L,
    form_url: String,
    map: FormMap,
    timings: Timings,
    gate: Arc<dyn ConfirmationGate>,
    sink: Option<Arc<dyn SubmissionSink>>,
    observer: Arc<dyn ProgressObserver>,
}

impl<L: Launcher> SubmissionDriver<L> {
    pub fn new(
        launcher: L,
        form_url: impl Into<String>,
        map: FormMap,
        timings: Timings,
        gate: Arc<dyn ConfirmationGate>,
    ) -> Self {
        Self {
            launcher,
            form_url: form_url.into(),
            map,
            timings,
            gate,
            sink: None,
            observer: Arc::new(TracingObserver),
        }
    }

    pub fn with_sink(mut self, sink: Arc<dyn SubmissionSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn ProgressObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Run one record through the form. The session is closed on every
    /// exit path.
    ///
    /// The record is validated and the sink consulted before a browser is
    /// launched; either refusing means no session is opened.
    pub async fn run(&self, record: &ApplicantRecord) -> Result<RunOutcome> {
        record.validate()?;
        if let Some(sink) = &self.sink {
            sink.check(&SubmissionRow::now(record)).await?;
        }

        let session = self.launcher.launch().await?;
        let result = self.drive(session.page(), record).await;

        if let Err(e) = session.close().await {
            warn!(error = %e, "session teardown failed");
        }

        if let Ok(RunOutcome::Submitted(receipt)) = &result {
            self.record_submission(record, receipt).await;
        }
        result
    }

    async fn drive(
        &self,
        page: &<L::Session as Session>::Page,
        record: &ApplicantRecord,
    ) -> Result<RunOutcome> {
        page.navigate(&self.form_url).await?;
        let anchor = wait_for_visible(
            page,
            &self.map.anchor,
            self.timings.anchor_timeout,
            self.timings.poll_interval,
        )
        .await?;
        if anchor.is_none() {
            return Err(Error::SessionError(format!(
                "form did not render within {:?} (no {})",
                self.timings.anchor_timeout, self.map.anchor
            )));
        }
        info!(url = %self.form_url, "form ready");

        let mut engine =
            FormEngine::new(page, &self.map, self.timings).with_observer(self.observer.clone());
        engine.fill(record).await?;

        if self.gate.confirm(record).await? == Decision::Decline {
            info!("operator declined; nothing submitted");
            return Ok(RunOutcome::Declined);
        }

        engine.proceed_to_confirmation().await?;
        let receipt = engine.submit().await?;
        Ok(RunOutcome::Submitted(receipt))
    }

    async fn record_submission(&self, record: &ApplicantRecord, receipt: &Receipt) {
        let Some(sink) = &self.sink else {
            return;
        };
        let row = SubmissionRow::now(record);
        if let Err(e) = sink.deliver(&row).await {
            warn!(error = %e, receipt = %receipt, "submission was not recorded in the sink");
        }
    }
}
