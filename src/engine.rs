//! Drives the hosted form from entry through submission.
//!
//! The engine is a small state machine over the page:
//!
//! ```text
//! Initial --fill--> Filled --proceed_to_confirmation--> Confirmed --submit--> Submitted
//!    \                 \                                    \
//!     `----------------`------------------------------------`----> Failed
//! ```
//!
//! Every operation checks the current state first and never touches the
//! page when called out of order. Nothing is retried: a repeated click on
//! a submit button can file the application twice.

use std::fmt;
use std::sync::{Arc, OnceLock};

use regex::Regex;
use tracing::{info, info_span, warn, Instrument};

use crate::config::Timings;
use crate::error::{Error, Result};
use crate::form_map::{keys, FieldKey, FormMap};
use crate::locator::FieldLocator;
use crate::page::FormPage;
use crate::progress::{ProgressEvent, ProgressObserver, SectionStatus, TracingObserver};
use crate::record::ApplicantRecord;
use crate::sections::{fill_section, FillContext, Section, SectionOutcome};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Initial,
    Filled,
    Confirmed,
    Submitted,
    Failed,
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EngineState::Initial => "initial",
            EngineState::Filled => "filled",
            EngineState::Confirmed => "confirmed",
            EngineState::Submitted => "submitted",
            EngineState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Receipt number issued by the hosted form after a successful submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Receipt(String);

impl Receipt {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Receipt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Find the receipt marker (`＜ 受付番号: ABC123 ＞`) in page text.
pub fn extract_receipt(text: &str) -> Option<Receipt> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| {
        Regex::new(r"[＜<]\s*受付番号\s*[:：]\s*([^\s＞>]+)\s*[＞>]").expect("static regex")
    });
    re.captures(text)
        .and_then(|caps| caps.get(1))
        .map(|token| Receipt(token.as_str().to_string()))
}

pub struct FormEngine<'a, P: FormPage> {
    page: &'a P,
    map: &'a FormMap,
    timings: Timings,
    observer: Arc<dyn ProgressObserver>,
    state: EngineState,
}

impl<'a, P: FormPage> FormEngine<'a, P> {
    pub fn new(page: &'a P, map: &'a FormMap, timings: Timings) -> Self {
        Self {
            page,
            map,
            timings,
            observer: Arc::new(TracingObserver),
            state: EngineState::Initial,
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn ProgressObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    fn expect(&self, op: &'static str, required: EngineState) -> Result<()> {
        if self.state == required {
            Ok(())
        } else {
            Err(Error::InvalidState {
                op,
                state: self.state,
            })
        }
    }

    /// Fill every section in form order, stopping at the first failure.
    pub async fn fill(&mut self, record: &ApplicantRecord) -> Result<()> {
        self.expect("fill", EngineState::Initial)?;

        let ctx = FillContext {
            page: self.page,
            locator: FieldLocator::new(self.map),
            timings: self.timings,
        };

        for section in Section::ORDER {
            let span = info_span!("section", name = %section);
            let result = fill_section(&ctx, section, record).instrument(span).await;

            let status = match &result {
                Ok(SectionOutcome::Completed { writes }) => {
                    SectionStatus::Completed { writes: *writes }
                }
                Ok(SectionOutcome::Skipped) => SectionStatus::Skipped,
                Err(e) => SectionStatus::Failed {
                    reason: e.to_string(),
                },
            };
            self.observer.on_event(&ProgressEvent { section, status });

            if let Err(source) = result {
                self.state = EngineState::Failed;
                return Err(Error::FillFailed {
                    section,
                    source: Box::new(source),
                });
            }
        }

        self.state = EngineState::Filled;
        info!("form filled");
        Ok(())
    }

    /// Move from the entry view to the confirmation view.
    pub async fn proceed_to_confirmation(&mut self) -> Result<()> {
        self.expect("proceed to confirmation", EngineState::Filled)?;

        let result = async {
            self.click_control(keys::CONFIRM_BUTTON).await?;
            self.page
                .wait_for_idle(self.timings.network_quiet, self.timings.ready_timeout)
                .await
        }
        .await;

        match result {
            Ok(()) => {
                self.state = EngineState::Confirmed;
                info!("confirmation view reached");
                Ok(())
            }
            Err(e) => {
                self.state = EngineState::Failed;
                Err(e)
            }
        }
    }

    /// Press the final submit button and read back the receipt number.
    ///
    /// Once the button has been clicked the application may have been
    /// accepted even when no receipt can be read; that case is reported as
    /// [`Error::ReceiptNotFound`] so an operator can check by hand.
    pub async fn submit(&mut self) -> Result<Receipt> {
        self.expect("submit", EngineState::Confirmed)?;

        if let Err(e) = self.click_control(keys::SUBMIT_BUTTON).await {
            self.state = EngineState::Failed;
            return Err(e);
        }

        if let Err(e) = self
            .page
            .wait_for_idle(self.timings.network_quiet, self.timings.ready_timeout)
            .await
        {
            warn!(error = %e, "page not idle after submit; looking for receipt anyway");
        }

        let receipt = match self.page.text().await {
            Ok(text) => extract_receipt(&text),
            Err(e) => {
                warn!(error = %e, "cannot read page text after submit");
                None
            }
        };

        match receipt {
            Some(receipt) => {
                self.state = EngineState::Submitted;
                info!(receipt = %receipt, "application submitted");
                Ok(receipt)
            }
            None => {
                self.state = EngineState::Failed;
                Err(Error::ReceiptNotFound)
            }
        }
    }

    async fn click_control(&self, name: &str) -> Result<()> {
        let located = FieldLocator::new(self.map)
            .locate(self.page, &FieldKey::new(name))
            .await?;
        self.page.click(&located.surface).await
    }
}
