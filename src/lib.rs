pub mod browser;
pub mod config;
pub mod driver;
pub mod element;
pub mod engine;
pub mod error;
pub mod form_map;
pub mod locator;
pub mod page;
pub mod progress;
pub mod record;
pub mod sections;
pub mod sink;
pub mod telemetry;

pub use browser::{ChromeLauncher, Launcher, Session};
pub use config::AutomationConfig;
pub use driver::{ConfirmationGate, Decision, RunOutcome, SubmissionDriver};
pub use engine::{EngineState, FormEngine, Receipt};
pub use error::{Error, Result};
pub use form_map::{FieldKey, FormMap};
pub use page::{ChromePage, FormPage};
pub use record::ApplicantRecord;
