use tracing::{info, warn};

use crate::sections::Section;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SectionStatus {
    Completed { writes: usize },
    Skipped,
    Failed { reason: String },
}

/// Emitted once per section the engine runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressEvent {
    pub section: Section,
    pub status: SectionStatus,
}

pub trait ProgressObserver: Send + Sync {
    fn on_event(&self, event: &ProgressEvent);
}

/// Reports progress as structured log events.
pub struct TracingObserver;

impl ProgressObserver for TracingObserver {
    fn on_event(&self, event: &ProgressEvent) {
        match &event.status {
            SectionStatus::Completed { writes } => {
                info!(section = %event.section, writes, "section filled")
            }
            SectionStatus::Skipped => info!(section = %event.section, "section skipped"),
            SectionStatus::Failed { reason } => {
                warn!(section = %event.section, reason = %reason, "section failed")
            }
        }
    }
}

/// Prints one line per section for an operator watching the terminal.
pub struct ConsoleObserver;

impl ProgressObserver for ConsoleObserver {
    fn on_event(&self, event: &ProgressEvent) {
        match &event.status {
            SectionStatus::Completed { .. } => println!("  [ok]   {}", event.section),
            SectionStatus::Skipped => println!("  [skip] {}", event.section),
            SectionStatus::Failed { reason } => {
                println!("  [fail] {}: {reason}", event.section)
            }
        }
    }
}
