pub mod notifier;
pub mod provisioner;
pub mod renewal;
pub mod scanner;
pub mod schedule;
pub mod supervisor;

pub use crate::domain::model::{DomainRecord, RenewalOutcome, ScanReport};
pub use crate::domain::ports::{CertInspector, CommandRunner, Mailer};
pub use crate::utils::error::Result;
