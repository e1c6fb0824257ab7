pub mod adapters;
pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

pub use adapters::{openssl::OpensslInspector, shell::ShellRunner, smtp::SmtpMailer};
pub use config::{cli::ProvisionArgs, cli::SupervisorArgs, SupervisorConfig};
pub use core::{
    notifier::Notifier, provisioner::Provisioner, renewal::RenewalOrchestrator,
    scanner::CertScanner, schedule::CheckSchedule, supervisor::Supervisor,
};
pub use utils::error::{CertError, Result};
