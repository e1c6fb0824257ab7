use chrono::{DateTime, Utc};
use std::fmt;
use std::path::PathBuf;

const SECONDS_PER_DAY: i64 = 86_400;

/// One certificate found under the scan root, valid for a single scan pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomainRecord {
    pub domain: String,
    pub cert_path: PathBuf,
    pub expires_at: DateTime<Utc>,
    pub days_remaining: i64,
}

impl DomainRecord {
    pub fn new(
        domain: String,
        cert_path: PathBuf,
        expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            domain,
            cert_path,
            expires_at,
            days_remaining: days_remaining(expires_at, now),
        }
    }

    /// Inclusive: a certificate exactly `threshold_days` out is renewed.
    pub fn needs_renewal(&self, threshold_days: u32) -> bool {
        self.days_remaining <= i64::from(threshold_days)
    }
}

/// Whole days between `now` and `expires_at`, rounded toward negative
/// infinity so an expired certificate reports a negative count.
pub fn days_remaining(expires_at: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    (expires_at - now).num_seconds().div_euclid(SECONDS_PER_DAY)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedDomain {
    pub domain: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default)]
pub struct ScanReport {
    pub records: Vec<DomainRecord>,
    pub skipped: Vec<SkippedDomain>,
}

impl ScanReport {
    pub fn eligible(&self, threshold_days: u32) -> impl Iterator<Item = &DomainRecord> {
        self.records
            .iter()
            .filter(move |record| record.needs_renewal(threshold_days))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenewalOutcome {
    pub succeeded: bool,
    pub stdout: String,
    pub stderr: String,
    pub restarted: bool,
    /// `None` when no restart was attempted.
    pub restart_succeeded: Option<bool>,
    pub restart_detail: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub subject: String,
    pub body: String,
}

impl Notification {
    pub fn new(subject: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            body: body.into(),
        }
    }
}

/// Something an external command runner can execute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Invocation {
    /// A command line handed to `sh -c` verbatim; used for operator supplied
    /// command strings.
    Shell(String),
    /// A program with discrete arguments, never passed through a shell.
    Exec { program: String, args: Vec<String> },
}

impl Invocation {
    pub fn shell(command: impl Into<String>) -> Self {
        Invocation::Shell(command.into())
    }

    pub fn exec<I, A>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = A>,
        A: Into<String>,
    {
        Invocation::Exec {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Invocation::Shell(command) => f.write_str(command),
            Invocation::Exec { program, args } => {
                f.write_str(program)?;
                for arg in args {
                    write!(f, " {}", arg)?;
                }
                Ok(())
            }
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
}
