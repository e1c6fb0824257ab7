use crate::adapters::openssl::OpensslInspector;
use crate::config::SupervisorConfig;
use crate::core::notifier::Notifier;
use crate::core::renewal::RenewalOrchestrator;
use crate::core::scanner::CertScanner;
use crate::core::schedule::CheckSchedule;
use crate::domain::model::{RenewalOutcome, ScanReport};
use crate::domain::ports::CommandRunner;
use chrono::{DateTime, Utc};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;

/// What one check pass saw and did.
#[derive(Debug, Clone, Default)]
pub struct PassSummary {
    pub report: ScanReport,
    /// Domains at or under the renewal threshold.
    pub eligible: Vec<String>,
    /// Present when the renewal command was run during this pass.
    pub renewal: Option<RenewalOutcome>,
}

/// Ties scanning and renewal together and drives them from a schedule.
///
/// Only one pass runs at a time: a trigger that arrives while a pass is in
/// flight is dropped.
pub struct Supervisor {
    scanner: CertScanner,
    orchestrator: RenewalOrchestrator,
    threshold_days: u32,
    dry_run: bool,
    in_flight: AtomicBool,
}

struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl Supervisor {
    pub fn new(scanner: CertScanner, orchestrator: RenewalOrchestrator, threshold_days: u32) -> Self {
        Self {
            scanner,
            orchestrator,
            threshold_days,
            dry_run: false,
            in_flight: AtomicBool::new(false),
        }
    }

    pub fn from_config(
        config: &SupervisorConfig,
        runner: Arc<dyn CommandRunner>,
        notifier: Notifier,
    ) -> Self {
        let inspector = Arc::new(OpensslInspector::new(
            runner.clone(),
            config.openssl_bin.clone(),
        ));
        let scanner = CertScanner::new(
            config.cert_root_directory.clone(),
            config.cert_file_name.clone(),
            inspector,
        );
        let orchestrator = RenewalOrchestrator::from_config(config, runner, notifier);
        Self::new(scanner, orchestrator, config.expiry_threshold_days)
    }

    /// In dry-run mode passes scan and report but never renew.
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn is_running(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst)
    }

    fn try_begin(&self) -> Option<InFlight<'_>> {
        self.in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| InFlight(&self.in_flight))
    }

    pub async fn run_pass(&self) -> Option<PassSummary> {
        self.run_pass_at(Utc::now()).await
    }

    /// Returns `None` when another pass was already running.
    pub async fn run_pass_at(&self, now: DateTime<Utc>) -> Option<PassSummary> {
        let Some(_guard) = self.try_begin() else {
            tracing::warn!("Previous certificate check is still running, skipping this trigger");
            return None;
        };

        let report = match self.scanner.scan_at(now).await {
            Ok(report) => report,
            Err(e) => {
                tracing::error!("Error reading certificate directory: {}", e);
                return Some(PassSummary::default());
            }
        };

        let eligible: Vec<String> = report
            .eligible(self.threshold_days)
            .map(|record| {
                tracing::info!(
                    "Certificate for {} is expiring soon. Triggering renewal.",
                    record.domain
                );
                record.domain.clone()
            })
            .collect();

        let renewal = if eligible.is_empty() {
            tracing::debug!(
                threshold_days = self.threshold_days,
                "no certificate needs renewal"
            );
            None
        } else if self.dry_run {
            tracing::info!(
                "Dry run: skipping renewal for {} certificate(s)",
                eligible.len()
            );
            None
        } else {
            Some(self.orchestrator.renew().await)
        };

        Some(PassSummary {
            report,
            eligible,
            renewal,
        })
    }

    /// Runs one pass immediately, then one per schedule fire until
    /// `shutdown` resolves. Scheduled passes run on their own task so a slow
    /// renewal never delays the timer; the in-flight guard keeps them from
    /// overlapping. A pass still running at shutdown is awaited, so a
    /// launched renewal always finishes.
    pub async fn run<F>(self: Arc<Self>, schedule: &CheckSchedule, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        tracing::info!(
            "Starting certificate renewal service with schedule: {}",
            schedule.expression()
        );

        tracing::info!("Running initial certificate check");
        self.run_pass().await;

        tokio::pin!(shutdown);
        let mut cursor = Utc::now();
        let mut passes = JoinSet::new();

        loop {
            let Some(next) = schedule.next_after(cursor.max(Utc::now())) else {
                tracing::warn!("Schedule has no upcoming fire times, stopping");
                break;
            };
            let wait = (next - Utc::now()).to_std().unwrap_or(Duration::ZERO);
            tracing::debug!(next_run = %next, "waiting for next scheduled check");

            tokio::select! {
                _ = tokio::time::sleep(wait) => {
                    cursor = next;
                    tracing::info!("Running scheduled certificate check");
                    while passes.try_join_next().is_some() {}
                    let supervisor = Arc::clone(&self);
                    passes.spawn(async move {
                        supervisor.run_pass().await;
                    });
                }
                _ = &mut shutdown => {
                    tracing::info!("Shutdown requested, stopping certificate renewal service");
                    break;
                }
            }
        }

        if self.is_running() {
            tracing::info!("Waiting for the running certificate check to finish");
        }
        while let Some(result) = passes.join_next().await {
            if let Err(e) = result {
                tracing::error!("Certificate check task failed: {}", e);
            }
        }
    }
}
