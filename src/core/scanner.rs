use crate::domain::model::{DomainRecord, ScanReport, SkippedDomain};
use crate::domain::ports::CertInspector;
use crate::utils::error::{CertError, Result};
use chrono::{DateTime, NaiveDateTime, Utc};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock};

static NOT_AFTER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"notAfter=(.+)").expect("notAfter pattern is valid"));

/// A directory under the scan root that may hold a certificate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub domain: String,
    pub cert_path: PathBuf,
}

/// Walks the immediate subdirectories of a certificate root (one directory
/// per domain) and works out how long each certificate has left.
pub struct CertScanner {
    root: PathBuf,
    cert_file_name: String,
    inspector: Arc<dyn CertInspector>,
}

impl CertScanner {
    pub fn new(
        root: impl Into<PathBuf>,
        cert_file_name: impl Into<String>,
        inspector: Arc<dyn CertInspector>,
    ) -> Self {
        Self {
            root: root.into(),
            cert_file_name: cert_file_name.into(),
            inspector,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Lazily lists the domain directories under the root. Plain files are
    /// ignored; unreadable entries are logged and skipped.
    pub fn candidates(&self) -> Result<impl Iterator<Item = Candidate> + '_> {
        let entries = std::fs::read_dir(&self.root).map_err(|e| CertError::FileSystem {
            path: self.root.clone(),
            message: e.to_string(),
        })?;

        Ok(entries.filter_map(move |entry| {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::warn!("Error reading entry in {}: {}", self.root.display(), e);
                    return None;
                }
            };

            let path = entry.path();
            if !path.is_dir() {
                return None;
            }

            Some(Candidate {
                domain: entry.file_name().to_string_lossy().into_owned(),
                cert_path: path.join(&self.cert_file_name),
            })
        }))
    }

    pub async fn scan(&self) -> Result<ScanReport> {
        self.scan_at(Utc::now()).await
    }

    /// Scans every candidate sequentially. Per-domain failures end up in
    /// `ScanReport::skipped`; only an unreadable root fails the whole scan.
    pub async fn scan_at(&self, now: DateTime<Utc>) -> Result<ScanReport> {
        let mut report = ScanReport::default();

        for candidate in self.candidates()? {
            match self.inspect_candidate(&candidate, now).await {
                Ok(record) => {
                    tracing::info!(
                        "Certificate for {} expires in {} days ({})",
                        record.domain,
                        record.days_remaining,
                        record.expires_at.to_rfc3339()
                    );
                    report.records.push(record);
                }
                Err(e) => {
                    report.skipped.push(SkippedDomain {
                        domain: candidate.domain,
                        reason: e.to_string(),
                    });
                }
            }
        }

        tracing::debug!(
            records = report.records.len(),
            skipped = report.skipped.len(),
            "scan of {} finished",
            self.root.display()
        );
        Ok(report)
    }

    async fn inspect_candidate(
        &self,
        candidate: &Candidate,
        now: DateTime<Utc>,
    ) -> Result<DomainRecord> {
        let is_file = tokio::fs::metadata(&candidate.cert_path)
            .await
            .map(|meta| meta.is_file())
            .unwrap_or(false);
        if !is_file {
            tracing::warn!("Certificate file not found for domain: {}", candidate.domain);
            return Err(CertError::FileSystem {
                path: candidate.cert_path.clone(),
                message: "certificate file not found".to_string(),
            });
        }

        let report = self
            .inspector
            .inspect(&candidate.cert_path)
            .await
            .inspect_err(|e| {
                tracing::error!("Error checking certificate for {}: {}", candidate.domain, e)
            })?;

        let expires_at = parse_not_after(&candidate.domain, &report).inspect_err(|_| {
            tracing::error!("Failed to parse expiry date for {}", candidate.domain)
        })?;

        Ok(DomainRecord::new(
            candidate.domain.clone(),
            candidate.cert_path.clone(),
            expires_at,
            now,
        ))
    }
}

/// Extracts the expiry instant from inspector output such as
/// `notAfter=Jan  5 09:30:00 2026 GMT`.
pub fn parse_not_after(domain: &str, output: &str) -> Result<DateTime<Utc>> {
    let raw = NOT_AFTER
        .captures(output)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim())
        .ok_or_else(|| CertError::Parse {
            domain: domain.to_string(),
            message: "no notAfter field in inspector output".to_string(),
        })?;

    parse_expiry(raw).ok_or_else(|| CertError::Parse {
        domain: domain.to_string(),
        message: format!("unrecognised date '{}'", raw),
    })
}

fn parse_expiry(raw: &str) -> Option<DateTime<Utc>> {
    // OpenSSL always reports GMT.
    let openssl = raw
        .strip_suffix("GMT")
        .or_else(|| raw.strip_suffix("UTC"))
        .map(str::trim_end)
        .and_then(|s| NaiveDateTime::parse_from_str(s, "%b %e %H:%M:%S %Y").ok())
        .map(|naive| naive.and_utc());

    openssl.or_else(|| {
        DateTime::parse_from_rfc2822(raw)
            .or_else(|_| DateTime::parse_from_rfc3339(raw))
            .ok()
            .map(|dt| dt.with_timezone(&Utc))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use std::collections::HashMap;
    use tempfile::TempDir;

    /// Answers with a canned report per certificate path.
    struct CannedInspector {
        reports: HashMap<PathBuf, String>,
    }

    #[async_trait]
    impl CertInspector for CannedInspector {
        async fn inspect(&self, cert_path: &Path) -> Result<String> {
            self.reports
                .get(cert_path)
                .cloned()
                .ok_or_else(|| CertError::ExternalCommand {
                    command: format!("openssl x509 -in {}", cert_path.display()),
                    status: "exit status: 1".to_string(),
                    stdout: String::new(),
                    stderr: "unable to load certificate".to_string(),
                })
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap()
    }

    fn add_domain(root: &Path, domain: &str, with_cert: bool) -> PathBuf {
        let dir = root.join(domain);
        std::fs::create_dir_all(&dir).unwrap();
        let cert = dir.join("cert.pem");
        if with_cert {
            std::fs::write(&cert, "-----BEGIN CERTIFICATE-----\n").unwrap();
        }
        cert
    }

    #[test]
    fn test_parse_openssl_dates() {
        let expiry = parse_not_after("a", "notAfter=Jun  1 00:00:00 2031 GMT\n").unwrap();
        assert_eq!(expiry, Utc.with_ymd_and_hms(2031, 6, 1, 0, 0, 0).unwrap());

        let expiry = parse_not_after("a", "notAfter=Dec 25 13:45:10 2025 GMT").unwrap();
        assert_eq!(expiry, Utc.with_ymd_and_hms(2025, 12, 25, 13, 45, 10).unwrap());
    }

    #[test]
    fn test_parse_fallback_formats() {
        let expiry = parse_not_after("a", "notAfter=Tue, 1 Jul 2025 10:00:00 +0000").unwrap();
        assert_eq!(expiry, Utc.with_ymd_and_hms(2025, 7, 1, 10, 0, 0).unwrap());

        let expiry = parse_not_after("a", "notAfter=2025-07-01T12:00:00+02:00").unwrap();
        assert_eq!(expiry, Utc.with_ymd_and_hms(2025, 7, 1, 10, 0, 0).unwrap());
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(
            parse_not_after("a.example", "subject=CN = a.example"),
            Err(CertError::Parse { ref domain, .. }) if domain == "a.example"
        ));
        assert!(matches!(
            parse_not_after("a.example", "notAfter=sometime soon"),
            Err(CertError::Parse { .. })
        ));
    }

    #[tokio::test]
    async fn test_scan_skips_domain_without_certificate() {
        let root = TempDir::new().unwrap();
        let valid = add_domain(root.path(), "valid.example", true);
        add_domain(root.path(), "missing.example", false);
        std::fs::write(root.path().join("README"), "not a domain").unwrap();

        let inspector = CannedInspector {
            reports: HashMap::from([(
                valid.clone(),
                "notAfter=Jun 30 00:00:00 2025 GMT".to_string(),
            )]),
        };
        let scanner = CertScanner::new(root.path(), "cert.pem", Arc::new(inspector));

        let report = scanner.scan_at(now()).await.unwrap();

        assert_eq!(report.records.len(), 1);
        assert_eq!(report.records[0].domain, "valid.example");
        assert_eq!(report.records[0].cert_path, valid);
        assert_eq!(report.records[0].days_remaining, 29);
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].domain, "missing.example");
    }

    #[tokio::test]
    async fn test_scan_continues_past_inspector_and_parse_failures() {
        let root = TempDir::new().unwrap();
        let good = add_domain(root.path(), "good.example", true);
        let garbled = add_domain(root.path(), "garbled.example", true);
        add_domain(root.path(), "unreadable.example", true);

        let inspector = CannedInspector {
            reports: HashMap::from([
                (good, "notAfter=May 20 00:00:00 2025 GMT".to_string()),
                (garbled, "certificate has no end date".to_string()),
            ]),
        };
        let scanner = CertScanner::new(root.path(), "cert.pem", Arc::new(inspector));

        let report = scanner.scan_at(now()).await.unwrap();

        assert_eq!(report.records.len(), 1);
        assert_eq!(report.records[0].days_remaining, -12);
        let mut skipped: Vec<_> = report.skipped.iter().map(|s| s.domain.as_str()).collect();
        skipped.sort();
        assert_eq!(skipped, vec!["garbled.example", "unreadable.example"]);
    }

    #[tokio::test]
    async fn test_missing_root_fails_scan() {
        let scanner = CertScanner::new(
            "/nonexistent/letsencrypt/live",
            "cert.pem",
            Arc::new(CannedInspector {
                reports: HashMap::new(),
            }),
        );

        assert!(matches!(
            scanner.scan().await,
            Err(CertError::FileSystem { .. })
        ));
    }

    #[test]
    fn test_candidates_only_lists_directories() {
        let root = TempDir::new().unwrap();
        add_domain(root.path(), "a.example", true);
        std::fs::write(root.path().join("stray.pem"), "").unwrap();

        let scanner = CertScanner::new(
            root.path(),
            "cert.pem",
            Arc::new(CannedInspector {
                reports: HashMap::new(),
            }),
        );
        let candidates: Vec<Candidate> = scanner.candidates().unwrap().collect();

        assert_eq!(
            candidates,
            vec![Candidate {
                domain: "a.example".to_string(),
                cert_path: root.path().join("a.example").join("cert.pem"),
            }]
        );
    }
}
