use crate::domain::model::Notification;
use crate::domain::ports::Mailer;
use std::sync::Arc;

/// Best-effort delivery of outcome emails. A failed delivery is logged and
/// dropped; callers never see it.
#[derive(Clone)]
pub struct Notifier {
    mailer: Option<Arc<dyn Mailer>>,
}

impl Notifier {
    pub fn new(mailer: Arc<dyn Mailer>) -> Self {
        Self {
            mailer: Some(mailer),
        }
    }

    pub fn disabled() -> Self {
        Self { mailer: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.mailer.is_some()
    }

    pub async fn notify(&self, subject: &str, body: &str) {
        let Some(mailer) = &self.mailer else {
            return;
        };

        match mailer.send(&Notification::new(subject, body)).await {
            Ok(()) => tracing::info!("Notification email sent: {}", subject),
            Err(e) => tracing::error!("Failed to send email notification: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::error::{CertError, Result};
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Default)]
    struct FlakyMailer {
        attempts: Mutex<Vec<Notification>>,
    }

    #[async_trait]
    impl Mailer for FlakyMailer {
        async fn send(&self, notification: &Notification) -> Result<()> {
            self.attempts.lock().unwrap().push(notification.clone());
            Err(CertError::transport("connection refused"))
        }
    }

    #[test]
    fn test_disabled_notifier_sends_nothing() {
        let notifier = Notifier::disabled();
        assert!(!notifier.is_enabled());
        tokio_test::block_on(notifier.notify("Certificate Renewal Failed", "boom"));
    }

    #[tokio::test]
    async fn test_delivery_failure_is_swallowed_after_one_attempt() {
        let mailer = Arc::new(FlakyMailer::default());
        let notifier = Notifier::new(mailer.clone());

        notifier.notify("Certificate Renewal Failed", "boom").await;

        let attempts = mailer.attempts.lock().unwrap();
        assert_eq!(attempts.len(), 1);
        assert_eq!(attempts[0].subject, "Certificate Renewal Failed");
        assert_eq!(attempts[0].body, "boom");
    }
}
