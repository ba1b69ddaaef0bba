use diesel::PgConnection;
use tracing::{info, warn};

use crate::database::queries;
use crate::sync::SyncEvent;

/// Best-effort notification and email collaborators. Real delivery (push
/// gateway, mail provider) lives outside this service; the stand-ins log
/// what would be sent. Dispatch runs after the ledger transaction has
/// committed and a failure here must never unwind a committed transition.
#[derive(Debug, Clone, Default)]
pub struct Notifier;

#[derive(Debug)]
pub struct DeliveryError(pub String);

impl std::fmt::Display for DeliveryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "notification delivery failed: {}", self.0)
    }
}

impl std::error::Error for DeliveryError {}

impl Notifier {
    pub fn notify(&self, user_id: &str, event: &SyncEvent) -> Result<(), DeliveryError> {
        info!(
            "notify user {}: {} request {} -> {}",
            user_id, event.event, event.request_id, event.status
        );
        Ok(())
    }

    pub fn send_email(&self, email: &str, template: &str, event: &SyncEvent) -> Result<(), DeliveryError> {
        info!("email {} template {} for request {}", email, template, event.request_id);
        Ok(())
    }
}

pub fn create_notifier() -> Notifier {
    Notifier
}

// fire-and-forget fan-out for a committed transition; failures are
// logged, counted against nothing and never returned to the caller
pub fn dispatch(notifier: &Notifier, conn: &mut PgConnection, event: &SyncEvent) {
    if let Err(e) = notifier.notify(&event.user_id, event) {
        warn!("{e}");
    }
    match queries::load_profile(conn, &event.user_id) {
        Ok(Some(profile)) => {
            if let Err(e) = notifier.send_email(&profile.email, &event.event, event) {
                warn!("{e}");
            }
        }
        Ok(None) => {}
        Err(e) => warn!("profile lookup for notification failed: {e}"),
    }
}
