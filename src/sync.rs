use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::database::models::{RequestStatus, WithdrawalRequest};

/// Change events published to clients after a committed transition.
/// Delivery is at-least-once: consumers may see the same event twice, or
/// see events arrive after a fresher refetch already landed. The store is
/// the sole source of truth; these events only hint that a refetch is
/// worthwhile, and `RequestCache::apply_event` is the reconciliation rule
/// that makes duplicated or stale deliveries harmless.
#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncEvent {
    pub event: String,
    pub request_id: i64,
    pub user_id: String,
    pub status: String,
    pub amount: String,
}

pub const WITHDRAWAL_CREATED: &str = "withdrawal.created";
pub const WITHDRAWAL_APPROVED: &str = "withdrawal.approved";
pub const WITHDRAWAL_REJECTED: &str = "withdrawal.rejected";

impl SyncEvent {
    pub fn created(request: &WithdrawalRequest) -> Self {
        Self::from_request(WITHDRAWAL_CREATED, request)
    }

    pub fn approved(request: &WithdrawalRequest) -> Self {
        Self::from_request(WITHDRAWAL_APPROVED, request)
    }

    pub fn rejected(request: &WithdrawalRequest) -> Self {
        Self::from_request(WITHDRAWAL_REJECTED, request)
    }

    fn from_request(event: &str, request: &WithdrawalRequest) -> Self {
        Self {
            event: event.to_string(),
            request_id: request.id,
            user_id: request.user_id.clone(),
            status: request.status.clone(),
            amount: request.amount.to_string(),
        }
    }
}

/// Client-side request cache. A consumer may patch it tentatively after
/// calling approve/reject for responsiveness, but must reconcile with a
/// full refetch (`reconcile`) afterwards; tentative state is never
/// committed truth.
#[derive(Default, Debug)]
pub struct RequestCache {
    statuses: HashMap<i64, RequestStatus>,
}

impl RequestCache {
    pub fn status(&self, request_id: i64) -> Option<RequestStatus> {
        self.statuses.get(&request_id).copied()
    }

    /// Apply one delivered event. Returns whether anything changed;
    /// re-applying a transition that already happened is a no-op, and a
    /// terminal status is never downgraded by a late `created` event.
    pub fn apply_event(&mut self, event: &SyncEvent) -> bool {
        let incoming = match RequestStatus::parse(&event.status) {
            Some(incoming) => incoming,
            None => return false,
        };
        match self.statuses.get(&event.request_id) {
            Some(current) if *current == incoming => false,
            Some(current) if current.is_terminal() => false,
            _ => {
                self.statuses.insert(event.request_id, incoming);
                true
            }
        }
    }

    /// Replace the cache with an authoritative refetch.
    pub fn reconcile<'a, I: IntoIterator<Item = &'a WithdrawalRequest>>(&mut self, requests: I) {
        self.statuses = requests
            .into_iter()
            .filter_map(|request| RequestStatus::parse(&request.status).map(|status| (request.id, status)))
            .collect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bigdecimal::BigDecimal;

    fn request(id: i64, status: RequestStatus) -> WithdrawalRequest {
        WithdrawalRequest {
            id,
            user_id: "creator_1".to_string(),
            amount: BigDecimal::from(60),
            bank_account_number: "GE29NB0000000101904917".to_string(),
            status: status.as_str().to_string(),
            created_at: chrono::Utc::now().naive_utc(),
            reviewed_by: None,
            reviewed_at: None,
            admin_notes: None,
        }
    }

    #[test]
    fn test_duplicate_delivery_is_noop() {
        let mut cache = RequestCache::default();
        let created = SyncEvent::created(&request(1, RequestStatus::Pending));
        let approved = SyncEvent::approved(&request(1, RequestStatus::Completed));

        assert!(cache.apply_event(&created));
        assert!(cache.apply_event(&approved));
        assert!(!cache.apply_event(&approved));
        assert_eq!(cache.status(1), Some(RequestStatus::Completed));
    }

    #[test]
    fn test_stale_created_after_terminal_is_noop() {
        let mut cache = RequestCache::default();
        assert!(cache.apply_event(&SyncEvent::rejected(&request(2, RequestStatus::Rejected))));
        assert!(!cache.apply_event(&SyncEvent::created(&request(2, RequestStatus::Pending))));
        assert_eq!(cache.status(2), Some(RequestStatus::Rejected));
    }

    #[test]
    fn test_reconcile_overrides_tentative_state() {
        let mut cache = RequestCache::default();
        cache.apply_event(&SyncEvent::created(&request(3, RequestStatus::Pending)));
        // tentative local patch turned out wrong; the refetch wins
        cache.reconcile([&request(3, RequestStatus::Completed)]);
        assert_eq!(cache.status(3), Some(RequestStatus::Completed));
        assert_eq!(cache.status(4), None);
    }

    #[test]
    fn test_event_payload_shape() {
        let event = SyncEvent::approved(&request(5, RequestStatus::Completed));
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "withdrawal.approved");
        assert_eq!(json["requestId"], 5);
        assert_eq!(json["status"], "completed");
    }
}
