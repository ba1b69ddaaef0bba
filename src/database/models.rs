use bigdecimal::BigDecimal;
use chrono::NaiveDateTime;
use diesel::prelude::*;

/// Kind of a signed, append-only ledger entry. `Earning` and `Commission`
/// are credited by external purchase/referral flows; the two withdrawal
/// kinds are written by the withdrawal request manager and always
/// reference a request.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum LedgerEntryType {
    Earning,
    Commission,
    WithdrawalReserved,
    WithdrawalReversed,
}

impl LedgerEntryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            LedgerEntryType::Earning => "earning",
            LedgerEntryType::Commission => "commission",
            LedgerEntryType::WithdrawalReserved => "withdrawal_reserved",
            LedgerEntryType::WithdrawalReversed => "withdrawal_reversed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "earning" => Some(LedgerEntryType::Earning),
            "commission" => Some(LedgerEntryType::Commission),
            "withdrawal_reserved" => Some(LedgerEntryType::WithdrawalReserved),
            "withdrawal_reversed" => Some(LedgerEntryType::WithdrawalReversed),
            _ => None,
        }
    }
}

/// Withdrawal request state. `Pending` transitions exactly once to one of
/// the two terminal states and never back.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum RequestStatus {
    Pending,
    Completed,
    Rejected,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Pending => "pending",
            RequestStatus::Completed => "completed",
            RequestStatus::Rejected => "rejected",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(RequestStatus::Pending),
            "completed" => Some(RequestStatus::Completed),
            "rejected" => Some(RequestStatus::Rejected),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, RequestStatus::Pending)
    }
}

#[derive(Queryable)]
pub struct Balance {
    pub user_id: String,
    pub current_value: BigDecimal,
    pub bank_account_number: Option<String>,
}

#[derive(Queryable)]
pub struct LedgerEntry {
    pub id: i64,
    pub user_id: String,
    pub entry_type: String,
    pub amount: BigDecimal,
    pub request_id: Option<i64>,
    pub idempotency_key: Option<String>,
    pub created_at: NaiveDateTime,
}

#[derive(Insertable)]
#[diesel(table_name = crate::schema::ledger_entry)]
pub struct NewLedgerEntry {
    pub id: i64,
    pub user_id: String,
    pub entry_type: String,
    pub amount: BigDecimal,
    pub request_id: Option<i64>,
    pub idempotency_key: Option<String>,
    pub created_at: NaiveDateTime,
}

#[derive(Queryable, Clone, PartialEq, Debug)]
pub struct WithdrawalRequest {
    pub id: i64,
    pub user_id: String,
    pub amount: BigDecimal,
    pub bank_account_number: String,
    pub status: String,
    pub created_at: NaiveDateTime,
    pub reviewed_by: Option<String>,
    pub reviewed_at: Option<NaiveDateTime>,
    pub admin_notes: Option<String>,
}

#[derive(Insertable)]
#[diesel(table_name = crate::schema::withdrawal_request)]
pub struct NewWithdrawalRequest {
    pub id: i64,
    pub user_id: String,
    pub amount: BigDecimal,
    pub bank_account_number: String,
    pub status: String,
    pub created_at: NaiveDateTime,
}

#[derive(Queryable)]
pub struct UserProfile {
    pub user_id: String,
    pub username: String,
    pub email: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trip() {
        for status in [RequestStatus::Pending, RequestStatus::Completed, RequestStatus::Rejected] {
            assert_eq!(RequestStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(RequestStatus::parse("cancelled"), None);
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(!RequestStatus::Pending.is_terminal());
        assert!(RequestStatus::Completed.is_terminal());
        assert!(RequestStatus::Rejected.is_terminal());
    }

    #[test]
    fn test_entry_type_round_trip() {
        for entry_type in [
            LedgerEntryType::Earning,
            LedgerEntryType::Commission,
            LedgerEntryType::WithdrawalReserved,
            LedgerEntryType::WithdrawalReversed,
        ] {
            assert_eq!(LedgerEntryType::parse(entry_type.as_str()), Some(entry_type));
        }
        assert_eq!(LedgerEntryType::parse("refund"), None);
    }
}
