use actix_web::HttpResponse;
use serde::Serialize;

use crate::database::models::{RequestStatus, WithdrawalRequest};
use crate::database::queries::{BalanceValues, RequesterSnapshot};

/// Wire DTOs. Amounts travel as decimal strings so no consumer is tempted
/// to do float arithmetic on money.

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceData {
    pub user_id: String,
    pub balance: String,
    pub pending_withdrawal: String,
    pub total_earned: String,
    pub total_withdrawn_completed: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WithdrawalRequestData {
    pub id: i64,
    pub user_id: String,
    pub amount: String,
    pub bank_account_number: String,
    pub status: String,
    pub created_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reviewed_by: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reviewed_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub admin_notes: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequesterData {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub balance: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminRequestData {
    #[serde(flatten)]
    pub request: WithdrawalRequestData,
    pub requester: RequesterData,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ErrorData {
    kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    field: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    available: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    status: Option<String>,
}

#[derive(Serialize)]
struct ErrorOutput {
    error: ErrorData,
}

impl WithdrawalRequestData {
    pub fn from_model(request: &WithdrawalRequest) -> Self {
        Self {
            id: request.id,
            user_id: request.user_id.clone(),
            amount: request.amount.to_string(),
            bank_account_number: request.bank_account_number.clone(),
            status: request.status.clone(),
            created_at: request.created_at.and_utc().to_rfc3339(),
            reviewed_by: request.reviewed_by.clone(),
            reviewed_at: request.reviewed_at.map(|at| at.and_utc().to_rfc3339()),
            admin_notes: request.admin_notes.clone(),
        }
    }
}

pub fn balance_http_response(values: BalanceValues, user_id: &str) -> HttpResponse {
    HttpResponse::Ok().json(BalanceData {
        user_id: user_id.to_string(),
        balance: values.balance.to_string(),
        pending_withdrawal: values.pending_withdrawal.to_string(),
        total_earned: values.total_earned.to_string(),
        total_withdrawn_completed: values.total_withdrawn_completed.to_string(),
    })
}

pub fn withdrawal_request_http_response(request: &WithdrawalRequest) -> HttpResponse {
    HttpResponse::Ok().json(WithdrawalRequestData::from_model(request))
}

pub fn withdrawal_list_http_response(requests: &[WithdrawalRequest]) -> HttpResponse {
    let data: Vec<WithdrawalRequestData> = requests.iter().map(WithdrawalRequestData::from_model).collect();
    HttpResponse::Ok().json(data)
}

pub fn admin_list_http_response(rows: &[(WithdrawalRequest, RequesterSnapshot)]) -> HttpResponse {
    let data: Vec<AdminRequestData> = rows
        .iter()
        .map(|(request, snapshot)| AdminRequestData {
            request: WithdrawalRequestData::from_model(request),
            requester: RequesterData {
                username: snapshot.username.clone(),
                email: snapshot.email.clone(),
                balance: snapshot.balance.as_ref().map(|balance| balance.to_string()),
            },
        })
        .collect();
    HttpResponse::Ok().json(data)
}

pub fn ok_http_response() -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({ "ok": true }))
}

pub fn bad_parameter_http_response(field: &str) -> HttpResponse {
    HttpResponse::BadRequest().json(ErrorOutput {
        error: ErrorData {
            kind: "validation",
            field: Some(field.to_string()),
            available: None,
            status: None,
        },
    })
}

pub fn insufficient_balance_http_response(available: &bigdecimal::BigDecimal) -> HttpResponse {
    HttpResponse::Conflict().json(ErrorOutput {
        error: ErrorData {
            kind: "insufficient_balance",
            field: None,
            available: Some(available.to_string()),
            status: None,
        },
    })
}

pub fn not_found_http_response() -> HttpResponse {
    HttpResponse::NotFound().json(ErrorOutput {
        error: ErrorData {
            kind: "not_found",
            field: None,
            available: None,
            status: None,
        },
    })
}

// reports the request's actual current status so the caller can
// reconcile its view instead of guessing
pub fn already_processed_http_response(status: RequestStatus) -> HttpResponse {
    HttpResponse::Conflict().json(ErrorOutput {
        error: ErrorData {
            kind: "already_processed",
            field: None,
            available: None,
            status: Some(status.as_str().to_string()),
        },
    })
}

pub fn forbidden_http_response() -> HttpResponse {
    HttpResponse::Forbidden().json(ErrorOutput {
        error: ErrorData {
            kind: "forbidden",
            field: None,
            available: None,
            status: None,
        },
    })
}

// a write conflict that survived the bounded retries; safe to retry
pub fn transient_http_response() -> HttpResponse {
    HttpResponse::ServiceUnavailable().json(ErrorOutput {
        error: ErrorData {
            kind: "transient",
            field: None,
            available: None,
            status: None,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use bigdecimal::BigDecimal;
    use std::str::FromStr;

    #[test]
    fn test_amounts_serialize_as_strings() {
        let data = BalanceData {
            user_id: "creator_1".to_string(),
            balance: BigDecimal::from_str("40.50").unwrap().to_string(),
            pending_withdrawal: "60".to_string(),
            total_earned: "100.50".to_string(),
            total_withdrawn_completed: "0".to_string(),
        };
        let json = serde_json::to_value(&data).unwrap();
        assert_eq!(json["balance"], "40.50");
        assert_eq!(json["pendingWithdrawal"], "60");
    }
}
