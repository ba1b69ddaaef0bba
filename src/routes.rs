use std::ops::DerefMut;
use std::str::FromStr;

use actix_request_identifier::RequestId;
use actix_web::{get, post, put, web, HttpRequest, HttpResponse};
use bigdecimal::{BigDecimal, Signed, Zero};
use diesel::r2d2::{ConnectionManager, Pool};
use diesel::PgConnection;
use serde::Deserialize;
use tracing::{error, instrument};

use crate::admin::AdminDirectory;
use crate::database::models::{LedgerEntryType, RequestStatus};
use crate::database::mutations::{CreateWithdrawalResult, ReviewOutcome};
use crate::database::{ledger, mutations, queries};
use crate::notify::Notifier;
use crate::sync::SyncEvent;
use crate::{iban, notify, responses};

type DbPool = Pool<ConnectionManager<PgConnection>>;

const ADMIN_ID_HEADER: &str = "x-admin-id";

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetBankAccountInput {
    pub user_id: String,
    pub bank_account_number: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreditInput {
    pub idempotency_key: String,
    pub user_id: String,
    pub entry_type: String,
    pub amount: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateWithdrawalInput {
    pub user_id: String,
    pub amount: String,
    pub bank_account_number: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewInput {
    pub admin_id: String,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Deserialize, Debug)]
pub struct AdminListQuery {
    pub status: Option<String>,
}

#[get("/balance/{user_id}")]
#[instrument(skip(db), fields(request_id = request_id.as_str()))]
pub async fn balance_handler(
    db: web::Data<DbPool>,
    request_id: RequestId,
    user_id: web::Path<String>,
) -> Result<HttpResponse, Box<dyn std::error::Error>> {
    let user_id = user_id.into_inner();
    let mut conn = db.get()?;

    let user_id1 = user_id.clone();
    web::block(move || queries::load_balance_info(conn.deref_mut(), user_id1.as_str()).map_err(anyhow::Error::from))
        .await
        .unwrap_or_else(|e| {
            error!("{e}");
            Err(e.into())
        })
        .map(|info| match info {
            queries::BalanceInfo::Ok(values) => responses::balance_http_response(values, user_id.as_str()),
            queries::BalanceInfo::NotFound => responses::not_found_http_response(),
        })
        .map_err(Into::into)
}

#[put("/bank-account")]
#[instrument(skip(db, input), fields(request_id = request_id.as_str()))]
pub async fn set_bank_account_handler(
    db: web::Data<DbPool>,
    request_id: RequestId,
    input: web::Json<SetBankAccountInput>,
) -> Result<HttpResponse, Box<dyn std::error::Error>> {
    if input.user_id.is_empty() {
        return Ok(responses::bad_parameter_http_response("userId"));
    }
    if !iban::account_format().is_valid(&input.bank_account_number) {
        return Ok(responses::bad_parameter_http_response("bankAccountNumber"));
    }

    let mut conn = db.get()?;
    web::block(move || {
        mutations::set_bank_account(conn.deref_mut(), input.user_id.as_str(), input.bank_account_number.as_str())
            .map_err(anyhow::Error::from)
    })
    .await
    .unwrap_or_else(|e| {
        error!("{e}");
        Err(e.into())
    })
    .map(|_| responses::ok_http_response())
    .map_err(Into::into)
}

// earning/commission appends coming from the purchase and referral flows
#[post("/earnings")]
#[instrument(skip(db, input), fields(request_id = request_id.as_str()))]
pub async fn credit_handler(
    db: web::Data<DbPool>,
    request_id: RequestId,
    input: web::Json<CreditInput>,
) -> Result<HttpResponse, Box<dyn std::error::Error>> {
    if input.idempotency_key.is_empty() {
        return Ok(responses::bad_parameter_http_response("idempotencyKey"));
    }
    if input.user_id.is_empty() {
        return Ok(responses::bad_parameter_http_response("userId"));
    }
    let entry_type = match LedgerEntryType::parse(&input.entry_type) {
        Some(entry_type @ (LedgerEntryType::Earning | LedgerEntryType::Commission)) => entry_type,
        _ => return Ok(responses::bad_parameter_http_response("entryType")),
    };
    let req_amount = match BigDecimal::from_str(&input.amount) {
        Ok(req_amount) if !req_amount.is_negative() && !req_amount.is_zero() => req_amount,
        _ => return Ok(responses::bad_parameter_http_response("amount")),
    };

    let mut conn = db.get()?;
    let user_id = input.user_id.clone();

    enum BlockResult {
        Balance(queries::BalanceValues),
        Conflict,
        Error(anyhow::Error),
    }
    web::block(move || {
        let credited = ledger::credit(
            conn.deref_mut(),
            input.idempotency_key.as_str(),
            input.user_id.as_str(),
            entry_type,
            req_amount,
        );
        match credited {
            Ok(_) => {}
            Err(e) if ledger::is_write_conflict(&e) => return BlockResult::Conflict,
            Err(e) => return BlockResult::Error(e.into()),
        }
        match queries::load_balance_info(conn.deref_mut(), input.user_id.as_str()) {
            // credit initialized the balance row, so the view exists
            Ok(queries::BalanceInfo::Ok(values)) => BlockResult::Balance(values),
            Ok(queries::BalanceInfo::NotFound) => {
                BlockResult::Error(anyhow::anyhow!("balance row missing after credit"))
            }
            Err(e) => BlockResult::Error(e.into()),
        }
    })
    .await
    .map(|res| match res {
        BlockResult::Balance(values) => Ok(responses::balance_http_response(values, user_id.as_str())),
        BlockResult::Conflict => Ok(responses::transient_http_response()),
        BlockResult::Error(e) => {
            error!("{e}");
            Err(e.into())
        }
    })
    .unwrap_or_else(|e| {
        error!("{e}");
        Err(e.into())
    })
}

#[post("/withdrawals")]
#[instrument(skip(db, notifier, input), fields(request_id = request_id.as_str()))]
pub async fn create_withdrawal_handler(
    db: web::Data<DbPool>,
    notifier: web::Data<Notifier>,
    request_id: RequestId,
    input: web::Json<CreateWithdrawalInput>,
) -> Result<HttpResponse, Box<dyn std::error::Error>> {
    if input.user_id.is_empty() {
        return Ok(responses::bad_parameter_http_response("userId"));
    }
    let req_amount = match BigDecimal::from_str(&input.amount) {
        Ok(req_amount) => req_amount,
        Err(_) => return Ok(responses::bad_parameter_http_response("amount")),
    };
    if !mutations::is_valid_amount(&req_amount) {
        return Ok(responses::bad_parameter_http_response("amount"));
    }
    if !iban::account_format().is_valid(&input.bank_account_number) {
        return Ok(responses::bad_parameter_http_response("bankAccountNumber"));
    }

    let mut conn = db.get()?;
    let notifier = notifier.into_inner();

    enum BlockResult {
        Created(crate::database::models::WithdrawalRequest),
        Insufficient(BigDecimal),
        Conflict,
        Error(anyhow::Error),
    }
    web::block(move || {
        match mutations::create_withdrawal(
            conn.deref_mut(),
            input.user_id.as_str(),
            req_amount,
            input.bank_account_number.as_str(),
        ) {
            Ok(CreateWithdrawalResult::Ok(request)) => {
                notify::dispatch(&notifier, conn.deref_mut(), &SyncEvent::created(&request));
                BlockResult::Created(request)
            }
            Ok(CreateWithdrawalResult::InsufficientBalance { available }) => BlockResult::Insufficient(available),
            Err(e) if ledger::is_write_conflict(&e) => BlockResult::Conflict,
            Err(e) => BlockResult::Error(e.into()),
        }
    })
    .await
    .map(|res| match res {
        BlockResult::Created(request) => Ok(responses::withdrawal_request_http_response(&request)),
        BlockResult::Insufficient(available) => Ok(responses::insufficient_balance_http_response(&available)),
        BlockResult::Conflict => Ok(responses::transient_http_response()),
        BlockResult::Error(e) => {
            error!("{e}");
            Err(e.into())
        }
    })
    .unwrap_or_else(|e| {
        error!("{e}");
        Err(e.into())
    })
}

#[get("/withdrawals/{user_id}")]
#[instrument(skip(db), fields(request_id = request_id.as_str()))]
pub async fn own_withdrawals_handler(
    db: web::Data<DbPool>,
    request_id: RequestId,
    user_id: web::Path<String>,
) -> Result<HttpResponse, Box<dyn std::error::Error>> {
    let mut conn = db.get()?;
    let user_id = user_id.into_inner();

    web::block(move || queries::list_for_user(conn.deref_mut(), user_id.as_str()).map_err(anyhow::Error::from))
        .await
        .unwrap_or_else(|e| {
            error!("{e}");
            Err(e.into())
        })
        .map(|requests| responses::withdrawal_list_http_response(&requests))
        .map_err(Into::into)
}

#[get("/admin/withdrawals")]
#[instrument(skip(db, admins, req), fields(request_id = request_id.as_str()))]
pub async fn admin_list_handler(
    db: web::Data<DbPool>,
    admins: web::Data<AdminDirectory>,
    request_id: RequestId,
    req: HttpRequest,
    query: web::Query<AdminListQuery>,
) -> Result<HttpResponse, Box<dyn std::error::Error>> {
    if !is_admin_request(&req, &admins) {
        return Ok(responses::forbidden_http_response());
    }
    let status_filter = match &query.status {
        None => None,
        Some(raw) => match RequestStatus::parse(raw) {
            Some(status_filter) => Some(status_filter),
            None => return Ok(responses::bad_parameter_http_response("status")),
        },
    };

    let mut conn = db.get()?;
    web::block(move || queries::list_requests(conn.deref_mut(), status_filter).map_err(anyhow::Error::from))
        .await
        .unwrap_or_else(|e| {
            error!("{e}");
            Err(e.into())
        })
        .map(|rows| responses::admin_list_http_response(&rows))
        .map_err(Into::into)
}

#[post("/admin/withdrawals/{request_id}/approve")]
#[instrument(skip(db, admins, notifier, input), fields(request_id = request_id.as_str()))]
pub async fn admin_approve_handler(
    db: web::Data<DbPool>,
    admins: web::Data<AdminDirectory>,
    notifier: web::Data<Notifier>,
    request_id: RequestId,
    path: web::Path<i64>,
    input: web::Json<ReviewInput>,
) -> Result<HttpResponse, Box<dyn std::error::Error>> {
    review_withdrawal(db, admins, notifier, path.into_inner(), input.into_inner(), ReviewAction::Approve).await
}

#[post("/admin/withdrawals/{request_id}/reject")]
#[instrument(skip(db, admins, notifier, input), fields(request_id = request_id.as_str()))]
pub async fn admin_reject_handler(
    db: web::Data<DbPool>,
    admins: web::Data<AdminDirectory>,
    notifier: web::Data<Notifier>,
    request_id: RequestId,
    path: web::Path<i64>,
    input: web::Json<ReviewInput>,
) -> Result<HttpResponse, Box<dyn std::error::Error>> {
    review_withdrawal(db, admins, notifier, path.into_inner(), input.into_inner(), ReviewAction::Reject).await
}

#[derive(Clone, Copy)]
enum ReviewAction {
    Approve,
    Reject,
}

// both admin transitions share the authorization check, the manager call
// and the fire-and-forget notification fan-out
async fn review_withdrawal(
    db: web::Data<DbPool>,
    admins: web::Data<AdminDirectory>,
    notifier: web::Data<Notifier>,
    withdrawal_id: i64,
    input: ReviewInput,
    action: ReviewAction,
) -> Result<HttpResponse, Box<dyn std::error::Error>> {
    if input.admin_id.is_empty() || !admins.is_authorized(&input.admin_id) {
        return Ok(responses::forbidden_http_response());
    }

    let mut conn = db.get()?;
    let notifier = notifier.into_inner();

    enum BlockResult {
        Reviewed(crate::database::models::WithdrawalRequest),
        AlreadyProcessed(RequestStatus),
        NotFound,
        Conflict,
        Error(anyhow::Error),
    }
    web::block(move || {
        let notes = input.notes.as_deref();
        let outcome = match action {
            ReviewAction::Approve => mutations::approve(conn.deref_mut(), withdrawal_id, input.admin_id.as_str(), notes),
            ReviewAction::Reject => mutations::reject(conn.deref_mut(), withdrawal_id, input.admin_id.as_str(), notes),
        };
        match outcome {
            Ok(ReviewOutcome::Ok(request)) => {
                let event = match action {
                    ReviewAction::Approve => SyncEvent::approved(&request),
                    ReviewAction::Reject => SyncEvent::rejected(&request),
                };
                notify::dispatch(&notifier, conn.deref_mut(), &event);
                BlockResult::Reviewed(request)
            }
            Ok(ReviewOutcome::AlreadyProcessed { status }) => BlockResult::AlreadyProcessed(status),
            Ok(ReviewOutcome::NotFound) => BlockResult::NotFound,
            Err(e) if ledger::is_write_conflict(&e) => BlockResult::Conflict,
            Err(e) => BlockResult::Error(e.into()),
        }
    })
    .await
    .map(|res| match res {
        BlockResult::Reviewed(request) => Ok(responses::withdrawal_request_http_response(&request)),
        BlockResult::AlreadyProcessed(status) => Ok(responses::already_processed_http_response(status)),
        BlockResult::NotFound => Ok(responses::not_found_http_response()),
        BlockResult::Conflict => Ok(responses::transient_http_response()),
        BlockResult::Error(e) => {
            error!("{e}");
            Err(e.into())
        }
    })
    .unwrap_or_else(|e| {
        error!("{e}");
        Err(e.into())
    })
}

fn is_admin_request(req: &HttpRequest, admins: &AdminDirectory) -> bool {
    req.headers()
        .get(ADMIN_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(|admin_id| admins.is_authorized(admin_id))
        .unwrap_or(false)
}
