use bigdecimal::BigDecimal;
use diesel::result::Error;
use diesel::{Connection, ExpressionMethods, OptionalExtension, PgConnection, QueryDsl, RunQueryDsl};

use crate::database::ledger::retry_on_conflict;
use crate::database::models::{LedgerEntryType, NewLedgerEntry, NewWithdrawalRequest, RequestStatus, WithdrawalRequest};
use crate::database::{idgen, ledger, models};

/// Smallest amount a creator may withdraw, inclusive.
pub const MIN_WITHDRAWAL: i64 = 20;

pub fn is_valid_amount(amount: &BigDecimal) -> bool {
    *amount >= BigDecimal::from(MIN_WITHDRAWAL)
}

#[derive(PartialEq, Debug)]
pub enum CreateWithdrawalResult {
    Ok(WithdrawalRequest),
    InsufficientBalance { available: BigDecimal },
}

#[derive(PartialEq, Debug)]
pub enum ReviewOutcome {
    Ok(WithdrawalRequest),
    AlreadyProcessed { status: RequestStatus },
    NotFound,
}

/// Atomic check-and-reserve. Inside one transaction the user's balance
/// row is locked `FOR UPDATE`, availability is recomputed from the locked
/// projection, and either nothing happens (insufficient balance) or the
/// pending request, the `withdrawal_reserved` ledger entry of `-amount`
/// and the projection update commit together. The row lock is what makes
/// two racing creates for the same user serialize: the loser re-checks
/// against the winner's committed reservation.
///
/// Amount and account format validation happen at the route layer before
/// any database work.
pub fn create_withdrawal(
    conn: &mut PgConnection,
    req_user_id: &str,
    req_amount: BigDecimal,
    req_bank_account_number: &str,
) -> Result<CreateWithdrawalResult, Error> {
    ledger::init_user_balance(conn, req_user_id)?;

    retry_on_conflict(conn, |conn| {
        conn.transaction::<_, Error, _>(|conn| {
            let user_balance = ledger::lock_balance(conn, req_user_id)?;

            // the projection already nets out completed withdrawals and
            // every other pending reservation
            let available = user_balance.current_value;
            if req_amount > available {
                return Ok(CreateWithdrawalResult::InsufficientBalance { available });
            }

            let request_id = idgen::next();
            let request = {
                use crate::schema::withdrawal_request::dsl::*;
                diesel::insert_into(withdrawal_request)
                    .values(&NewWithdrawalRequest {
                        id: request_id,
                        user_id: req_user_id.to_string(),
                        amount: req_amount.clone(),
                        bank_account_number: req_bank_account_number.to_string(),
                        status: RequestStatus::Pending.as_str().to_string(),
                        created_at: chrono::Utc::now().naive_utc(),
                    })
                    .get_result::<WithdrawalRequest>(conn)?
            };

            ledger::append(
                conn,
                NewLedgerEntry {
                    id: idgen::next(),
                    user_id: req_user_id.to_string(),
                    entry_type: LedgerEntryType::WithdrawalReserved.as_str().to_string(),
                    amount: -req_amount.clone(),
                    request_id: Some(request_id),
                    idempotency_key: None,
                    created_at: chrono::Utc::now().naive_utc(),
                },
            )?;
            ledger::set_cached_balance(conn, req_user_id, available - req_amount.clone())?;

            Ok(CreateWithdrawalResult::Ok(request))
        })
    })
}

/// Finalize a pending request. The reservation made at creation time
/// already removed the funds, so no ledger entry is written here; the
/// request row is locked so that of two racing reviewers exactly one
/// wins and the other sees the terminal status.
pub fn approve(
    conn: &mut PgConnection,
    request_id: i64,
    admin_id: &str,
    notes: Option<&str>,
) -> Result<ReviewOutcome, Error> {
    retry_on_conflict(conn, |conn| {
        conn.transaction::<_, Error, _>(|conn| {
            let request = match lock_request(conn, request_id)? {
                Some(request) => request,
                None => return Ok(ReviewOutcome::NotFound),
            };
            if let Some(status) = terminal_status(&request) {
                return Ok(ReviewOutcome::AlreadyProcessed { status });
            }
            let updated = finalize_request(conn, request_id, RequestStatus::Completed, admin_id, notes)?;
            Ok(ReviewOutcome::Ok(updated))
        })
    })
}

/// Reverse a pending request: the terminal status and a
/// `withdrawal_reversed` ledger entry of `+amount` commit together, so
/// the post-reject balance equals the pre-create balance exactly.
pub fn reject(
    conn: &mut PgConnection,
    request_id: i64,
    admin_id: &str,
    notes: Option<&str>,
) -> Result<ReviewOutcome, Error> {
    retry_on_conflict(conn, |conn| {
        conn.transaction::<_, Error, _>(|conn| {
            let request = match lock_request(conn, request_id)? {
                Some(request) => request,
                None => return Ok(ReviewOutcome::NotFound),
            };
            if let Some(status) = terminal_status(&request) {
                return Ok(ReviewOutcome::AlreadyProcessed { status });
            }

            let updated = finalize_request(conn, request_id, RequestStatus::Rejected, admin_id, notes)?;

            let user_balance = ledger::lock_balance(conn, &request.user_id)?;
            ledger::append(
                conn,
                NewLedgerEntry {
                    id: idgen::next(),
                    user_id: request.user_id.clone(),
                    entry_type: LedgerEntryType::WithdrawalReversed.as_str().to_string(),
                    amount: request.amount.clone(),
                    request_id: Some(request_id),
                    idempotency_key: None,
                    created_at: chrono::Utc::now().naive_utc(),
                },
            )?;
            ledger::set_cached_balance(
                conn,
                &request.user_id,
                user_balance.current_value + request.amount.clone(),
            )?;

            Ok(ReviewOutcome::Ok(updated))
        })
    })
}

// stores the creator's payout account; format validation happens at the
// route layer
pub fn set_bank_account(conn: &mut PgConnection, req_user_id: &str, req_account_number: &str) -> Result<(), Error> {
    ledger::init_user_balance(conn, req_user_id)?;
    use crate::schema::balance::dsl::*;
    diesel::update(balance.filter(user_id.eq(req_user_id)))
        .set(bank_account_number.eq(req_account_number))
        .execute(conn)?;
    Ok(())
}

fn lock_request(conn: &mut PgConnection, req_id: i64) -> Result<Option<WithdrawalRequest>, Error> {
    use crate::schema::withdrawal_request::dsl::*;
    withdrawal_request
        .filter(id.eq(req_id))
        .for_update()
        .first::<models::WithdrawalRequest>(conn)
        .optional()
}

fn terminal_status(request: &WithdrawalRequest) -> Option<RequestStatus> {
    RequestStatus::parse(&request.status).filter(RequestStatus::is_terminal)
}

fn finalize_request(
    conn: &mut PgConnection,
    req_id: i64,
    terminal: RequestStatus,
    req_admin_id: &str,
    notes: Option<&str>,
) -> Result<WithdrawalRequest, Error> {
    use crate::schema::withdrawal_request::dsl::*;
    diesel::update(withdrawal_request.filter(id.eq(req_id)))
        .set((
            status.eq(terminal.as_str()),
            reviewed_by.eq(req_admin_id),
            reviewed_at.eq(chrono::Utc::now().naive_utc()),
            admin_notes.eq(notes),
        ))
        .get_result::<WithdrawalRequest>(conn)
}
