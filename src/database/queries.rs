use bigdecimal::BigDecimal;
use diesel::dsl::sum;
use diesel::result::Error;
use diesel::{
    Connection, ExpressionMethods, NullableExpressionMethods, OptionalExtension, PgConnection, QueryDsl, RunQueryDsl,
};

use crate::database::ledger;
use crate::database::models::{self, LedgerEntryType, RequestStatus, WithdrawalRequest};

#[derive(PartialEq, Debug)]
pub enum BalanceInfo {
    Ok(BalanceValues),
    NotFound,
}

#[derive(PartialEq, Debug)]
pub struct BalanceValues {
    pub balance: BigDecimal,
    pub pending_withdrawal: BigDecimal,
    pub total_earned: BigDecimal,
    pub total_withdrawn_completed: BigDecimal,
}

/// Point-in-time balance view derived from the ledger and the live set of
/// withdrawal requests, evaluated inside one transaction. A read taken
/// here is display-only; `mutations::create_withdrawal` recomputes
/// availability under its own lock and never trusts an earlier read.
pub fn load_balance_info(conn: &mut PgConnection, req_user_id: &str) -> Result<BalanceInfo, Error> {
    conn.transaction::<_, Error, _>(|conn| {
        let user_balance = {
            use crate::schema::balance::dsl::*;
            balance
                .filter(user_id.eq(req_user_id))
                .first::<models::Balance>(conn)
                .optional()?
        };
        let user_balance = match user_balance {
            Some(user_balance) => user_balance,
            None => return Ok(BalanceInfo::NotFound),
        };

        let total_earned = ledger::sum_for_user(
            conn,
            req_user_id,
            Some(&[LedgerEntryType::Earning, LedgerEntryType::Commission]),
        )?;

        let pending_withdrawal = sum_of_requests(conn, req_user_id, RequestStatus::Pending)?;
        let total_withdrawn_completed = sum_of_requests(conn, req_user_id, RequestStatus::Completed)?;

        Ok(BalanceInfo::Ok(BalanceValues {
            balance: user_balance.current_value,
            pending_withdrawal,
            total_earned,
            total_withdrawn_completed,
        }))
    })
}

fn sum_of_requests(conn: &mut PgConnection, req_user_id: &str, req_status: RequestStatus) -> Result<BigDecimal, Error> {
    use crate::schema::withdrawal_request::dsl::*;
    withdrawal_request
        .filter(user_id.eq(req_user_id))
        .filter(status.eq(req_status.as_str()))
        .select(sum(amount))
        .first::<Option<BigDecimal>>(conn)
        .map(|total| total.unwrap_or_else(|| BigDecimal::from(0)))
}

// a user's own requests, newest first
pub fn list_for_user(conn: &mut PgConnection, req_user_id: &str) -> Result<Vec<WithdrawalRequest>, Error> {
    use crate::schema::withdrawal_request::dsl::*;
    withdrawal_request
        .filter(user_id.eq(req_user_id))
        .order(created_at.desc())
        .load::<WithdrawalRequest>(conn)
}

/// Snapshot of the requester shown next to each request in the admin
/// review list. All fields are optional: a missing profile or balance row
/// never hides a request from review.
#[derive(PartialEq, Debug)]
pub struct RequesterSnapshot {
    pub username: Option<String>,
    pub email: Option<String>,
    pub balance: Option<BigDecimal>,
}

// admin review list across all users, optionally filtered by status
pub fn list_requests(
    conn: &mut PgConnection,
    status_filter: Option<RequestStatus>,
) -> Result<Vec<(WithdrawalRequest, RequesterSnapshot)>, Error> {
    use crate::schema::{balance, user_profile, withdrawal_request};

    let mut query = withdrawal_request::table
        .left_join(user_profile::table)
        .left_join(balance::table)
        .select((
            withdrawal_request::all_columns,
            user_profile::username.nullable(),
            user_profile::email.nullable(),
            balance::current_value.nullable(),
        ))
        .order(withdrawal_request::created_at.desc())
        .into_boxed();
    if let Some(status_filter) = status_filter {
        query = query.filter(withdrawal_request::status.eq(status_filter.as_str()));
    }

    let rows = query.load::<(WithdrawalRequest, Option<String>, Option<String>, Option<BigDecimal>)>(conn)?;
    Ok(rows
        .into_iter()
        .map(|(request, username, email, balance)| (request, RequesterSnapshot { username, email, balance }))
        .collect())
}

pub fn load_profile(conn: &mut PgConnection, req_user_id: &str) -> Result<Option<models::UserProfile>, Error> {
    use crate::schema::user_profile::dsl::*;
    user_profile
        .filter(user_id.eq(req_user_id))
        .first::<models::UserProfile>(conn)
        .optional()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::{connect, idgen};
    use std::ops::DerefMut;

    #[test]
    fn test_balance_info_not_found() {
        let Some(pool) = connect::test_pool() else { return };
        let mut conn = pool.get().unwrap();

        conn.deref_mut().test_transaction::<_, Error, _>(|conn| {
            assert_eq!(load_balance_info(conn, "test_unknown_user")?, BalanceInfo::NotFound);
            Ok(())
        });
    }

    #[test]
    fn test_balance_info_after_credits() {
        let Some(pool) = connect::test_pool() else { return };
        let mut conn = pool.get().unwrap();
        let user_id = format!("test_info_{}", idgen::next());

        conn.deref_mut().test_transaction::<_, Error, _>(|conn| {
            ledger::credit(conn, "test_info_key_1", &user_id, LedgerEntryType::Earning, BigDecimal::from(80))?;
            ledger::credit(conn, "test_info_key_2", &user_id, LedgerEntryType::Commission, BigDecimal::from(20))?;

            let info = load_balance_info(conn, &user_id)?;
            assert_eq!(
                info,
                BalanceInfo::Ok(BalanceValues {
                    balance: BigDecimal::from(100),
                    pending_withdrawal: BigDecimal::from(0),
                    total_earned: BigDecimal::from(100),
                    total_withdrawn_completed: BigDecimal::from(0),
                })
            );
            Ok(())
        });
    }

    #[test]
    fn test_list_requests_joins_profile() {
        let Some(pool) = connect::test_pool() else { return };
        let mut conn = pool.get().unwrap();
        let user_id = format!("test_list_{}", idgen::next());

        conn.deref_mut().test_transaction::<_, Error, _>(|conn| {
            {
                use crate::schema::user_profile;
                diesel::insert_into(user_profile::table)
                    .values((
                        user_profile::user_id.eq(user_id.as_str()),
                        user_profile::username.eq("maia"),
                        user_profile::email.eq("maia@example.com"),
                    ))
                    .execute(conn)?;
            }
            ledger::credit(conn, &format!("test_list_key_{}", &user_id), &user_id, LedgerEntryType::Earning, BigDecimal::from(50))?;
            let created = crate::database::mutations::create_withdrawal(
                conn,
                &user_id,
                BigDecimal::from(30),
                "GE29NB0000000101904917",
            )?;
            let request = match created {
                crate::database::mutations::CreateWithdrawalResult::Ok(request) => request,
                other => panic!("unexpected create result: {:?}", other),
            };

            let rows = list_requests(conn, Some(RequestStatus::Pending))?;
            let row = rows
                .iter()
                .find(|(candidate, _)| candidate.id == request.id)
                .expect("created request missing from admin list");
            assert_eq!(row.1.username.as_deref(), Some("maia"));
            assert_eq!(row.1.email.as_deref(), Some("maia@example.com"));
            assert_eq!(row.1.balance, Some(BigDecimal::from(20)));

            // terminal-only filter excludes the pending request
            let completed = list_requests(conn, Some(RequestStatus::Completed))?;
            assert!(completed.iter().all(|(candidate, _)| candidate.id != request.id));
            Ok(())
        });
    }
}
