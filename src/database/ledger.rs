use bigdecimal::BigDecimal;
use diesel::dsl::sum;
use diesel::result::{DatabaseErrorInformation, DatabaseErrorKind, Error};
use diesel::{Connection, ExpressionMethods, OptionalExtension, PgConnection, QueryDsl, RunQueryDsl};
use tracing::warn;

use crate::database::models::{Balance, LedgerEntryType, NewLedgerEntry};
use crate::database::{idgen, models};

const MAX_WRITE_ATTEMPTS: u32 = 3;

/// The ledger store is append-only: entries are inserted, summed and
/// never updated or deleted. The `balance` row is a cached projection of
/// a user's ledger sum, maintained strictly inside the same transaction
/// as each append, and doubles as the per-user lock anchor for
/// check-and-reserve.

// creates new balance table record, on conflict does nothing
pub fn init_user_balance(conn: &mut PgConnection, req_user_id: &str) -> Result<bool, Error> {
    use crate::schema::balance::dsl::*;
    diesel::insert_into(balance)
        .values((user_id.eq(req_user_id), current_value.eq(BigDecimal::from(0))))
        .on_conflict(user_id)
        .do_nothing()
        .execute(conn)
        .map(|res| res > 0)
}

// load the user's balance projection and lock it for update, serializing
// every balance-affecting write for this user
pub fn lock_balance(conn: &mut PgConnection, req_user_id: &str) -> Result<Balance, Error> {
    use crate::schema::balance::dsl::*;
    balance
        .filter(user_id.eq(req_user_id))
        .for_update()
        .first::<models::Balance>(conn)
}

// must only be called while holding the row lock, with the value derived
// from the locked row plus the entries appended in this transaction
pub fn set_cached_balance(conn: &mut PgConnection, req_user_id: &str, value: BigDecimal) -> Result<(), Error> {
    use crate::schema::balance::dsl::*;
    diesel::update(balance.filter(user_id.eq(req_user_id)))
        .set(current_value.eq(value))
        .execute(conn)?;
    Ok(())
}

// append a ledger entry; committed before the caller's transaction is
// acknowledged, and immutable afterwards
pub fn append(conn: &mut PgConnection, entry: NewLedgerEntry) -> Result<i64, Error> {
    use crate::schema::ledger_entry::dsl::*;
    let entry_id = entry.id;
    diesel::insert_into(ledger_entry).values(&entry).execute(conn)?;
    Ok(entry_id)
}

// net ledger sum for a user, optionally restricted to entry types
pub fn sum_for_user(
    conn: &mut PgConnection,
    req_user_id: &str,
    types: Option<&[LedgerEntryType]>,
) -> Result<BigDecimal, Error> {
    use crate::schema::ledger_entry::dsl::*;
    let total = match types {
        Some(types) => {
            let names: Vec<&str> = types.iter().map(|t| t.as_str()).collect();
            ledger_entry
                .filter(user_id.eq(req_user_id))
                .filter(entry_type.eq_any(names))
                .select(sum(amount))
                .first::<Option<BigDecimal>>(conn)?
        }
        None => ledger_entry
            .filter(user_id.eq(req_user_id))
            .select(sum(amount))
            .first::<Option<BigDecimal>>(conn)?,
    };
    Ok(total.unwrap_or_else(|| BigDecimal::from(0)))
}

// credits an earning or commission coming from the external purchase and
// referral flows; idempotent on the caller-provided key
pub fn credit(
    conn: &mut PgConnection,
    req_idempotency_key: &str,
    req_user_id: &str,
    req_entry_type: LedgerEntryType,
    req_amount: BigDecimal,
) -> Result<i64, Error> {
    init_user_balance(conn, req_user_id)?;

    retry_on_conflict(conn, |conn| {
        conn.transaction::<_, Error, _>(|conn| {
            credit_locked(conn, req_idempotency_key, req_user_id, req_entry_type, req_amount.clone())
        })
    })
}

fn credit_locked(
    conn: &mut PgConnection,
    req_idempotency_key: &str,
    req_user_id: &str,
    req_entry_type: LedgerEntryType,
    req_amount: BigDecimal,
) -> Result<i64, Error> {
    let user_balance = lock_balance(conn, req_user_id)?;

    // idempotency check
    let existing = {
        use crate::schema::ledger_entry::dsl::*;
        ledger_entry
            .filter(idempotency_key.eq(req_idempotency_key))
            .first::<models::LedgerEntry>(conn)
            .optional()?
    };
    if let Some(existing) = existing {
        return Ok(existing.id);
    }

    let entry_id = append(
        conn,
        NewLedgerEntry {
            id: idgen::next(),
            user_id: req_user_id.to_string(),
            entry_type: req_entry_type.as_str().to_string(),
            amount: req_amount.clone(),
            request_id: None,
            idempotency_key: Some(req_idempotency_key.to_string()),
            created_at: chrono::Utc::now().naive_utc(),
        },
    )?;
    set_cached_balance(conn, req_user_id, user_balance.current_value + req_amount)?;

    Ok(entry_id)
}

// retry serialization failures and deadlocks a bounded number of times;
// whatever still fails after that surfaces as a transient store error
pub(crate) fn retry_on_conflict<T, F>(conn: &mut PgConnection, mut op: F) -> Result<T, Error>
where
    F: FnMut(&mut PgConnection) -> Result<T, Error>,
{
    let mut attempt = 1;
    loop {
        match op(conn) {
            Err(e) if attempt < MAX_WRITE_ATTEMPTS && is_write_conflict(&e) => {
                warn!("retrying conflicting ledger write (attempt {attempt}): {e}");
                attempt += 1;
            }
            other => return other,
        }
    }
}

pub fn is_write_conflict(e: &Error) -> bool {
    match e {
        Error::DatabaseError(DatabaseErrorKind::SerializationFailure, _) => true,
        Error::DatabaseError(_, info) => is_deadlock(info.as_ref()),
        _ => false,
    }
}

fn is_deadlock(info: &dyn DatabaseErrorInformation) -> bool {
    info.message().contains("deadlock detected")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::connect;
    use std::ops::DerefMut;
    use std::str::FromStr;

    #[test]
    fn test_credit_is_idempotent() {
        let Some(pool) = connect::test_pool() else { return };
        let mut conn = pool.get().unwrap();
        let user_id = format!("test_credit_{}", idgen::next());

        conn.deref_mut().test_transaction::<_, Error, _>(|conn| {
            let amount = BigDecimal::from_str("100").unwrap();
            let entry_id = credit(conn, "test_credit_key", &user_id, LedgerEntryType::Earning, amount.clone())?;
            assert!(entry_id > 0);
            assert_eq!(sum_for_user(conn, &user_id, None)?, amount);

            // replay with the same key appends nothing
            let entry_id2 = credit(conn, "test_credit_key", &user_id, LedgerEntryType::Earning, amount.clone())?;
            assert_eq!(entry_id, entry_id2);
            assert_eq!(sum_for_user(conn, &user_id, None)?, amount);

            Ok(())
        });
    }

    #[test]
    fn test_sum_for_user_by_type() {
        let Some(pool) = connect::test_pool() else { return };
        let mut conn = pool.get().unwrap();
        let user_id = format!("test_sum_{}", idgen::next());

        conn.deref_mut().test_transaction::<_, Error, _>(|conn| {
            credit(conn, "test_sum_key_1", &user_id, LedgerEntryType::Earning, BigDecimal::from(70))?;
            credit(conn, "test_sum_key_2", &user_id, LedgerEntryType::Commission, BigDecimal::from(30))?;

            let earned = sum_for_user(
                conn,
                &user_id,
                Some(&[LedgerEntryType::Earning, LedgerEntryType::Commission]),
            )?;
            assert_eq!(earned, BigDecimal::from(100));

            let reserved = sum_for_user(conn, &user_id, Some(&[LedgerEntryType::WithdrawalReserved]))?;
            assert_eq!(reserved, BigDecimal::from(0));

            assert_eq!(sum_for_user(conn, &user_id, None)?, BigDecimal::from(100));
            Ok(())
        });
    }

    #[test]
    fn test_sum_for_unknown_user_is_zero() {
        let Some(pool) = connect::test_pool() else { return };
        let mut conn = pool.get().unwrap();

        conn.deref_mut().test_transaction::<_, Error, _>(|conn| {
            assert_eq!(sum_for_user(conn, "test_no_such_user", None)?, BigDecimal::from(0));
            Ok(())
        });
    }
}
