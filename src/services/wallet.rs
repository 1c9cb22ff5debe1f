use sqlx::{PgConnection, PgExecutor, PgPool};

use crate::error::{ApiError, ApiResult};
use crate::models::wallet::{AccountRef, TxnKind, WalletTransaction};
use crate::services::metrics;

pub struct WalletService;

impl WalletService {
    /// Debit a wallet. The balance check and the write are one conditional
    /// UPDATE, so two concurrent debits can never overdraw the account —
    /// whichever commits second simply finds too little balance left.
    pub async fn debit(
        conn: &mut PgConnection,
        account: AccountRef,
        amount_paise: i64,
        description: &str,
        reference: Option<&str>,
    ) -> ApiResult<i64> {
        if amount_paise <= 0 {
            return Err(ApiError::Validation("Debit amount must be positive.".into()));
        }
        let updated: Option<(i64,)> = sqlx::query_as(&format!(
            "UPDATE {} SET wallet_balance_paise = wallet_balance_paise - $1, updated_at = NOW()
             WHERE id = $2 AND wallet_balance_paise >= $1
             RETURNING wallet_balance_paise",
            account.table()
        ))
        .bind(amount_paise)
        .bind(account.id())
        .fetch_optional(&mut *conn)
        .await?;

        let new_balance = match updated {
            Some((balance,)) => balance,
            None => {
                // Distinguish a missing account from an underfunded one.
                Self::balance(&mut *conn, account).await?;
                return Err(ApiError::InsufficientFunds);
            }
        };

        Self::record_txn(
            conn,
            account,
            TxnKind::Debit,
            amount_paise,
            new_balance,
            description,
            reference,
        )
        .await?;
        metrics::WALLET_TXNS_COUNTER
            .with_label_values(&["debit", &account.kind().to_string()])
            .inc();
        Ok(new_balance)
    }

    /// Credit a wallet. Always succeeds for a positive amount and an
    /// existing account.
    pub async fn credit(
        conn: &mut PgConnection,
        account: AccountRef,
        amount_paise: i64,
        description: &str,
        reference: Option<&str>,
    ) -> ApiResult<i64> {
        if amount_paise <= 0 {
            return Err(ApiError::Validation("Credit amount must be positive.".into()));
        }
        let updated: Option<(i64,)> = sqlx::query_as(&format!(
            "UPDATE {} SET wallet_balance_paise = wallet_balance_paise + $1, updated_at = NOW()
             WHERE id = $2
             RETURNING wallet_balance_paise",
            account.table()
        ))
        .bind(amount_paise)
        .bind(account.id())
        .fetch_optional(&mut *conn)
        .await?;

        let new_balance = updated
            .map(|(b,)| b)
            .ok_or_else(|| ApiError::NotFound("Account not found.".into()))?;

        Self::record_txn(
            conn,
            account,
            TxnKind::Credit,
            amount_paise,
            new_balance,
            description,
            reference,
        )
        .await?;
        metrics::WALLET_TXNS_COUNTER
            .with_label_values(&["credit", &account.kind().to_string()])
            .inc();
        Ok(new_balance)
    }

    pub async fn balance<'e, E: PgExecutor<'e>>(exec: E, account: AccountRef) -> ApiResult<i64> {
        let balance: Option<(i64,)> = sqlx::query_as(&format!(
            "SELECT wallet_balance_paise FROM {} WHERE id = $1",
            account.table()
        ))
        .bind(account.id())
        .fetch_optional(exec)
        .await?;
        balance
            .map(|(b,)| b)
            .ok_or_else(|| ApiError::NotFound("Account not found.".into()))
    }

    pub async fn list_transactions(
        pool: &PgPool,
        account: AccountRef,
        limit: i64,
    ) -> ApiResult<Vec<WalletTransaction>> {
        let txns = sqlx::query_as::<_, WalletTransaction>(
            r#"SELECT id, owner_kind, owner_id, kind, amount_paise, balance_after_paise,
                      description, reference, created_at
               FROM wallet_transactions
               WHERE owner_kind = $1 AND owner_id = $2
               ORDER BY created_at DESC
               LIMIT $3"#,
        )
        .bind(account.kind())
        .bind(account.id())
        .bind(limit)
        .fetch_all(pool)
        .await?;
        Ok(txns)
    }

    async fn record_txn(
        conn: &mut PgConnection,
        account: AccountRef,
        kind: TxnKind,
        amount_paise: i64,
        balance_after_paise: i64,
        description: &str,
        reference: Option<&str>,
    ) -> ApiResult<()> {
        sqlx::query(
            r#"INSERT INTO wallet_transactions
                   (owner_kind, owner_id, kind, amount_paise, balance_after_paise, description, reference)
               VALUES ($1, $2, $3, $4, $5, $6, $7)"#,
        )
        .bind(account.kind())
        .bind(account.id())
        .bind(kind)
        .bind(amount_paise)
        .bind(balance_after_paise)
        .bind(description)
        .bind(reference)
        .execute(conn)
        .await?;
        Ok(())
    }
}
