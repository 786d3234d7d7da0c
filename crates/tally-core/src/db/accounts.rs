//! Linked account operations

use rusqlite::{params, OptionalExtension, Row};
use std::str::FromStr;

use super::{parse_datetime, Database};
use crate::error::{Error, Result};
use crate::models::{Account, AccountStatus, AccountType};

fn row_to_account(row: &Row) -> rusqlite::Result<Account> {
    Ok(Account {
        id: row.get(0)?,
        name: row.get(1)?,
        institution: row.get(2)?,
        account_type: row
            .get::<_, Option<String>>(3)?
            .and_then(|s| AccountType::from_str(&s).ok()),
        mask: row.get(4)?,
        provider_account_id: row.get(5)?,
        status: row
            .get::<_, String>(6)?
            .parse()
            .unwrap_or(AccountStatus::Active),
        last_synced_at: row.get::<_, Option<String>>(7)?.map(|s| parse_datetime(&s)),
        created_at: parse_datetime(&row.get::<_, String>(8)?),
    })
}

const ACCOUNT_COLS: &str =
    "id, name, institution, account_type, mask, provider_account_id, status, last_synced_at, created_at";

impl Database {
    /// Create a linked account, storing the aggregator access token
    ///
    /// The token lives only in the database (SQLCipher-encrypted at rest)
    /// and is never included in the `Account` model.
    #[allow(clippy::too_many_arguments)]
    pub fn create_account(
        &self,
        name: &str,
        institution: &str,
        account_type: Option<AccountType>,
        mask: Option<&str>,
        provider_account_id: Option<&str>,
        access_token: Option<&str>,
    ) -> Result<i64> {
        let conn = self.conn()?;
        conn.execute(
            r#"
            INSERT INTO accounts (name, institution, account_type, mask, provider_account_id, access_token)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
            params![
                name,
                institution,
                account_type.map(|t| t.as_str()),
                mask,
                provider_account_id,
                access_token
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// List accounts, optionally including unlinked ones
    pub fn list_accounts(&self, include_unlinked: bool) -> Result<Vec<Account>> {
        let conn = self.conn()?;
        let sql = if include_unlinked {
            format!("SELECT {} FROM accounts ORDER BY id", ACCOUNT_COLS)
        } else {
            format!(
                "SELECT {} FROM accounts WHERE status != 'unlinked' ORDER BY id",
                ACCOUNT_COLS
            )
        };
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map([], row_to_account)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Into::into)
    }

    /// Accounts eligible for the polling scheduler
    pub fn list_syncable_accounts(&self) -> Result<Vec<Account>> {
        let conn = self.conn()?;
        let sql = format!(
            "SELECT {} FROM accounts WHERE status != 'unlinked' AND access_token IS NOT NULL ORDER BY id",
            ACCOUNT_COLS
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map([], row_to_account)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Into::into)
    }

    /// Get an account by id
    pub fn get_account(&self, id: i64) -> Result<Account> {
        let conn = self.conn()?;
        let sql = format!("SELECT {} FROM accounts WHERE id = ?1", ACCOUNT_COLS);
        conn.query_row(&sql, params![id], row_to_account)
            .optional()?
            .ok_or_else(|| Error::NotFound(format!("Account {} not found", id)))
    }

    /// Get the aggregator access token for an account
    pub fn get_access_token(&self, account_id: i64) -> Result<Option<String>> {
        let conn = self.conn()?;
        let token: Option<Option<String>> = conn
            .query_row(
                "SELECT access_token FROM accounts WHERE id = ?1",
                params![account_id],
                |row| row.get(0),
            )
            .optional()?;
        token.ok_or_else(|| Error::NotFound(format!("Account {} not found", account_id)))
    }

    /// Update the sync lifecycle status of an account
    pub fn set_account_status(&self, id: i64, status: AccountStatus) -> Result<()> {
        let conn = self.conn()?;
        let updated = conn.execute(
            "UPDATE accounts SET status = ?1 WHERE id = ?2",
            params![status.as_str(), id],
        )?;
        if updated == 0 {
            return Err(Error::NotFound(format!("Account {} not found", id)));
        }
        Ok(())
    }

    /// Record a successful sync: timestamp, cursor, and status back to active
    pub fn mark_account_synced(&self, id: i64, cursor: Option<&str>) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            r#"
            UPDATE accounts
            SET last_synced_at = CURRENT_TIMESTAMP,
                sync_cursor = COALESCE(?1, sync_cursor),
                status = 'active'
            WHERE id = ?2
            "#,
            params![cursor, id],
        )?;
        Ok(())
    }

    /// Get the stored aggregator pagination cursor for an account
    pub fn get_sync_cursor(&self, account_id: i64) -> Result<Option<String>> {
        let conn = self.conn()?;
        let cursor: Option<Option<String>> = conn
            .query_row(
                "SELECT sync_cursor FROM accounts WHERE id = ?1",
                params![account_id],
                |row| row.get(0),
            )
            .optional()?;
        cursor.ok_or_else(|| Error::NotFound(format!("Account {} not found", account_id)))
    }

    /// Unlink an account: drop the access token and stop syncing
    ///
    /// Transaction history is preserved.
    pub fn unlink_account(&self, id: i64) -> Result<()> {
        let conn = self.conn()?;
        let updated = conn.execute(
            "UPDATE accounts SET status = 'unlinked', access_token = NULL WHERE id = ?1",
            params![id],
        )?;
        if updated == 0 {
            return Err(Error::NotFound(format!("Account {} not found", id)));
        }
        Ok(())
    }
}
