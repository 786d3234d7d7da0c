//! Database access layer with connection pooling and migrations
//!
//! This module is organized by domain:
//! - `accounts` - Linked account operations
//! - `transactions` - Transaction CRUD and filtering
//! - `categories` - Categories, user rules, and merchant patterns
//! - `budgets` - Budgets, progress aggregation, and budget alerts
//! - `fraud` - Fraud alert storage and review state
//! - `sync_history` - Per-account sync run records
//! - `audit` - Audit log of mutating operations

use chrono::{DateTime, Utc};
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use tracing::info;

use crate::error::{Error, Result};

mod accounts;
mod audit;
mod budgets;
mod categories;
mod fraud;
mod sync_history;
mod transactions;


pub use transactions::TransactionFilter;

pub type DbPool = Pool<SqliteConnectionManager>;
pub type DbConn = PooledConnection<SqliteConnectionManager>;

/// Environment variable for database encryption key
pub const DB_KEY_ENV: &str = "TALLY_DB_KEY";

/// Default database location under the platform data directory
pub fn default_db_path() -> std::path::PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| std::path::PathBuf::from("."))
        .join("tally")
        .join("tally.db")
}

/// Derive the SQLCipher key from a passphrase with Argon2id
///
/// The salt is a fixed application constant, so a given passphrase always
/// yields the same key and the database file can be moved or restored freely.
fn derive_key(passphrase: &str) -> Result<String> {
    use argon2::{password_hash::SaltString, Argon2, PasswordHasher};

    // Changing this invalidates every existing encrypted database
    const APP_SALT: &[u8; 16] = b"tally-salt-v1-00";

    let salt = SaltString::encode_b64(APP_SALT)
        .map_err(|e| Error::Encryption(format!("Invalid key salt: {}", e)))?;

    let hash = Argon2::default()
        .hash_password(passphrase.as_bytes(), &salt)
        .map_err(|e| Error::Encryption(format!("Key derivation failed: {}", e)))?;

    // SQLCipher takes the raw key hex-encoded
    let hash_bytes = hash
        .hash
        .ok_or_else(|| Error::Encryption("Key derivation produced no output".to_string()))?;
    Ok(hex::encode(hash_bytes.as_bytes()))
}

/// Parse a SQLite datetime string into a DateTime<Utc>
pub(crate) fn parse_datetime(s: &str) -> DateTime<Utc> {
    // SQLite stores as "YYYY-MM-DD HH:MM:SS" format
    chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
        .map(|dt| dt.and_utc())
        .unwrap_or_else(|_| Utc::now())
}

/// Database wrapper with connection pooling
#[derive(Clone)]
pub struct Database {
    pool: DbPool,
    /// Path to the database file
    db_path: String,
}

impl Database {
    /// Create a new database connection pool with encryption
    ///
    /// Requires `TALLY_DB_KEY` environment variable to be set.
    /// The database will be encrypted using SQLCipher with a key derived
    /// from the passphrase via Argon2. Aggregator access tokens stored in
    /// the accounts table are covered by this at-rest encryption.
    ///
    /// Returns an error if `TALLY_DB_KEY` is not set. Use `new_unencrypted()`
    /// for development/testing without encryption.
    pub fn new(path: &str) -> Result<Self> {
        let encryption_key = std::env::var(DB_KEY_ENV).ok();
        match encryption_key {
            Some(key) => Self::new_with_key(path, Some(&key)),
            None => Err(Error::Encryption(format!(
                "Database encryption required. Set {} environment variable with your passphrase, \
                or use --no-encrypt for unencrypted databases (not recommended for production).",
                DB_KEY_ENV
            ))),
        }
    }

    /// Create a new unencrypted database connection pool
    ///
    /// WARNING: This creates an unencrypted database. Only use for development
    /// or testing. For production, use `new()` with `TALLY_DB_KEY` set.
    pub fn new_unencrypted(path: &str) -> Result<Self> {
        Self::new_with_key(path, None)
    }

    /// Create a new database with an explicit encryption key
    pub fn new_with_key(path: &str, passphrase: Option<&str>) -> Result<Self> {
        let manager = SqliteConnectionManager::file(path);

        let pool = if let Some(pass) = passphrase {
            let key = derive_key(pass)?;
            let key_pragma = format!("PRAGMA key = 'x\"{}\"';", key);

            // Use with_init to set the key on every new connection
            let manager = manager.with_init(move |conn| {
                conn.execute_batch(&key_pragma)?;
                Ok(())
            });

            Pool::builder().max_size(10).build(manager)?
        } else {
            Pool::builder().max_size(10).build(manager)?
        };

        let db = Self {
            pool,
            db_path: path.to_string(),
        };
        db.run_migrations()?;

        Ok(db)
    }

    /// Get the path to the database file
    pub fn path(&self) -> &str {
        &self.db_path
    }

    /// Create an in-memory database (for testing)
    ///
    /// Note: Uses a temporary file rather than `:memory:` because SQLCipher
    /// has issues with in-memory databases in the connection pool.
    pub fn in_memory() -> Result<Self> {
        use std::sync::atomic::{AtomicU64, Ordering};
        static COUNTER: AtomicU64 = AtomicU64::new(0);

        let id = COUNTER.fetch_add(1, Ordering::SeqCst);
        let path = format!("/tmp/tally_test_{}.db", id);

        // Remove any existing file
        let _ = std::fs::remove_file(&path);

        Self::new_unencrypted(&path)
    }

    /// Check if the database is encrypted
    pub fn is_encrypted(&self) -> Result<bool> {
        let conn = self.conn()?;
        // SQLCipher sets cipher_version if encryption is active
        let result: rusqlite::Result<String> =
            conn.query_row("PRAGMA cipher_version;", [], |row| row.get(0));
        Ok(result.is_ok() && std::env::var(DB_KEY_ENV).is_ok())
    }

    /// Get a connection from the pool
    pub fn conn(&self) -> Result<DbConn> {
        Ok(self.pool.get()?)
    }

    /// Run database migrations
    fn run_migrations(&self) -> Result<()> {
        let conn = self.conn()?;

        conn.execute_batch(
            r#"
            PRAGMA foreign_keys = ON;
            PRAGMA journal_mode = WAL;
            PRAGMA cache_size = 2000;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;

            -- Linked accounts
            CREATE TABLE IF NOT EXISTS accounts (
                id INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                institution TEXT NOT NULL,
                account_type TEXT,
                mask TEXT,
                provider_account_id TEXT UNIQUE,
                access_token TEXT,                         -- aggregator token; protected by SQLCipher at rest
                status TEXT NOT NULL DEFAULT 'active',     -- active, sync_failed, unlinked
                last_synced_at DATETIME,
                sync_cursor TEXT,                          -- aggregator pagination cursor
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP
            );

            CREATE INDEX IF NOT EXISTS idx_accounts_status ON accounts(status);

            -- Categories
            CREATE TABLE IF NOT EXISTS categories (
                id INTEGER PRIMARY KEY,
                name TEXT NOT NULL UNIQUE,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP
            );

            -- User-defined categorization rules (highest cascade priority)
            CREATE TABLE IF NOT EXISTS category_rules (
                id INTEGER PRIMARY KEY,
                category_id INTEGER NOT NULL REFERENCES categories(id) ON DELETE CASCADE,
                pattern TEXT NOT NULL,
                pattern_type TEXT NOT NULL DEFAULT 'contains',  -- contains, regex, exact
                priority INTEGER NOT NULL DEFAULT 0,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP
            );

            CREATE INDEX IF NOT EXISTS idx_category_rules_category ON category_rules(category_id);

            -- Merchant keyword patterns (seeded, user-extensible)
            CREATE TABLE IF NOT EXISTS merchant_patterns (
                id INTEGER PRIMARY KEY,
                keyword TEXT NOT NULL,
                category_id INTEGER NOT NULL REFERENCES categories(id) ON DELETE CASCADE,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP
            );

            CREATE INDEX IF NOT EXISTS idx_merchant_patterns_category ON merchant_patterns(category_id);

            -- Transactions
            CREATE TABLE IF NOT EXISTS transactions (
                id INTEGER PRIMARY KEY,
                account_id INTEGER NOT NULL REFERENCES accounts(id),
                provider_txn_id TEXT,
                date DATE NOT NULL,
                posted_at DATETIME,                        -- provider timestamp when available
                description TEXT NOT NULL,
                merchant TEXT,
                amount REAL NOT NULL,                      -- negative = expense
                location TEXT,
                pending BOOLEAN NOT NULL DEFAULT 0,
                category_id INTEGER REFERENCES categories(id),
                category_source TEXT,                      -- rule, merchant_pattern, provider, llm, manual, fallback
                category_confidence INTEGER,               -- 0-100
                needs_review BOOLEAN NOT NULL DEFAULT 0,
                import_hash TEXT NOT NULL UNIQUE,
                original_data TEXT,                        -- raw provider payload as JSON
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP
            );

            CREATE INDEX IF NOT EXISTS idx_transactions_date ON transactions(date);
            CREATE INDEX IF NOT EXISTS idx_transactions_account ON transactions(account_id);
            CREATE INDEX IF NOT EXISTS idx_transactions_category ON transactions(category_id);
            CREATE INDEX IF NOT EXISTS idx_transactions_pending ON transactions(pending);
            CREATE INDEX IF NOT EXISTS idx_transactions_review ON transactions(needs_review);
            CREATE INDEX IF NOT EXISTS idx_transactions_posted_at ON transactions(posted_at);

            -- Budgets
            CREATE TABLE IF NOT EXISTS budgets (
                id INTEGER PRIMARY KEY,
                category_id INTEGER NOT NULL REFERENCES categories(id) ON DELETE CASCADE,
                limit_amount REAL NOT NULL,
                start_date DATE NOT NULL,
                end_date DATE NOT NULL,
                alert_threshold_pct REAL NOT NULL DEFAULT 80,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP
            );

            CREATE INDEX IF NOT EXISTS idx_budgets_category ON budgets(category_id);

            -- Budget threshold alerts
            CREATE TABLE IF NOT EXISTS budget_alerts (
                id INTEGER PRIMARY KEY,
                budget_id INTEGER NOT NULL REFERENCES budgets(id) ON DELETE CASCADE,
                level TEXT NOT NULL,                       -- warning, exceeded
                message TEXT NOT NULL,
                resolved BOOLEAN NOT NULL DEFAULT 0,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP
            );

            CREATE INDEX IF NOT EXISTS idx_budget_alerts_budget ON budget_alerts(budget_id);

            -- Fraud alerts
            CREATE TABLE IF NOT EXISTS fraud_alerts (
                id INTEGER PRIMARY KEY,
                transaction_id INTEGER NOT NULL REFERENCES transactions(id),
                alert_type TEXT NOT NULL,                  -- unusual_amount, unusual_location, velocity
                severity TEXT NOT NULL,                    -- low, medium, high
                message TEXT NOT NULL,
                reviewed BOOLEAN NOT NULL DEFAULT 0,
                false_positive BOOLEAN NOT NULL DEFAULT 0,
                review_note TEXT,
                reviewed_at DATETIME,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP
            );

            CREATE INDEX IF NOT EXISTS idx_fraud_alerts_txn ON fraud_alerts(transaction_id);
            CREATE INDEX IF NOT EXISTS idx_fraud_alerts_reviewed ON fraud_alerts(reviewed);

            -- Sync run history
            CREATE TABLE IF NOT EXISTS sync_history (
                id INTEGER PRIMARY KEY,
                account_id INTEGER NOT NULL REFERENCES accounts(id),
                status TEXT NOT NULL,                      -- success, failed
                fetched INTEGER NOT NULL DEFAULT 0,
                imported INTEGER NOT NULL DEFAULT 0,
                updated INTEGER NOT NULL DEFAULT 0,
                error TEXT,
                started_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                finished_at DATETIME
            );

            CREATE INDEX IF NOT EXISTS idx_sync_history_account ON sync_history(account_id);

            -- Audit log
            CREATE TABLE IF NOT EXISTS audit_log (
                id INTEGER PRIMARY KEY,
                user TEXT NOT NULL,
                action TEXT NOT NULL,
                target_type TEXT,
                target_id INTEGER,
                detail TEXT,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP
            );
            "#,
        )?;

        Ok(())
    }

    /// Seed the default categories and merchant keyword patterns
    ///
    /// Idempotent: existing categories and keywords are left untouched.
    pub fn seed_defaults(&self) -> Result<()> {
        let conn = self.conn()?;

        const CATEGORIES: &[&str] = &[
            "Groceries",
            "Dining",
            "Transport",
            "Shopping",
            "Entertainment",
            "Subscriptions",
            "Travel",
            "Health",
            "Utilities",
            "Income",
            "Fees",
            "Uncategorized",
        ];

        for name in CATEGORIES {
            conn.execute(
                "INSERT OR IGNORE INTO categories (name) VALUES (?1)",
                [name],
            )?;
        }

        // Keyword -> category seed for the merchant-pattern cascade stage
        const PATTERNS: &[(&str, &str)] = &[
            ("NETFLIX", "Subscriptions"),
            ("SPOTIFY", "Subscriptions"),
            ("HULU", "Subscriptions"),
            ("UBER", "Transport"),
            ("LYFT", "Transport"),
            ("SHELL", "Transport"),
            ("CHEVRON", "Transport"),
            ("STARBUCKS", "Dining"),
            ("MCDONALD", "Dining"),
            ("CHIPOTLE", "Dining"),
            ("DOORDASH", "Dining"),
            ("WHOLE FOODS", "Groceries"),
            ("TRADER JOE", "Groceries"),
            ("SAFEWAY", "Groceries"),
            ("KROGER", "Groceries"),
            ("AMAZON", "Shopping"),
            ("TARGET", "Shopping"),
            ("WALMART", "Shopping"),
            ("COSTCO", "Shopping"),
            ("DELTA", "Travel"),
            ("UNITED", "Travel"),
            ("AIRBNB", "Travel"),
            ("MARRIOTT", "Travel"),
            ("CVS", "Health"),
            ("WALGREENS", "Health"),
            ("COMCAST", "Utilities"),
            ("PG&E", "Utilities"),
        ];

        for (keyword, category) in PATTERNS {
            conn.execute(
                r#"
                INSERT INTO merchant_patterns (keyword, category_id)
                SELECT ?1, id FROM categories WHERE name = ?2
                AND NOT EXISTS (SELECT 1 FROM merchant_patterns WHERE keyword = ?1)
                "#,
                [keyword, category],
            )?;
        }

        info!("Seeded default categories and merchant patterns");
        Ok(())
    }
}
