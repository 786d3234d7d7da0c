//! Fraud detection heuristics
//!
//! Three checks run against each newly posted transaction:
//! - unusual amount, against a rolling 30-day expense baseline
//! - unusual location, against locations the account has been seen at before
//! - velocity, counting transactions in a trailing 5-minute window
//!
//! Each finding becomes a fraud alert, deduplicated per (transaction, type).

use chrono::Duration;
use tracing::info;

use crate::db::Database;
use crate::error::Result;
use crate::models::{FraudAlertType, FraudSeverity, Transaction};

/// Tunable thresholds for the heuristics
#[derive(Debug, Clone)]
pub struct FraudConfig {
    /// Expense flagged when its amount exceeds baseline * this multiplier
    pub amount_multiplier: f64,
    /// Severity bumps to high at baseline * this multiplier
    pub high_amount_multiplier: f64,
    /// Minimum baseline transactions before the amount check applies
    pub min_baseline_txns: i64,
    /// Rolling window for the amount baseline
    pub baseline_days: i64,
    /// Window over which a location counts as previously seen
    pub location_window_days: i64,
    /// A location seen at least this often is considered typical
    pub typical_location_min_count: i64,
    /// Velocity window length
    pub velocity_window_secs: i64,
    /// More than this many transactions in the window triggers an alert
    pub velocity_max_txns: i64,
}

impl Default for FraudConfig {
    fn default() -> Self {
        Self {
            amount_multiplier: 3.0,
            high_amount_multiplier: 5.0,
            min_baseline_txns: 5,
            baseline_days: 30,
            location_window_days: 90,
            typical_location_min_count: 2,
            velocity_window_secs: 300,
            velocity_max_txns: 3,
        }
    }
}

/// One heuristic hit for a transaction
#[derive(Debug, Clone)]
pub struct FraudFinding {
    pub alert_type: FraudAlertType,
    pub severity: FraudSeverity,
    pub message: String,
}

/// Runs the fraud heuristics against transactions in a database
pub struct FraudAnalyzer<'a> {
    db: &'a Database,
    config: FraudConfig,
}

impl<'a> FraudAnalyzer<'a> {
    pub fn new(db: &'a Database, config: FraudConfig) -> Self {
        Self { db, config }
    }

    /// Run all checks against a transaction
    ///
    /// Pending transactions are never analyzed; their amounts and timestamps
    /// routinely change before posting.
    pub fn analyze(&self, tx: &Transaction) -> Result<Vec<FraudFinding>> {
        if tx.pending {
            return Ok(Vec::new());
        }

        let mut findings = Vec::new();
        if let Some(finding) = self.check_amount(tx)? {
            findings.push(finding);
        }
        if let Some(finding) = self.check_location(tx)? {
            findings.push(finding);
        }
        if let Some(finding) = self.check_velocity(tx)? {
            findings.push(finding);
        }
        Ok(findings)
    }

    /// Run all checks and persist the resulting alerts
    ///
    /// Returns ids of alerts actually created (existing unreviewed alerts of
    /// the same type suppress duplicates).
    pub fn analyze_and_record(&self, tx: &Transaction) -> Result<Vec<i64>> {
        let mut created = Vec::new();
        for finding in self.analyze(tx)? {
            if let Some(id) = self.db.create_fraud_alert(
                tx.id,
                finding.alert_type,
                finding.severity,
                &finding.message,
            )? {
                info!(
                    transaction_id = tx.id,
                    alert_type = %finding.alert_type,
                    severity = %finding.severity,
                    "Fraud alert raised"
                );
                created.push(id);
            }
        }
        Ok(created)
    }

    /// Flag expenses far above the account's rolling baseline
    ///
    /// Skipped for credits and for accounts with too little history to form
    /// a meaningful baseline.
    fn check_amount(&self, tx: &Transaction) -> Result<Option<FraudFinding>> {
        if tx.amount >= 0.0 {
            return Ok(None);
        }

        let (baseline, count) = self.db.amount_baseline(
            tx.account_id,
            tx.date,
            self.config.baseline_days,
            tx.id,
        )?;
        if count < self.config.min_baseline_txns || baseline <= 0.0 {
            return Ok(None);
        }

        let amount = tx.amount.abs();
        let ratio = amount / baseline;
        if ratio <= self.config.amount_multiplier {
            return Ok(None);
        }

        let severity = if ratio > self.config.high_amount_multiplier {
            FraudSeverity::High
        } else {
            FraudSeverity::Medium
        };
        Ok(Some(FraudFinding {
            alert_type: FraudAlertType::UnusualAmount,
            severity,
            message: format!(
                "Amount {:.2} is {:.1}x the {}-day average of {:.2}",
                amount, ratio, self.config.baseline_days, baseline
            ),
        }))
    }

    /// Flag transactions from locations the account has not been seen at
    ///
    /// Skipped when the transaction has no location, or when the account has
    /// no located history at all to compare against.
    fn check_location(&self, tx: &Transaction) -> Result<Option<FraudFinding>> {
        let location = match tx.location.as_deref() {
            Some(l) if !l.trim().is_empty() => l,
            _ => return Ok(None),
        };

        let since = tx.date - Duration::days(self.config.location_window_days);
        if self.db.located_transaction_count(tx.account_id, since, tx.id)? == 0 {
            return Ok(None);
        }

        let seen = self
            .db
            .location_seen_count(tx.account_id, location, since, tx.id)?;
        if seen >= self.config.typical_location_min_count {
            return Ok(None);
        }

        Ok(Some(FraudFinding {
            alert_type: FraudAlertType::UnusualLocation,
            severity: FraudSeverity::Medium,
            message: format!("Location \"{}\" is not typical for this account", location),
        }))
    }

    /// Flag bursts of transactions in a short window
    ///
    /// Requires a provider timestamp; date-only transactions are skipped.
    fn check_velocity(&self, tx: &Transaction) -> Result<Option<FraudFinding>> {
        let posted_at = match tx.posted_at {
            Some(t) => t,
            None => return Ok(None),
        };

        // Count includes the transaction under analysis
        let others = self.db.velocity_count(
            tx.account_id,
            posted_at,
            self.config.velocity_window_secs,
            tx.id,
        )?;
        let total = others + 1;
        if total <= self.config.velocity_max_txns {
            return Ok(None);
        }

        Ok(Some(FraudFinding {
            alert_type: FraudAlertType::Velocity,
            severity: FraudSeverity::High,
            message: format!(
                "{} transactions within {} seconds",
                total, self.config.velocity_window_secs
            ),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NewTransaction;
    use chrono::{NaiveDate, NaiveDateTime};

    fn setup() -> (Database, i64) {
        let db = Database::in_memory().unwrap();
        db.seed_defaults().unwrap();
        let account_id = db
            .create_account("Checking", "Test Bank", None, None, None, None)
            .unwrap();
        (db, account_id)
    }

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, d).unwrap()
    }

    fn ts(d: u32, h: u32, m: u32, s: u32) -> NaiveDateTime {
        date(d).and_hms_opt(h, m, s).unwrap()
    }

    fn insert(
        db: &Database,
        account_id: i64,
        d: NaiveDate,
        posted_at: Option<NaiveDateTime>,
        amount: f64,
        location: Option<&str>,
        hash: &str,
    ) -> Transaction {
        let id = db
            .insert_transaction(
                account_id,
                &NewTransaction {
                    provider_txn_id: None,
                    date: d,
                    posted_at,
                    description: format!("tx {}", hash),
                    merchant: None,
                    amount,
                    location: location.map(String::from),
                    pending: false,
                    import_hash: hash.to_string(),
                    original_data: None,
                },
            )
            .unwrap();
        db.get_transaction(id).unwrap()
    }

    fn baseline_expenses(db: &Database, account_id: i64) {
        // Five expenses around 20.00 across early June
        for (i, amount) in [-18.0, -22.0, -19.0, -21.0, -20.0].iter().enumerate() {
            insert(
                db,
                account_id,
                date(1 + i as u32),
                None,
                *amount,
                Some("Portland, OR"),
                &format!("base{}", i),
            );
        }
    }

    #[test]
    fn test_amount_check_requires_baseline() {
        let (db, account_id) = setup();
        // Only two prior expenses, below min_baseline_txns
        insert(&db, account_id, date(1), None, -20.0, None, "b1");
        insert(&db, account_id, date(2), None, -20.0, None, "b2");
        let tx = insert(&db, account_id, date(10), None, -500.0, None, "big");

        let analyzer = FraudAnalyzer::new(&db, FraudConfig::default());
        let findings = analyzer.analyze(&tx).unwrap();
        assert!(findings.is_empty());
    }

    #[test]
    fn test_unusual_amount_medium_and_high() {
        let (db, account_id) = setup();
        baseline_expenses(&db, account_id);
        let analyzer = FraudAnalyzer::new(&db, FraudConfig::default());

        // Baseline is 20.00; 80.00 is 4x -> medium
        let medium = insert(&db, account_id, date(10), None, -80.0, Some("Portland, OR"), "m");
        let findings = analyzer.analyze(&medium).unwrap();
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].alert_type, FraudAlertType::UnusualAmount);
        assert_eq!(findings[0].severity, FraudSeverity::Medium);

        // 200.00 is 10x -> high (baseline shifts slightly with the 80.00 row in range,
        // still well past the 5x bar)
        let high = insert(&db, account_id, date(11), None, -200.0, Some("Portland, OR"), "h");
        let findings = analyzer.analyze(&high).unwrap();
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].severity, FraudSeverity::High);
    }

    #[test]
    fn test_credits_never_flagged_for_amount() {
        let (db, account_id) = setup();
        baseline_expenses(&db, account_id);
        let tx = insert(&db, account_id, date(10), None, 5000.0, Some("Portland, OR"), "pay");

        let analyzer = FraudAnalyzer::new(&db, FraudConfig::default());
        assert!(analyzer.analyze(&tx).unwrap().is_empty());
    }

    #[test]
    fn test_unusual_location() {
        let (db, account_id) = setup();
        baseline_expenses(&db, account_id);
        let analyzer = FraudAnalyzer::new(&db, FraudConfig::default());

        // Typical location, normal amount: clean
        let home = insert(&db, account_id, date(10), None, -20.0, Some("portland, or"), "home");
        assert!(analyzer.analyze(&home).unwrap().is_empty());

        // New location: flagged
        let away = insert(&db, account_id, date(11), None, -20.0, Some("Kyiv, UA"), "away");
        let findings = analyzer.analyze(&away).unwrap();
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].alert_type, FraudAlertType::UnusualLocation);
        assert_eq!(findings[0].severity, FraudSeverity::Medium);
    }

    #[test]
    fn test_location_check_skipped_without_history() {
        let (db, account_id) = setup();
        // No located history at all
        insert(&db, account_id, date(1), None, -20.0, None, "b1");
        let tx = insert(&db, account_id, date(10), None, -20.0, Some("Kyiv, UA"), "t");

        let analyzer = FraudAnalyzer::new(&db, FraudConfig::default());
        assert!(analyzer.analyze(&tx).unwrap().is_empty());
    }

    #[test]
    fn test_velocity() {
        let (db, account_id) = setup();
        let analyzer = FraudAnalyzer::new(&db, FraudConfig::default());

        insert(&db, account_id, date(10), Some(ts(10, 12, 0, 10)), -5.0, None, "v1");
        insert(&db, account_id, date(10), Some(ts(10, 12, 1, 0)), -5.0, None, "v2");
        insert(&db, account_id, date(10), Some(ts(10, 12, 2, 0)), -5.0, None, "v3");

        // Fourth transaction inside the 5-minute window trips the check
        let tx = insert(&db, account_id, date(10), Some(ts(10, 12, 3, 0)), -5.0, None, "v4");
        let findings = analyzer.analyze(&tx).unwrap();
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].alert_type, FraudAlertType::Velocity);
        assert_eq!(findings[0].severity, FraudSeverity::High);

        // Outside the window: clean
        let later = insert(&db, account_id, date(10), Some(ts(10, 13, 0, 0)), -5.0, None, "v5");
        assert!(analyzer.analyze(&later).unwrap().is_empty());
    }

    #[test]
    fn test_velocity_skipped_without_timestamp() {
        let (db, account_id) = setup();
        for i in 0..4 {
            insert(&db, account_id, date(10), None, -5.0, None, &format!("v{}", i));
        }
        let tx = insert(&db, account_id, date(10), None, -5.0, None, "v9");

        let analyzer = FraudAnalyzer::new(&db, FraudConfig::default());
        assert!(analyzer.analyze(&tx).unwrap().is_empty());
    }

    #[test]
    fn test_record_deduplicates() {
        let (db, account_id) = setup();
        baseline_expenses(&db, account_id);
        let tx = insert(&db, account_id, date(10), None, -200.0, Some("Portland, OR"), "big");

        let analyzer = FraudAnalyzer::new(&db, FraudConfig::default());
        let first = analyzer.analyze_and_record(&tx).unwrap();
        assert_eq!(first.len(), 1);

        // Re-analysis of the same transaction raises nothing new
        let second = analyzer.analyze_and_record(&tx).unwrap();
        assert!(second.is_empty());

        let alerts = db.list_fraud_alerts(Some(false)).unwrap();
        assert_eq!(alerts.len(), 1);

        // Once reviewed the alert drops out of the open list
        db.review_fraud_alert(alerts[0].id, true, Some("own purchase")).unwrap();
        assert!(db.list_fraud_alerts(Some(false)).unwrap().is_empty());
    }

    #[test]
    fn test_pending_transactions_skipped() {
        let (db, account_id) = setup();
        baseline_expenses(&db, account_id);
        let id = db
            .insert_transaction(
                account_id,
                &NewTransaction {
                    provider_txn_id: None,
                    date: date(10),
                    posted_at: None,
                    description: "pending big".into(),
                    merchant: None,
                    amount: -500.0,
                    location: Some("Kyiv, UA".into()),
                    pending: true,
                    import_hash: "p1".into(),
                    original_data: None,
                },
            )
            .unwrap();
        let tx = db.get_transaction(id).unwrap();

        let analyzer = FraudAnalyzer::new(&db, FraudConfig::default());
        assert!(analyzer.analyze(&tx).unwrap().is_empty());
    }
}
