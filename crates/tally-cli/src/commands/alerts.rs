//! Alert commands (list fraud and budget alerts, review)

use anyhow::Result;
use tally_core::{
    db::Database,
    models::{FraudSeverity, Transaction},
};

use super::truncate;

pub fn cmd_alerts(db: &Database, include_handled: bool) -> Result<()> {
    let fraud = if include_handled {
        db.list_fraud_alerts(None)?
    } else {
        db.list_fraud_alerts(Some(false))?
    };
    let budget = db.list_budget_alerts(include_handled)?;

    if fraud.is_empty() && budget.is_empty() {
        println!("✅ No open alerts.");
        return Ok(());
    }

    if !fraud.is_empty() {
        println!();
        println!("🚨 Fraud alerts");
        println!("   ─────────────────────────────────────────────────────────────");
        for alert in &fraud {
            let severity_icon = match alert.severity {
                FraudSeverity::High => "🔴",
                FraudSeverity::Medium => "🟡",
                FraudSeverity::Low => "⚪",
            };
            let reviewed = if alert.reviewed {
                if alert.false_positive {
                    " (false positive)"
                } else {
                    " (reviewed)"
                }
            } else {
                ""
            };
            println!(
                "   {} [{}] {}{}",
                severity_icon,
                alert.id,
                alert.alert_type.label(),
                reviewed
            );
            println!("      {}", alert.message);
            if let Ok(tx) = db.get_transaction(alert.transaction_id) {
                println!("      {}", describe_transaction(&tx));
            }
            println!();
        }
        println!("   Review with: tally review ALERT_ID [--false-positive]");
    }

    if !budget.is_empty() {
        println!();
        println!("📊 Budget alerts");
        println!("   ─────────────────────────────────────────────────────────────");
        for alert in &budget {
            let resolved = if alert.resolved { " (resolved)" } else { "" };
            println!("   [{}] {}{}", alert.id, alert.message, resolved);
        }
    }

    Ok(())
}

fn describe_transaction(tx: &Transaction) -> String {
    format!(
        "txn [{}] {} {:.2} {}",
        tx.id,
        tx.date,
        tx.amount,
        truncate(&tx.description, 40)
    )
}

pub fn cmd_review(
    db: &Database,
    alert_id: i64,
    false_positive: bool,
    note: Option<&str>,
) -> Result<()> {
    db.review_fraud_alert(alert_id, false_positive, note)?;
    if false_positive {
        println!("✅ Alert {} marked as false positive", alert_id);
    } else {
        println!("✅ Alert {} marked reviewed", alert_id);
    }
    Ok(())
}
