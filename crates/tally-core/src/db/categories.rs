//! Categories, user rules, and merchant keyword patterns

use rusqlite::{params, OptionalExtension, Row};
use std::str::FromStr;

use super::{parse_datetime, Database};
use crate::error::{Error, Result};
use crate::models::{Category, CategoryRule, MerchantPattern, PatternType};

fn row_to_category(row: &Row) -> rusqlite::Result<Category> {
    Ok(Category {
        id: row.get(0)?,
        name: row.get(1)?,
        created_at: parse_datetime(&row.get::<_, String>(2)?),
    })
}

fn row_to_rule(row: &Row) -> rusqlite::Result<CategoryRule> {
    Ok(CategoryRule {
        id: row.get(0)?,
        category_id: row.get(1)?,
        pattern: row.get(2)?,
        pattern_type: row
            .get::<_, String>(3)?
            .parse()
            .unwrap_or(PatternType::Contains),
        priority: row.get(4)?,
        created_at: parse_datetime(&row.get::<_, String>(5)?),
    })
}

impl Database {
    /// List all categories alphabetically
    pub fn list_categories(&self) -> Result<Vec<Category>> {
        let conn = self.conn()?;
        let mut stmt =
            conn.prepare("SELECT id, name, created_at FROM categories ORDER BY name")?;
        let rows = stmt.query_map([], row_to_category)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Into::into)
    }

    /// Create a category, returning its id
    pub fn create_category(&self, name: &str) -> Result<i64> {
        let conn = self.conn()?;
        conn.execute("INSERT INTO categories (name) VALUES (?1)", params![name])?;
        Ok(conn.last_insert_rowid())
    }

    /// Get a category by id
    pub fn get_category(&self, id: i64) -> Result<Category> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT id, name, created_at FROM categories WHERE id = ?1",
            params![id],
            row_to_category,
        )
        .optional()?
        .ok_or_else(|| Error::NotFound(format!("Category {} not found", id)))
    }

    /// Look up a category by exact name
    pub fn get_category_by_name(&self, name: &str) -> Result<Option<Category>> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT id, name, created_at FROM categories WHERE name = ?1 COLLATE NOCASE",
            params![name],
            row_to_category,
        )
        .optional()
        .map_err(Into::into)
    }

    /// Delete a category; rules and patterns cascade, transactions keep NULL
    pub fn delete_category(&self, id: i64) -> Result<()> {
        let conn = self.conn()?;
        // Detach transactions first so the FK does not block the delete
        conn.execute(
            "UPDATE transactions SET category_id = NULL, category_source = NULL, category_confidence = NULL WHERE category_id = ?1",
            params![id],
        )?;
        let deleted = conn.execute("DELETE FROM categories WHERE id = ?1", params![id])?;
        if deleted == 0 {
            return Err(Error::NotFound(format!("Category {} not found", id)));
        }
        Ok(())
    }

    /// List user rules, highest priority first
    ///
    /// This is the order the categorization cascade walks them in.
    pub fn list_category_rules(&self) -> Result<Vec<CategoryRule>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, category_id, pattern, pattern_type, priority, created_at
             FROM category_rules ORDER BY priority DESC, id",
        )?;
        let rows = stmt.query_map([], row_to_rule)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Into::into)
    }

    /// Create a user rule
    pub fn create_category_rule(
        &self,
        category_id: i64,
        pattern: &str,
        pattern_type: PatternType,
        priority: i32,
    ) -> Result<i64> {
        // Validate regex patterns up front so a bad rule fails loudly here
        // instead of being silently skipped by the cascade later.
        if pattern_type == PatternType::Regex {
            regex::RegexBuilder::new(pattern)
                .case_insensitive(true)
                .build()?;
        }

        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO category_rules (category_id, pattern, pattern_type, priority) VALUES (?1, ?2, ?3, ?4)",
            params![category_id, pattern, pattern_type.as_str(), priority],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Delete a user rule
    pub fn delete_category_rule(&self, id: i64) -> Result<()> {
        let conn = self.conn()?;
        let deleted = conn.execute("DELETE FROM category_rules WHERE id = ?1", params![id])?;
        if deleted == 0 {
            return Err(Error::NotFound(format!("Rule {} not found", id)));
        }
        Ok(())
    }

    /// List merchant keyword patterns
    pub fn list_merchant_patterns(&self) -> Result<Vec<MerchantPattern>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, keyword, category_id, created_at FROM merchant_patterns ORDER BY keyword",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(MerchantPattern {
                id: row.get(0)?,
                keyword: row.get(1)?,
                category_id: row.get(2)?,
                created_at: parse_datetime(&row.get::<_, String>(3)?),
            })
        })?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Into::into)
    }

    /// Add a merchant keyword pattern
    pub fn create_merchant_pattern(&self, keyword: &str, category_id: i64) -> Result<i64> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO merchant_patterns (keyword, category_id) VALUES (?1, ?2)",
            params![keyword.to_uppercase(), category_id],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Delete a merchant keyword pattern
    pub fn delete_merchant_pattern(&self, id: i64) -> Result<()> {
        let conn = self.conn()?;
        let deleted = conn.execute("DELETE FROM merchant_patterns WHERE id = ?1", params![id])?;
        if deleted == 0 {
            return Err(Error::NotFound(format!("Merchant pattern {} not found", id)));
        }
        Ok(())
    }
}
