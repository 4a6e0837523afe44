use anyhow::{Context, Result};
use portal_common::{ActivityType, RelatedTable};
use rusqlite::types::Value;
use rusqlite::{Row, params, params_from_iter};

use super::{PortalDb, enum_col, now_ts};
use crate::portal::models::{Activity, NewActivity};

/// Resolves the actor name from the employee, falling back to the individual
/// with the same auth-provider id.
const ACTIVITY_SELECT: &str = "
    SELECT a.id, a.user_id, a.partner_id, a.activity_type, a.related_id, a.related_table,
           a.details, a.activity_date,
           COALESCE(
               (SELECT first_name || ' ' || last_name FROM employees
                WHERE external_auth_id = a.user_id LIMIT 1),
               (SELECT first_name || ' ' || last_name FROM individuals
                WHERE external_auth_id = a.user_id LIMIT 1)
           )
    FROM activities a";

fn map_activity(row: &Row<'_>) -> rusqlite::Result<Activity> {
    Ok(Activity {
        id: row.get(0)?,
        user_id: row.get(1)?,
        partner_id: row.get(2)?,
        activity_type: enum_col(row, 3)?,
        related_id: row.get(4)?,
        related_table: enum_col(row, 5)?,
        details: row.get(6)?,
        activity_date: row.get(7)?,
        actor: row.get(8)?,
    })
}

impl PortalDb {
    /// Append an activity row. Safe to call inside a caller's transaction.
    pub fn create_activity(&self, activity: &NewActivity) -> Result<i64> {
        self.conn
            .execute(
                "INSERT INTO activities (user_id, partner_id, activity_type, related_id, related_table, details, activity_date)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    activity.user_id,
                    activity.partner_id,
                    activity.activity_type.as_str(),
                    activity.related_id,
                    activity.related_table.as_str(),
                    activity.details,
                    now_ts()
                ],
            )
            .context("Failed to insert activity")?;
        Ok(self.conn.last_insert_rowid())
    }

    fn query_activities(
        &self,
        filter: &str,
        mut values: Vec<Value>,
        limit: Option<u32>,
    ) -> Result<Vec<Activity>> {
        let mut sql = format!(
            "{} {} ORDER BY a.activity_date DESC, a.id DESC",
            ACTIVITY_SELECT, filter
        );
        if let Some(limit) = limit {
            values.push(Value::Integer(i64::from(limit)));
            sql.push_str(&format!(" LIMIT ?{}", values.len()));
        }
        let mut stmt = self
            .conn
            .prepare(&sql)
            .context("Failed to prepare activity query")?;
        let rows = stmt
            .query_map(params_from_iter(values), map_activity)
            .context("Failed to query activities")?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .context("Failed to read activity row")
    }

    pub fn activities_for_item(&self, table: RelatedTable, id: i64) -> Result<Vec<Activity>> {
        self.query_activities(
            "WHERE a.related_table = ?1 AND a.related_id = ?2",
            vec![Value::Text(table.as_str().to_string()), Value::Integer(id)],
            None,
        )
    }

    pub fn recent_activity(&self, limit: u32) -> Result<Vec<Activity>> {
        self.query_activities("", Vec::new(), Some(limit))
    }

    pub fn activity_by_user(&self, user_id: &str, limit: u32) -> Result<Vec<Activity>> {
        self.query_activities(
            "WHERE a.user_id = ?1",
            vec![Value::Text(user_id.to_string())],
            Some(limit),
        )
    }

    pub fn activity_for_partner(&self, partner_id: i64, limit: u32) -> Result<Vec<Activity>> {
        self.query_activities(
            "WHERE a.partner_id = ?1",
            vec![Value::Integer(partner_id)],
            Some(limit),
        )
    }

    pub fn activity_by_type(&self, types: &[ActivityType], limit: u32) -> Result<Vec<Activity>> {
        if types.is_empty() {
            return Ok(Vec::new());
        }
        let placeholders = (1..=types.len())
            .map(|i| format!("?{}", i))
            .collect::<Vec<_>>()
            .join(", ");
        let values = types
            .iter()
            .map(|t| Value::Text(t.as_str().to_string()))
            .collect();
        self.query_activities(
            &format!("WHERE a.activity_type IN ({})", placeholders),
            values,
            Some(limit),
        )
    }
}
