//! SQLite persistence for the portal.
//!
//! `PortalDb` owns a single connection; each submodule adds an `impl PortalDb`
//! block for one area. Multi-statement writes open a transaction at the public
//! method and call private helpers that run on the same connection.

use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{SecondsFormat, Utc};
use rusqlite::types::{Type, Value};
use rusqlite::{Connection, Row, params};

use crate::errors::PortalError;

mod access_items;
mod activities;
mod campaign_profiles;
mod campaigns;
mod notes;
mod packages;
mod partners;
mod permissions;
mod service_categories;
mod service_items;
mod task_templates;

pub use permissions::merge_partner_overrides;

/// Async-safe handle to the portal database.
///
/// Wraps `PortalDb` behind `Arc<Mutex>` and runs all access on tokio's
/// blocking thread pool via `spawn_blocking`, keeping synchronous SQLite I/O
/// off the async worker threads.
#[derive(Clone)]
pub struct DbHandle {
    inner: Arc<std::sync::Mutex<PortalDb>>,
}

impl DbHandle {
    pub fn new(db: PortalDb) -> Self {
        Self {
            inner: Arc::new(std::sync::Mutex::new(db)),
        }
    }

    /// Run a closure with access to the database on a blocking thread.
    /// All data passed into `f` must be owned (`'static`).
    pub async fn call<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&PortalDb) -> Result<R> + Send + 'static,
        R: Send + 'static,
    {
        let db = self.inner.clone();
        tokio::task::spawn_blocking(move || {
            let guard = db.lock().map_err(|_| PortalError::LockPoisoned)?;
            f(&guard)
        })
        .await
        .context("DB task panicked")?
    }
}

pub struct PortalDb {
    conn: Connection,
}

impl PortalDb {
    /// Open (or create) a SQLite database at the given path and run migrations.
    pub fn new(path: &Path) -> Result<Self> {
        let conn = Connection::open(path).context("Failed to open SQLite database")?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    /// Create an in-memory SQLite database (for testing).
    pub fn new_in_memory() -> Result<Self> {
        let conn =
            Connection::open_in_memory().context("Failed to open in-memory SQLite database")?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    fn init(&self) -> Result<()> {
        self.conn
            .execute_batch("PRAGMA foreign_keys = ON;")
            .context("Failed to enable foreign keys")?;
        self.run_migrations().context("Failed to run migrations")?;
        Ok(())
    }

    /// NotFound unless `table` has a row keyed `id`. `None` and 0 mean "no
    /// reference" and pass. `table` and `key_column` come from code.
    pub(crate) fn require_ref(
        &self,
        kind: &'static str,
        table: &str,
        key_column: &str,
        id: Option<i64>,
    ) -> Result<()> {
        let Some(id) = id.filter(|id| *id != 0) else {
            return Ok(());
        };
        let exists: bool = self
            .conn
            .query_row(
                &format!("SELECT COUNT(*) > 0 FROM {} WHERE {} = ?1", table, key_column),
                params![id],
                |row| row.get(0),
            )
            .with_context(|| format!("Failed to check {}", table))?;
        if !exists {
            return Err(PortalError::not_found(kind, id).into());
        }
        Ok(())
    }

    fn run_migrations(&self) -> Result<()> {
        self.conn
            .execute_batch(
                "
                CREATE TABLE IF NOT EXISTS entities (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    netsuite_id INTEGER,
                    entity_type TEXT NOT NULL,
                    name TEXT NOT NULL,
                    avatar_url TEXT,
                    created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
                    updated_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
                );

                CREATE TABLE IF NOT EXISTS companies (
                    entity_id INTEGER PRIMARY KEY REFERENCES entities(id) ON DELETE CASCADE,
                    legal_name TEXT,
                    business_registration_number TEXT,
                    industry TEXT,
                    size TEXT
                );

                CREATE TABLE IF NOT EXISTS individuals (
                    entity_id INTEGER PRIMARY KEY REFERENCES entities(id) ON DELETE CASCADE,
                    first_name TEXT NOT NULL,
                    last_name TEXT NOT NULL,
                    title TEXT,
                    external_auth_id TEXT
                );

                CREATE TABLE IF NOT EXISTS employees (
                    entity_id INTEGER PRIMARY KEY REFERENCES entities(id) ON DELETE CASCADE,
                    first_name TEXT NOT NULL,
                    last_name TEXT NOT NULL,
                    title TEXT,
                    status TEXT NOT NULL DEFAULT 'active',
                    external_auth_id TEXT
                );

                CREATE TABLE IF NOT EXISTS partners (
                    entity_id INTEGER PRIMARY KEY REFERENCES entities(id) ON DELETE CASCADE,
                    demo_date TEXT,
                    demo_by_entity_id INTEGER REFERENCES entities(id),
                    msa_signed INTEGER NOT NULL DEFAULT 0,
                    msa_signed_date TEXT,
                    start_date TEXT,
                    status TEXT NOT NULL DEFAULT 'prospect',
                    partner_type TEXT,
                    acquisition_source TEXT,
                    total_monthly_revenue INTEGER,
                    available_currencies TEXT,
                    default_currency TEXT,
                    analytics_folder_id TEXT,
                    google_drive_link TEXT,
                    external_id TEXT,
                    is_onboarded INTEGER NOT NULL DEFAULT 0,
                    created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
                    updated_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
                );

                CREATE TABLE IF NOT EXISTS entity_relationships (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    parent_entity_id INTEGER NOT NULL REFERENCES entities(id) ON DELETE CASCADE,
                    child_entity_id INTEGER NOT NULL REFERENCES entities(id) ON DELETE CASCADE,
                    relationship_type TEXT NOT NULL,
                    relationship_subtype TEXT,
                    created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
                );

                CREATE TABLE IF NOT EXISTS entity_contacts (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    entity_id INTEGER NOT NULL REFERENCES entities(id) ON DELETE CASCADE,
                    contact_type TEXT NOT NULL,
                    contact_value TEXT NOT NULL,
                    contact_label TEXT NOT NULL DEFAULT 'work',
                    is_primary INTEGER NOT NULL DEFAULT 0
                );

                CREATE TABLE IF NOT EXISTS campaign_profiles (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    name TEXT NOT NULL,
                    label TEXT,
                    short_description TEXT,
                    long_description TEXT,
                    criteria TEXT,
                    examples TEXT,
                    seo_growth_opportunities TEXT,
                    common_challenges TEXT,
                    campaign_considerations TEXT,
                    presale_considerations TEXT,
                    phase_one_outline TEXT,
                    ongoing_phase_outline TEXT,
                    is_active INTEGER NOT NULL DEFAULT 1,
                    created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
                    created_by INTEGER NOT NULL REFERENCES entities(id),
                    updated_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
                    updated_by INTEGER NOT NULL REFERENCES entities(id)
                );

                CREATE TABLE IF NOT EXISTS campaigns (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    partner_entity_id INTEGER NOT NULL REFERENCES entities(id),
                    site_url TEXT NOT NULL,
                    status TEXT NOT NULL DEFAULT 'prospect',
                    campaign_profile_id INTEGER REFERENCES campaign_profiles(id) ON DELETE SET NULL,
                    created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
                    updated_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
                );

                CREATE TABLE IF NOT EXISTS service_categories (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    key TEXT NOT NULL UNIQUE,
                    display_name TEXT NOT NULL,
                    description TEXT,
                    is_active INTEGER NOT NULL DEFAULT 1,
                    created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
                    created_by INTEGER NOT NULL REFERENCES entities(id),
                    updated_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
                    updated_by INTEGER NOT NULL REFERENCES entities(id)
                );

                CREATE TABLE IF NOT EXISTS service_items (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    name TEXT NOT NULL,
                    service_category TEXT,
                    service_category_id INTEGER REFERENCES service_categories(id),
                    service_label TEXT,
                    type TEXT,
                    description TEXT,
                    sop_url TEXT,
                    min_pricing_usd_cents INTEGER,
                    est_cogs_usd_cents INTEGER,
                    est_time_minutes INTEGER,
                    recommended_price_cents INTEGER,
                    recommended_price_currency TEXT,
                    partner_entity_id INTEGER REFERENCES entities(id),
                    is_active INTEGER NOT NULL DEFAULT 1,
                    service_scope TEXT NOT NULL DEFAULT 'campaign',
                    is_billable INTEGER NOT NULL DEFAULT 1,
                    proposal_mode TEXT NOT NULL DEFAULT 'both',
                    package_display TEXT,
                    mcp_display TEXT,
                    in_stream INTEGER NOT NULL DEFAULT 0,
                    generate_task INTEGER NOT NULL DEFAULT 0,
                    created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
                    created_by INTEGER NOT NULL REFERENCES entities(id),
                    updated_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
                    updated_by INTEGER NOT NULL REFERENCES entities(id)
                );

                CREATE TABLE IF NOT EXISTS packages (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    name TEXT NOT NULL,
                    monthly_price_cents INTEGER,
                    currency TEXT,
                    partner_entity_id INTEGER REFERENCES entities(id),
                    related_campaign_profile_id INTEGER REFERENCES campaign_profiles(id) ON DELETE SET NULL,
                    campaign_considerations TEXT,
                    presale_considerations TEXT,
                    phase_one_outline TEXT,
                    ongoing_phase_outline TEXT,
                    seo_growth_opportunities TEXT,
                    is_active INTEGER NOT NULL DEFAULT 1,
                    buy_without_discovery INTEGER NOT NULL DEFAULT 1,
                    description TEXT,
                    outcome TEXT,
                    type TEXT,
                    default_aa_client_template TEXT,
                    created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
                    created_by INTEGER NOT NULL REFERENCES entities(id),
                    updated_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
                    updated_by INTEGER NOT NULL REFERENCES entities(id)
                );

                CREATE TABLE IF NOT EXISTS package_service_items (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    package_id INTEGER NOT NULL REFERENCES packages(id) ON DELETE CASCADE,
                    service_item_id INTEGER NOT NULL REFERENCES service_items(id),
                    quantity INTEGER,
                    frequency TEXT,
                    monthly_price_cents INTEGER,
                    order_override INTEGER,
                    unique_service_label TEXT,
                    created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
                    created_by INTEGER NOT NULL REFERENCES entities(id),
                    updated_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
                    updated_by INTEGER NOT NULL REFERENCES entities(id)
                );

                CREATE TABLE IF NOT EXISTS package_service_action_items (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    package_id INTEGER NOT NULL REFERENCES packages(id) ON DELETE CASCADE,
                    package_service_item_id INTEGER REFERENCES package_service_items(id) ON DELETE CASCADE,
                    service_item_id INTEGER NOT NULL REFERENCES service_items(id),
                    order_override INTEGER,
                    in_onboarding INTEGER NOT NULL DEFAULT 0,
                    created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
                    created_by INTEGER NOT NULL REFERENCES entities(id),
                    updated_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
                    updated_by INTEGER NOT NULL REFERENCES entities(id)
                );

                CREATE TABLE IF NOT EXISTS permissions (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    name TEXT,
                    permission_key TEXT NOT NULL,
                    permission_state TEXT NOT NULL,
                    scope_status TEXT,
                    campaign_id INTEGER REFERENCES campaigns(id) ON DELETE CASCADE,
                    package_id INTEGER REFERENCES packages(id) ON DELETE CASCADE,
                    partner_id INTEGER REFERENCES entities(id) ON DELETE CASCADE,
                    campaign_profile_id INTEGER REFERENCES campaign_profiles(id) ON DELETE CASCADE,
                    service_item_id INTEGER REFERENCES service_items(id),
                    service_category_id INTEGER REFERENCES service_categories(id),
                    changed_by INTEGER REFERENCES entities(id),
                    change_reason TEXT,
                    is_active INTEGER NOT NULL DEFAULT 1,
                    created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
                    created_by INTEGER NOT NULL REFERENCES entities(id),
                    updated_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
                    updated_by INTEGER NOT NULL REFERENCES entities(id)
                );

                CREATE TABLE IF NOT EXISTS access_items (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    email TEXT,
                    username TEXT NOT NULL,
                    access_item_owner TEXT NOT NULL,
                    in_lastpass INTEGER NOT NULL DEFAULT 0,
                    tfa_type TEXT,
                    tfa_type_value TEXT,
                    tfa_contact_id INTEGER REFERENCES entities(id),
                    tfa_source TEXT,
                    partner_entity_id INTEGER REFERENCES entities(id),
                    is_active INTEGER NOT NULL DEFAULT 1,
                    created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
                    created_by INTEGER NOT NULL REFERENCES entities(id),
                    updated_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
                    updated_by INTEGER NOT NULL REFERENCES entities(id)
                );

                CREATE TABLE IF NOT EXISTS task_templates (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    type TEXT NOT NULL,
                    title TEXT NOT NULL,
                    description TEXT,
                    key TEXT,
                    primary_participant TEXT NOT NULL,
                    grouping TEXT NOT NULL,
                    est_time_minutes INTEGER,
                    sop_url TEXT,
                    sop_id INTEGER,
                    gold_standard_url TEXT,
                    template_category TEXT NOT NULL,
                    partner_entity_id INTEGER REFERENCES entities(id),
                    campaign_profile_id INTEGER REFERENCES campaign_profiles(id) ON DELETE SET NULL,
                    service_category_id INTEGER REFERENCES service_categories(id),
                    mandatory INTEGER NOT NULL DEFAULT 0,
                    decision_point INTEGER NOT NULL DEFAULT 0,
                    active INTEGER NOT NULL DEFAULT 1,
                    created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
                    created_by INTEGER REFERENCES entities(id),
                    updated_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
                    updated_by INTEGER REFERENCES entities(id)
                );

                CREATE TABLE IF NOT EXISTS notes (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    entity_id INTEGER NOT NULL,
                    entity_type TEXT NOT NULL,
                    note_type TEXT NOT NULL DEFAULT 'general',
                    title TEXT,
                    content TEXT,
                    is_internal INTEGER NOT NULL DEFAULT 1,
                    is_pinned INTEGER NOT NULL DEFAULT 0,
                    is_current INTEGER NOT NULL DEFAULT 1,
                    version_number INTEGER NOT NULL DEFAULT 1,
                    replaces_note_id INTEGER REFERENCES notes(id),
                    created_by_entity_id INTEGER REFERENCES entities(id),
                    created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
                    updated_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
                );

                CREATE TABLE IF NOT EXISTS activities (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    user_id TEXT NOT NULL,
                    partner_id INTEGER REFERENCES entities(id) ON DELETE SET NULL,
                    activity_type TEXT NOT NULL,
                    related_id INTEGER NOT NULL,
                    related_table TEXT NOT NULL,
                    details TEXT,
                    activity_date TEXT NOT NULL
                );

                CREATE UNIQUE INDEX IF NOT EXISTS idx_notes_one_current
                    ON notes(entity_id, entity_type, note_type) WHERE is_current = 1;
                CREATE INDEX IF NOT EXISTS idx_notes_replaces ON notes(replaces_note_id);
                CREATE INDEX IF NOT EXISTS idx_partners_external_id ON partners(external_id);
                CREATE INDEX IF NOT EXISTS idx_relationships_parent ON entity_relationships(parent_entity_id, relationship_type);
                CREATE INDEX IF NOT EXISTS idx_contacts_entity ON entity_contacts(entity_id);
                CREATE INDEX IF NOT EXISTS idx_campaigns_partner ON campaigns(partner_entity_id);
                CREATE INDEX IF NOT EXISTS idx_permissions_partner_key ON permissions(partner_id, permission_key);
                CREATE INDEX IF NOT EXISTS idx_package_items_package ON package_service_items(package_id);
                CREATE INDEX IF NOT EXISTS idx_package_actions_package ON package_service_action_items(package_id);
                CREATE INDEX IF NOT EXISTS idx_task_templates_key ON task_templates(key, partner_entity_id);
                CREATE INDEX IF NOT EXISTS idx_activities_related ON activities(related_table, related_id);
                CREATE INDEX IF NOT EXISTS idx_activities_user ON activities(user_id);
                ",
            )
            .context("Failed to run schema migrations")?;
        Ok(())
    }
}

// ── Shared helpers ────────────────────────────────────────────────────

/// Timestamp in the same shape as the column defaults (`2024-01-31T09:15:02.123Z`).
pub(crate) fn now_ts() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Read a TEXT column into a string-backed enum.
pub(crate) fn enum_col<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let raw: String = row.get(idx)?;
    raw.parse()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

/// Nullable variant of [`enum_col`].
pub(crate) fn opt_enum_col<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let raw: Option<String> = row.get(idx)?;
    raw.map(|s| {
        s.parse()
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
    })
    .transpose()
}

/// Treat blank form input as absent.
pub(crate) fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|s| !s.is_empty())
}

/// Run `UPDATE <table> SET col = ?, ... WHERE <key> = ?` for the given
/// assignments. Table and column names come from code, never from input.
/// Returns the number of rows changed; an empty assignment list is a no-op.
pub(crate) fn update_columns(
    conn: &Connection,
    table: &str,
    key_column: &str,
    key: i64,
    assignments: Vec<(&str, Value)>,
) -> rusqlite::Result<usize> {
    if assignments.is_empty() {
        return Ok(0);
    }
    let set_clause = assignments
        .iter()
        .enumerate()
        .map(|(i, (col, _))| format!("{} = ?{}", col, i + 1))
        .collect::<Vec<_>>()
        .join(", ");
    let sql = format!(
        "UPDATE {} SET {} WHERE {} = ?{}",
        table,
        set_clause,
        key_column,
        assignments.len() + 1
    );
    let mut values: Vec<Value> = assignments.into_iter().map(|(_, v)| v).collect();
    values.push(Value::Integer(key));
    conn.execute(&sql, rusqlite::params_from_iter(values))
}

/// Convert optional form text into a column value, blank becoming NULL.
pub(crate) fn text_value(value: Option<&str>) -> Value {
    match non_empty(value) {
        Some(s) => Value::Text(s.to_string()),
        None => Value::Null,
    }
}

/// Column kinds accepted by the single-field update endpoints.
#[derive(Clone, Copy)]
pub(crate) enum FieldKind {
    Text,
    Int,
    Bool,
    /// Text column restricted to a vocabulary; the fn validates the value.
    Choice(fn(&str) -> Result<(), portal_common::ParseEnumError>),
}

pub(crate) fn choice<T>(s: &str) -> Result<(), portal_common::ParseEnumError>
where
    T: FromStr<Err = portal_common::ParseEnumError>,
{
    s.parse::<T>().map(|_| ())
}

/// Look up `field` in a whitelist and convert a JSON value to a column value.
pub(crate) fn field_update(
    allowed: &[(&'static str, FieldKind)],
    field: &str,
    value: &serde_json::Value,
) -> Result<(&'static str, Value), PortalError> {
    let (column, kind) = allowed
        .iter()
        .find(|(name, _)| *name == field)
        .copied()
        .ok_or_else(|| PortalError::validation(format!("Field '{}' cannot be updated", field)))?;

    use serde_json::Value as Json;
    let converted = match (kind, value) {
        (_, Json::Null) => Value::Null,
        (FieldKind::Text, Json::String(s)) => match non_empty(Some(s.as_str())) {
            Some(s) => Value::Text(s.to_string()),
            None => Value::Null,
        },
        (FieldKind::Int, Json::Number(n)) => n
            .as_i64()
            .map(Value::Integer)
            .ok_or_else(|| PortalError::validation(format!("Field '{}' expects an integer", field)))?,
        (FieldKind::Int, Json::String(s)) => s
            .trim()
            .parse::<i64>()
            .map(Value::Integer)
            .map_err(|_| PortalError::validation(format!("Field '{}' expects an integer", field)))?,
        (FieldKind::Bool, Json::Bool(b)) => Value::Integer(i64::from(*b)),
        (FieldKind::Bool, Json::String(s)) => match s.as_str() {
            "true" | "1" | "on" => Value::Integer(1),
            "false" | "0" | "off" => Value::Integer(0),
            _ => {
                return Err(PortalError::validation(format!(
                    "Field '{}' expects true or false",
                    field
                )));
            }
        },
        (FieldKind::Choice(check), Json::String(s)) => {
            check(s)?;
            Value::Text(s.clone())
        }
        _ => {
            return Err(PortalError::validation(format!(
                "Unsupported value for field '{}'",
                field
            )));
        }
    };
    Ok((column, converted))
}
