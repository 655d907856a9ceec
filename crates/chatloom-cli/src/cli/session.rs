//! Session management CLI commands: list, delete.
//!
//! These work on the stored session list directly, so they need no API key.

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use comfy_table::{presets, Cell, Color, ContentArrangement, Table};
use console::style;
use dialoguer::Confirm;

use chatloom_core::chat::codec::PersistenceCodec;
use chatloom_core::storage::KvStore;
use chatloom_types::chat::{SessionId, SessionRecord};
use chatloom_types::storage::SESSIONS_KEY;

use crate::state::AppState;

/// One line of the session table.
pub struct SessionRow {
    pub id: SessionId,
    pub title: String,
    pub messages: usize,
}

impl From<&SessionRecord> for SessionRow {
    fn from(record: &SessionRecord) -> Self {
        Self {
            id: record.id,
            title: record.title.clone(),
            messages: record.messages.len(),
        }
    }
}

/// Creation time encoded in a UUID v7 session id.
pub fn created_at(id: SessionId) -> Option<DateTime<Local>> {
    let (secs, nanos) = id.0.get_timestamp()?.to_unix();
    let utc = DateTime::from_timestamp(i64::try_from(secs).ok()?, nanos)?;
    Some(utc.with_timezone(&Local))
}

/// Resolve a 1-based list number or an id prefix to a session id.
///
/// Ambiguous prefixes resolve to nothing.
pub fn resolve_session(ids: &[SessionId], selector: &str) -> Option<SessionId> {
    let selector = selector.trim();
    if selector.is_empty() {
        return None;
    }
    if let Ok(n) = selector.parse::<usize>() {
        if n >= 1 && n <= ids.len() {
            return Some(ids[n - 1]);
        }
    }
    let mut matches = ids.iter().filter(|id| id.to_string().starts_with(selector));
    match (matches.next(), matches.next()) {
        (Some(id), None) => Some(*id),
        _ => None,
    }
}

/// Render sessions as a table, marking the active one.
pub fn session_table(rows: &[SessionRow], active: Option<SessionId>) -> Table {
    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);

    table.set_header(vec![
        Cell::new("#").fg(Color::White),
        Cell::new("Title").fg(Color::White),
        Cell::new("Created").fg(Color::White),
        Cell::new("Messages").fg(Color::White),
        Cell::new("Id").fg(Color::White),
    ]);

    for (index, row) in rows.iter().enumerate() {
        let marker = if Some(row.id) == active { "*" } else { "" };
        let title: String = if row.title.chars().count() > 40 {
            format!("{}...", row.title.chars().take(37).collect::<String>())
        } else {
            row.title.clone()
        };
        let created = created_at(row.id)
            .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_default();
        let id = row.id.to_string();

        table.add_row(vec![
            Cell::new(format!("{}{marker}", index + 1)).fg(Color::White),
            Cell::new(title).fg(Color::Cyan),
            Cell::new(created).fg(Color::DarkGrey),
            Cell::new(row.messages.to_string()).fg(Color::White),
            Cell::new(&id[..8]).fg(Color::DarkGrey),
        ]);
    }

    table
}

async fn load_records<K: KvStore>(kv: &K) -> Result<Vec<SessionRecord>> {
    let Some(bytes) = kv.get(SESSIONS_KEY).await? else {
        return Ok(Vec::new());
    };
    PersistenceCodec::decode(&bytes).context("stored sessions are unreadable")
}

/// List stored sessions.
///
/// # Examples
///
/// ```bash
/// chatloom sessions
/// chatloom sessions --json
/// ```
pub async fn list_sessions<K: KvStore>(state: &AppState<K>, json: bool) -> Result<()> {
    let records = load_records(state.kv.as_ref()).await?;

    if json {
        let summary: Vec<_> = records
            .iter()
            .map(|r| {
                serde_json::json!({
                    "id": r.id,
                    "title": r.title,
                    "messages": r.messages.len(),
                    "created_at": created_at(r.id).map(|t| t.to_rfc3339()),
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    if records.is_empty() {
        println!();
        println!(
            "  {} No sessions yet. Start one with: {}",
            style("i").blue().bold(),
            style("chatloom chat").yellow()
        );
        println!();
        return Ok(());
    }

    let rows: Vec<SessionRow> = records.iter().map(SessionRow::from).collect();
    println!();
    println!("{}", session_table(&rows, None));
    println!();
    println!(
        "  {} session{}",
        style(rows.len()).bold(),
        if rows.len() == 1 { "" } else { "s" }
    );
    println!();
    Ok(())
}

/// Delete a stored session after confirmation.
pub async fn delete_session<K: KvStore>(
    state: &AppState<K>,
    selector: &str,
    force: bool,
    json: bool,
) -> Result<()> {
    let mut records = load_records(state.kv.as_ref()).await?;
    let ids: Vec<SessionId> = records.iter().map(|r| r.id).collect();
    let id = resolve_session(&ids, selector)
        .with_context(|| format!("no session matches '{selector}'"))?;
    let Some(position) = records.iter().position(|r| r.id == id) else {
        anyhow::bail!("no session matches '{selector}'");
    };

    if !force && !json {
        let confirmed = Confirm::new()
            .with_prompt(format!("  Delete '{}'?", records[position].title))
            .default(false)
            .interact()?;
        if !confirmed {
            println!("  Cancelled.");
            return Ok(());
        }
    }

    let removed = records.remove(position);
    let bytes = PersistenceCodec::encode(&records)?;
    state.kv.set(SESSIONS_KEY, &bytes).await?;
    tracing::info!(session_id = %removed.id, "session deleted");

    if json {
        println!("{}", serde_json::json!({"deleted": removed.id}));
    } else {
        println!(
            "  {} Deleted '{}'",
            style("✓").green().bold(),
            removed.title
        );
    }
    Ok(())
}
