//! `events` table access

use crate::timestamp::{format_timestamp, parse_timestamp};
use crate::{Database, Result};
use rusqlite::{params, params_from_iter, types::Value, OptionalExtension};
use vaultguard_core::{Event, EventFilter, EventType, NewEvent};

/// Event log storage over a borrowed connection
pub struct EventStorage<'a> {
    db: &'a Database,
}

impl<'a> EventStorage<'a> {
    /// Create event storage
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Append an event
    pub fn append(&self, event: &NewEvent) -> Result<i64> {
        self.db.conn().execute(
            "INSERT INTO events (owner_id, event_type, event_meta, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![
                event.owner_id,
                event.event_type.as_str(),
                event.metadata,
                format_timestamp(event.created_at)
            ],
        )?;
        Ok(self.db.conn().last_insert_rowid())
    }

    /// Count events matching `filter`
    pub fn count(&self, filter: &EventFilter) -> Result<u64> {
        if filter.event_types.is_empty() {
            return Ok(0);
        }

        let mut sql = String::from("SELECT COUNT(*) FROM events WHERE event_type IN (");
        let mut args: Vec<Value> = Vec::new();
        for (i, event_type) in filter.event_types.iter().enumerate() {
            if i > 0 {
                sql.push_str(", ");
            }
            sql.push('?');
            args.push(Value::Text(event_type.as_str().to_string()));
        }
        sql.push_str(") AND datetime(created_at) >= datetime(?)");
        args.push(Value::Text(format_timestamp(filter.since)));

        if let Some(owner_id) = filter.owner_id {
            sql.push_str(" AND owner_id = ?");
            args.push(Value::Integer(owner_id));
        }

        let count: i64 = self
            .db
            .conn()
            .query_row(&sql, params_from_iter(args), |row| row.get(0))?;
        Ok(count.max(0) as u64)
    }

    /// Most common local login hour for the owner, earliest hour on ties
    pub fn top_login_hour(&self, owner_id: i64) -> Result<Option<u32>> {
        let hour: Option<i64> = self
            .db
            .conn()
            .query_row(
                "SELECT CAST(strftime('%H', created_at, 'localtime') AS INTEGER) AS hour, COUNT(*) AS cnt
                 FROM events
                 WHERE owner_id = ?1 AND event_type = ?2 AND created_at IS NOT NULL
                 GROUP BY hour
                 ORDER BY cnt DESC, hour ASC
                 LIMIT 1",
                params![owner_id, EventType::LoginSuccess.as_str()],
                |row| row.get(0),
            )
            .optional()?
            .flatten();
        Ok(hour.and_then(|h| u32::try_from(h).ok()).filter(|h| *h < 24))
    }

    /// Newest events first. Rows with an unknown type or timestamp are skipped.
    pub fn recent(&self, limit: usize) -> Result<Vec<Event>> {
        let mut stmt = self.db.conn().prepare(
            "SELECT id, owner_id, event_type, event_meta, created_at
             FROM events
             ORDER BY datetime(created_at) DESC, id DESC
             LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit as i64], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, Option<i64>>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, Option<String>>(3)?,
                row.get::<_, Option<String>>(4)?,
            ))
        })?;

        let mut events = Vec::new();
        for row in rows {
            let (id, owner_id, kind, metadata, created_at) = row?;
            let (Ok(event_type), Some(created_at)) = (
                kind.parse::<EventType>(),
                created_at.as_deref().and_then(parse_timestamp),
            ) else {
                tracing::debug!("Skipping unreadable event {}", id);
                continue;
            };
            events.push(Event {
                id,
                owner_id,
                event_type,
                metadata,
                created_at,
            });
        }
        Ok(events)
    }
}
