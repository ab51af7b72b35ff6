//! SQLite persistence for the row collection
//!
//! The collection is stored as a full snapshot: every save replaces the
//! table contents and the id counter inside one transaction.

use anyhow::{Context, Result};
use rusqlite::{Connection, OptionalExtension, Row as SqlRow};
use tracing::debug;

use crate::models::{Component, RowId, RowInput, RowRecord, RowResult, Snapshot};

/// Initialize the database schema
pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        -- One row per depth sample, in collection order
        CREATE TABLE IF NOT EXISTS gc_rows (
            id INTEGER PRIMARY KEY,
            position INTEGER NOT NULL,
            depth TEXT NOT NULL,
            total_gas REAL,
            c1 REAL,
            c2 REAL,
            c3 REAL,
            ic4 REAL,
            nc4 REAL,
            ic5 REAL,
            nc5 REAL,
            -- Derived values, kept so the table is readable on its own
            sum_units REAL NOT NULL,
            percent REAL NOT NULL,
            is_consistent INTEGER NOT NULL,
            normalized INTEGER NOT NULL DEFAULT 0
        );

        CREATE INDEX IF NOT EXISTS idx_gc_rows_position ON gc_rows(position);

        -- Collection-wide counters
        CREATE TABLE IF NOT EXISTS gc_meta (
            key TEXT PRIMARY KEY,
            value INTEGER NOT NULL
        );
        "#,
    )?;
    Ok(())
}

const NEXT_ID_KEY: &str = "next_id";

/// Replace the stored collection with `snapshot`.
pub fn save_snapshot(conn: &mut Connection, snapshot: &Snapshot) -> Result<()> {
    let records = &snapshot.records;
    let tx = conn.transaction()?;
    tx.execute("DELETE FROM gc_rows", [])?;
    {
        let mut stmt = tx.prepare(
            "INSERT INTO gc_rows (id, position, depth, total_gas, c1, c2, c3, ic4, nc4, ic5, nc5,
                                  sum_units, percent, is_consistent, normalized)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
        )?;

        for (position, record) in records.iter().enumerate() {
            let input = &record.input;
            let [c1, c2, c3, ic4, nc4, ic5, nc5] = input.components;
            stmt.execute(rusqlite::params![
                record.id as i64,
                position as i64,
                input.depth,
                input.total_gas,
                c1,
                c2,
                c3,
                ic4,
                nc4,
                ic5,
                nc5,
                record.results.sum_units,
                record.results.percent,
                record.results.is_consistent,
                record.normalized,
            ])
            .with_context(|| format!("Failed to store row {}", record.id))?;
        }
    }
    tx.execute(
        "INSERT OR REPLACE INTO gc_meta (key, value) VALUES (?1, ?2)",
        (NEXT_ID_KEY, snapshot.next_id as i64),
    )?;
    tx.commit()?;

    debug!("Saved snapshot of {} rows (next id {})", records.len(), snapshot.next_id);
    Ok(())
}

fn record_from_sql(row: &SqlRow<'_>) -> rusqlite::Result<RowRecord> {
    let mut input = RowInput {
        depth: row.get(1)?,
        total_gas: row.get(2)?,
        ..RowInput::default()
    };
    for (offset, component) in Component::ALL.into_iter().enumerate() {
        input.set_component(component, row.get(3 + offset)?);
    }

    Ok(RowRecord {
        id: row.get::<_, i64>(0)? as u64,
        input,
        results: RowResult {
            sum_units: row.get(10)?,
            percent: row.get(11)?,
            is_consistent: row.get(12)?,
            ..RowResult::default()
        },
        normalized: row.get(13)?,
    })
}

fn load_next_id(conn: &Connection) -> Result<Option<RowId>> {
    let value: Option<i64> = conn
        .query_row(
            "SELECT value FROM gc_meta WHERE key = ?1",
            [NEXT_ID_KEY],
            |row| row.get(0),
        )
        .optional()?;
    Ok(value.map(|v| v.max(1) as RowId))
}

/// Load the stored collection in its saved order.
///
/// Only the stored summary values come back in `results`; callers rebuild
/// full results with [`crate::collection::RowCollection::from_snapshot`].
pub fn load_snapshot(conn: &Connection) -> Result<Snapshot> {
    let mut stmt = conn.prepare(
        "SELECT id, depth, total_gas, c1, c2, c3, ic4, nc4, ic5, nc5,
                sum_units, percent, is_consistent, normalized
         FROM gc_rows
         ORDER BY position",
    )?;

    let rows = stmt.query_map([], record_from_sql)?;

    let mut results = Vec::new();
    for row in rows {
        results.push(row?);
    }
    let next_id = load_next_id(conn)?.unwrap_or(1);
    debug!("Loaded {} rows (next id {})", results.len(), next_id);
    Ok(Snapshot {
        records: results,
        next_id,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collection::RowCollection;
    use crate::config::Settings;
    use crate::models::Field;

    fn open() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        conn
    }

    fn reload(conn: &Connection) -> RowCollection {
        RowCollection::from_snapshot(Settings::default(), load_snapshot(conn).unwrap())
    }

    #[test]
    fn test_snapshot_round_trip_preserves_order_and_blanks() {
        let mut conn = open();
        let mut c = RowCollection::new(Settings::default());
        c.add_rows(vec![
            RowInput::new("300", Some(10.0)).with(Component::C1, 1500.0),
            RowInput::new("100", None).with(Component::NC5, 12.5),
        ])
        .unwrap();
        c.normalize_row(1);

        save_snapshot(&mut conn, &c.snapshot()).unwrap();
        let restored = reload(&conn);

        assert_eq!(restored.rows(), c.rows());
        assert_eq!(restored.rows()[1].input.total_gas, None);
        assert_eq!(restored.rows()[1].input.component(Component::C2), None);
        assert!(restored.rows()[0].normalized);
    }

    #[test]
    fn test_save_replaces_previous_snapshot() {
        let mut conn = open();
        let mut c = RowCollection::new(Settings::default());
        c.add_rows(vec![RowInput::new("1", Some(1.0)), RowInput::new("2", Some(2.0))])
            .unwrap();
        save_snapshot(&mut conn, &c.snapshot()).unwrap();

        c.remove_row(1);
        c.update_field(2, Field::Depth, "2.5");
        save_snapshot(&mut conn, &c.snapshot()).unwrap();

        let loaded = load_snapshot(&conn).unwrap();
        assert_eq!(loaded.records.len(), 1);
        assert_eq!(loaded.records[0].id, 2);
        assert_eq!(loaded.records[0].input.depth, "2.5");
    }

    #[test]
    fn test_removed_highest_id_not_reissued_after_reload() {
        let mut conn = open();
        let mut c = RowCollection::new(Settings::default());
        c.add_rows(vec![RowInput::new("1", Some(1.0)), RowInput::new("2", Some(2.0))])
            .unwrap();
        save_snapshot(&mut conn, &c.snapshot()).unwrap();

        let mut c = reload(&conn);
        assert!(c.remove_row(2));
        save_snapshot(&mut conn, &c.snapshot()).unwrap();

        let mut c = reload(&conn);
        let id = c.add_empty_row().id;
        assert_eq!(id, 3);
    }

    #[test]
    fn test_cleared_collection_keeps_counter() {
        let mut conn = open();
        let mut c = RowCollection::new(Settings::default());
        c.add_rows(vec![RowInput::new("1", Some(1.0))]).unwrap();
        c.clear();
        save_snapshot(&mut conn, &c.snapshot()).unwrap();

        let loaded = load_snapshot(&conn).unwrap();
        assert!(loaded.records.is_empty());
        assert_eq!(loaded.next_id, 2);
    }

    #[test]
    fn test_empty_database_starts_at_one() {
        let conn = open();
        let loaded = load_snapshot(&conn).unwrap();
        assert!(loaded.records.is_empty());
        assert_eq!(loaded.next_id, 1);
    }
}
