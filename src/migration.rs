//! One-time rewrite of the legacy `week_number` schema into `year` + `week`.
//!
//! Legacy stores kept a bare week number on tasks and weekly logs. Every such
//! row is assigned a single configured year; the rebuild is all-or-nothing.

use rusqlite::Connection;

use crate::database::{
    tasks_table_sql, weekly_logs_table_sql, DatabaseError, TASK_INDEXES, WEEKLY_LOG_INDEXES,
};

/// Row statistics gathered after a successful migration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationSummary {
    pub total_tasks: i64,
    pub year_count: i64,
    pub min_year: Option<i32>,
    pub max_year: Option<i32>,
}

/// Check if a column exists in a table
fn column_exists(conn: &Connection, table: &str, column: &str) -> Result<bool, rusqlite::Error> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM pragma_table_info(?1) WHERE name = ?2",
        rusqlite::params![table, column],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

fn table_exists(conn: &Connection, table: &str) -> Result<bool, rusqlite::Error> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
        rusqlite::params![table],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

/// A table is legacy when it still has `week_number` and has no `year`
fn is_legacy(conn: &Connection, table: &str) -> Result<bool, rusqlite::Error> {
    Ok(column_exists(conn, table, "week_number")? && !column_exists(conn, table, "year")?)
}

/// SELECT expression for `column`: the legacy value when the old table has it
/// and it is not NULL, else `fallback`
fn carry(conn: &Connection, table: &str, column: &str, fallback: &str) -> Result<String, rusqlite::Error> {
    Ok(if column_exists(conn, table, column)? {
        format!("COALESCE({column}, {fallback})")
    } else {
        fallback.to_string()
    })
}

/// Rebuild `tasks` (and `weekly_logs`) if the store still uses the legacy shape.
///
/// A task without a week number stays weekless: it gets no year either, so
/// rollovers never pick it up.
///
/// Returns `None` when the schema is already current. Must run while foreign
/// keys are off, since dropping the old task table would otherwise cascade
/// into the log table.
pub fn migrate_legacy_schema_if_needed(
    conn: &Connection,
    legacy_year: i32,
) -> Result<Option<MigrationSummary>, DatabaseError> {
    if !table_exists(conn, "tasks")? || !is_legacy(conn, "tasks")? {
        return Ok(None);
    }

    tracing::info!(legacy_year, "legacy week_number schema detected, migrating");
    if let Err(e) = rebuild(conn, legacy_year) {
        // The transaction was dropped uncommitted, so nothing was applied
        tracing::error!(error = %e, "legacy migration failed, rolled back");
        return Err(DatabaseError::Migration(e));
    }

    let summary = conn.query_row(
        "SELECT COUNT(*), COUNT(DISTINCT year), MIN(year), MAX(year) FROM tasks",
        [],
        |row| {
            Ok(MigrationSummary {
                total_tasks: row.get(0)?,
                year_count: row.get(1)?,
                min_year: row.get(2)?,
                max_year: row.get(3)?,
            })
        },
    )?;
    Ok(Some(summary))
}

fn rebuild(conn: &Connection, legacy_year: i32) -> Result<(), rusqlite::Error> {
    let tx = conn.unchecked_transaction()?;

    tx.execute("DROP TABLE IF EXISTS tasks_new", [])?;
    tx.execute(&tasks_table_sql("tasks_new"), [])?;
    let copy_tasks = format!(
        "INSERT INTO tasks_new (id, title, description, category_id, project_id, priority, status, progress,
            year, week, is_recurring, recurring_note, created_at, updated_at)
         SELECT id, title, {description}, {category_id}, project_id, {priority}, {status}, {progress},
            CASE WHEN week_number IS NULL THEN NULL ELSE ?1 END, week_number,
            {is_recurring}, {recurring_note}, {created_at}, {updated_at}
         FROM tasks",
        description = carry(&tx, "tasks", "description", "NULL")?,
        category_id = carry(&tx, "tasks", "category_id", "NULL")?,
        priority = carry(&tx, "tasks", "priority", "'p2'")?,
        status = carry(&tx, "tasks", "status", "'todo'")?,
        progress = carry(&tx, "tasks", "progress", "0")?,
        is_recurring = carry(&tx, "tasks", "is_recurring", "0")?,
        recurring_note = carry(&tx, "tasks", "recurring_note", "NULL")?,
        created_at = carry(&tx, "tasks", "created_at", "CURRENT_TIMESTAMP")?,
        updated_at = carry(&tx, "tasks", "updated_at", "CURRENT_TIMESTAMP")?,
    );
    let copied = tx.execute(&copy_tasks, rusqlite::params![legacy_year])?;
    tx.execute("DROP TABLE tasks", [])?;
    tx.execute("ALTER TABLE tasks_new RENAME TO tasks", [])?;
    for sql in TASK_INDEXES {
        tx.execute(sql, [])?;
    }
    tracing::debug!(copied, "tasks rebuilt");

    if table_exists(&tx, "weekly_logs")? && is_legacy(&tx, "weekly_logs")? {
        tx.execute("DROP TABLE IF EXISTS weekly_logs_new", [])?;
        tx.execute(&weekly_logs_table_sql("weekly_logs_new"), [])?;
        let copy_logs = format!(
            "INSERT INTO weekly_logs_new (id, year, week, task_id, log_type, content, log_date, created_at)
             SELECT id, ?1, week_number, {task_id}, log_type, {content}, {log_date}, {created_at}
             FROM weekly_logs",
            task_id = carry(&tx, "weekly_logs", "task_id", "NULL")?,
            content = carry(&tx, "weekly_logs", "content", "NULL")?,
            log_date = carry(&tx, "weekly_logs", "log_date", "DATE('now')")?,
            created_at = carry(&tx, "weekly_logs", "created_at", "CURRENT_TIMESTAMP")?,
        );
        let copied = tx.execute(&copy_logs, rusqlite::params![legacy_year])?;
        tx.execute("DROP TABLE weekly_logs", [])?;
        tx.execute("ALTER TABLE weekly_logs_new RENAME TO weekly_logs", [])?;
        for sql in WEEKLY_LOG_INDEXES {
            tx.execute(sql, [])?;
        }
        tracing::debug!(copied, "weekly logs rebuilt");
    }

    tx.commit()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Priority, Status};

    fn legacy_store() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE categories (id INTEGER PRIMARY KEY, name TEXT NOT NULL UNIQUE, description TEXT,
                created_at TEXT, updated_at TEXT);
             CREATE TABLE projects (id INTEGER PRIMARY KEY, name TEXT NOT NULL, description TEXT,
                category_id INTEGER NOT NULL, is_default INTEGER DEFAULT 0, created_at TEXT, updated_at TEXT);
             CREATE TABLE tasks (id INTEGER PRIMARY KEY AUTOINCREMENT, title TEXT NOT NULL, description TEXT,
                category_id INTEGER, project_id INTEGER NOT NULL, priority TEXT DEFAULT 'p2',
                status TEXT DEFAULT 'todo', progress INTEGER DEFAULT 0, week_number INTEGER,
                created_at TEXT, updated_at TEXT);
             CREATE TABLE weekly_logs (id INTEGER PRIMARY KEY AUTOINCREMENT, week_number INTEGER NOT NULL,
                task_id INTEGER, log_type TEXT NOT NULL, content TEXT, log_date TEXT NOT NULL, created_at TEXT);
             INSERT INTO categories (id, name) VALUES (1, 'Work');
             INSERT INTO projects (id, name, category_id, is_default) VALUES (1, '杂', 1, 1);
             INSERT INTO tasks (title, category_id, project_id, status, week_number) VALUES
                ('a', 1, 1, 'done', 3), ('b', 1, 1, 'todo', 4), ('c', 1, 1, 'backlog', 9);
             INSERT INTO weekly_logs (week_number, task_id, log_type, content, log_date)
                VALUES (3, 1, 'done', 'shipped', '2025-01-15');",
        )
        .unwrap();
        conn
    }

    #[test]
    fn current_schema_is_left_alone() {
        let conn = Connection::open_in_memory().unwrap();
        assert_eq!(migrate_legacy_schema_if_needed(&conn, 2025).unwrap(), None);
        conn.execute(&tasks_table_sql("tasks"), []).unwrap();
        assert_eq!(migrate_legacy_schema_if_needed(&conn, 2025).unwrap(), None);
    }

    #[test]
    fn legacy_rows_get_the_configured_year() {
        let conn = legacy_store();
        let summary = migrate_legacy_schema_if_needed(&conn, 2024).unwrap().unwrap();
        assert_eq!(
            summary,
            MigrationSummary { total_tasks: 3, year_count: 1, min_year: Some(2024), max_year: Some(2024) }
        );

        let weeks: Vec<(String, i32, u32, i64)> = conn
            .prepare("SELECT title, year, week, is_recurring FROM tasks ORDER BY id")
            .unwrap()
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)))
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(
            weeks,
            vec![
                ("a".to_string(), 2024, 3, 0),
                ("b".to_string(), 2024, 4, 0),
                ("c".to_string(), 2024, 9, 0)
            ]
        );

        let log: (i32, u32, String) = conn
            .query_row("SELECT year, week, content FROM weekly_logs", [], |row| {
                Ok((row.get(0)?, row.get(1)?, row.get(2)?))
            })
            .unwrap();
        assert_eq!(log, (2024, 3, "shipped".to_string()));
        assert!(!column_exists(&conn, "tasks", "week_number").unwrap());

        // Second run finds nothing to do
        assert_eq!(migrate_legacy_schema_if_needed(&conn, 2024).unwrap(), None);
    }

    #[test]
    fn null_legacy_columns_fall_back_to_defaults() {
        let conn = legacy_store();
        conn.execute_batch(
            "INSERT INTO tasks (title, category_id, project_id, priority, status, progress, week_number,
                created_at, updated_at) VALUES ('bare', 1, 1, NULL, NULL, NULL, NULL, NULL, NULL);
             UPDATE weekly_logs SET created_at = NULL;",
        )
        .unwrap();

        let summary = migrate_legacy_schema_if_needed(&conn, 2025).unwrap().unwrap();
        assert_eq!(summary.total_tasks, 4);
        assert_eq!((summary.min_year, summary.max_year), (Some(2025), Some(2025)));

        let bare = conn
            .query_row(
                &format!("SELECT {} FROM tasks t WHERE t.title = 'bare'", crate::database::TASK_COLUMNS),
                [],
                crate::database::Database::row_to_task,
            )
            .unwrap();
        assert_eq!(bare.priority, Priority::P2);
        assert_eq!(bare.status, Status::Todo);
        assert_eq!(bare.progress, 0);
        assert_eq!(bare.year_week, None);
        assert!(!bare.created_at.is_empty());

        let year: Option<i32> =
            conn.query_row("SELECT year FROM tasks WHERE title = 'bare'", [], |r| r.get(0)).unwrap();
        assert_eq!(year, None);
        let log_created: Option<String> =
            conn.query_row("SELECT created_at FROM weekly_logs", [], |r| r.get(0)).unwrap();
        assert!(log_created.is_some());
    }

    #[test]
    fn failed_migration_leaves_the_legacy_table_intact() {
        let conn = legacy_store();
        // Out-of-range progress violates the new table's CHECK constraint mid-copy
        conn.execute("UPDATE tasks SET progress = 400 WHERE title = 'b'", []).unwrap();

        let err = migrate_legacy_schema_if_needed(&conn, 2025).unwrap_err();
        assert!(matches!(err, DatabaseError::Migration(_)));
        assert!(column_exists(&conn, "tasks", "week_number").unwrap());
        assert!(!table_exists(&conn, "tasks_new").unwrap());
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM tasks", [], |r| r.get(0)).unwrap();
        assert_eq!(count, 3);
    }
}
