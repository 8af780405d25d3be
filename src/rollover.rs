//! Forwarding unfinished work into a later week.

use serde::Serialize;

use crate::database::{Database, DatabaseError, TASK_COLUMNS};
use crate::models::YearWeek;

/// Non-recurring, unfinished, and at or before the source week (year first, then week)
const SWEEP_PREDICATE: &str = "status IN ('todo', 'doing', 'backlog')
    AND (is_recurring = 0 OR is_recurring IS NULL)
    AND (year < ?1 OR (year = ?1 AND week <= ?2))";

/// Preview of what a rollover from a given week would touch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct UnfinishedCount {
    pub normal_count: i64,
    pub recurring_count: i64,
    pub total_count: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RolloverResult {
    pub moved_count: usize,
    pub created_count: usize,
    pub to: YearWeek,
}

fn check_week(week: YearWeek) -> Result<(), DatabaseError> {
    if week.week == 0 || week.year <= 0 {
        return Err(DatabaseError::Validation(format!("Invalid year/week: {}/{}", week.year, week.week)));
    }
    Ok(())
}

/// Count what `rollover_unfinished(from, ..)` would move and duplicate, without writing
pub fn count_unfinished(db: &Database, from: YearWeek) -> Result<UnfinishedCount, DatabaseError> {
    check_week(from)?;
    let normal_count: i64 = db.conn().query_row(
        &format!("SELECT COUNT(*) FROM tasks WHERE {SWEEP_PREDICATE}"),
        rusqlite::params![from.year, from.week],
        |row| row.get(0),
    )?;
    let recurring_count: i64 = db.conn().query_row(
        "SELECT COUNT(*) FROM tasks WHERE is_recurring = 1 AND year = ?1 AND week = ?2",
        rusqlite::params![from.year, from.week],
        |row| row.get(0),
    )?;
    Ok(UnfinishedCount {
        normal_count,
        recurring_count,
        total_count: normal_count + recurring_count,
    })
}

/// Every todo/doing/backlog task in the store, regardless of week
pub fn count_all_unfinished(db: &Database) -> Result<i64, DatabaseError> {
    Ok(db.conn().query_row(
        "SELECT COUNT(*) FROM tasks WHERE status IN ('todo', 'doing', 'backlog')",
        [],
        |row| row.get(0),
    )?)
}

/// Move unfinished non-recurring tasks at or before `from` into `to`, and give every
/// recurring task of `from` a fresh todo instance in `to`.
///
/// Both steps share one transaction. The recurring instances of `from` are
/// left as they are.
pub fn rollover_unfinished(db: &Database, from: YearWeek, to: YearWeek) -> Result<RolloverResult, DatabaseError> {
    check_week(from)?;
    check_week(to)?;
    let now = db.now();

    let tx = db.begin()?;
    let moved_count = tx.execute(
        &format!("UPDATE tasks SET year = ?3, week = ?4, updated_at = ?5 WHERE {SWEEP_PREDICATE}"),
        rusqlite::params![from.year, from.week, to.year, to.week, now],
    )?;

    // Collected before inserting so the copies never feed back in when from == to
    let recurring = {
        let mut stmt = tx.prepare(&format!(
            "SELECT {TASK_COLUMNS} FROM tasks t WHERE t.is_recurring = 1 AND t.year = ?1 AND t.week = ?2 ORDER BY t.id"
        ))?;
        stmt.query_map(rusqlite::params![from.year, from.week], Database::row_to_task)?
            .collect::<Result<Vec<_>, _>>()?
    };

    for task in &recurring {
        tx.execute(
            "INSERT INTO tasks (title, description, category_id, project_id, priority, status, progress,
                year, week, is_recurring, recurring_note, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, 'todo', 0, ?6, ?7, 1, ?8, ?9, ?9)",
            rusqlite::params![
                task.title,
                task.description,
                task.category_id,
                task.project_id,
                task.priority,
                to.year,
                to.week,
                task.recurring_note,
                now
            ],
        )?;
    }
    db.commit(tx)?;

    let result = RolloverResult {
        moved_count,
        created_count: recurring.len(),
        to,
    };
    tracing::info!(
        from = %from,
        to = %to,
        moved = result.moved_count,
        created = result.created_count,
        "rollover complete"
    );
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::tests::test_db;
    use crate::models::{NewTask, Status, TaskFilter};

    fn add(db: &Database, category: i64, title: &str, status: Status, week: Option<YearWeek>, recurring: bool) -> i64 {
        let mut input = NewTask::new(title);
        input.category_id = Some(category);
        input.status = Some(status);
        input.year_week = week;
        input.is_recurring = recurring;
        if recurring {
            input.recurring_note = Some("every monday".to_string());
        }
        db.create_task(&input).unwrap()
    }

    #[test]
    fn sweeps_older_unfinished_tasks_and_copies_recurring_ones() {
        let db = test_db();
        let c = db.create_category("Work", None).unwrap();
        let w5 = YearWeek::new(2025, 5);
        let w7 = YearWeek::new(2025, 7);
        let w8 = YearWeek::new(2025, 8);

        let old = add(&db, c, "old todo", Status::Todo, Some(YearWeek::new(2024, 50)), false);
        let doing = add(&db, c, "doing", Status::Doing, Some(w5), false);
        let done = add(&db, c, "done", Status::Done, Some(w7), false);
        let later = add(&db, c, "future", Status::Todo, Some(YearWeek::new(2025, 9)), false);
        let standup = add(&db, c, "standup", Status::Done, Some(w7), true);
        let no_week = add(&db, c, "someday", Status::Backlog, None, false);

        let preview = count_unfinished(&db, w7).unwrap();
        assert_eq!(preview, UnfinishedCount { normal_count: 2, recurring_count: 1, total_count: 3 });

        let result = rollover_unfinished(&db, w7, w8).unwrap();
        assert_eq!((result.moved_count, result.created_count), (2, 1));

        assert_eq!(db.get_task(old).unwrap().task.year_week, Some(w8));
        assert_eq!(db.get_task(doing).unwrap().task.year_week, Some(w8));
        assert_eq!(db.get_task(done).unwrap().task.year_week, Some(w7));
        assert_eq!(db.get_task(later).unwrap().task.year_week, Some(YearWeek::new(2025, 9)));
        assert_eq!(db.get_task(no_week).unwrap().task.year_week, None);

        let original = db.get_task(standup).unwrap().task;
        assert_eq!((original.status, original.year_week), (Status::Done, Some(w7)));

        let next = db.list_week_tasks(w8).unwrap();
        let copy = next.iter().find(|t| t.task.title == "standup").unwrap();
        assert_eq!(copy.task.status, Status::Todo);
        assert_eq!(copy.task.progress, 0);
        assert!(copy.task.is_recurring);
        assert_eq!(copy.task.recurring_note.as_deref(), Some("every monday"));
    }

    #[test]
    fn rolling_a_week_onto_itself_adds_one_copy_per_recurring_task() {
        let db = test_db();
        let c = db.create_category("Work", None).unwrap();
        let w7 = YearWeek::new(2025, 7);
        add(&db, c, "todo", Status::Todo, Some(w7), false);
        add(&db, c, "weekly sync", Status::Todo, Some(w7), true);
        add(&db, c, "weekly review", Status::Doing, Some(w7), true);

        let result = rollover_unfinished(&db, w7, w7).unwrap();
        assert_eq!(result.created_count, 2);
        assert_eq!(db.list_week_tasks(w7).unwrap().len(), 5);

        let recurring = db
            .list_tasks(&TaskFilter { year: Some(2025), week: Some(7), ..Default::default() })
            .unwrap()
            .into_iter()
            .filter(|t| t.task.title == "weekly sync")
            .count();
        assert_eq!(recurring, 2);
    }

    #[test]
    fn failed_copy_undoes_the_sweep() {
        let db = test_db();
        let c = db.create_category("Work", None).unwrap();
        let w6 = YearWeek::new(2025, 6);
        let w7 = YearWeek::new(2025, 7);
        let w8 = YearWeek::new(2025, 8);
        let older = add(&db, c, "older", Status::Todo, Some(w6), false);
        let current = add(&db, c, "current", Status::Doing, Some(w7), false);
        add(&db, c, "weekly sync", Status::Todo, Some(w7), true);

        db.conn()
            .execute_batch(
                "CREATE TRIGGER no_recurring_copies BEFORE INSERT ON tasks
                 WHEN NEW.is_recurring = 1
                 BEGIN SELECT RAISE(ABORT, 'copy refused'); END;",
            )
            .unwrap();

        assert!(rollover_unfinished(&db, w7, w8).is_err());
        assert_eq!(db.get_task(older).unwrap().task.year_week, Some(w6));
        assert_eq!(db.get_task(current).unwrap().task.year_week, Some(w7));
        assert!(db.list_week_tasks(w8).unwrap().is_empty());

        // The store is still usable once the blocker is gone
        db.conn().execute_batch("DROP TRIGGER no_recurring_copies").unwrap();
        let result = rollover_unfinished(&db, w7, w8).unwrap();
        assert_eq!((result.moved_count, result.created_count), (2, 1));
    }

    #[test]
    fn rejects_week_zero_without_writing() {
        let db = test_db();
        let c = db.create_category("Work", None).unwrap();
        add(&db, c, "todo", Status::Todo, Some(YearWeek::new(2025, 1)), false);
        let err = rollover_unfinished(&db, YearWeek::new(2025, 1), YearWeek::new(2025, 0)).unwrap_err();
        assert!(matches!(err, DatabaseError::Validation(_)));
        assert_eq!(db.list_week_tasks(YearWeek::new(2025, 1)).unwrap().len(), 1);
    }

    #[test]
    fn all_unfinished_counts_every_week() {
        let db = test_db();
        let c = db.create_category("Work", None).unwrap();
        add(&db, c, "a", Status::Todo, Some(YearWeek::new(2025, 1)), false);
        add(&db, c, "b", Status::Backlog, None, false);
        add(&db, c, "c", Status::Done, Some(YearWeek::new(2025, 2)), false);
        add(&db, c, "d", Status::Doing, Some(YearWeek::new(2026, 2)), true);
        assert_eq!(count_all_unfinished(&db).unwrap(), 3);
    }
}
