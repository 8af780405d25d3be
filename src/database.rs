use rusqlite::{Connection, OptionalExtension, Transaction};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::migration;
use crate::models::{
    Category, CategorySummary, LogType, NewTask, Project, ProjectSummary, Status, Task,
    TaskFilter, TaskWithNames, WeeklyLog, YearWeek, clamp_progress, DEFAULT_PROJECT_DESCRIPTION,
    DEFAULT_PROJECT_NAME,
};
use crate::week::{Clock, SystemClock};

/// Year assigned to rows carried over from the pre-`year` schema
pub const DEFAULT_LEGACY_YEAR: i32 = 2025;

#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("SQLite error: {0}")]
    SqliteError(#[from] rusqlite::Error),
    #[error("Failed to create database directory: {0}")]
    DirectoryError(String),
    #[error("Validation failed: {0}")]
    Validation(String),
    #[error("{entity} not found (ID: {id})")]
    NotFound { entity: &'static str, id: i64 },
    #[error("Legacy schema migration failed and was rolled back: {0}")]
    Migration(#[source] rusqlite::Error),
}

impl DatabaseError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, DatabaseError::NotFound { .. })
    }
}

/// Options applied when a store is opened
#[derive(Debug, Clone)]
pub struct StoreOptions {
    pub legacy_default_year: i32,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            legacy_default_year: DEFAULT_LEGACY_YEAR,
        }
    }
}

/// `CREATE TABLE` statement for the task table under the given name
pub(crate) fn tasks_table_sql(table: &str) -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {table} (
            id              INTEGER PRIMARY KEY AUTOINCREMENT,
            title           TEXT NOT NULL,
            description     TEXT,
            category_id     INTEGER,
            project_id      INTEGER NOT NULL,
            priority        TEXT CHECK(priority IN ('p0', 'p1', 'p2')) DEFAULT 'p2',
            status          TEXT CHECK(status IN ('todo', 'doing', 'done', 'backlog')) DEFAULT 'todo',
            progress        INTEGER DEFAULT 0 CHECK(progress >= 0 AND progress <= 100),
            year            INTEGER,
            week            INTEGER,
            is_recurring    INTEGER DEFAULT 0,
            recurring_note  TEXT,
            created_at      TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at      TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
            FOREIGN KEY (category_id) REFERENCES categories(id) ON DELETE SET NULL,
            FOREIGN KEY (project_id) REFERENCES projects(id) ON DELETE CASCADE
        )"
    )
}

/// `CREATE TABLE` statement for the weekly log table under the given name
pub(crate) fn weekly_logs_table_sql(table: &str) -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {table} (
            id              INTEGER PRIMARY KEY AUTOINCREMENT,
            year            INTEGER NOT NULL,
            week            INTEGER NOT NULL,
            task_id         INTEGER,
            log_type        TEXT CHECK(log_type IN ('added', 'progress', 'done')) NOT NULL,
            content         TEXT,
            log_date        TEXT NOT NULL,
            created_at      TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
            FOREIGN KEY (task_id) REFERENCES tasks(id) ON DELETE CASCADE
        )"
    )
}

pub(crate) const TASK_INDEXES: &[&str] = &[
    "CREATE INDEX IF NOT EXISTS idx_tasks_category ON tasks(category_id)",
    "CREATE INDEX IF NOT EXISTS idx_tasks_project ON tasks(project_id)",
    "CREATE INDEX IF NOT EXISTS idx_tasks_year_week ON tasks(year, week)",
    "CREATE INDEX IF NOT EXISTS idx_tasks_year ON tasks(year)",
    "CREATE INDEX IF NOT EXISTS idx_tasks_status ON tasks(status)",
    "CREATE INDEX IF NOT EXISTS idx_tasks_recurring ON tasks(is_recurring)",
];

pub(crate) const WEEKLY_LOG_INDEXES: &[&str] = &[
    "CREATE INDEX IF NOT EXISTS idx_weekly_logs_year_week ON weekly_logs(year, week)",
];

/// Column list shared by every task query; the task table is always aliased `t`
pub(crate) const TASK_COLUMNS: &str = "t.id, t.title, t.description, t.category_id, t.project_id, t.priority, t.status, \
     t.progress, t.year, t.week, t.is_recurring, t.recurring_note, t.created_at, t.updated_at";

pub struct Database {
    conn: Connection,
    clock: Box<dyn Clock>,
}

impl Database {
    /// Open (or create) the store at `path`, migrating a legacy schema first
    pub fn open(path: &Path, options: &StoreOptions) -> Result<Self, DatabaseError> {
        let db_path = PathBuf::from(path);

        // Create parent directory if it doesn't exist
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| DatabaseError::DirectoryError(e.to_string()))?;
            }
        }

        let conn = Connection::open(&db_path)?;
        tracing::debug!(path = %db_path.display(), "opened store");
        Self::from_connection(conn, options, Box::new(SystemClock))
    }

    /// Open a throwaway store that lives only in memory
    pub fn open_in_memory() -> Result<Self, DatabaseError> {
        Self::from_connection(
            Connection::open_in_memory()?,
            &StoreOptions::default(),
            Box::new(SystemClock),
        )
    }

    fn from_connection(
        conn: Connection,
        options: &StoreOptions,
        clock: Box<dyn Clock>,
    ) -> Result<Self, DatabaseError> {
        // The table rebuild must not fire ON DELETE actions, so foreign keys
        // are switched on only once the schema is current.
        if let Some(summary) = migration::migrate_legacy_schema_if_needed(&conn, options.legacy_default_year)? {
            tracing::info!(
                total_tasks = summary.total_tasks,
                year_count = summary.year_count,
                min_year = ?summary.min_year,
                max_year = ?summary.max_year,
                "legacy schema migrated to year + week"
            );
        }
        conn.execute_batch("PRAGMA foreign_keys = ON")?;

        let db = Database { conn, clock };
        db.initialize_schema()?;
        Ok(db)
    }

    /// Replace the clock used for timestamps and "today"
    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    /// Initialize the database schema (tables and indexes)
    fn initialize_schema(&self) -> Result<(), DatabaseError> {
        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS categories (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                name            TEXT NOT NULL UNIQUE,
                description     TEXT,
                created_at      TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at      TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
            )",
            [],
        )?;

        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS projects (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                name            TEXT NOT NULL,
                description     TEXT,
                category_id     INTEGER NOT NULL,
                is_default      INTEGER DEFAULT 0,
                created_at      TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at      TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY (category_id) REFERENCES categories(id) ON DELETE CASCADE
            )",
            [],
        )?;

        self.conn.execute(&tasks_table_sql("tasks"), [])?;
        self.conn.execute(&weekly_logs_table_sql("weekly_logs"), [])?;

        self.conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_projects_category ON projects(category_id)",
            [],
        )?;
        // At most one default project per category
        self.conn.execute(
            "CREATE UNIQUE INDEX IF NOT EXISTS idx_projects_one_default
             ON projects(category_id) WHERE is_default = 1",
            [],
        )?;
        for sql in TASK_INDEXES.iter().chain(WEEKLY_LOG_INDEXES) {
            self.conn.execute(sql, [])?;
        }

        Ok(())
    }

    /// Get a reference to the underlying connection
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    pub fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    pub(crate) fn now(&self) -> String {
        self.clock.timestamp()
    }

    /// Start a unit of work; every mutation goes through one of these
    pub(crate) fn begin(&self) -> Result<Transaction<'_>, DatabaseError> {
        Ok(self.conn.unchecked_transaction()?)
    }

    /// Commit point for every mutation. The write is durable once this returns.
    pub(crate) fn commit(&self, tx: Transaction<'_>) -> Result<(), DatabaseError> {
        tx.commit()?;
        tracing::trace!("store committed");
        Ok(())
    }

    // ============ Categories ============

    fn row_to_category(row: &rusqlite::Row) -> Result<Category, rusqlite::Error> {
        Ok(Category {
            id: Some(row.get(0)?),
            name: row.get(1)?,
            description: row.get(2)?,
            created_at: row.get(3)?,
            updated_at: row.get(4)?,
        })
    }

    /// Create a category together with its default project; returns the category ID
    pub fn create_category(&self, name: &str, description: Option<&str>) -> Result<i64, DatabaseError> {
        let name = require_text("Category name", name)?;
        if self.find_category_by_name(name)?.is_some() {
            return Err(DatabaseError::Validation(format!("Category name already exists: {}", name)));
        }

        let now = self.now();
        let tx = self.begin()?;
        tx.execute(
            "INSERT INTO categories (name, description, created_at, updated_at) VALUES (?1, ?2, ?3, ?3)",
            rusqlite::params![name, description, now],
        )?;
        let category_id = tx.last_insert_rowid();
        tx.execute(
            "INSERT INTO projects (name, description, category_id, is_default, created_at, updated_at)
             VALUES (?1, ?2, ?3, 1, ?4, ?4)",
            rusqlite::params![DEFAULT_PROJECT_NAME, DEFAULT_PROJECT_DESCRIPTION, category_id, now],
        )?;
        self.commit(tx)?;

        tracing::debug!(category_id, name, "category created");
        Ok(category_id)
    }

    pub fn get_category(&self, id: i64) -> Result<Category, DatabaseError> {
        self.conn
            .query_row(
                "SELECT id, name, description, created_at, updated_at FROM categories WHERE id = ?1",
                rusqlite::params![id],
                Self::row_to_category,
            )
            .optional()?
            .ok_or(DatabaseError::NotFound { entity: "Category", id })
    }

    pub fn find_category_by_name(&self, name: &str) -> Result<Option<Category>, DatabaseError> {
        Ok(self
            .conn
            .query_row(
                "SELECT id, name, description, created_at, updated_at FROM categories WHERE name = ?1",
                rusqlite::params![name],
                Self::row_to_category,
            )
            .optional()?)
    }

    /// All categories ordered by name, with project/task/done counts
    pub fn list_categories(&self) -> Result<Vec<CategorySummary>, DatabaseError> {
        let mut stmt = self.conn.prepare(
            "SELECT c.id, c.name, c.description, c.created_at, c.updated_at,
                (SELECT COUNT(*) FROM projects p WHERE p.category_id = c.id),
                (SELECT COUNT(*) FROM tasks t WHERE t.category_id = c.id),
                (SELECT COUNT(*) FROM tasks t WHERE t.category_id = c.id AND t.status = 'done')
             FROM categories c
             ORDER BY c.name",
        )?;
        let categories = stmt
            .query_map([], |row| {
                Ok(CategorySummary {
                    category: Self::row_to_category(row)?,
                    project_count: row.get(5)?,
                    task_count: row.get(6)?,
                    done_count: row.get(7)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(categories)
    }

    pub fn update_category(&self, id: i64, name: &str, description: Option<&str>) -> Result<(), DatabaseError> {
        let name = require_text("Category name", name)?;
        self.get_category(id)?;
        if let Some(existing) = self.find_category_by_name(name)? {
            if existing.id != Some(id) {
                return Err(DatabaseError::Validation(format!("Category name already exists: {}", name)));
            }
        }

        let tx = self.begin()?;
        tx.execute(
            "UPDATE categories SET name = ?1, description = ?2, updated_at = ?3 WHERE id = ?4",
            rusqlite::params![name, description, self.now(), id],
        )?;
        self.commit(tx)
    }

    /// Delete a category. Its projects (and their tasks) go with it.
    pub fn delete_category(&self, id: i64) -> Result<(), DatabaseError> {
        self.get_category(id)?;
        let tx = self.begin()?;
        tx.execute("DELETE FROM categories WHERE id = ?1", rusqlite::params![id])?;
        self.commit(tx)
    }

    // ============ Projects ============

    fn row_to_project(row: &rusqlite::Row) -> Result<Project, rusqlite::Error> {
        Ok(Project {
            id: Some(row.get(0)?),
            name: row.get(1)?,
            description: row.get(2)?,
            category_id: row.get(3)?,
            is_default: row.get::<_, i64>(4)? != 0,
            created_at: row.get(5)?,
            updated_at: row.get(6)?,
        })
    }

    /// Create a regular (non-default) project under a category
    pub fn create_project(&self, category_id: i64, name: &str, description: Option<&str>) -> Result<i64, DatabaseError> {
        let name = require_text("Project name", name)?;
        self.require_category(category_id)?;

        let now = self.now();
        let tx = self.begin()?;
        tx.execute(
            "INSERT INTO projects (name, description, category_id, is_default, created_at, updated_at)
             VALUES (?1, ?2, ?3, 0, ?4, ?4)",
            rusqlite::params![name, description, category_id, now],
        )?;
        let id = tx.last_insert_rowid();
        self.commit(tx)?;
        Ok(id)
    }

    pub fn get_project(&self, id: i64) -> Result<Project, DatabaseError> {
        self.conn
            .query_row(
                "SELECT id, name, description, category_id, is_default, created_at, updated_at
                 FROM projects WHERE id = ?1",
                rusqlite::params![id],
                Self::row_to_project,
            )
            .optional()?
            .ok_or(DatabaseError::NotFound { entity: "Project", id })
    }

    /// The category's default project, if the category exists
    pub fn get_default_project(&self, category_id: i64) -> Result<Option<Project>, DatabaseError> {
        Ok(self
            .conn
            .query_row(
                "SELECT id, name, description, category_id, is_default, created_at, updated_at
                 FROM projects WHERE category_id = ?1 AND is_default = 1",
                rusqlite::params![category_id],
                Self::row_to_project,
            )
            .optional()?)
    }

    fn query_project_summaries(&self, sql: &str, params: &[&dyn rusqlite::ToSql]) -> Result<Vec<ProjectSummary>, DatabaseError> {
        let mut stmt = self.conn.prepare(sql)?;
        let projects = stmt
            .query_map(params, |row| {
                Ok(ProjectSummary {
                    project: Self::row_to_project(row)?,
                    category_name: row.get(7)?,
                    task_count: row.get(8)?,
                    done_count: row.get(9)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(projects)
    }

    /// Projects of one category: default project first, then by creation time
    pub fn list_projects(&self, category_id: i64) -> Result<Vec<ProjectSummary>, DatabaseError> {
        self.query_project_summaries(
            "SELECT p.id, p.name, p.description, p.category_id, p.is_default, p.created_at, p.updated_at,
                c.name,
                (SELECT COUNT(*) FROM tasks t WHERE t.project_id = p.id),
                (SELECT COUNT(*) FROM tasks t WHERE t.project_id = p.id AND t.status = 'done')
             FROM projects p
             LEFT JOIN categories c ON p.category_id = c.id
             WHERE p.category_id = ?1
             ORDER BY p.is_default DESC, p.created_at, p.id",
            &[&category_id],
        )
    }

    /// Every project, grouped by category name
    pub fn list_all_projects(&self) -> Result<Vec<ProjectSummary>, DatabaseError> {
        self.query_project_summaries(
            "SELECT p.id, p.name, p.description, p.category_id, p.is_default, p.created_at, p.updated_at,
                c.name,
                (SELECT COUNT(*) FROM tasks t WHERE t.project_id = p.id),
                (SELECT COUNT(*) FROM tasks t WHERE t.project_id = p.id AND t.status = 'done')
             FROM projects p
             LEFT JOIN categories c ON p.category_id = c.id
             ORDER BY c.name, p.is_default DESC, p.created_at, p.id",
            &[],
        )
    }

    pub fn update_project(&self, id: i64, name: &str, description: Option<&str>) -> Result<(), DatabaseError> {
        let name = require_text("Project name", name)?;
        self.get_project(id)?;
        let tx = self.begin()?;
        tx.execute(
            "UPDATE projects SET name = ?1, description = ?2, updated_at = ?3 WHERE id = ?4",
            rusqlite::params![name, description, self.now(), id],
        )?;
        self.commit(tx)
    }

    /// Delete a non-default project, moving its tasks to the category's default project.
    /// Returns the number of tasks that were re-parented.
    pub fn delete_project(&self, id: i64) -> Result<usize, DatabaseError> {
        let project = self.get_project(id)?;
        if project.is_default {
            return Err(DatabaseError::Validation("Cannot delete default project".to_string()));
        }

        let tx = self.begin()?;
        let default_id: Option<i64> = tx
            .query_row(
                "SELECT id FROM projects WHERE category_id = ?1 AND is_default = 1",
                rusqlite::params![project.category_id],
                |row| row.get(0),
            )
            .optional()?;

        let moved = match default_id {
            Some(default_id) => tx.execute(
                "UPDATE tasks SET project_id = ?1, updated_at = ?2 WHERE project_id = ?3",
                rusqlite::params![default_id, self.now(), id],
            )?,
            None => {
                tracing::warn!(category_id = project.category_id, "category has no default project; tasks are deleted with the project");
                0
            }
        };
        tx.execute("DELETE FROM projects WHERE id = ?1", rusqlite::params![id])?;
        self.commit(tx)?;

        tracing::debug!(project_id = id, moved, "project deleted");
        Ok(moved)
    }

    // ============ Tasks ============

    /// Map a row selected with `TASK_COLUMNS` to a Task
    pub(crate) fn row_to_task(row: &rusqlite::Row) -> Result<Task, rusqlite::Error> {
        let year: Option<i32> = row.get(8)?;
        let week: Option<u32> = row.get(9)?;
        Ok(Task {
            id: Some(row.get(0)?),
            title: row.get(1)?,
            description: row.get(2)?,
            category_id: row.get(3)?,
            project_id: row.get(4)?,
            priority: row.get(5)?,
            status: row.get(6)?,
            progress: clamp_progress(row.get(7)?),
            year_week: year.zip(week).map(|(year, week)| YearWeek::new(year, week)),
            is_recurring: row.get::<_, Option<i64>>(10)?.unwrap_or(0) != 0,
            recurring_note: row.get(11)?,
            created_at: row.get(12)?,
            updated_at: row.get(13)?,
        })
    }

    /// Map a row selected with `TASK_COLUMNS, c.name, p.name`
    fn row_to_task_with_names(row: &rusqlite::Row) -> Result<TaskWithNames, rusqlite::Error> {
        Ok(TaskWithNames {
            task: Self::row_to_task(row)?,
            category_name: row.get(14)?,
            project_name: row.get(15)?,
        })
    }

    /// Resolve and check the fields of a task before it is written
    fn validate_task(&self, input: &NewTask) -> Result<ValidTask, DatabaseError> {
        let title = require_text("Task title", &input.title)?.to_string();

        if let Some(yw) = input.year_week {
            if yw.week == 0 || yw.year <= 0 {
                return Err(DatabaseError::Validation(format!(
                    "Invalid year/week: {}/{}", yw.year, yw.week
                )));
            }
        }

        if let Some(category_id) = input.category_id {
            self.require_category(category_id)?;
        }

        let project = match input.project_id {
            Some(project_id) => match self.get_project(project_id) {
                Ok(project) => project,
                Err(DatabaseError::NotFound { .. }) => {
                    return Err(DatabaseError::Validation(format!("Project does not exist: {}", project_id)));
                }
                Err(e) => return Err(e),
            },
            None => {
                let category_id = input.category_id.ok_or_else(|| {
                    DatabaseError::Validation("project_id is required or category must have a default project".to_string())
                })?;
                self.get_default_project(category_id)?.ok_or_else(|| {
                    DatabaseError::Validation("project_id is required or category must have a default project".to_string())
                })?
            }
        };

        if let Some(category_id) = input.category_id {
            if category_id != project.category_id {
                return Err(DatabaseError::Validation(format!(
                    "Project {} does not belong to category {}",
                    project.id.unwrap_or_default(),
                    category_id
                )));
            }
        }

        Ok(ValidTask {
            title,
            category_id: Some(project.category_id),
            project_id: project.id.unwrap_or_default(),
            progress: clamp_progress(input.progress.unwrap_or(0)),
        })
    }

    /// Insert a task and return its ID
    pub fn create_task(&self, input: &NewTask) -> Result<i64, DatabaseError> {
        let valid = self.validate_task(input)?;
        let now = self.now();
        let (year, week) = split_year_week(input.year_week);

        let tx = self.begin()?;
        tx.execute(
            "INSERT INTO tasks (title, description, category_id, project_id, priority, status, progress,
                year, week, is_recurring, recurring_note, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?12)",
            rusqlite::params![
                valid.title,
                input.description,
                valid.category_id,
                valid.project_id,
                input.priority.unwrap_or_default(),
                input.status.unwrap_or_default(),
                valid.progress,
                year,
                week,
                input.is_recurring as i64,
                input.recurring_note,
                now
            ],
        )?;
        let id = tx.last_insert_rowid();
        self.commit(tx)?;
        Ok(id)
    }

    /// Get a single task (with category and project names) by ID
    pub fn get_task(&self, id: i64) -> Result<TaskWithNames, DatabaseError> {
        let sql = format!(
            "SELECT {TASK_COLUMNS}, c.name, p.name
             FROM tasks t
             LEFT JOIN categories c ON t.category_id = c.id
             LEFT JOIN projects p ON t.project_id = p.id
             WHERE t.id = ?1"
        );
        self.conn
            .query_row(&sql, rusqlite::params![id], Self::row_to_task_with_names)
            .optional()?
            .ok_or(DatabaseError::NotFound { entity: "Task", id })
    }

    /// Replace every editable field of a task
    pub fn update_task(&self, id: i64, input: &NewTask) -> Result<(), DatabaseError> {
        let current = self.get_task(id)?.task;
        let valid = self.validate_task(input)?;
        let (year, week) = split_year_week(input.year_week);

        let tx = self.begin()?;
        tx.execute(
            "UPDATE tasks SET title = ?1, description = ?2, category_id = ?3, project_id = ?4, priority = ?5,
                status = ?6, progress = ?7, year = ?8, week = ?9, is_recurring = ?10, recurring_note = ?11,
                updated_at = ?12
             WHERE id = ?13",
            rusqlite::params![
                valid.title,
                input.description,
                valid.category_id,
                valid.project_id,
                input.priority.unwrap_or(current.priority),
                input.status.unwrap_or(current.status),
                valid.progress,
                year,
                week,
                input.is_recurring as i64,
                input.recurring_note,
                self.now(),
                id
            ],
        )?;
        self.commit(tx)
    }

    /// Change only the status (and optionally the progress) of a task
    pub fn set_task_status(&self, id: i64, status: Status, progress: Option<i64>) -> Result<(), DatabaseError> {
        let current = self.get_task(id)?.task;
        let progress = progress.map(clamp_progress).unwrap_or(current.progress);
        let tx = self.begin()?;
        tx.execute(
            "UPDATE tasks SET status = ?1, progress = ?2, updated_at = ?3 WHERE id = ?4",
            rusqlite::params![status, progress, self.now(), id],
        )?;
        self.commit(tx)
    }

    pub fn delete_task(&self, id: i64) -> Result<(), DatabaseError> {
        self.get_task(id)?;
        let tx = self.begin()?;
        tx.execute("DELETE FROM tasks WHERE id = ?1", rusqlite::params![id])?;
        self.commit(tx)
    }

    /// Tasks matching every set field of `filter`, by priority then newest first
    pub fn list_tasks(&self, filter: &TaskFilter) -> Result<Vec<TaskWithNames>, DatabaseError> {
        let mut sql = format!(
            "SELECT {TASK_COLUMNS}, c.name, p.name
             FROM tasks t
             LEFT JOIN categories c ON t.category_id = c.id
             LEFT JOIN projects p ON t.project_id = p.id
             WHERE 1=1"
        );
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(category_id) = filter.category_id {
            params.push(Box::new(category_id));
            sql.push_str(&format!(" AND t.category_id = ?{}", params.len()));
        }
        if let Some(project_id) = filter.project_id {
            params.push(Box::new(project_id));
            sql.push_str(&format!(" AND t.project_id = ?{}", params.len()));
        }
        if let Some(year) = filter.year {
            params.push(Box::new(year));
            sql.push_str(&format!(" AND t.year = ?{}", params.len()));
        }
        if let Some(week) = filter.week {
            params.push(Box::new(week));
            sql.push_str(&format!(" AND t.week = ?{}", params.len()));
        }
        if let Some(status) = filter.status {
            params.push(Box::new(status));
            sql.push_str(&format!(" AND t.status = ?{}", params.len()));
        }
        sql.push_str(" ORDER BY t.priority, t.created_at DESC, t.id DESC");

        let mut stmt = self.conn.prepare(&sql)?;
        let tasks = stmt
            .query_map(rusqlite::params_from_iter(params.iter()), Self::row_to_task_with_names)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(tasks)
    }

    /// Tasks filed under one week, most urgent first
    pub fn list_week_tasks(&self, week: YearWeek) -> Result<Vec<TaskWithNames>, DatabaseError> {
        self.list_tasks(&TaskFilter {
            year: Some(week.year),
            week: Some(week.week),
            ..Default::default()
        })
    }

    // ============ Weekly logs ============

    /// Append a weekly log entry; `log_date` defaults to today
    pub fn add_weekly_log(
        &self,
        week: YearWeek,
        task_id: Option<i64>,
        log_type: LogType,
        content: Option<&str>,
        log_date: Option<&str>,
    ) -> Result<i64, DatabaseError> {
        if let Some(task_id) = task_id {
            if let Err(e) = self.get_task(task_id) {
                return Err(match e {
                    DatabaseError::NotFound { .. } => {
                        DatabaseError::Validation(format!("Task does not exist: {}", task_id))
                    }
                    other => other,
                });
            }
        }
        let log_date = match log_date {
            Some(date) => crate::utils::parse_date(date)
                .map_err(|e| DatabaseError::Validation(format!("Invalid log date '{}': {}", date, e)))?
                .format("%Y-%m-%d")
                .to_string(),
            None => self.clock.today().format("%Y-%m-%d").to_string(),
        };

        let tx = self.begin()?;
        tx.execute(
            "INSERT INTO weekly_logs (year, week, task_id, log_type, content, log_date, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            rusqlite::params![week.year, week.week, task_id, log_type, content, log_date, self.now()],
        )?;
        let id = tx.last_insert_rowid();
        self.commit(tx)?;
        Ok(id)
    }

    pub fn list_weekly_logs(&self, week: YearWeek) -> Result<Vec<WeeklyLog>, DatabaseError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, year, week, task_id, log_type, content, log_date, created_at
             FROM weekly_logs WHERE year = ?1 AND week = ?2
             ORDER BY log_date, id",
        )?;
        let logs = stmt
            .query_map(rusqlite::params![week.year, week.week], |row| {
                Ok(WeeklyLog {
                    id: Some(row.get(0)?),
                    year_week: YearWeek::new(row.get(1)?, row.get(2)?),
                    task_id: row.get(3)?,
                    log_type: row.get(4)?,
                    content: row.get(5)?,
                    log_date: row.get(6)?,
                    created_at: row.get(7)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(logs)
    }

    // ============ Store statistics ============

    /// (categories, projects, tasks) row counts
    pub fn counts(&self) -> Result<(i64, i64, i64), DatabaseError> {
        Ok(self.conn.query_row(
            "SELECT
                (SELECT COUNT(*) FROM categories),
                (SELECT COUNT(*) FROM projects),
                (SELECT COUNT(*) FROM tasks)",
            [],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )?)
    }

    fn require_category(&self, id: i64) -> Result<(), DatabaseError> {
        match self.get_category(id) {
            Ok(_) => Ok(()),
            Err(DatabaseError::NotFound { .. }) => {
                Err(DatabaseError::Validation(format!("Category does not exist: {}", id)))
            }
            Err(e) => Err(e),
        }
    }
}

struct ValidTask {
    title: String,
    category_id: Option<i64>,
    project_id: i64,
    progress: u8,
}

fn require_text<'a>(field: &str, value: &'a str) -> Result<&'a str, DatabaseError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(DatabaseError::Validation(format!("{} must not be empty", field)));
    }
    Ok(trimmed)
}

fn split_year_week(year_week: Option<YearWeek>) -> (Option<i32>, Option<u32>) {
    match year_week {
        Some(yw) => (Some(yw.year), Some(yw.week)),
        None => (None, None),
    }
}
