//! On-disk store and config tests: data survives reopening, legacy stores are
//! migrated on open, and workspaces persist through the config file.

use chrono::NaiveDate;
use rusqlite::Connection;
use wkr::config::Config;
use wkr::database::{Database, StoreOptions};
use wkr::models::{NewTask, Status, YearWeek};
use wkr::rollover::rollover_unfinished;
use wkr::week::FixedClock;

fn open_store(path: &std::path::Path) -> Database {
    Database::open(path, &StoreOptions::default())
        .unwrap()
        .with_clock(FixedClock::at(NaiveDate::from_ymd_opt(2025, 2, 12).unwrap()))
}

fn write_legacy_store(path: &std::path::Path) {
    let conn = Connection::open(path).unwrap();
    conn.execute_batch(
        "CREATE TABLE categories (id INTEGER PRIMARY KEY, name TEXT NOT NULL UNIQUE, description TEXT,
            created_at TEXT, updated_at TEXT);
         CREATE TABLE projects (id INTEGER PRIMARY KEY, name TEXT NOT NULL, description TEXT,
            category_id INTEGER NOT NULL, is_default INTEGER DEFAULT 0, created_at TEXT, updated_at TEXT);
         CREATE TABLE tasks (id INTEGER PRIMARY KEY AUTOINCREMENT, title TEXT NOT NULL, description TEXT,
            category_id INTEGER, project_id INTEGER NOT NULL, priority TEXT DEFAULT 'p2',
            status TEXT DEFAULT 'todo', progress INTEGER DEFAULT 0, week_number INTEGER,
            is_recurring INTEGER DEFAULT 0, recurring_note TEXT, created_at TEXT, updated_at TEXT);
         INSERT INTO categories (id, name) VALUES (1, 'Work');
         INSERT INTO projects (id, name, category_id, is_default) VALUES (1, '杂', 1, 1);
         INSERT INTO tasks (title, category_id, project_id, status, progress, week_number) VALUES
            ('plan', 1, 1, 'done', 100, 2),
            ('build', 1, 1, 'doing', 30, 5),
            ('ship', 1, 1, 'todo', 0, 5),
            ('someday', 1, 1, 'backlog', 0, NULL);",
    )
    .unwrap();
}

#[test]
fn tasks_survive_reopen() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("nested").join("wkr.db");

    // First session: the parent directory does not exist yet.
    let task_id = {
        let db = open_store(&path);
        let category = db.create_category("Work", Some("day job")).unwrap();
        let mut input = NewTask::new("Quarterly plan");
        input.category_id = Some(category);
        input.status = Some(Status::Doing);
        input.progress = Some(40);
        input.year_week = Some(YearWeek::new(2025, 7));
        db.create_task(&input).unwrap()
    };

    // Second session: every write was committed before returning.
    {
        let db = open_store(&path);
        let task = db.get_task(task_id).unwrap();
        assert_eq!(task.task.title, "Quarterly plan");
        assert_eq!(task.task.progress, 40);
        assert_eq!(task.category_name.as_deref(), Some("Work"));
        assert_eq!(task.project_name.as_deref(), Some("杂"));
        assert_eq!(db.counts().unwrap(), (1, 1, 1));
    }
}

#[test]
fn legacy_store_is_migrated_on_open() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("legacy.db");
    write_legacy_store(&path);

    {
        let db = Database::open(&path, &StoreOptions { legacy_default_year: 2023 }).unwrap();
        let tasks = db.list_tasks(&Default::default()).unwrap();
        assert_eq!(tasks.len(), 4);
        for task in &tasks {
            match task.task.title.as_str() {
                "plan" => assert_eq!(task.task.year_week, Some(YearWeek::new(2023, 2))),
                "build" | "ship" => assert_eq!(task.task.year_week, Some(YearWeek::new(2023, 5))),
                "someday" => assert_eq!(task.task.year_week, None),
                other => panic!("unexpected task {other}"),
            }
        }
        assert_eq!(db.list_week_tasks(YearWeek::new(2023, 5)).unwrap().len(), 2);
    }

    // Reopening with another year must not migrate again.
    {
        let db = Database::open(&path, &StoreOptions { legacy_default_year: 2030 }).unwrap();
        assert_eq!(db.list_week_tasks(YearWeek::new(2023, 5)).unwrap().len(), 2);
        assert!(db.list_week_tasks(YearWeek::new(2030, 5)).unwrap().is_empty());
    }

    // A weekless legacy task stays in the backlog across a later-year rollover.
    {
        let db = Database::open(&path, &StoreOptions::default()).unwrap();
        let result = rollover_unfinished(&db, YearWeek::new(2024, 1), YearWeek::new(2024, 2)).unwrap();
        assert_eq!(result.moved_count, 2);
        let tasks = db.list_tasks(&Default::default()).unwrap();
        let someday = tasks.iter().find(|t| t.task.title == "someday").unwrap();
        assert_eq!(someday.task.year_week, None);
    }
}

#[test]
fn workspaces_persist_through_the_config_file() {
    let dir = tempfile::TempDir::new().unwrap();
    let config_path = dir.path().join("config").join("config.toml");
    let data_dir = dir.path().join("data");

    // First run writes the defaults.
    {
        let mut config = Config::load_from(&config_path, &data_dir).unwrap();
        assert!(config_path.exists());
        assert_eq!(config.get_database_path().unwrap(), data_dir.join("wkr.db"));

        let path = config.add_workspace("personal", Some("Personal"), None).unwrap();
        Database::open(&path, &config.store_options()).unwrap();
        config.use_workspace("personal").unwrap();
        config.save_to(&config_path).unwrap();
    }

    {
        let mut config = Config::load_from(&config_path, &data_dir).unwrap();
        assert_eq!(config.current_workspace, "personal");
        let path = config.get_database_path().unwrap();
        assert!(path.exists());

        config.use_workspace("main").unwrap();
        let removed = config.remove_workspace("personal").unwrap();
        assert_eq!(removed, path);
        assert!(!path.exists());
        config.save_to(&config_path).unwrap();
    }

    let config = Config::load_from(&config_path, &data_dir).unwrap();
    assert_eq!(config.list_workspaces().len(), 1);
}
