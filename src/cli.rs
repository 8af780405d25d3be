use clap::{Args, Parser, Subcommand};
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::config::{Config, ConfigError};
use crate::database::{Database, DatabaseError};
use crate::models::{LogType, NewTask, Priority, Status, TaskFilter, TaskWithNames, YearWeek};
use crate::report::{build_weekly_report, render_report_markdown};
use crate::rollover::{count_all_unfinished, count_unfinished, rollover_unfinished};
use crate::week::{compute_current_week, compute_default_week, next_week, report_week_options, week_start};

#[derive(Parser)]
#[command(name = "wkr")]
#[command(about = "Weekly task tracker - categories, projects, week-bucketed tasks and weekly reports")]
#[command(version)]
pub struct Cli {
    /// Custom config file path
    #[arg(short, long)]
    pub config: Option<String>,

    /// Use development mode (uses separate dev config/database)
    #[arg(long)]
    pub dev: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Launch interactive TUI (default if no subcommand)
    Tui,
    /// Show the current week and the week new tasks default to
    Week,
    /// Manage categories
    #[command(subcommand)]
    Category(CategoryCommand),
    /// Manage projects
    #[command(subcommand)]
    Project(ProjectCommand),
    /// Manage tasks
    #[command(subcommand)]
    Task(TaskCommand),
    /// Append to or read the weekly log
    #[command(subcommand)]
    Log(LogCommand),
    /// Move unfinished tasks forward and copy recurring ones
    Rollover {
        /// Source week, e.g. 2025-W07 (default: current week)
        #[arg(long)]
        from: Option<YearWeek>,
        /// Target week (default: the week after --from)
        #[arg(long)]
        to: Option<YearWeek>,
        /// Only print what would change
        #[arg(long)]
        dry_run: bool,
        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
    /// Generate the weekly report
    Report {
        /// Report year (default: current year)
        #[arg(long)]
        year: Option<i32>,
        /// Report week (default: current week)
        #[arg(long)]
        week: Option<u32>,
        /// Print the report data as JSON instead of Markdown
        #[arg(long)]
        json: bool,
        /// Copy the Markdown to the clipboard
        #[arg(long)]
        copy: bool,
        /// Write the output to a file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Manage workspaces (separate store files)
    #[command(subcommand)]
    Workspace(WorkspaceCommand),
}

#[derive(Subcommand)]
pub enum CategoryCommand {
    /// Create a category (its default project is created with it)
    Add {
        name: String,
        #[arg(short, long)]
        description: Option<String>,
    },
    /// List categories with project and task counts
    List,
    /// Rename a category
    Rename {
        /// Category ID or name
        category: String,
        name: String,
        #[arg(short, long)]
        description: Option<String>,
    },
    /// Delete a category with its projects and tasks
    Rm {
        /// Category ID or name
        category: String,
    },
}

#[derive(Subcommand)]
pub enum ProjectCommand {
    /// Create a project under a category
    Add {
        /// Category ID or name
        category: String,
        name: String,
        #[arg(short, long)]
        description: Option<String>,
    },
    /// List projects, optionally of one category
    List {
        /// Category ID or name
        #[arg(long)]
        category: Option<String>,
    },
    /// Rename a project
    Rename {
        id: i64,
        name: String,
        #[arg(short, long)]
        description: Option<String>,
    },
    /// Delete a project; its tasks move to the category's default project
    Rm { id: i64 },
}

#[derive(Args)]
pub struct TaskFields {
    /// Category ID or name
    #[arg(long)]
    pub category: Option<String>,
    /// Project ID
    #[arg(long)]
    pub project: Option<i64>,
    /// p0, p1 or p2
    #[arg(long)]
    pub priority: Option<Priority>,
    /// todo, doing, done or backlog
    #[arg(long)]
    pub status: Option<Status>,
    /// 0-100, clamped
    #[arg(long)]
    pub progress: Option<i64>,
    /// Week bucket, e.g. 2025-W07
    #[arg(long, conflicts_with = "no_week")]
    pub week: Option<YearWeek>,
    /// File the task without a week
    #[arg(long)]
    pub no_week: bool,
    #[arg(short, long)]
    pub description: Option<String>,
    /// Recurring note; marks the task as recurring
    #[arg(long)]
    pub recurring: Option<String>,
}

#[derive(Subcommand)]
pub enum TaskCommand {
    /// Create a task (week defaults to this week, or next week from Friday on)
    Add {
        title: String,
        #[command(flatten)]
        fields: TaskFields,
    },
    /// List tasks
    List {
        /// Category ID or name
        #[arg(long)]
        category: Option<String>,
        #[arg(long)]
        project: Option<i64>,
        #[arg(long)]
        week: Option<YearWeek>,
        #[arg(long)]
        status: Option<Status>,
        #[arg(long)]
        json: bool,
    },
    /// Show one task
    Show { id: i64 },
    /// Change fields of a task
    Update {
        id: i64,
        #[arg(long)]
        title: Option<String>,
        #[command(flatten)]
        fields: TaskFields,
    },
    /// Mark a task done at 100%
    Done { id: i64 },
    /// Delete a task
    Rm { id: i64 },
}

#[derive(Subcommand)]
pub enum LogCommand {
    /// Append a log entry
    Add {
        /// added, progress or done
        #[arg(long = "type")]
        log_type: LogType,
        content: Option<String>,
        #[arg(long)]
        task: Option<i64>,
        /// Week (default: current week)
        #[arg(long)]
        week: Option<YearWeek>,
        /// YYYY-MM-DD (default: today)
        #[arg(long)]
        date: Option<String>,
    },
    /// List the log of a week
    List {
        #[arg(long)]
        week: Option<YearWeek>,
    },
}

#[derive(Subcommand)]
pub enum WorkspaceCommand {
    /// List workspaces with their row counts
    List,
    /// Create a workspace and switch to it
    Add {
        name: String,
        #[arg(long)]
        display_name: Option<String>,
        #[arg(short, long)]
        description: Option<String>,
    },
    /// Switch to a workspace
    Use { name: String },
    /// Change a workspace's display name and description
    Rename {
        name: String,
        display_name: String,
        #[arg(short, long)]
        description: Option<String>,
    },
    /// Remove a workspace and delete its store file
    Rm {
        name: String,
        #[arg(short, long)]
        yes: bool,
    },
}

#[derive(Debug, Error)]
pub enum CliError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] DatabaseError),
    #[error("Config error: {0}")]
    ConfigError(#[from] ConfigError),
    #[error("Unknown category: {0}")]
    UnknownCategory(String),
    #[error("Failed to parse date: {0}")]
    DateParseError(String),
    #[error("IO error: {0}")]
    IoError(#[from] io::Error),
    #[error("Failed to serialize JSON: {0}")]
    JsonError(#[from] serde_json::Error),
    #[error("Clipboard error: {0}")]
    ClipboardError(String),
}

/// Accept either a numeric ID or an exact category name
fn resolve_category(db: &Database, category: &str) -> Result<i64, CliError> {
    if let Ok(id) = category.trim().parse::<i64>() {
        return Ok(db.get_category(id)?.id.unwrap_or(id));
    }
    db.find_category_by_name(category.trim())?
        .and_then(|c| c.id)
        .ok_or_else(|| CliError::UnknownCategory(category.to_string()))
}

/// Ask a yes/no question on stdin; anything but "y"/"yes" is a no
fn confirm(prompt: &str) -> Result<bool, CliError> {
    print!("{} [y/N] ", prompt);
    io::stdout().flush()?;
    let mut answer = String::new();
    io::stdin().lock().read_line(&mut answer)?;
    Ok(matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes"))
}

fn status_glyph(status: Status) -> &'static str {
    match status {
        Status::Todo => "○",
        Status::Doing => "◐",
        Status::Done => "✓",
        Status::Backlog => "…",
    }
}

/// One-line summary of a task for listings
pub fn format_task_line(task: &TaskWithNames) -> String {
    let t = &task.task;
    let mut line = format!(
        "#{:<4} {} [{}] {}",
        t.id.unwrap_or_default(),
        status_glyph(t.status),
        t.priority,
        t.title
    );
    if t.status == Status::Doing || (t.progress > 0 && t.progress < 100) {
        line.push_str(&format!(" [{}%]", t.progress));
    }
    let category = task.category_name.as_deref().unwrap_or("-");
    let project = task.project_name.as_deref().unwrap_or("-");
    line.push_str(&format!("  ({}/{})", category, project));
    match t.year_week {
        Some(yw) => line.push_str(&format!("  {}", yw)),
        None => line.push_str("  no week"),
    }
    if t.is_recurring {
        line.push_str("  ↻");
    }
    line
}

pub fn handle_week(db: &Database, config: &Config) -> Result<(), CliError> {
    let today = db.clock().today();
    let current = compute_current_week(today);
    let default = compute_default_week(today);
    let monday = week_start(current)
        .map(|d| d.format("%Y-%m-%d").to_string())
        .unwrap_or_default();
    println!("Today:         {}", today.format("%Y-%m-%d %A"));
    println!("Current week:  {} ({}, starts {})", current, current.label(), monday);
    println!("Default week:  {} ({})", default, default.label());
    println!("Unfinished:    {}", count_all_unfinished(db)?);

    let recent: Vec<String> = report_week_options(today, config.report.history_weeks)
        .iter()
        .map(YearWeek::label)
        .collect();
    println!("Report weeks:  {}", recent.join(", "));
    Ok(())
}

pub fn handle_category(command: CategoryCommand, db: &Database) -> Result<(), CliError> {
    match command {
        CategoryCommand::Add { name, description } => {
            let id = db.create_category(&name, description.as_deref())?;
            println!("Category created successfully (ID: {})", id);
        }
        CategoryCommand::List => {
            let categories = db.list_categories()?;
            if categories.is_empty() {
                println!("No categories yet. Create one with `wkr category add <name>`.");
            }
            for summary in categories {
                println!(
                    "#{:<4} {}  projects: {}  tasks: {} ({} done){}",
                    summary.category.id.unwrap_or_default(),
                    summary.category.name,
                    summary.project_count,
                    summary.task_count,
                    summary.done_count,
                    summary
                        .category
                        .description
                        .map(|d| format!("  - {}", d))
                        .unwrap_or_default()
                );
            }
        }
        CategoryCommand::Rename { category, name, description } => {
            let id = resolve_category(db, &category)?;
            let description = match description {
                Some(d) => Some(d),
                None => db.get_category(id)?.description,
            };
            db.update_category(id, &name, description.as_deref())?;
            println!("Category {} renamed to {}", id, name);
        }
        CategoryCommand::Rm { category } => {
            let id = resolve_category(db, &category)?;
            db.delete_category(id)?;
            println!("Category {} deleted", id);
        }
    }
    Ok(())
}

pub fn handle_project(command: ProjectCommand, db: &Database) -> Result<(), CliError> {
    match command {
        ProjectCommand::Add { category, name, description } => {
            let category_id = resolve_category(db, &category)?;
            let id = db.create_project(category_id, &name, description.as_deref())?;
            println!("Project created successfully (ID: {})", id);
        }
        ProjectCommand::List { category } => {
            let projects = match category {
                Some(category) => db.list_projects(resolve_category(db, &category)?)?,
                None => db.list_all_projects()?,
            };
            for summary in projects {
                let project = &summary.project;
                println!(
                    "#{:<4} {}/{}{}  tasks: {} ({} done)",
                    project.id.unwrap_or_default(),
                    summary.category_name.as_deref().unwrap_or("-"),
                    project.name,
                    if project.is_default { " (default)" } else { "" },
                    summary.task_count,
                    summary.done_count
                );
            }
        }
        ProjectCommand::Rename { id, name, description } => {
            let description = match description {
                Some(d) => Some(d),
                None => db.get_project(id)?.description,
            };
            db.update_project(id, &name, description.as_deref())?;
            println!("Project {} renamed to {}", id, name);
        }
        ProjectCommand::Rm { id } => {
            let moved = db.delete_project(id)?;
            println!("Project {} deleted ({} task(s) moved to the default project)", id, moved);
        }
    }
    Ok(())
}

/// Apply the optional task fields given on the command line onto `input`
fn apply_fields(input: &mut NewTask, fields: TaskFields, db: &Database) -> Result<(), CliError> {
    let category_given = fields.category.is_some();
    if let Some(category) = fields.category {
        input.category_id = Some(resolve_category(db, &category)?);
        if fields.project.is_none() {
            // The old project belongs to the old category
            input.project_id = None;
        }
    }
    if let Some(project) = fields.project {
        input.project_id = Some(project);
        if !category_given {
            // Taken from the project instead
            input.category_id = None;
        }
    }
    if let Some(priority) = fields.priority {
        input.priority = Some(priority);
    }
    if let Some(status) = fields.status {
        input.status = Some(status);
    }
    if let Some(progress) = fields.progress {
        input.progress = Some(progress);
    }
    if fields.no_week {
        input.year_week = None;
    } else if let Some(week) = fields.week {
        input.year_week = Some(week);
    }
    if let Some(description) = fields.description {
        input.description = Some(description);
    }
    if let Some(note) = fields.recurring {
        input.is_recurring = true;
        input.recurring_note = Some(note);
    }
    Ok(())
}

pub fn handle_task(command: TaskCommand, db: &Database) -> Result<(), CliError> {
    match command {
        TaskCommand::Add { title, fields } => {
            let mut input = NewTask::new(title);
            input.year_week = Some(compute_default_week(db.clock().today()));
            apply_fields(&mut input, fields, db)?;
            let id = db.create_task(&input)?;
            println!("Task created successfully (ID: {})", id);
        }
        TaskCommand::List { category, project, week, status, json } => {
            let filter = TaskFilter {
                category_id: category.map(|c| resolve_category(db, &c)).transpose()?,
                project_id: project,
                year: week.map(|w| w.year),
                week: week.map(|w| w.week),
                status,
            };
            let tasks = db.list_tasks(&filter)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&tasks)?);
            } else if tasks.is_empty() {
                println!("No tasks match.");
            } else {
                for task in &tasks {
                    println!("{}", format_task_line(task));
                }
            }
        }
        TaskCommand::Show { id } => {
            let task = db.get_task(id)?;
            println!("{}", format_task_line(&task));
            if let Some(description) = task.task.description.as_deref() {
                println!("\n{}", description);
            }
            if let Some(note) = task.task.recurring_note.as_deref() {
                println!("\nRecurring: {}", note);
            }
            println!("\ncreated {}  updated {}", task.task.created_at, task.task.updated_at);
        }
        TaskCommand::Update { id, title, fields } => {
            let current = db.get_task(id)?.task;
            let mut input = NewTask::from(&current);
            if let Some(title) = title {
                input.title = title;
            }
            apply_fields(&mut input, fields, db)?;
            db.update_task(id, &input)?;
            println!("Task {} updated", id);
        }
        TaskCommand::Done { id } => {
            db.set_task_status(id, Status::Done, Some(100))?;
            println!("Task {} done", id);
        }
        TaskCommand::Rm { id } => {
            db.delete_task(id)?;
            println!("Task {} deleted", id);
        }
    }
    Ok(())
}

pub fn handle_log(command: LogCommand, db: &Database) -> Result<(), CliError> {
    let current = compute_current_week(db.clock().today());
    match command {
        LogCommand::Add { log_type, content, task, week, date } => {
            if let Some(date) = date.as_deref() {
                crate::utils::parse_date(date)
                    .map_err(|e| CliError::DateParseError(format!("Invalid date format '{}': {}", date, e)))?;
            }
            let id = db.add_weekly_log(
                week.unwrap_or(current),
                task,
                log_type,
                content.as_deref(),
                date.as_deref(),
            )?;
            println!("Log entry created successfully (ID: {})", id);
        }
        LogCommand::List { week } => {
            let week = week.unwrap_or(current);
            for log in db.list_weekly_logs(week)? {
                println!(
                    "{}  {:<8} {}{}",
                    log.log_date,
                    log.log_type,
                    log.task_id.map(|id| format!("#{} ", id)).unwrap_or_default(),
                    log.content.unwrap_or_default()
                );
            }
        }
    }
    Ok(())
}

pub fn handle_rollover(
    from: Option<YearWeek>,
    to: Option<YearWeek>,
    dry_run: bool,
    yes: bool,
    db: &Database,
) -> Result<(), CliError> {
    let from = from.unwrap_or_else(|| compute_current_week(db.clock().today()));
    let to = to.unwrap_or_else(|| next_week(from));
    let preview = count_unfinished(db, from)?;
    println!(
        "From {} to {}: {} unfinished task(s) to move, {} recurring task(s) to copy",
        from, to, preview.normal_count, preview.recurring_count
    );

    if dry_run || preview.total_count == 0 {
        return Ok(());
    }
    if !yes && !confirm("Proceed?")? {
        println!("Cancelled");
        return Ok(());
    }

    let result = rollover_unfinished(db, from, to)?;
    println!(
        "Moved {} task(s) and created {} recurring task(s) in {}",
        result.moved_count, result.created_count, result.to
    );
    Ok(())
}

pub fn handle_report(
    year: Option<i32>,
    week: Option<u32>,
    json: bool,
    copy: bool,
    output: Option<PathBuf>,
    db: &Database,
    config: &Config,
) -> Result<(), CliError> {
    let current = compute_current_week(db.clock().today());
    let target = YearWeek::new(year.unwrap_or(current.year), week.unwrap_or(current.week));
    let report = build_weekly_report(db, target, config.report.added_window)?;
    let markdown = render_report_markdown(&report);

    let text = if json {
        serde_json::to_string_pretty(&report)?
    } else {
        markdown.clone()
    };

    match output {
        Some(path) => {
            std::fs::write(&path, &text)?;
            println!("Report written to {}", path.display());
        }
        None => print!("{}", text),
    }

    if copy {
        let mut clipboard = arboard::Clipboard::new().map_err(|e| CliError::ClipboardError(e.to_string()))?;
        clipboard
            .set_text(markdown)
            .map_err(|e| CliError::ClipboardError(e.to_string()))?;
        eprintln!("Copied to clipboard");
    }
    Ok(())
}

/// Row counts of the store at `path`, or zeros if the file does not exist yet
fn workspace_counts(path: &Path, config: &Config) -> (i64, i64, i64) {
    if !path.exists() {
        return (0, 0, 0);
    }
    match Database::open(path, &config.store_options()).and_then(|db| db.counts()) {
        Ok(counts) => counts,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "could not read workspace stats");
            (0, 0, 0)
        }
    }
}

pub fn handle_workspace(command: WorkspaceCommand, config: &mut Config, config_path: &Path) -> Result<(), CliError> {
    match command {
        WorkspaceCommand::List => {
            for (name, workspace) in config.list_workspaces() {
                let path = crate::utils::expand_path(&workspace.file_path);
                let (categories, projects, tasks) = workspace_counts(&path, config);
                println!(
                    "{} {:<12} {}  categories: {}  projects: {}  tasks: {}  last used: {}",
                    if *name == config.current_workspace { "*" } else { " " },
                    name,
                    workspace.display_name,
                    categories,
                    projects,
                    tasks,
                    workspace.last_used.as_deref().unwrap_or("never")
                );
            }
        }
        WorkspaceCommand::Add { name, display_name, description } => {
            let path = config.add_workspace(&name, display_name.as_deref(), description.as_deref())?;
            Database::open(&path, &config.store_options())?;
            config.use_workspace(&name)?;
            config.save_to(config_path)?;
            println!("Workspace {} created at {} and selected", name, path.display());
        }
        WorkspaceCommand::Use { name } => {
            config.use_workspace(&name)?;
            config.save_to(config_path)?;
            println!("Now using workspace {}", name);
        }
        WorkspaceCommand::Rename { name, display_name, description } => {
            config.rename_workspace(&name, &display_name, description.as_deref())?;
            config.save_to(config_path)?;
            println!("Workspace {} renamed to {}", name, display_name);
        }
        WorkspaceCommand::Rm { name, yes } => {
            let path = config.workspace_path(&name)?;
            if !yes && !confirm(&format!("Delete workspace {} and {}?", name, path.display()))? {
                println!("Cancelled");
                return Ok(());
            }
            config.remove_workspace(&name)?;
            config.save_to(config_path)?;
            println!("Workspace {} removed", name);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::tests::test_db;

    #[test]
    fn cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_week_and_enum_arguments() {
        let cli = Cli::try_parse_from([
            "wkr", "task", "add", "Ship it", "--category", "Work", "--priority", "p0", "--week", "2025-W07",
        ])
        .unwrap();
        match cli.command {
            Some(Commands::Task(TaskCommand::Add { title, fields })) => {
                assert_eq!(title, "Ship it");
                assert_eq!(fields.priority, Some(Priority::P0));
                assert_eq!(fields.week, Some(YearWeek::new(2025, 7)));
            }
            _ => panic!("expected task add"),
        }
        assert!(Cli::try_parse_from(["wkr", "task", "add", "x", "--priority", "p5"]).is_err());
        assert!(Cli::try_parse_from(["wkr", "rollover", "--from", "2025-W00"]).is_err());
    }

    #[test]
    fn categories_resolve_by_id_or_name() {
        let db = test_db();
        let id = db.create_category("Work", None).unwrap();
        assert_eq!(resolve_category(&db, "Work").unwrap(), id);
        assert_eq!(resolve_category(&db, &id.to_string()).unwrap(), id);
        assert!(matches!(resolve_category(&db, "Home"), Err(CliError::UnknownCategory(_))));
    }

    #[test]
    fn changing_category_drops_the_old_project() {
        let db = test_db();
        let work = db.create_category("Work", None).unwrap();
        let home = db.create_category("Home", None).unwrap();
        let infra = db.create_project(work, "Infra", None).unwrap();
        let mut input = NewTask::new("move me");
        input.project_id = Some(infra);
        let id = db.create_task(&input).unwrap();

        let mut input = NewTask::from(&db.get_task(id).unwrap().task);
        let fields = TaskFields {
            category: Some("Home".to_string()),
            project: None,
            priority: None,
            status: None,
            progress: None,
            week: None,
            no_week: false,
            description: None,
            recurring: None,
        };
        apply_fields(&mut input, fields, &db).unwrap();
        db.update_task(id, &input).unwrap();

        let task = db.get_task(id).unwrap();
        assert_eq!(task.task.category_id, Some(home));
        assert_eq!(task.project_name.as_deref(), Some(crate::models::DEFAULT_PROJECT_NAME));
    }
}
