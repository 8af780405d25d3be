use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Name of the project every category owns from the moment it is created
pub const DEFAULT_PROJECT_NAME: &str = "杂";
pub const DEFAULT_PROJECT_DESCRIPTION: &str = "默认项目，用于未明确归类的任务";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid {kind} '{value}' (expected one of: {expected})")]
pub struct ParseEnumError {
    pub kind: &'static str,
    pub value: String,
    pub expected: &'static str,
}

/// Implements string conversion, Display and SQLite mapping for a closed enumeration
macro_rules! text_enum {
    ($name:ident, $kind:literal, { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = ParseEnumError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.trim().to_ascii_lowercase().as_str() {
                    $($text => Ok($name::$variant),)+
                    _ => Err(ParseEnumError {
                        kind: $kind,
                        value: s.to_string(),
                        expected: concat!($($text, " "),+),
                    }),
                }
            }
        }

        impl ToSql for $name {
            fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
                Ok(ToSqlOutput::from(self.as_str()))
            }
        }

        impl FromSql for $name {
            fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
                value
                    .as_str()?
                    .parse()
                    .map_err(|e| FromSqlError::Other(Box::new(e)))
            }
        }
    };
}

/// Task priority; p0 is the most urgent and sorts first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    P0,
    P1,
    #[default]
    P2,
}

text_enum!(Priority, "priority", { P0 => "p0", P1 => "p1", P2 => "p2" });

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    #[default]
    Todo,
    Doing,
    Done,
    Backlog,
}

text_enum!(Status, "status", { Todo => "todo", Doing => "doing", Done => "done", Backlog => "backlog" });

impl Status {
    /// Statuses swept forward by a rollover
    pub const UNFINISHED: [Status; 3] = [Status::Todo, Status::Doing, Status::Backlog];

    pub fn is_unfinished(&self) -> bool {
        Self::UNFINISHED.contains(self)
    }

    /// Next status in the todo -> doing -> done cycle; backlog re-enters at todo
    pub fn cycle(&self) -> Status {
        match self {
            Status::Todo => Status::Doing,
            Status::Doing => Status::Done,
            Status::Done | Status::Backlog => Status::Todo,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Status::Todo => "待办",
            Status::Doing => "进行中",
            Status::Done => "已完成",
            Status::Backlog => "Backlog",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogType {
    Added,
    Progress,
    Done,
}

text_enum!(LogType, "log type", { Added => "added", Progress => "progress", Done => "done" });

/// A (year, week) bucket. Ordering is chronological: year first, then week.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct YearWeek {
    pub year: i32,
    pub week: u32,
}

impl YearWeek {
    pub fn new(year: i32, week: u32) -> Self {
        Self { year, week }
    }

    /// Report label, e.g. `2025WK7`
    pub fn label(&self) -> String {
        format!("{}WK{}", self.year, self.week)
    }
}

impl fmt::Display for YearWeek {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-W{:02}", self.year, self.week)
    }
}

impl FromStr for YearWeek {
    type Err = String;

    /// Accepts `2025-W07`, `2025-7`, `2025W7` and `2025WK7`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_ascii_uppercase();
        let (year, week) = upper
            .split_once("WK")
            .or_else(|| upper.split_once("-W"))
            .or_else(|| upper.split_once('W'))
            .or_else(|| upper.split_once('-'))
            .ok_or_else(|| format!("Expected YEAR-WEEK (e.g. 2025-W07), got '{}'", s))?;
        let year: i32 = year
            .trim_end_matches('-')
            .parse()
            .map_err(|_| format!("Invalid year in '{}'", s))?;
        let week: u32 = week
            .parse()
            .map_err(|_| format!("Invalid week in '{}'", s))?;
        if week == 0 {
            return Err(format!("Week must be at least 1, got '{}'", s));
        }
        Ok(Self { year, week })
    }
}

/// Clamp a raw progress value into 0..=100
pub fn clamp_progress(value: i64) -> u8 {
    value.clamp(0, 100) as u8
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Category {
    pub id: Option<i64>,
    pub name: String,
    pub description: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategorySummary {
    #[serde(flatten)]
    pub category: Category,
    pub project_count: i64,
    pub task_count: i64,
    pub done_count: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub id: Option<i64>,
    pub name: String,
    pub description: Option<String>,
    pub category_id: i64,
    pub is_default: bool,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectSummary {
    #[serde(flatten)]
    pub project: Project,
    pub category_name: Option<String>,
    pub task_count: i64,
    pub done_count: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: Option<i64>,
    pub title: String,
    pub description: Option<String>,
    pub category_id: Option<i64>,
    pub project_id: i64,
    pub priority: Priority,
    pub status: Status,
    pub progress: u8,
    /// None for tasks that live in the backlog pool without a week
    pub year_week: Option<YearWeek>,
    pub is_recurring: bool,
    pub recurring_note: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// A task joined with the names of its category and project
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskWithNames {
    #[serde(flatten)]
    pub task: Task,
    pub category_name: Option<String>,
    pub project_name: Option<String>,
}

/// Fields accepted when creating or replacing a task
#[derive(Debug, Clone, Default)]
pub struct NewTask {
    pub title: String,
    pub description: Option<String>,
    pub category_id: Option<i64>,
    pub project_id: Option<i64>,
    pub priority: Option<Priority>,
    pub status: Option<Status>,
    pub progress: Option<i64>,
    pub year_week: Option<YearWeek>,
    pub is_recurring: bool,
    pub recurring_note: Option<String>,
}

impl NewTask {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Default::default()
        }
    }
}

impl From<&Task> for NewTask {
    fn from(task: &Task) -> Self {
        Self {
            title: task.title.clone(),
            description: task.description.clone(),
            category_id: task.category_id,
            project_id: Some(task.project_id),
            priority: Some(task.priority),
            status: Some(task.status),
            progress: Some(task.progress as i64),
            year_week: task.year_week,
            is_recurring: task.is_recurring,
            recurring_note: task.recurring_note.clone(),
        }
    }
}

/// Optional filters for task listing; unset fields match everything
#[derive(Debug, Clone, Default)]
pub struct TaskFilter {
    pub category_id: Option<i64>,
    pub project_id: Option<i64>,
    pub year: Option<i32>,
    pub week: Option<u32>,
    pub status: Option<Status>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeeklyLog {
    pub id: Option<i64>,
    pub year_week: YearWeek,
    pub task_id: Option<i64>,
    pub log_type: LogType,
    pub content: Option<String>,
    pub log_date: String, // YYYY-MM-DD
    pub created_at: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_orders_p0_first() {
        let mut priorities = vec![Priority::P2, Priority::P0, Priority::P1];
        priorities.sort();
        assert_eq!(priorities, vec![Priority::P0, Priority::P1, Priority::P2]);
    }

    #[test]
    fn enums_reject_values_outside_the_closed_set() {
        assert_eq!("P1".parse::<Priority>().unwrap(), Priority::P1);
        assert_eq!("backlog".parse::<Status>().unwrap(), Status::Backlog);
        let err = "p3".parse::<Priority>().unwrap_err();
        assert_eq!(err.kind, "priority");
        assert!("blocked".parse::<Status>().is_err());
        assert!("edited".parse::<LogType>().is_err());
    }

    #[test]
    fn status_cycle_skips_backlog() {
        assert_eq!(Status::Todo.cycle(), Status::Doing);
        assert_eq!(Status::Doing.cycle(), Status::Done);
        assert_eq!(Status::Done.cycle(), Status::Todo);
        assert_eq!(Status::Backlog.cycle(), Status::Todo);
        assert!(!Status::Done.is_unfinished());
        assert!(Status::Backlog.is_unfinished());
    }

    #[test]
    fn year_week_parses_common_spellings() {
        let expected = YearWeek::new(2025, 7);
        assert_eq!("2025-W07".parse::<YearWeek>().unwrap(), expected);
        assert_eq!("2025-7".parse::<YearWeek>().unwrap(), expected);
        assert_eq!("2025wk7".parse::<YearWeek>().unwrap(), expected);
        assert_eq!("2025W7".parse::<YearWeek>().unwrap(), expected);
        assert!("2025-W00".parse::<YearWeek>().is_err());
        assert!("week seven".parse::<YearWeek>().is_err());
        assert_eq!(expected.label(), "2025WK7");
        assert_eq!(expected.to_string(), "2025-W07");
    }

    #[test]
    fn year_week_orders_by_year_then_week() {
        assert!(YearWeek::new(2024, 52) < YearWeek::new(2025, 1));
        assert!(YearWeek::new(2025, 3) < YearWeek::new(2025, 10));
    }

    #[test]
    fn progress_is_clamped() {
        assert_eq!(clamp_progress(-5), 0);
        assert_eq!(clamp_progress(42), 42);
        assert_eq!(clamp_progress(250), 100);
    }
}
