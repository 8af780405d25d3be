//! Weekly report: collecting a week's tasks and rendering them as Markdown.

use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::database::{Database, DatabaseError};
use crate::models::{Priority, Status, YearWeek};
use crate::week::{monday_of, week_start};

const FALLBACK_CATEGORY: &str = "其他";
const FALLBACK_PROJECT: &str = "未分类";

/// How the "added this week" section decides which tasks are new
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AddedWindow {
    /// Created on or after the Monday of the clock's current week, whatever week is reported
    #[default]
    CurrentWeek,
    /// Created between the reported week's Monday and the following Monday
    TargetWeek,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportTask {
    pub id: i64,
    pub title: String,
    pub description: Option<String>,
    pub progress: u8,
    pub priority: Priority,
    pub status: Status,
    pub category_name: Option<String>,
    pub project_name: Option<String>,
    pub project_is_default: bool,
}

impl ReportTask {
    /// Project label shown next to a task, `None` for the default project
    fn named_project(&self) -> Option<&str> {
        if self.project_is_default {
            None
        } else {
            self.project_name.as_deref()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeeklyReport {
    pub year: i32,
    pub week: u32,
    /// e.g. `2025WK7`
    pub label: String,
    pub done_tasks_by_category: Vec<ReportTask>,
    pub added_tasks: Vec<ReportTask>,
    pub in_progress_tasks: Vec<ReportTask>,
    /// Every backlog task in the store; not filtered by week
    pub backlog_tasks: Vec<ReportTask>,
}

impl WeeklyReport {
    pub fn year_week(&self) -> YearWeek {
        YearWeek::new(self.year, self.week)
    }

    /// Sections that have at least one task, in rendering order
    pub fn sections(&self) -> Vec<ReportSection> {
        [
            (ReportSection::Progress, self.done_tasks_by_category.is_empty()),
            (ReportSection::Added, self.added_tasks.is_empty()),
            (ReportSection::InProgress, self.in_progress_tasks.is_empty()),
            (ReportSection::Backlog, self.backlog_tasks.is_empty()),
        ]
        .into_iter()
        .filter(|(_, empty)| !empty)
        .map(|(section, _)| section)
        .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.sections().is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReportSection {
    Progress,
    Added,
    InProgress,
    Backlog,
}

impl ReportSection {
    pub const ALL: [ReportSection; 4] = [
        ReportSection::Progress,
        ReportSection::Added,
        ReportSection::InProgress,
        ReportSection::Backlog,
    ];

    pub fn heading(&self) -> &'static str {
        match self {
            ReportSection::Progress => "本周进展",
            ReportSection::Added => "本周新增需求 (Added)",
            ReportSection::InProgress => "进行中 (In Progress)",
            ReportSection::Backlog => "Backlog",
        }
    }
}

/// Recover the sections of a rendered report from its `## ` headings
pub fn parse_sections(markdown: &str) -> Vec<ReportSection> {
    markdown
        .lines()
        .filter_map(|line| line.strip_prefix("## "))
        .filter_map(|heading| {
            ReportSection::ALL
                .into_iter()
                .find(|section| section.heading() == heading.trim())
        })
        .collect()
}

const REPORT_COLUMNS: &str = "t.id, t.title, t.description, t.progress, t.priority, t.status, c.name, p.name, p.is_default";

fn row_to_report_task(row: &rusqlite::Row) -> Result<ReportTask, rusqlite::Error> {
    Ok(ReportTask {
        id: row.get(0)?,
        title: row.get(1)?,
        description: row.get(2)?,
        progress: crate::models::clamp_progress(row.get::<_, Option<i64>>(3)?.unwrap_or(0)),
        priority: row.get(4)?,
        status: row.get(5)?,
        category_name: row.get(6)?,
        project_name: row.get(7)?,
        project_is_default: row.get::<_, Option<i64>>(8)?.unwrap_or(0) != 0,
    })
}

fn query_report_tasks(
    db: &Database,
    sql: &str,
    params: &[&dyn rusqlite::ToSql],
) -> Result<Vec<ReportTask>, DatabaseError> {
    let mut stmt = db.conn().prepare(sql)?;
    let tasks = stmt
        .query_map(params, row_to_report_task)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(tasks)
}

/// Gather the four task collections that make up the report for `week`
pub fn build_weekly_report(
    db: &Database,
    week: YearWeek,
    window: AddedWindow,
) -> Result<WeeklyReport, DatabaseError> {
    if week.week == 0 {
        return Err(DatabaseError::Validation(format!("Invalid week: {}", week.week)));
    }

    // Tasks without a category are left out of the progress section
    let done = query_report_tasks(
        db,
        &format!(
            "SELECT {REPORT_COLUMNS}
             FROM tasks t
             JOIN categories c ON t.category_id = c.id
             LEFT JOIN projects p ON t.project_id = p.id
             WHERE t.year = ?1 AND t.week = ?2 AND t.status = 'done'
             ORDER BY c.name, p.name, t.priority"
        ),
        &[&week.year, &week.week],
    )?;

    let (since, until) = match window {
        AddedWindow::CurrentWeek => (monday_of(db.clock().now_utc().date()), None),
        AddedWindow::TargetWeek => {
            let start = week_start(week).ok_or_else(|| {
                DatabaseError::Validation(format!("Week {} has no calendar date", week))
            })?;
            (start, Some(start + Duration::days(7)))
        }
    };
    let since = since.format("%Y-%m-%d").to_string();
    let added = match until {
        None => query_report_tasks(
            db,
            &format!(
                "SELECT {REPORT_COLUMNS}
                 FROM tasks t
                 LEFT JOIN categories c ON t.category_id = c.id
                 LEFT JOIN projects p ON t.project_id = p.id
                 WHERE t.year = ?1 AND t.week = ?2 AND DATE(t.created_at) >= ?3
                 ORDER BY t.priority"
            ),
            &[&week.year, &week.week, &since],
        )?,
        Some(until) => {
            let until = until.format("%Y-%m-%d").to_string();
            query_report_tasks(
                db,
                &format!(
                    "SELECT {REPORT_COLUMNS}
                     FROM tasks t
                     LEFT JOIN categories c ON t.category_id = c.id
                     LEFT JOIN projects p ON t.project_id = p.id
                     WHERE t.year = ?1 AND t.week = ?2
                       AND DATE(t.created_at) >= ?3 AND DATE(t.created_at) < ?4
                     ORDER BY t.priority"
                ),
                &[&week.year, &week.week, &since, &until],
            )?
        }
    };

    let in_progress = query_report_tasks(
        db,
        &format!(
            "SELECT {REPORT_COLUMNS}
             FROM tasks t
             LEFT JOIN categories c ON t.category_id = c.id
             LEFT JOIN projects p ON t.project_id = p.id
             WHERE t.year = ?1 AND t.week = ?2 AND t.status = 'doing'
             ORDER BY t.priority"
        ),
        &[&week.year, &week.week],
    )?;

    let backlog = query_report_tasks(
        db,
        &format!(
            "SELECT {REPORT_COLUMNS}
             FROM tasks t
             LEFT JOIN categories c ON t.category_id = c.id
             LEFT JOIN projects p ON t.project_id = p.id
             WHERE t.status = 'backlog'
             ORDER BY c.name, p.name, t.priority"
        ),
        &[],
    )?;

    tracing::debug!(
        week = %week,
        done = done.len(),
        added = added.len(),
        in_progress = in_progress.len(),
        backlog = backlog.len(),
        "weekly report built"
    );

    Ok(WeeklyReport {
        year: week.year,
        week: week.week,
        label: week.label(),
        done_tasks_by_category: done,
        added_tasks: added,
        in_progress_tasks: in_progress,
        backlog_tasks: backlog,
    })
}

struct ProjectGroup<'a> {
    name: &'a str,
    is_default: bool,
    tasks: Vec<&'a ReportTask>,
}

struct CategoryGroup<'a> {
    name: &'a str,
    projects: Vec<ProjectGroup<'a>>,
}

impl CategoryGroup<'_> {
    /// A lone default project is rendered without its own sub-heading
    fn is_flat(&self) -> bool {
        self.projects.len() == 1 && self.projects[0].is_default
    }
}

/// Group by category, then project, keeping first-seen order
fn group_tasks(tasks: &[ReportTask]) -> Vec<CategoryGroup<'_>> {
    let mut groups: Vec<CategoryGroup<'_>> = Vec::new();
    for task in tasks {
        let category = task.category_name.as_deref().unwrap_or(FALLBACK_CATEGORY);
        let project = task.project_name.as_deref().unwrap_or(FALLBACK_PROJECT);

        let index = match groups.iter().position(|g| g.name == category) {
            Some(index) => index,
            None => {
                groups.push(CategoryGroup { name: category, projects: Vec::new() });
                groups.len() - 1
            }
        };
        let projects = &mut groups[index].projects;
        match projects.iter_mut().find(|p| p.name == project) {
            Some(group) => group.tasks.push(task),
            None => projects.push(ProjectGroup {
                name: project,
                is_default: task.project_is_default && task.project_name.is_some(),
                tasks: vec![task],
            }),
        }
    }
    groups
}

fn progress_suffix(task: &ReportTask) -> String {
    if task.progress < 100 {
        format!(" [{}%]", task.progress)
    } else {
        String::new()
    }
}

fn render_grouped(out: &mut String, tasks: &[ReportTask], with_details: bool) {
    for category in group_tasks(tasks) {
        out.push_str(&format!("**{}**:\n", category.name));
        let flat = category.is_flat();
        for project in &category.projects {
            let (task_indent, detail_indent) = if flat {
                ("  ", "      ")
            } else {
                out.push_str(&format!("  *{}*:\n", project.name));
                ("    ", "        ")
            };
            for task in &project.tasks {
                if !with_details {
                    out.push_str(&format!("{}- {}\n", task_indent, task.title));
                    continue;
                }
                out.push_str(&format!("{}- {}{}\n", task_indent, task.title, progress_suffix(task)));
                if let Some(description) = task.description.as_deref().filter(|d| !d.is_empty()) {
                    out.push_str(&format!("{}- {}\n", detail_indent, description));
                }
            }
        }
        out.push('\n');
    }
}

/// Render a report as Markdown. Sections without tasks are left out.
pub fn render_report_markdown(report: &WeeklyReport) -> String {
    let mut out = format!("# {} 周报\n\n", report.label);

    if !report.done_tasks_by_category.is_empty() {
        out.push_str(&format!("## {}\n\n", ReportSection::Progress.heading()));
        render_grouped(&mut out, &report.done_tasks_by_category, true);
    }

    if !report.added_tasks.is_empty() {
        out.push_str(&format!("## {}\n", ReportSection::Added.heading()));
        for task in &report.added_tasks {
            let category = task.category_name.as_deref().unwrap_or("");
            let prefix = match task.named_project() {
                Some(project) => format!("{}/{}", category, project),
                None => category.to_string(),
            };
            if prefix.is_empty() {
                out.push_str(&format!("- {}\n", task.title));
            } else {
                out.push_str(&format!("- {}: {}\n", prefix, task.title));
            }
        }
        out.push('\n');
    }

    if !report.in_progress_tasks.is_empty() {
        out.push_str(&format!("## {}\n", ReportSection::InProgress.heading()));
        for task in &report.in_progress_tasks {
            out.push_str(&format!("- {} [{}%]", task.title, task.progress));
            if let Some(project) = task.named_project() {
                out.push_str(&format!(" ({})", project));
            }
            out.push('\n');
        }
        out.push('\n');
    }

    if !report.backlog_tasks.is_empty() {
        out.push_str(&format!("## {}\n\n", ReportSection::Backlog.heading()));
        render_grouped(&mut out, &report.backlog_tasks, false);
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::tests::test_db;
    use crate::models::{NewTask, DEFAULT_PROJECT_NAME};

    fn task(title: &str, category: &str, project: Option<&str>, progress: u8) -> ReportTask {
        ReportTask {
            id: 0,
            title: title.to_string(),
            description: None,
            progress,
            priority: Priority::P2,
            status: Status::Done,
            category_name: Some(category.to_string()),
            project_name: Some(project.unwrap_or(DEFAULT_PROJECT_NAME).to_string()),
            project_is_default: project.is_none(),
        }
    }

    fn empty_report() -> WeeklyReport {
        WeeklyReport {
            year: 2025,
            week: 7,
            label: "2025WK7".to_string(),
            done_tasks_by_category: vec![],
            added_tasks: vec![],
            in_progress_tasks: vec![],
            backlog_tasks: vec![],
        }
    }

    #[test]
    fn renders_every_section_with_grouping_rules() {
        let mut fix = task("Fix bug", "Work", None, 100);
        fix.description = Some("null pointer".to_string());
        let mut report = empty_report();
        report.done_tasks_by_category = vec![
            fix,
            task("Write doc", "Work", None, 80),
            task("Plant", "Home", Some("Garden"), 100),
        ];
        report.added_tasks = vec![task("Plant", "Home", Some("Garden"), 0), task("Call", "Work", None, 0)];
        report.in_progress_tasks = vec![task("Migrate", "Work", Some("Infra"), 40), task("Tidy", "Work", None, 10)];
        report.backlog_tasks = vec![
            task("Someday", "Work", None, 0),
            task("Maybe", "Work", Some("Infra"), 0),
        ];

        let expected = "# 2025WK7 周报\n\n\
            ## 本周进展\n\n\
            **Work**:\n  - Fix bug\n      - null pointer\n  - Write doc [80%]\n\n\
            **Home**:\n  *Garden*:\n    - Plant\n\n\
            ## 本周新增需求 (Added)\n- Home/Garden: Plant\n- Work: Call\n\n\
            ## 进行中 (In Progress)\n- Migrate [40%] (Infra)\n- Tidy [10%]\n\n\
            ## Backlog\n\n\
            **Work**:\n  *杂*:\n    - Someday\n  *Infra*:\n    - Maybe\n\n";
        assert_eq!(render_report_markdown(&report), expected);
    }

    #[test]
    fn empty_sections_are_omitted() {
        let mut report = empty_report();
        assert_eq!(render_report_markdown(&report), "# 2025WK7 周报\n\n");
        assert!(report.is_empty());

        report.in_progress_tasks = vec![task("Migrate", "Work", None, 40)];
        let markdown = render_report_markdown(&report);
        assert_eq!(parse_sections(&markdown), vec![ReportSection::InProgress]);
        assert!(!markdown.contains("本周进展"));
    }

    #[test]
    fn parsed_sections_match_the_nonempty_collections() {
        let mut report = empty_report();
        report.done_tasks_by_category = vec![task("a", "Work", None, 100)];
        report.backlog_tasks = vec![task("b", "Work", Some("Infra"), 0)];
        let markdown = render_report_markdown(&report);
        assert_eq!(parse_sections(&markdown), report.sections());
        assert_eq!(report.sections(), vec![ReportSection::Progress, ReportSection::Backlog]);
    }

    #[test]
    fn missing_names_fall_back() {
        let mut orphan = task("lost", "x", None, 100);
        orphan.category_name = None;
        orphan.project_name = None;
        orphan.project_is_default = false;
        let mut report = empty_report();
        report.done_tasks_by_category = vec![orphan];
        assert!(render_report_markdown(&report).contains("**其他**:\n  *未分类*:\n    - lost\n"));
    }

    fn add(db: &Database, category: i64, project: Option<i64>, title: &str, status: Status, week: Option<YearWeek>) -> i64 {
        let mut input = NewTask::new(title);
        input.category_id = Some(category);
        input.project_id = project;
        input.status = Some(status);
        input.year_week = week;
        db.create_task(&input).unwrap()
    }

    #[test]
    fn done_tasks_land_in_exactly_one_bucket() {
        let db = test_db();
        let work = db.create_category("Work", None).unwrap();
        let infra = db.create_project(work, "Infra", None).unwrap();
        let w7 = YearWeek::new(2025, 7);
        add(&db, work, None, "one", Status::Done, Some(w7));
        add(&db, work, Some(infra), "two", Status::Done, Some(w7));
        add(&db, work, Some(infra), "three", Status::Doing, Some(w7));
        add(&db, work, None, "elsewhere", Status::Done, Some(YearWeek::new(2025, 6)));

        let report = build_weekly_report(&db, w7, AddedWindow::CurrentWeek).unwrap();
        assert_eq!(report.label, "2025WK7");
        let titles: Vec<_> = report.done_tasks_by_category.iter().map(|t| t.title.as_str()).collect();
        assert_eq!(titles, vec!["two", "one"]);
        assert_eq!(report.in_progress_tasks.len(), 1);

        // Done with progress 0 still carries its suffix: "- one [0%]"
        let markdown = render_report_markdown(&report);
        let lines_for = |title: &str| {
            let prefix = format!("- {title} ");
            markdown.lines().filter(|l| l.trim_start().starts_with(&prefix)).count()
        };
        assert_eq!(lines_for("one"), 1);
        assert_eq!(lines_for("two"), 1);
        assert!(markdown.contains("- one [0%]\n"));
    }

    #[test]
    fn backlog_is_the_same_for_every_week() {
        let db = test_db();
        let work = db.create_category("Work", None).unwrap();
        add(&db, work, None, "pool", Status::Backlog, None);
        add(&db, work, None, "parked", Status::Backlog, Some(YearWeek::new(2025, 2)));

        let a = build_weekly_report(&db, YearWeek::new(2025, 7), AddedWindow::CurrentWeek).unwrap();
        let b = build_weekly_report(&db, YearWeek::new(2024, 30), AddedWindow::CurrentWeek).unwrap();
        assert_eq!(a.backlog_tasks.len(), 2);
        assert_eq!(a.backlog_tasks, b.backlog_tasks);
    }

    #[test]
    fn added_window_policies_diverge_for_past_weeks() {
        // The test clock sits on Wednesday 2025-02-12, week 7
        let db = test_db();
        let work = db.create_category("Work", None).unwrap();
        let w5 = YearWeek::new(2025, 5);
        let filed_today = add(&db, work, None, "filed today", Status::Todo, Some(w5));
        let filed_then = add(&db, work, None, "filed in week 5", Status::Todo, Some(w5));
        db.conn()
            .execute(
                "UPDATE tasks SET created_at = '2025-01-29 09:30:00' WHERE id = ?1",
                rusqlite::params![filed_then],
            )
            .unwrap();

        let ids = |window: AddedWindow| -> Vec<i64> {
            build_weekly_report(&db, w5, window)
                .unwrap()
                .added_tasks
                .iter()
                .map(|t| t.id)
                .collect()
        };
        // Relative to the current date: only what was created this week counts
        assert_eq!(ids(AddedWindow::CurrentWeek), vec![filed_today]);
        // Relative to the reported week's own dates (2025-01-27 .. 2025-02-03)
        assert_eq!(ids(AddedWindow::TargetWeek), vec![filed_then]);
    }

    #[test]
    fn added_window_policies_agree_for_the_current_week() {
        let db = test_db();
        let work = db.create_category("Work", None).unwrap();
        let w7 = YearWeek::new(2025, 7);
        add(&db, work, None, "new", Status::Todo, Some(w7));
        let faithful = build_weekly_report(&db, w7, AddedWindow::CurrentWeek).unwrap();
        let corrected = build_weekly_report(&db, w7, AddedWindow::TargetWeek).unwrap();
        assert_eq!(faithful.added_tasks, corrected.added_tasks);
        assert_eq!(faithful.added_tasks.len(), 1);
    }
}
