use crate::{Config, Database, models::{NewTask, Status, TaskWithNames, YearWeek}};
use crate::database::DatabaseError;
use crate::report::{build_weekly_report, render_report_markdown};
use crate::rollover::{count_unfinished, rollover_unfinished, UnfinishedCount};
use crate::week::{compute_current_week, next_week, previous_week};
use ratatui::widgets::ListState;
use std::path::PathBuf;
use std::time::Instant;

/// Progress step for the progress up/down keys
pub const PROGRESS_STEP: i64 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tab {
    Week,
    Report,
}

impl Tab {
    pub const ALL: [Tab; 2] = [Tab::Week, Tab::Report];

    pub fn title(&self) -> &'static str {
        match self {
            Tab::Week => "Week",
            Tab::Report => "Report",
        }
    }

    pub fn index(&self) -> usize {
        match self {
            Tab::Week => 0,
            Tab::Report => 1,
        }
    }

    pub fn next(&self) -> Tab {
        match self {
            Tab::Week => Tab::Report,
            Tab::Report => Tab::Week,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Normal,
    Help,
    /// Rollover popup is open; holds the preview it was opened with
    ConfirmRollover(UnfinishedCount),
}

#[derive(Debug, Clone, Default)]
pub struct StatusState {
    pub message: Option<String>,
    pub message_time: Option<Instant>,
}

pub struct App {
    pub config: Config,
    /// Where theme changes are saved back to
    pub config_path: PathBuf,
    pub database: Database,

    /// The week shown on both tabs
    pub week: YearWeek,
    pub tasks: Vec<TaskWithNames>,
    pub list_state: ListState,

    pub current_tab: Tab,
    pub mode: Mode,
    pub report_markdown: String,
    pub report_scroll: usize,
    pub status: StatusState,
}

impl App {
    pub fn new(config: Config, config_path: PathBuf, database: Database) -> Result<Self, DatabaseError> {
        let week = compute_current_week(database.clock().today());
        let mut app = Self {
            config,
            config_path,
            database,
            week,
            tasks: Vec::new(),
            list_state: ListState::default(),
            current_tab: Tab::Week,
            mode: Mode::Normal,
            report_markdown: String::new(),
            report_scroll: 0,
            status: StatusState::default(),
        };
        app.load_week()?;
        Ok(app)
    }

    /// Reload the board and the report for `self.week`, keeping the selection in range
    pub fn load_week(&mut self) -> Result<(), DatabaseError> {
        self.tasks = self.database.list_week_tasks(self.week)?;
        let report = build_weekly_report(&self.database, self.week, self.config.report.added_window)?;
        self.report_markdown = if report.is_empty() {
            format!("# {} 周报\n\n*No tasks this week.*\n", self.week.label())
        } else {
            render_report_markdown(&report)
        };

        let selected = match (self.list_state.selected(), self.tasks.len()) {
            (_, 0) => None,
            (Some(i), len) => Some(i.min(len - 1)),
            (None, _) => Some(0),
        };
        self.list_state.select(selected);
        Ok(())
    }

    pub fn selected_task(&self) -> Option<&TaskWithNames> {
        self.list_state.selected().and_then(|i| self.tasks.get(i))
    }

    pub fn move_selection_up(&mut self) {
        match self.current_tab {
            Tab::Week => {
                if let Some(i) = self.list_state.selected() {
                    self.list_state.select(Some(i.saturating_sub(1)));
                }
            }
            Tab::Report => self.report_scroll = self.report_scroll.saturating_sub(1),
        }
    }

    pub fn move_selection_down(&mut self) {
        match self.current_tab {
            Tab::Week => {
                if let Some(i) = self.list_state.selected() {
                    if i + 1 < self.tasks.len() {
                        self.list_state.select(Some(i + 1));
                    }
                }
            }
            // Clamped against the rendered height at draw time
            Tab::Report => self.report_scroll += 1,
        }
    }

    pub fn switch_tab(&mut self, tab: Tab) {
        self.current_tab = tab;
        self.report_scroll = 0;
    }

    fn show_week(&mut self, week: YearWeek) {
        self.week = week;
        self.report_scroll = 0;
        self.list_state.select(None);
        if let Err(e) = self.load_week() {
            self.set_status_message(format!("Failed to load {}: {}", week, e));
        }
    }

    pub fn previous_week(&mut self) {
        self.show_week(previous_week(self.week));
    }

    pub fn next_week(&mut self) {
        self.show_week(next_week(self.week));
    }

    pub fn current_week(&mut self) {
        self.show_week(compute_current_week(self.database.clock().today()));
    }

    /// Advance the selected task through todo -> doing -> done -> todo
    pub fn cycle_selected_status(&mut self) {
        let Some((id, status)) = self.selected_task().and_then(|t| t.task.id.map(|id| (id, t.task.status))) else {
            return;
        };
        let next = status.cycle();
        let progress = (next == Status::Done).then_some(100);
        match self.database.set_task_status(id, next, progress) {
            Ok(()) => {
                self.set_status_message(format!("Task #{} is now {}", id, next.label()));
                self.reload();
            }
            Err(e) => self.set_status_message(format!("Failed to update task: {}", e)),
        }
    }

    /// Move the selected task's progress by `delta`, clamped to 0..=100
    pub fn adjust_selected_progress(&mut self, delta: i64) {
        let Some(task) = self.selected_task().map(|t| t.task.clone()) else {
            return;
        };
        let Some(id) = task.id else {
            return;
        };
        let mut input = NewTask::from(&task);
        input.progress = Some(task.progress as i64 + delta);
        match self.database.update_task(id, &input) {
            Ok(()) => self.reload(),
            Err(e) => self.set_status_message(format!("Failed to update task: {}", e)),
        }
    }

    /// Open the rollover popup for the shown week, unless there is nothing to move
    pub fn request_rollover(&mut self) {
        match count_unfinished(&self.database, self.week) {
            Ok(preview) if preview.total_count == 0 => {
                self.set_status_message(format!("Nothing to roll over from {}", self.week));
            }
            Ok(preview) => self.mode = Mode::ConfirmRollover(preview),
            Err(e) => self.set_status_message(format!("Failed to count unfinished tasks: {}", e)),
        }
    }

    pub fn confirm_rollover(&mut self) {
        self.mode = Mode::Normal;
        let to = next_week(self.week);
        match rollover_unfinished(&self.database, self.week, to) {
            Ok(result) => {
                self.set_status_message(format!(
                    "Moved {} and created {} recurring task(s) in {}",
                    result.moved_count, result.created_count, result.to
                ));
                self.reload();
            }
            Err(e) => self.set_status_message(format!("Rollover failed: {}", e)),
        }
    }

    pub fn cancel_rollover(&mut self) {
        self.mode = Mode::Normal;
    }

    pub fn copy_report(&mut self) {
        match arboard::Clipboard::new() {
            Ok(mut clipboard) => match clipboard.set_text(self.report_markdown.clone()) {
                Ok(()) => self.set_status_message(format!("Copied {} report to clipboard", self.week.label())),
                Err(e) => self.set_status_message(format!("Failed to copy to clipboard: {}", e)),
            },
            Err(_) => self.set_status_message("Failed to access clipboard".to_string()),
        }
    }

    /// Switch to the next theme and persist the choice
    pub fn cycle_theme(&mut self) {
        let theme = self.config.next_theme();
        if let Err(e) = self.config.set_theme(&theme) {
            self.set_status_message(format!("Failed to set theme: {}", e));
            return;
        }
        match self.config.save_to(&self.config_path) {
            Ok(()) => self.set_status_message(format!("Theme: {}", theme)),
            Err(e) => self.set_status_message(format!("Theme {} not saved: {}", theme, e)),
        }
    }

    pub fn toggle_help(&mut self) {
        self.mode = match self.mode {
            Mode::Help => Mode::Normal,
            _ => Mode::Help,
        };
    }

    fn reload(&mut self) {
        if let Err(e) = self.load_week() {
            self.set_status_message(format!("Failed to reload data: {}", e));
        }
    }

    pub fn set_status_message(&mut self, message: String) {
        self.status.message = Some(message);
        self.status.message_time = Some(Instant::now());
    }

    pub fn clear_status_message(&mut self) {
        self.status.message = None;
        self.status.message_time = None;
    }

    /// Check if status message should be auto-cleared (after 3 seconds)
    pub fn check_status_message_timeout(&mut self) {
        const STATUS_MESSAGE_TIMEOUT_SECS: u64 = 3;
        if let Some(time) = self.status.message_time {
            if time.elapsed().as_secs() >= STATUS_MESSAGE_TIMEOUT_SECS {
                self.clear_status_message();
            }
        }
    }
}
