use ratatui::widgets::{Block, Borders, List, ListItem, ListState, StatefulWidget, Scrollbar, ScrollbarState, ScrollbarOrientation};
use ratatui::style::{Style, Modifier};
use ratatui::text::{Line, Span};
use ratatui::Frame;
use ratatui::layout::{Rect, Layout, Direction, Constraint};
use crate::models::{Priority, Status, TaskWithNames, YearWeek};
use crate::Config;
use crate::tui::widgets::color::{parse_color, get_contrast_text_color};

fn status_glyph(status: Status) -> &'static str {
    match status {
        Status::Todo => "○",
        Status::Doing => "◐",
        Status::Done => "✓",
        Status::Backlog => "…",
    }
}

/// One board row: glyph, priority, title, progress, then category/project
pub fn task_row(task: &TaskWithNames, max_width: usize) -> String {
    let t = &task.task;
    let mut row = format!("{} {} {}", status_glyph(t.status), t.priority, t.title);
    if t.status == Status::Doing || (t.progress > 0 && t.progress < 100) {
        row.push_str(&format!(" [{}%]", t.progress));
    }
    if t.is_recurring {
        row.push_str(" ↻");
    }
    let location = match (task.category_name.as_deref(), task.project_name.as_deref()) {
        (Some(c), Some(p)) => format!("  {}/{}", c, p),
        (Some(c), None) => format!("  {}", c),
        (None, Some(p)) => format!("  {}", p),
        (None, None) => String::new(),
    };
    row.push_str(&location);

    if row.chars().count() > max_width {
        row = row.chars().take(max_width.saturating_sub(3)).collect::<String>() + "...";
    }
    row
}

pub fn render_week_board(f: &mut Frame, area: Rect, week: YearWeek, tasks: &[TaskWithNames], list_state: &mut ListState, config: &Config) {
    // 2 for borders, 2 for padding
    let max_width = area.width.saturating_sub(4) as usize;

    let active_theme = config.get_active_theme();
    let fg_color = parse_color(&active_theme.fg);
    let highlight_bg = parse_color(&active_theme.highlight_bg);
    let highlight_fg = if active_theme.highlight_fg.is_empty() {
        get_contrast_text_color(highlight_bg)
    } else {
        parse_color(&active_theme.highlight_fg)
    };

    let items: Vec<ListItem> = tasks
        .iter()
        .map(|task| {
            let text = task_row(task, max_width);
            let style = match (task.task.status, task.task.priority) {
                (Status::Done, _) => Style::default().add_modifier(Modifier::DIM),
                (_, Priority::P0) => Style::default().add_modifier(Modifier::BOLD),
                _ => Style::default(),
            };
            ListItem::new(Line::from(Span::styled(text, style)))
        })
        .collect();

    let list_areas = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Min(1),
            Constraint::Length(1), // Scrollbar
        ])
        .split(area);
    let list_area = list_areas[0];
    let scrollbar_area = list_areas[1];

    let done = tasks.iter().filter(|t| t.task.status == Status::Done).count();
    let title = format!("{} ({}) - {} of {} done", week.label(), week, done, tasks.len());
    let total_items = items.len();
    let list = List::new(items)
        .block(Block::default().borders(Borders::ALL).title(title))
        .style(Style::default().fg(fg_color))
        .highlight_style(Style::default().fg(highlight_fg).bg(highlight_bg));

    StatefulWidget::render(list, list_area, f.buffer_mut(), list_state);

    let visible_items = list_area.height.saturating_sub(2) as usize;
    if total_items > visible_items && visible_items > 0 && scrollbar_area.width > 0 {
        let scrollbar_inner_area = Rect::new(
            scrollbar_area.x,
            list_area.y + 1, // Start after top border
            scrollbar_area.width,
            list_area.height.saturating_sub(2),
        );

        let selected_index = list_state.selected().unwrap_or(0);
        let mut scrollbar_state = ScrollbarState::new(total_items)
            .viewport_content_length(visible_items)
            .position(selected_index.saturating_sub(visible_items - 1));

        let scrollbar = Scrollbar::default()
            .orientation(ScrollbarOrientation::VerticalRight)
            .begin_symbol(Some("↑"))
            .end_symbol(Some("↓"))
            .track_symbol(Some("│"))
            .thumb_symbol("█");

        f.render_stateful_widget(scrollbar, scrollbar_inner_area, &mut scrollbar_state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Task;

    fn task(status: Status, progress: u8) -> TaskWithNames {
        TaskWithNames {
            task: Task {
                id: Some(1),
                title: "Write report".to_string(),
                description: None,
                category_id: Some(1),
                project_id: 1,
                priority: Priority::P1,
                status,
                progress,
                year_week: Some(YearWeek::new(2025, 7)),
                is_recurring: false,
                recurring_note: None,
                created_at: String::new(),
                updated_at: String::new(),
            },
            category_name: Some("Work".to_string()),
            project_name: Some("Infra".to_string()),
        }
    }

    #[test]
    fn rows_show_progress_only_while_in_flight() {
        assert_eq!(task_row(&task(Status::Doing, 40), 80), "◐ p1 Write report [40%]  Work/Infra");
        assert_eq!(task_row(&task(Status::Done, 100), 80), "✓ p1 Write report  Work/Infra");
        assert_eq!(task_row(&task(Status::Todo, 0), 80), "○ p1 Write report  Work/Infra");
    }

    #[test]
    fn long_rows_are_truncated() {
        let row = task_row(&task(Status::Todo, 0), 10);
        assert_eq!(row.chars().count(), 10);
        assert!(row.ends_with("..."));
    }
}
