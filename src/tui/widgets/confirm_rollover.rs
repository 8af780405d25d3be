use ratatui::widgets::{Block, Borders, Paragraph, Clear};
use ratatui::style::{Style, Modifier};
use ratatui::Frame;
use ratatui::layout::{Rect, Alignment};
use ratatui::text::{Line, Span};
use crate::Config;
use crate::models::YearWeek;
use crate::rollover::UnfinishedCount;
use crate::tui::widgets::color::parse_color;
use crate::tui::widgets::popup_area;

pub fn render_confirm_rollover(f: &mut Frame, area: Rect, from: YearWeek, to: YearWeek, preview: &UnfinishedCount, config: &Config) {
    let active_theme = config.get_active_theme();
    let fg_color = parse_color(&active_theme.fg);
    let bg_color = parse_color(&active_theme.bg);
    let style = Style::default().fg(fg_color).bg(bg_color);

    let popup_area = popup_area(area, 50, 40);
    f.render_widget(Clear, popup_area);

    let lines = vec![
        Line::from(Span::styled(format!("Roll {} over to {}?", from, to), style.add_modifier(Modifier::BOLD))),
        Line::from(""),
        Line::from(Span::styled(format!("{} unfinished task(s) will move", preview.normal_count), style)),
        Line::from(Span::styled(format!("{} recurring task(s) will be copied", preview.recurring_count), style)),
        Line::from(""),
        Line::from(Span::styled("y/Enter: Roll over • n/Esc: Cancel", style)),
    ];

    let paragraph = Paragraph::new(lines)
        .block(Block::default()
            .borders(Borders::ALL)
            .title("Rollover")
            .title_alignment(Alignment::Center)
            .style(style))
        .style(style)
        .wrap(ratatui::widgets::Wrap { trim: true })
        .alignment(Alignment::Center);

    f.render_widget(paragraph, popup_area);
}
