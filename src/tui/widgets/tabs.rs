use ratatui::widgets::Tabs;
use ratatui::style::{Style, Modifier};
use ratatui::text::{Line, Span};
use ratatui::Frame;
use ratatui::layout::Rect;
use crate::models::YearWeek;
use crate::tui::app::Tab;
use crate::Config;
use crate::tui::widgets::color::{parse_color, get_contrast_text_color};

pub fn render_tabs(f: &mut Frame, area: Rect, current_tab: Tab, week: YearWeek, config: &Config) {
    let active_theme = config.get_active_theme();
    let highlight_bg = parse_color(&active_theme.highlight_bg);
    let fg_color = parse_color(&active_theme.fg);
    let bg_color = parse_color(&active_theme.bg);
    let tab_bg = parse_color(&active_theme.tab_bg);
    let tab_fg = get_contrast_text_color(tab_bg);

    // Padding spans give each tab a box look
    let titles: Vec<Line> = Tab::ALL
        .iter()
        .map(|tab| {
            let label = match tab {
                Tab::Week => format!("{} {}", tab.title(), week.label()),
                Tab::Report => tab.title().to_string(),
            };
            Line::from(vec![
                Span::styled("  ", Style::default().bg(tab_bg)),
                Span::styled(label, Style::default().fg(tab_fg).bg(tab_bg)),
                Span::styled("  ", Style::default().bg(tab_bg)),
            ])
        })
        .collect();

    let tabs = Tabs::new(titles)
        .select(current_tab.index())
        .style(Style::default().fg(fg_color).bg(bg_color))
        .highlight_style(
            Style::default()
                .fg(get_contrast_text_color(highlight_bg))
                .bg(highlight_bg)
                .add_modifier(Modifier::BOLD)
        )
        .divider("  ")
        .padding("", "");

    f.render_widget(tabs, area);
}
