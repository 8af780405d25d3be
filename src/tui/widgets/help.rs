use ratatui::widgets::{Block, Borders, Paragraph, Clear};
use ratatui::style::Style;
use ratatui::Frame;
use ratatui::layout::{Rect, Alignment};
use crate::Config;
use crate::tui::widgets::color::parse_color;
use crate::tui::widgets::popup_area;
use crate::utils::format_key_binding_for_display as key;

pub fn render_help(f: &mut Frame, area: Rect, config: &Config) {
    let active_theme = config.get_active_theme();
    let fg_color = parse_color(&active_theme.fg);
    let bg_color = parse_color(&active_theme.bg);

    let popup_area = popup_area(area, 60, 70);
    f.render_widget(Clear, popup_area);

    let paragraph = Paragraph::new(build_help_text(config))
        .block(Block::default()
            .borders(Borders::ALL)
            .title("Help - Key Bindings")
            .title_alignment(Alignment::Center)
            .style(Style::default().fg(fg_color).bg(bg_color)))
        .style(Style::default().fg(fg_color).bg(bg_color))
        .wrap(ratatui::widgets::Wrap { trim: true });

    f.render_widget(paragraph, popup_area);
}

pub fn build_help_text(config: &Config) -> String {
    let keys = &config.key_bindings;
    let mut text = String::new();

    text.push_str("Weeks:\n");
    text.push_str(&format!("  {} / ←: Previous week\n", key(&keys.previous_week)));
    text.push_str(&format!("  {} / →: Next week\n", key(&keys.next_week)));
    text.push_str(&format!("  {}: Back to the current week\n", key(&keys.current_week)));
    text.push_str(&format!("  {}: Roll unfinished tasks into next week\n", key(&keys.rollover)));
    text.push('\n');

    text.push_str("Tasks:\n");
    text.push_str(&format!("  {} / {}: Move selection (scroll on Report)\n", key(&keys.list_up), key(&keys.list_down)));
    text.push_str(&format!("  {}: Cycle status todo → doing → done\n", key(&keys.cycle_status)));
    text.push_str(&format!("  {} / {}: Progress ±10%\n", key(&keys.progress_up), key(&keys.progress_down)));
    text.push('\n');

    text.push_str("Report:\n");
    text.push_str(&format!("  {}: Switch Week/Report tab\n", key(&keys.switch_tab)));
    text.push_str(&format!("  {}: Copy report Markdown to clipboard\n", key(&keys.copy_report)));
    text.push('\n');

    text.push_str("General:\n");
    text.push_str(&format!("  {}: Cycle theme\n", key(&keys.cycle_theme)));
    text.push_str(&format!("  {}: Show/hide help\n", key(&keys.help)));
    text.push_str(&format!("  {}: Quit\n", key(&keys.quit)));

    text
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn help_lists_configured_keys() {
        let mut config = Config::default();
        config.key_bindings.rollover = "R".to_string();
        let text = build_help_text(&config);
        assert!(text.contains("R: Roll unfinished tasks into next week"));
        assert!(text.contains("q: Quit"));
    }
}
