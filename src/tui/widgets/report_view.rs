use ratatui::widgets::{Block, Borders, Paragraph, Scrollbar, ScrollbarOrientation, ScrollbarState};
use ratatui::style::Style;
use ratatui::Frame;
use ratatui::layout::{Rect, Layout as RatLayout, Direction, Constraint};
use ratatui::text::{Text, Line, Span};
use crate::Config;
use crate::tui::widgets::color::parse_color;
use ratskin::RatSkin;
use termimad::minimad::Text as MinimadText;

/// Markdown to styled lines, wrapped at `width`
pub fn markdown_lines(markdown: &str, width: u16) -> Vec<Line<'static>> {
    RatSkin::default()
        .parse(MinimadText::from(markdown), width)
        .into_iter()
        .map(|line| {
            let spans: Vec<Span> = line
                .spans
                .into_iter()
                .map(|span| Span::styled(span.content.to_string(), span.style))
                .collect();
            Line::from(spans)
        })
        .collect()
}

/// Render the report and return the scroll offset actually used, clamped to the content
pub fn render_report_view(f: &mut Frame, area: Rect, markdown: &str, title: &str, config: &Config, scroll_offset: usize) -> usize {
    if area.width < 2 || area.height < 2 {
        return scroll_offset;
    }

    let horizontal = RatLayout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Min(1),
            Constraint::Length(1), // Scrollbar
        ])
        .split(area);
    let content_area = horizontal[0];
    let scrollbar_area = horizontal[1];

    let viewport_height = area.height.saturating_sub(2) as usize;
    let text_width = content_area.width.saturating_sub(2);
    let lines = markdown_lines(markdown, text_width);

    let total_lines = lines.len();
    let max_scroll = total_lines.saturating_sub(viewport_height);
    let scroll_offset = scroll_offset.min(max_scroll);
    let end_line = (scroll_offset + viewport_height).min(total_lines);
    let visible_text = Text::from(lines[scroll_offset.min(end_line)..end_line].to_vec());

    // Keep indentation of nested lists
    let base_style = Style::default().fg(parse_color(&config.get_active_theme().fg));
    let paragraph = Paragraph::new(visible_text)
        .block(Block::default().borders(Borders::ALL).title(title.to_string()))
        .style(base_style)
        .wrap(ratatui::widgets::Wrap { trim: false });
    f.render_widget(paragraph, content_area);

    if total_lines > viewport_height {
        let scrollbar_inner_area = Rect::new(
            scrollbar_area.x,
            content_area.y + 1,
            scrollbar_area.width,
            content_area.height.saturating_sub(2),
        );
        let mut scrollbar_state = ScrollbarState::new(total_lines)
            .viewport_content_length(viewport_height)
            .position(scroll_offset);
        let scrollbar = Scrollbar::default()
            .orientation(ScrollbarOrientation::VerticalRight)
            .begin_symbol(Some("↑"))
            .end_symbol(Some("↓"))
            .track_symbol(Some("│"))
            .thumb_symbol("█");
        f.render_stateful_widget(scrollbar, scrollbar_inner_area, &mut scrollbar_state);
    }

    scroll_offset
}
