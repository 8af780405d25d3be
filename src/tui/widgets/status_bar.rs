use ratatui::widgets::Paragraph;
use ratatui::style::{Style, Modifier};
use ratatui::Frame;
use ratatui::layout::Rect;
use crate::Config;
use crate::tui::widgets::color::{parse_color, get_contrast_text_color};

const SEPARATOR: &str = " • ";
const ELLIPSIS: &str = "...";

/// Join as many hints as fit in `max_width`, ending with an ellipsis when some are dropped
pub fn fit_key_hints(key_hints: &[String], max_width: usize) -> String {
    let mut hints_text = String::new();
    for (i, hint) in key_hints.iter().enumerate() {
        let current_len = hints_text.chars().count();
        let would_be_len = if i == 0 {
            hint.chars().count()
        } else {
            current_len + SEPARATOR.chars().count() + hint.chars().count()
        };

        if would_be_len > max_width {
            if i == 0 || current_len + ELLIPSIS.len() > max_width {
                let source = if i == 0 { hint.as_str() } else { hints_text.as_str() };
                hints_text = source.chars().take(max_width.saturating_sub(ELLIPSIS.len())).collect();
            }
            hints_text.push_str(ELLIPSIS);
            break;
        }

        if i > 0 {
            hints_text.push_str(SEPARATOR);
        }
        hints_text.push_str(hint);
    }
    hints_text
}

pub fn render_status_bar(
    f: &mut Frame,
    area: Rect,
    message: Option<&String>,
    key_hints: &[String],
    config: &Config,
) {
    let active_theme = config.get_active_theme();
    let fg_color = parse_color(&active_theme.fg);
    let bg_color = parse_color(&active_theme.bg);
    let highlight_bg = parse_color(&active_theme.highlight_bg);
    let max_width = area.width as usize;

    let (content, style) = match message {
        // Messages stand out on the highlight color
        Some(msg) => {
            let mut content = msg.clone();
            if content.chars().count() > max_width {
                content = content.chars().take(max_width.saturating_sub(3)).collect::<String>() + ELLIPSIS;
            }
            let msg_fg = get_contrast_text_color(highlight_bg);
            (content, Style::default().fg(msg_fg).bg(highlight_bg).add_modifier(Modifier::BOLD))
        }
        None => (fit_key_hints(key_hints, max_width), Style::default().fg(fg_color).bg(bg_color)),
    };

    let paragraph = Paragraph::new(content)
        .style(style)
        .wrap(ratatui::widgets::Wrap { trim: true });

    f.render_widget(paragraph, area);
}
