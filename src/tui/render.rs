use ratatui::Frame;
use ratatui::widgets::{Block, Borders};
use ratatui::style::Style;
use crate::tui::app::{Mode, Tab};
use crate::tui::{App, Layout};
use crate::tui::widgets::{
    color::parse_color,
    confirm_rollover::render_confirm_rollover,
    help::render_help,
    report_view::render_report_view,
    status_bar::render_status_bar,
    tabs::render_tabs,
    week_board::render_week_board,
};
use crate::utils::format_key_binding_for_display as key;
use crate::week::next_week;

pub fn render(f: &mut Frame, app: &mut App, layout: &Layout) {
    let active_theme = app.config.get_active_theme();
    let fg_color = parse_color(&active_theme.fg);
    let bg_color = parse_color(&active_theme.bg);
    let outer_block = Block::default()
        .borders(Borders::ALL)
        .title("WKR")
        .title_alignment(ratatui::layout::Alignment::Center)
        .style(Style::default().fg(fg_color).bg(bg_color));
    f.render_widget(outer_block, f.area());

    render_tabs(f, layout.tabs_area, app.current_tab, app.week, &app.config);

    match app.current_tab {
        Tab::Week => {
            render_week_board(f, layout.main_area, app.week, &app.tasks, &mut app.list_state, &app.config);
        }
        Tab::Report => {
            let title = format!("{} 周报", app.week.label());
            app.report_scroll = render_report_view(
                f,
                layout.main_area,
                &app.report_markdown,
                &title,
                &app.config,
                app.report_scroll,
            );
        }
    }

    // Popups go over the normal content
    match app.mode {
        Mode::Help => render_help(f, f.area(), &app.config),
        Mode::ConfirmRollover(preview) => {
            render_confirm_rollover(f, f.area(), app.week, next_week(app.week), &preview, &app.config);
        }
        Mode::Normal => {}
    }

    let key_hints = get_key_hints(app);
    render_status_bar(f, layout.status_area, app.status.message.as_ref(), &key_hints, &app.config);
}

fn get_key_hints(app: &App) -> Vec<String> {
    let keys = &app.config.key_bindings;
    match app.mode {
        Mode::Help => vec![format!("Esc or {}: Exit help", key(&keys.help))],
        Mode::ConfirmRollover(_) => vec!["y/Enter: Roll over".to_string(), "n/Esc: Cancel".to_string()],
        Mode::Normal => {
            let mut hints = vec![
                format!("{}: Quit", key(&keys.quit)),
                format!("{}/{}: Week", key(&keys.previous_week), key(&keys.next_week)),
                format!("{}: Tab", key(&keys.switch_tab)),
            ];
            match app.current_tab {
                Tab::Week => {
                    hints.push(format!("{}: Status", key(&keys.cycle_status)));
                    hints.push(format!("{}/{}: Progress", key(&keys.progress_up), key(&keys.progress_down)));
                    hints.push(format!("{}: Rollover", key(&keys.rollover)));
                }
                Tab::Report => hints.push(format!("{}: Copy", key(&keys.copy_report))),
            }
            hints.push(format!("{}: Help", key(&keys.help)));
            hints
        }
    }
}
