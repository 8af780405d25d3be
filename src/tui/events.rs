use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind};
use crossterm::execute;
use crossterm::terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen, size as terminal_size};
use ratatui::backend::CrosstermBackend;
use ratatui::layout::Rect;
use ratatui::Terminal;
use std::io;
use crate::tui::app::{Mode, PROGRESS_STEP};
use crate::tui::error::TuiError;
use crate::tui::layout::Layout;
use crate::tui::App;
use crate::utils::{parse_key_binding, ParsedKeyBinding};

/// Guard that ensures terminal state is restored even on panic.
/// A terminal left in raw mode or on the alternate screen is unusable.
struct TerminalGuard {
    raw_mode_enabled: bool,
    alternate_screen_enabled: bool,
}

impl TerminalGuard {
    fn new() -> Result<Self, TuiError> {
        enable_raw_mode()?;
        execute!(io::stdout(), EnterAlternateScreen)?;

        Ok(Self {
            raw_mode_enabled: true,
            alternate_screen_enabled: true,
        })
    }

    /// Restore terminal state on normal exit; the guard does nothing on drop afterwards
    fn restore(&mut self) -> Result<(), TuiError> {
        if self.raw_mode_enabled {
            disable_raw_mode()?;
            self.raw_mode_enabled = false;
        }
        if self.alternate_screen_enabled {
            execute!(io::stdout(), LeaveAlternateScreen)?;
            self.alternate_screen_enabled = false;
        }
        Ok(())
    }
}

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        // Already on a cleanup path, errors are ignored
        if self.raw_mode_enabled {
            let _ = disable_raw_mode();
        }
        if self.alternate_screen_enabled {
            let _ = execute!(io::stdout(), LeaveAlternateScreen);
        }
    }
}

pub fn run_event_loop(mut app: App) -> Result<(), TuiError> {
    // Checked before entering the alternate screen so the message stays visible
    let (width, height) = terminal_size()?;
    let min_width_with_border = Layout::MIN_WIDTH + 2;
    let min_height_with_border = Layout::MIN_HEIGHT + 2;

    if width < min_width_with_border || height < min_height_with_border {
        return Err(TuiError::RenderError(format!(
            "Terminal size too small. Current: {}x{}, Minimum required: {}x{}. Please resize your terminal window.",
            width, height, min_width_with_border, min_height_with_border
        )));
    }

    // Bindings are parsed once so a bad config fails before the screen is taken over
    let bindings = Bindings::from_config(&app.config)?;

    let mut guard = TerminalGuard::new()?;
    let backend = CrosstermBackend::new(io::stdout());
    let mut terminal = Terminal::new(backend)?;

    loop {
        app.check_status_message_timeout();

        let size = terminal.size()?;
        let terminal_rect = Rect::new(0, 0, size.width, size.height);
        terminal.draw(|f| {
            let layout = Layout::calculate(terminal_rect);
            crate::tui::render::render(f, &mut app, &layout);
        })?;

        // Only Press events; Windows also reports releases
        if event::poll(std::time::Duration::from_millis(16))? {
            if let Event::Key(key_event) = event::read()? {
                if key_event.kind == KeyEventKind::Press && handle_key_event(&mut app, &bindings, key_event) {
                    break;
                }
            }
        }
    }

    guard.restore()?;

    Ok(())
}

/// Parsed form of the configured key bindings
pub struct Bindings {
    quit: ParsedKeyBinding,
    help: ParsedKeyBinding,
    list_up: ParsedKeyBinding,
    list_down: ParsedKeyBinding,
    previous_week: ParsedKeyBinding,
    next_week: ParsedKeyBinding,
    current_week: ParsedKeyBinding,
    switch_tab: ParsedKeyBinding,
    cycle_status: ParsedKeyBinding,
    progress_up: ParsedKeyBinding,
    progress_down: ParsedKeyBinding,
    rollover: ParsedKeyBinding,
    copy_report: ParsedKeyBinding,
    cycle_theme: ParsedKeyBinding,
}

impl Bindings {
    pub fn from_config(config: &crate::Config) -> Result<Self, TuiError> {
        let keys = &config.key_bindings;
        let parse = |s: &str| parse_key_binding(s).map_err(TuiError::KeyBindingError);
        Ok(Self {
            quit: parse(&keys.quit)?,
            help: parse(&keys.help)?,
            list_up: parse(&keys.list_up)?,
            list_down: parse(&keys.list_down)?,
            previous_week: parse(&keys.previous_week)?,
            next_week: parse(&keys.next_week)?,
            current_week: parse(&keys.current_week)?,
            switch_tab: parse(&keys.switch_tab)?,
            cycle_status: parse(&keys.cycle_status)?,
            progress_up: parse(&keys.progress_up)?,
            progress_down: parse(&keys.progress_down)?,
            rollover: parse(&keys.rollover)?,
            copy_report: parse(&keys.copy_report)?,
            cycle_theme: parse(&keys.cycle_theme)?,
        })
    }
}

/// Returns true when the app should quit
pub fn handle_key_event(app: &mut App, bindings: &Bindings, key_event: KeyEvent) -> bool {
    match app.mode {
        Mode::ConfirmRollover(_) => {
            match key_event.code {
                KeyCode::Char('y') | KeyCode::Char('Y') | KeyCode::Enter => app.confirm_rollover(),
                KeyCode::Char('n') | KeyCode::Char('N') | KeyCode::Esc => app.cancel_rollover(),
                _ => {}
            }
            return false;
        }
        Mode::Help => {
            if key_event.code == KeyCode::Esc || matches_key_event(key_event, &bindings.help) {
                app.toggle_help();
            }
            return false;
        }
        Mode::Normal => {}
    }

    if matches_key_event(key_event, &bindings.quit) {
        return true;
    }

    if matches_key_event(key_event, &bindings.help) {
        app.toggle_help();
    } else if matches_key_event(key_event, &bindings.switch_tab) {
        app.switch_tab(app.current_tab.next());
    } else if matches_key_event(key_event, &bindings.list_up) || key_event.code == KeyCode::Up {
        app.move_selection_up();
    } else if matches_key_event(key_event, &bindings.list_down) || key_event.code == KeyCode::Down {
        app.move_selection_down();
    } else if matches_key_event(key_event, &bindings.previous_week) || key_event.code == KeyCode::Left {
        app.previous_week();
    } else if matches_key_event(key_event, &bindings.next_week) || key_event.code == KeyCode::Right {
        app.next_week();
    } else if matches_key_event(key_event, &bindings.current_week) {
        app.current_week();
    } else if matches_key_event(key_event, &bindings.cycle_status) {
        app.cycle_selected_status();
    } else if matches_key_event(key_event, &bindings.progress_up) {
        app.adjust_selected_progress(PROGRESS_STEP);
    } else if matches_key_event(key_event, &bindings.progress_down) {
        app.adjust_selected_progress(-PROGRESS_STEP);
    } else if matches_key_event(key_event, &bindings.rollover) {
        app.request_rollover();
    } else if matches_key_event(key_event, &bindings.copy_report) {
        app.copy_report();
    } else if matches_key_event(key_event, &bindings.cycle_theme) {
        app.cycle_theme();
    }

    false
}

fn matches_key_event(key_event: KeyEvent, binding: &ParsedKeyBinding) -> bool {
    // Ctrl on Windows/Linux, Option/Alt on macOS
    let has_primary_mod = crate::utils::has_primary_modifier(key_event.modifiers);
    if binding.requires_ctrl != has_primary_mod {
        return false;
    }

    binding.key_code == key_event.code
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossterm::event::KeyModifiers;

    fn press(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    #[test]
    fn default_bindings_parse() {
        assert!(Bindings::from_config(&crate::Config::default()).is_ok());
    }

    #[test]
    fn bad_binding_is_reported() {
        let mut config = crate::Config::default();
        config.key_bindings.rollover = "Hyper+r".to_string();
        assert!(matches!(Bindings::from_config(&config), Err(TuiError::KeyBindingError(_))));
    }

    #[test]
    fn ctrl_binding_requires_the_modifier() {
        let binding = parse_key_binding("Ctrl+r").unwrap();
        assert!(!matches_key_event(press(KeyCode::Char('r')), &binding));
        assert!(matches_key_event(KeyEvent::new(KeyCode::Char('r'), KeyModifiers::CONTROL), &binding));
        let plain = parse_key_binding("r").unwrap();
        assert!(matches_key_event(press(KeyCode::Char('r')), &plain));
    }
}
