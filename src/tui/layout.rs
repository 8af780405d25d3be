use ratatui::layout::{Rect, Layout as RatLayout, Direction, Constraint};

pub struct Layout {
    pub inner_area: Rect, // Inside the outer border
    pub tabs_area: Rect,
    pub main_area: Rect,
    pub status_area: Rect,
}

impl Layout {
    /// Minimum inner terminal dimensions.
    /// Width fits a task line with its priority and progress; height is tabs, a
    /// bordered list with a few rows, and the status bar.
    pub const MIN_WIDTH: u16 = 40;
    pub const MIN_HEIGHT: u16 = 8;

    pub fn calculate(size: Rect) -> Self {
        let width = size.width.max(Self::MIN_WIDTH + 2);
        let height = size.height.max(Self::MIN_HEIGHT + 2);
        let size = Rect::new(size.x, size.y, width, height);

        let inner_area = Rect::new(
            size.x + 1,
            size.y + 1,
            size.width.saturating_sub(2),
            size.height.saturating_sub(2),
        );

        // Tabs render in 1 line without a block; the content below has borders
        let vertical = RatLayout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(1), // Tabs
                Constraint::Min(1),    // Week board or report
                Constraint::Length(1), // Status
            ])
            .split(inner_area);

        Self {
            inner_area,
            tabs_area: vertical[0],
            main_area: vertical[1],
            status_area: vertical[2],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_inside_the_border() {
        let layout = Layout::calculate(Rect::new(0, 0, 80, 24));
        assert_eq!(layout.inner_area, Rect::new(1, 1, 78, 22));
        assert_eq!(layout.tabs_area.height, 1);
        assert_eq!(layout.status_area.height, 1);
        assert_eq!(layout.main_area.height, 20);
    }

    #[test]
    fn small_terminals_are_padded_to_the_minimum() {
        let layout = Layout::calculate(Rect::new(0, 0, 10, 5));
        assert_eq!(layout.inner_area.width, Layout::MIN_WIDTH);
        assert_eq!(layout.inner_area.height, Layout::MIN_HEIGHT);
    }
}
