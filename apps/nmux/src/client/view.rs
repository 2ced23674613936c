use std::io::{self, Stdout};

use crossterm::event::{DisableMouseCapture, EnableMouseCapture};
use crossterm::execute;
use crossterm::terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode};
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use ratatui::buffer::Buffer;
use ratatui::layout::{Position, Rect};
use ratatui::style::{Color, Modifier, Style};

use crate::client::ClientError;
use crate::protocol::attr;
use crate::screen::{Cell, CellSurface, CursorShape, Rgb};
use crate::telemetry::PerfGuard;

fn color(rgb: Rgb) -> Color {
    Color::Rgb(rgb.r(), rgb.g(), rgb.b())
}

fn style(fg: Rgb, bg: Rgb, bits: u8) -> Style {
    let mut modifier = Modifier::empty();
    if bits & attr::BOLD != 0 {
        modifier |= Modifier::BOLD;
    }
    if bits & attr::ITALIC != 0 {
        modifier |= Modifier::ITALIC;
    }
    if bits & (attr::UNDERLINE | attr::UNDERCURL) != 0 {
        modifier |= Modifier::UNDERLINED;
    }
    Style::default().fg(color(fg)).bg(color(bg)).add_modifier(modifier)
}

fn cell_style(cell: &Cell) -> Style {
    style(cell.fg, cell.bg, cell.attr)
}

/// Copies the visible cell buffer into `buf`. Returns where the terminal's
/// own cursor should be shown, which is only the case for the bar shape; the
/// other shapes are drawn as styled cells.
pub fn paint(buf: &mut Buffer, area: Rect, surface: &CellSurface) -> Option<Position> {
    let (cols, rows) = surface.size();
    let width = area.width.min(cols.min(u16::MAX as u32) as u16);
    let height = area.height.min(rows.min(u16::MAX as u32) as u16);
    for y in 0..height {
        for x in 0..width {
            let (Some(source), Some(target)) = (
                surface.cell(y as u32, x as u32),
                buf.cell_mut((area.x + x, area.y + y)),
            ) else {
                continue;
            };
            target.set_char(source.ch).set_style(cell_style(source));
        }
    }

    let glyph = surface.cursor().filter(|_| surface.cursor_visible())?;
    if glyph.col >= width as u32 || glyph.row >= height as u32 {
        return None;
    }
    let position = Position::new(area.x + glyph.col as u16, area.y + glyph.row as u16);
    match glyph.shape {
        CursorShape::Bar => Some(position),
        CursorShape::Block | CursorShape::Underline => {
            let mut glyph_style = style(glyph.fg, glyph.bg, glyph.attr);
            if glyph.shape == CursorShape::Underline {
                glyph_style = glyph_style.add_modifier(Modifier::UNDERLINED);
            }
            if let Some(target) = buf.cell_mut(position) {
                target.set_char(glyph.ch).set_style(glyph_style);
            }
            None
        }
    }
}

/// The local terminal, in raw mode on the alternate screen with mouse
/// reporting enabled.
pub struct TerminalView {
    terminal: Terminal<CrosstermBackend<Stdout>>,
    painted_revision: Option<u64>,
}

impl TerminalView {
    pub fn enter() -> Result<Self, ClientError> {
        enable_raw_mode()?;
        let mut stdout = io::stdout();
        execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
        let mut terminal = Terminal::new(CrosstermBackend::new(stdout))?;
        terminal.hide_cursor()?;
        terminal.clear()?;
        Ok(Self {
            terminal,
            painted_revision: None,
        })
    }

    pub fn size(&self) -> Result<(u16, u16), ClientError> {
        let size = self.terminal.size()?;
        Ok((size.width.max(1), size.height.max(1)))
    }

    /// Repaints when the surface changed since the last call.
    pub fn render(&mut self, surface: &CellSurface) -> Result<(), ClientError> {
        let revision = surface.revision();
        if self.painted_revision == Some(revision) {
            return Ok(());
        }
        let _guard = PerfGuard::new("client_render_tui");
        self.terminal.draw(|frame| {
            let area = frame.area();
            if let Some(position) = paint(frame.buffer_mut(), area, surface) {
                frame.set_cursor_position(position);
            }
        })?;
        self.painted_revision = Some(revision);
        Ok(())
    }

    pub fn leave(mut self) -> Result<(), ClientError> {
        self.terminal.show_cursor()?;
        disable_raw_mode()?;
        execute!(self.terminal.backend_mut(), DisableMouseCapture, LeaveAlternateScreen)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::mode;
    use crate::screen::{PaletteEntry, ScreenModel};

    fn screen(cols: u32, rows: u32) -> ScreenModel<CellSurface> {
        let mut screen = ScreenModel::new(CellSurface::new());
        screen.set_size(cols, rows);
        screen.clear(1, PaletteEntry::from_wire(attr::BOLD, 0xff0000, 0x000010, u32::MAX));
        screen.put(0, "ok");
        screen
    }

    #[test_timeout::timeout]
    fn paints_cells_with_colors_and_block_cursor() {
        let mut screen = screen(4, 2);
        screen.flush(mode::NORMAL, 1, 0, 1, 'k');
        let area = Rect::new(0, 0, 6, 3);
        let mut buf = Buffer::empty(area);
        let cursor = paint(&mut buf, area, screen.surface());
        assert_eq!(cursor, None);

        let first = buf.cell((0, 0)).expect("cell");
        assert_eq!(first.symbol(), "o");
        assert_eq!(first.fg, Color::Rgb(0xff, 0, 0));
        assert_eq!(first.bg, Color::Rgb(0, 0, 0x10));
        assert!(first.modifier.contains(Modifier::BOLD));

        let cursor_cell = buf.cell((1, 0)).expect("cell");
        assert_eq!(cursor_cell.symbol(), "k");
        assert_eq!(cursor_cell.fg, Color::Rgb(0, 0, 0x10));
        assert_eq!(cursor_cell.bg, Color::Rgb(0xff, 0, 0));

        // Outside the remote grid the buffer is left alone.
        assert_eq!(buf.cell((5, 2)).expect("cell").symbol(), " ");
    }

    #[test_timeout::timeout]
    fn bar_cursor_uses_terminal_cursor() {
        let mut screen = screen(4, 2);
        screen.flush(mode::INSERT, 2, 1, 1, ' ');
        let area = Rect::new(0, 0, 4, 2);
        let mut buf = Buffer::empty(area);
        assert_eq!(paint(&mut buf, area, screen.surface()), Some(Position::new(2, 1)));

        screen.begin_message();
        assert_eq!(paint(&mut buf, area, screen.surface()), None);
    }
}
