use std::collections::TryReserveError;

use crate::screen::palette::{Brush, DEFAULT_BACKGROUND, DEFAULT_FOREGROUND, PaletteEntry, Rgb, Tile};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Cell {
    pub ch: char,
    pub fg: Rgb,
    pub bg: Rgb,
    pub sp: Rgb,
    pub attr: u8,
}

impl Cell {
    pub const fn blank() -> Self {
        Self {
            ch: ' ',
            fg: DEFAULT_FOREGROUND,
            bg: DEFAULT_BACKGROUND,
            sp: DEFAULT_FOREGROUND,
            attr: 0,
        }
    }

    fn filled(bg: Rgb) -> Self {
        Self { bg, ..Self::blank() }
    }
}

impl Default for Cell {
    fn default() -> Self {
        Self::blank()
    }
}

/// Where a run of cells starts.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Span {
    /// Linear cell index, row-major.
    pub index: u32,
    pub row: u32,
    pub col: u32,
    /// Horizontal decoration phase in cells. Pixel renderers multiply by the
    /// cell width so wavy underlines stay continuous across runs.
    pub phase: u32,
}

/// Inclusive cell rectangle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Region {
    pub top: u32,
    pub bottom: u32,
    pub left: u32,
    pub right: u32,
}

impl Region {
    pub fn width(&self) -> usize {
        (self.right - self.left + 1) as usize
    }

    pub fn height(&self) -> usize {
        (self.bottom - self.top + 1) as usize
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum CursorShape {
    #[default]
    Block,
    /// Insert mode.
    Bar,
    /// Replace mode.
    Underline,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CursorGlyph {
    pub col: u32,
    pub row: u32,
    pub ch: char,
    pub fg: Rgb,
    pub bg: Rgb,
    pub sp: Rgb,
    pub attr: u8,
    pub shape: CursorShape,
}

/// Rendering collaborator driven by the screen model.
///
/// Drawing goes to a pending buffer; nothing becomes visible until
/// [`Surface::flush`]. The cursor lives on its own overlay and is not part of
/// either buffer.
pub trait Surface {
    /// Resizes both buffers. Prior contents need not survive. On error the
    /// surface keeps its previous size.
    fn resize(&mut self, cols: u32, rows: u32) -> Result<(), TryReserveError>;

    fn palette_updated(&mut self, _id: u32, _entry: &PaletteEntry) {}

    fn draw_text(&mut self, span: Span, text: &str, brush: &Brush);

    fn draw_tile(&mut self, span: Span, tile: &Tile, count: u32);

    /// Moves `region` content up by `delta` rows (down when negative); rows
    /// exposed by the move are painted with `fill`.
    fn scroll(&mut self, region: Region, delta: i32, fill: Rgb);

    fn clear(&mut self, brush: &Brush);

    fn flush(&mut self);

    fn place_cursor(&mut self, glyph: &CursorGlyph);

    fn set_cursor_visible(&mut self, visible: bool);
}

/// Double-buffered cell grid. Used headless in tests and painted into the
/// local terminal by the client view.
#[derive(Clone, Debug, Default)]
pub struct CellSurface {
    cols: u32,
    rows: u32,
    pending: Vec<Cell>,
    visible: Vec<Cell>,
    scratch: Vec<Cell>,
    cursor: Option<CursorGlyph>,
    cursor_visible: bool,
    revision: u64,
    flushes: u64,
}

impl CellSurface {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn size(&self) -> (u32, u32) {
        (self.cols, self.rows)
    }

    /// Bumped whenever something visible changes.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn flush_count(&self) -> u64 {
        self.flushes
    }

    pub fn cell(&self, row: u32, col: u32) -> Option<&Cell> {
        self.offset(row, col).and_then(|idx| self.visible.get(idx))
    }

    pub fn pending_cell(&self, row: u32, col: u32) -> Option<&Cell> {
        self.offset(row, col).and_then(|idx| self.pending.get(idx))
    }

    pub fn row_text(&self, row: u32) -> String {
        if row >= self.rows {
            return String::new();
        }
        let start = (row * self.cols) as usize;
        self.visible[start..start + self.cols as usize]
            .iter()
            .map(|cell| cell.ch)
            .collect()
    }

    pub fn cursor(&self) -> Option<&CursorGlyph> {
        self.cursor.as_ref()
    }

    pub fn cursor_visible(&self) -> bool {
        self.cursor_visible && self.cursor.is_some()
    }

    fn offset(&self, row: u32, col: u32) -> Option<usize> {
        (row < self.rows && col < self.cols).then(|| (row * self.cols + col) as usize)
    }
}

fn blank_cells(len: usize) -> Result<Vec<Cell>, TryReserveError> {
    let mut cells = Vec::new();
    cells.try_reserve_exact(len)?;
    cells.resize(len, Cell::blank());
    Ok(cells)
}

impl Surface for CellSurface {
    fn resize(&mut self, cols: u32, rows: u32) -> Result<(), TryReserveError> {
        let len = (cols as usize).saturating_mul(rows as usize);
        let pending = blank_cells(len)?;
        let visible = blank_cells(len)?;
        self.cols = cols;
        self.rows = rows;
        self.pending = pending;
        self.visible = visible;
        self.scratch.clear();
        self.revision += 1;
        Ok(())
    }

    fn draw_text(&mut self, span: Span, text: &str, brush: &Brush) {
        let start = span.index as usize;
        for (slot, ch) in self.pending.iter_mut().skip(start).zip(text.chars()) {
            *slot = brush.cell(ch);
        }
    }

    fn draw_tile(&mut self, span: Span, tile: &Tile, count: u32) {
        let start = (span.index as usize).min(self.pending.len());
        let end = start.saturating_add(count as usize).min(self.pending.len());
        self.pending[start..end].fill(tile.cell);
    }

    fn scroll(&mut self, region: Region, delta: i32, fill: Rgb) {
        if region.top > region.bottom
            || region.left > region.right
            || region.bottom >= self.rows
            || region.right >= self.cols
        {
            return;
        }
        let (width, height) = (region.width(), region.height());
        let cols = self.cols as usize;
        self.scratch.clear();
        self.scratch.resize(width * height, Cell::filled(fill));
        for row in 0..height {
            let source = row as i64 + delta as i64;
            if source < 0 || source >= height as i64 {
                continue;
            }
            let from = (region.top as usize + source as usize) * cols + region.left as usize;
            self.scratch[row * width..(row + 1) * width]
                .copy_from_slice(&self.pending[from..from + width]);
        }
        for row in 0..height {
            let to = (region.top as usize + row) * cols + region.left as usize;
            self.pending[to..to + width].copy_from_slice(&self.scratch[row * width..(row + 1) * width]);
        }
    }

    fn clear(&mut self, brush: &Brush) {
        let cell = Cell {
            ch: ' ',
            fg: brush.fg,
            bg: brush.bg,
            sp: brush.sp,
            attr: 0,
        };
        self.pending.fill(cell);
    }

    fn flush(&mut self) {
        self.visible.clone_from(&self.pending);
        self.flushes += 1;
        self.revision += 1;
    }

    fn place_cursor(&mut self, glyph: &CursorGlyph) {
        self.cursor = Some(*glyph);
        self.revision += 1;
    }

    fn set_cursor_visible(&mut self, visible: bool) {
        if self.cursor_visible != visible {
            self.cursor_visible = visible;
            self.revision += 1;
        }
    }
}
