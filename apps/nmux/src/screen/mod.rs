//! Client-side screen state: the cell grid dimensions, the active palette,
//! the current brush, and the cursor with its blink schedule.
//!
//! The model owns no pixels. Every drawing effect is forwarded to a
//! [`Surface`]; the model only decides what to draw and where.

pub mod palette;
pub mod surface;

use tracing::{debug, trace, warn};

use crate::protocol::{Operation, PaletteUpdate, mode};
use crate::timer::{Fire, TimerMultiplexer};

pub use palette::{Brush, Color, Palette, PaletteEntry, Rgb, Tile, TileCache, TileKey};
pub use surface::{Cell, CellSurface, CursorGlyph, CursorShape, Region, Span, Surface};

const CURSOR_TASK: &str = "cursor";

/// Largest grid a host may request. Bigger resizes are refused.
pub const MAX_GRID_CELLS: u64 = 1 << 22;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlinkTiming {
    pub delay_ms: u64,
    pub interval_ms: u64,
}

pub const NORMAL_BLINK: BlinkTiming = BlinkTiming {
    delay_ms: 1_000,
    interval_ms: 500,
};

pub const INSERT_BLINK: BlinkTiming = BlinkTiming {
    delay_ms: 500,
    interval_ms: 350,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum CursorMode {
    #[default]
    Normal,
    Insert,
    Replace,
}

impl CursorMode {
    pub fn from_bits(bits: u32) -> Self {
        if bits & mode::INSERT != 0 {
            CursorMode::Insert
        } else if bits & mode::REPLACE != 0 {
            CursorMode::Replace
        } else {
            CursorMode::Normal
        }
    }

    pub fn shape(self) -> CursorShape {
        match self {
            CursorMode::Normal => CursorShape::Block,
            CursorMode::Insert => CursorShape::Bar,
            CursorMode::Replace => CursorShape::Underline,
        }
    }

    pub fn blink(self) -> BlinkTiming {
        match self {
            CursorMode::Normal => NORMAL_BLINK,
            CursorMode::Insert | CursorMode::Replace => INSERT_BLINK,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CursorState {
    pub x: u32,
    pub y: u32,
    pub mode: CursorMode,
    pub mode_bits: u32,
    pub palette_id: u32,
    pub ch: char,
    pub blink_delay_ms: u64,
    pub blink_interval_ms: u64,
    pub visible: bool,
    /// Set once the first flush has positioned the cursor.
    pub placed: bool,
}

/// What the local pointer is doing. Blinking is paused while a button is
/// held so the cursor does not flicker under a drag.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum PointerActivity {
    #[default]
    Idle,
    Pressed,
    Dragging,
    Released,
    Wheel,
}

impl PointerActivity {
    fn holds_button(self) -> bool {
        matches!(self, PointerActivity::Pressed | PointerActivity::Dragging)
    }
}

pub struct ScreenModel<S: Surface> {
    surface: S,
    cols: u32,
    rows: u32,
    palette: Palette,
    brush: Brush,
    tiles: TileCache,
    cursor: CursorState,
    timers: TimerMultiplexer<CursorState>,
    pointer: PointerActivity,
}

impl<S: Surface> ScreenModel<S> {
    pub fn new(surface: S) -> Self {
        Self {
            surface,
            cols: 0,
            rows: 0,
            palette: Palette::default(),
            brush: Brush::default(),
            tiles: TileCache::default(),
            cursor: CursorState::default(),
            timers: TimerMultiplexer::new(),
            pointer: PointerActivity::Idle,
        }
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    pub fn surface_mut(&mut self) -> &mut S {
        &mut self.surface
    }

    pub fn size(&self) -> (u32, u32) {
        (self.cols, self.rows)
    }

    pub fn palette(&self) -> &Palette {
        &self.palette
    }

    pub fn brush(&self) -> &Brush {
        &self.brush
    }

    pub fn tiles(&self) -> &TileCache {
        &self.tiles
    }

    pub fn cursor(&self) -> &CursorState {
        &self.cursor
    }

    pub fn blink_scheduled(&self) -> bool {
        self.timers.contains(CURSOR_TASK)
    }

    pub fn pointer(&self) -> PointerActivity {
        self.pointer
    }

    /// Called once per inbound message, before any of its operations.
    pub fn begin_message(&mut self) {
        self.hide_cursor();
    }

    pub fn apply(&mut self, op: &Operation) {
        match op {
            Operation::Resize { cols, rows } => self.set_size(*cols, *rows),
            Operation::SetPalette { entries } => self.set_palette(entries),
            Operation::SetStyle { id } => self.set_style(*id),
            Operation::Put { index, text } => self.put(*index, text),
            Operation::PutRepeated { index, ch, count } => self.put_repeated(*index, *ch, *count),
            Operation::Scroll {
                fill,
                delta,
                top,
                bottom,
                left,
                right,
            } => self.scroll(
                Region {
                    top: *top,
                    bottom: *bottom,
                    left: *left,
                    right: *right,
                },
                *delta,
                *fill,
            ),
            Operation::Clear {
                id,
                attr,
                fg,
                bg,
                sp,
            } => self.clear(*id, PaletteEntry::from_wire(*attr, *fg, *bg, *sp)),
            Operation::Flush { mode, x, y, id, ch } => self.flush(*mode, *x, *y, *id, *ch),
            Operation::Log { .. } | Operation::Unknown { .. } => {}
        }
    }

    pub fn set_size(&mut self, cols: u32, rows: u32) {
        if (cols, rows) == (self.cols, self.rows) {
            return;
        }
        if u64::from(cols) * u64::from(rows) > MAX_GRID_CELLS {
            warn!(target = "client::screen", cols, rows, "refusing oversized grid");
            return;
        }
        if let Err(err) = self.surface.resize(cols, rows) {
            warn!(target = "client::screen", cols, rows, error = %err, "grid allocation failed");
            return;
        }
        debug!(target = "client::screen", cols, rows, "grid resized");
        self.cols = cols;
        self.rows = rows;
    }

    pub fn set_palette(&mut self, entries: &[PaletteUpdate]) {
        for update in entries {
            let entry = PaletteEntry::from_wire(update.attr, update.fg, update.bg, update.sp);
            self.palette.insert(update.id, entry);
            self.surface.palette_updated(update.id, &entry);
        }
    }

    pub fn set_style(&mut self, id: u32) {
        match self.palette.get(id) {
            Some(entry) => self.brush = Brush::from(entry),
            None => debug!(target = "client::screen", id, "style references unknown palette id"),
        }
    }

    fn span(&self, index: u32) -> Option<Span> {
        if self.cols == 0 || index >= self.cols.saturating_mul(self.rows) {
            trace!(target = "client::screen", index, "put outside the grid");
            return None;
        }
        let col = index % self.cols;
        Some(Span {
            index,
            row: index / self.cols,
            col,
            phase: col,
        })
    }

    pub fn put(&mut self, index: u32, text: &str) {
        if let Some(span) = self.span(index) {
            self.surface.draw_text(span, text, &self.brush);
        }
    }

    pub fn put_repeated(&mut self, index: u32, ch: char, count: u32) {
        if count == 0 {
            return;
        }
        if let Some(span) = self.span(index) {
            let tile = self.tiles.tile(ch, &self.brush);
            self.surface.draw_tile(span, &tile, count);
        }
    }

    /// Positive `delta` moves content up. The region is clamped to the grid;
    /// an empty intersection is ignored.
    pub fn scroll(&mut self, region: Region, delta: i16, fill: u32) {
        if self.cols == 0 || self.rows == 0 {
            return;
        }
        let region = Region {
            top: region.top,
            bottom: region.bottom.min(self.rows - 1),
            left: region.left,
            right: region.right.min(self.cols - 1),
        };
        if region.top > region.bottom || region.left > region.right {
            debug!(target = "client::screen", ?region, "scroll region outside the grid");
            return;
        }
        self.hide_cursor();
        self.surface.scroll(region, delta as i32, Rgb(fill & 0xff_ff_ff));
    }

    /// Resets the palette to the single given entry and paints the whole
    /// grid with its background.
    pub fn clear(&mut self, id: u32, entry: PaletteEntry) {
        self.palette.clear();
        self.tiles.clear();
        self.palette.insert(id, entry);
        self.surface.palette_updated(id, &entry);
        self.brush = Brush::from(&entry);
        self.surface.clear(&self.brush);
    }

    pub fn flush(&mut self, mode_bits: u32, x: u32, y: u32, id: u32, ch: char) {
        self.surface.flush();

        let mode = CursorMode::from_bits(mode_bits);
        let brush = self.palette.get(id).map(Brush::from).unwrap_or(self.brush);
        let (fg, bg) = match mode {
            CursorMode::Normal => (brush.bg, brush.fg),
            CursorMode::Insert | CursorMode::Replace => (brush.fg, brush.bg),
        };
        let timing = mode.blink();
        self.cursor = CursorState {
            x,
            y,
            mode,
            mode_bits,
            palette_id: id,
            ch,
            blink_delay_ms: timing.delay_ms,
            blink_interval_ms: timing.interval_ms,
            visible: self.cursor.visible,
            placed: true,
        };
        self.surface.place_cursor(&CursorGlyph {
            col: x,
            row: y,
            ch,
            fg,
            bg,
            sp: brush.sp,
            attr: brush.attr,
            shape: mode.shape(),
        });
        self.show_cursor();
    }

    /// Advances the blink schedule to the frame time `now_ms`.
    pub fn tick(&mut self, now_ms: u64) {
        let before = self.cursor.visible;
        self.timers.tick(&mut self.cursor, now_ms);
        if self.cursor.visible != before {
            self.surface.set_cursor_visible(self.cursor.visible);
        }
    }

    pub fn pointer_event(&mut self, activity: PointerActivity) {
        self.pointer = activity;
        match activity {
            PointerActivity::Pressed | PointerActivity::Dragging => {
                self.timers.remove(CURSOR_TASK);
            }
            // Only a Flush shows the cursor. Release resumes blinking if
            // one already has.
            PointerActivity::Released => {
                if self.cursor.placed && self.cursor.visible {
                    self.schedule_blink();
                }
            }
            PointerActivity::Idle | PointerActivity::Wheel => {}
        }
    }

    fn hide_cursor(&mut self) {
        self.timers.remove(CURSOR_TASK);
        self.cursor.visible = false;
        self.surface.set_cursor_visible(false);
    }

    fn show_cursor(&mut self) {
        self.cursor.visible = true;
        self.surface.set_cursor_visible(true);
        self.schedule_blink();
    }

    fn schedule_blink(&mut self) {
        if self.pointer.holds_button() {
            return;
        }
        self.timers.add(
            CURSOR_TASK,
            |cursor: &mut CursorState, fire: Fire| cursor.visible = fire.counter % 2 == 0,
            self.cursor.blink_interval_ms,
            Some(self.cursor.blink_delay_ms),
            None,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{attr, mode};

    fn model(cols: u32, rows: u32) -> ScreenModel<CellSurface> {
        let mut model = ScreenModel::new(CellSurface::new());
        model.set_size(cols, rows);
        model
    }

    fn visible_text(model: &ScreenModel<CellSurface>, row: u32) -> String {
        model.surface().row_text(row)
    }

    #[test_timeout::timeout]
    fn put_uses_row_major_addressing() {
        let mut model = model(10, 4);
        model.put(23, "x");
        model.flush(mode::NORMAL, 0, 0, 0, ' ');
        assert_eq!(model.surface().cell(2, 3).map(|c| c.ch), Some('x'));
        assert_eq!(visible_text(&model, 2), "   x      ");
    }

    #[test_timeout::timeout]
    fn put_outside_grid_is_ignored() {
        let mut model = model(4, 2);
        model.put(8, "zz");
        model.put_repeated(100, 'q', 3);
        model.flush(mode::NORMAL, 0, 0, 0, ' ');
        assert_eq!(visible_text(&model, 0), "    ");
        assert_eq!(visible_text(&model, 1), "    ");
    }

    #[test_timeout::timeout]
    fn resize_to_same_size_keeps_contents() {
        let mut model = model(4, 2);
        model.put(0, "ab");
        model.flush(mode::NORMAL, 0, 0, 0, ' ');
        model.set_size(4, 2);
        assert_eq!(visible_text(&model, 0), "ab  ");
        model.set_size(5, 2);
        assert_eq!(visible_text(&model, 0), "     ");
    }

    #[test_timeout::timeout]
    fn style_selects_palette_entry_and_ignores_unknown_ids() {
        let mut model = model(4, 1);
        model.set_palette(&[PaletteUpdate {
            id: 3,
            attr: attr::REVERSE,
            fg: 0x00ff00,
            bg: 0x000080,
            sp: u32::MAX,
        }]);
        model.set_style(3);
        assert_eq!(model.brush().fg, Rgb(0x000080));
        assert_eq!(model.brush().bg, Rgb(0x00ff00));

        model.set_style(99);
        assert_eq!(model.brush().fg, Rgb(0x000080));
    }

    #[test_timeout::timeout]
    fn clear_resets_palette_and_paints_background() {
        let mut model = model(3, 2);
        model.set_palette(&[PaletteUpdate {
            id: 7,
            attr: 0,
            fg: 0x111111,
            bg: 0x222222,
            sp: 0x333333,
        }]);
        model.put_repeated(0, ' ', 2);
        assert_eq!(model.tiles().len(), 1);

        model.clear(1, PaletteEntry::from_wire(0, 0xffffff, 0x0000ff, 0xffffff));
        assert_eq!(model.palette().len(), 1);
        assert!(model.tiles().is_empty());
        model.set_style(7);
        assert_eq!(model.brush().bg, Rgb(0x0000ff));

        model.flush(mode::NORMAL, 0, 0, 1, ' ');
        assert!(
            (0..2).all(|row| (0..3).all(|col| model.surface().cell(row, col).map(|c| c.bg) == Some(Rgb(0x0000ff))))
        );
    }

    #[test_timeout::timeout]
    fn scroll_is_clamped_and_hides_cursor() {
        let mut model = model(3, 4);
        for row in 0..4 {
            let text: String = std::iter::repeat_n(char::from(b'a' + row as u8), 3).collect();
            model.put(row * 3, &text);
        }
        model.flush(mode::NORMAL, 0, 0, 0, ' ');
        assert!(model.cursor().visible);

        model.scroll(
            Region {
                top: 1,
                bottom: 99,
                left: 0,
                right: 99,
            },
            1,
            0x00ff00,
        );
        assert!(!model.cursor().visible);
        assert!(!model.blink_scheduled());
        model.flush(mode::NORMAL, 0, 0, 0, ' ');
        let rows: Vec<String> = (0..4).map(|r| visible_text(&model, r)).collect();
        assert_eq!(rows, vec!["aaa", "ccc", "ddd", "   "]);
        assert_eq!(model.surface().cell(3, 0).map(|c| c.bg), Some(Rgb(0x00ff00)));

        model.scroll(
            Region {
                top: 9,
                bottom: 12,
                left: 0,
                right: 2,
            },
            1,
            0,
        );
        assert!(model.cursor().visible);
    }

    #[test_timeout::timeout]
    fn flush_places_swapped_block_cursor_in_normal_mode() {
        let mut model = model(4, 2);
        model.clear(1, PaletteEntry::from_wire(0, 0xffffff, 0x000000, 0xffffff));
        model.flush(mode::NORMAL, 2, 1, 1, 'k');
        let glyph = model.surface().cursor().copied().expect("cursor placed");
        assert_eq!((glyph.col, glyph.row, glyph.ch), (2, 1, 'k'));
        assert_eq!(glyph.fg, Rgb(0x000000));
        assert_eq!(glyph.bg, Rgb(0xffffff));
        assert_eq!(glyph.shape, CursorShape::Block);
        assert!(model.surface().cursor_visible());
        assert_eq!(model.cursor().blink_delay_ms, 1_000);

        model.flush(mode::INSERT, 0, 0, 42, ' ');
        let glyph = model.surface().cursor().copied().expect("cursor placed");
        assert_eq!(glyph.shape, CursorShape::Bar);
        assert_eq!(glyph.fg, Rgb(0xffffff));
        assert_eq!(model.cursor().blink_interval_ms, 350);
    }

    #[test_timeout::timeout]
    fn cursor_blinks_after_delay() {
        let mut model = model(4, 2);
        model.tick(100);
        model.flush(mode::NORMAL, 0, 0, 0, ' ');

        model.tick(1_099);
        assert!(model.cursor().visible);
        model.tick(1_100);
        assert!(!model.cursor().visible);
        assert!(!model.surface().cursor_visible());
        model.tick(1_300);
        assert!(!model.cursor().visible);
        model.tick(1_600);
        assert!(model.cursor().visible);
        assert!(model.surface().cursor_visible());
    }

    #[test_timeout::timeout]
    fn new_message_hides_cursor_until_next_flush() {
        let mut model = model(4, 2);
        model.flush(mode::NORMAL, 0, 0, 0, ' ');
        model.begin_message();
        assert!(!model.surface().cursor_visible());
        assert!(!model.blink_scheduled());
        model.flush(mode::NORMAL, 1, 0, 0, ' ');
        assert!(model.surface().cursor_visible());
        assert!(model.blink_scheduled());
    }

    #[test_timeout::timeout]
    fn pointer_press_suppresses_blinking_until_release() {
        let mut model = model(4, 2);
        model.pointer_event(PointerActivity::Pressed);
        model.flush(mode::NORMAL, 0, 0, 0, ' ');
        assert!(model.cursor().visible);
        assert!(!model.blink_scheduled());

        model.pointer_event(PointerActivity::Dragging);
        model.tick(5_000);
        assert!(model.cursor().visible);

        model.pointer_event(PointerActivity::Released);
        assert!(model.blink_scheduled());
        assert!(model.cursor().visible);
    }

    #[test_timeout::timeout]
    fn release_does_not_show_a_hidden_cursor() {
        let mut model = model(4, 2);
        model.flush(mode::NORMAL, 0, 0, 0, ' ');
        model.begin_message();
        model.pointer_event(PointerActivity::Pressed);
        model.pointer_event(PointerActivity::Released);
        assert!(!model.cursor().visible);
        assert!(!model.blink_scheduled());
        assert!(!model.surface().cursor_visible());

        model.flush(mode::NORMAL, 1, 0, 0, ' ');
        assert!(model.cursor().visible);
        assert!(model.blink_scheduled());
    }

    #[test_timeout::timeout]
    fn oversized_resize_keeps_the_current_grid() {
        let mut model = model(4, 2);
        model.set_size(u32::MAX, u32::MAX);
        assert_eq!(model.size(), (4, 2));
        model.set_size(1 << 12, (1 << 10) + 1);
        assert_eq!(model.size(), (4, 2));
        assert_eq!(model.surface().size(), (4, 2));
        model.set_size(300, 100);
        assert_eq!(model.surface().size(), (300, 100));
    }

    #[test_timeout::timeout]
    fn release_before_first_flush_does_nothing() {
        let mut model = model(4, 2);
        model.pointer_event(PointerActivity::Released);
        assert!(!model.blink_scheduled());
        assert!(!model.cursor().visible);
    }

    #[test_timeout::timeout]
    fn repeated_put_stamps_tiles() {
        let mut model = model(5, 1);
        model.put_repeated(1, '-', 3);
        model.put_repeated(0, ' ', 0);
        model.flush(mode::NORMAL, 0, 0, 0, ' ');
        assert_eq!(visible_text(&model, 0), " --- ");
        assert!(model.tiles().is_empty());
    }
}
