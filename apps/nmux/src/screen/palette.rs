use std::collections::HashMap;
use std::fmt;

use crate::protocol::attr;
use crate::screen::surface::Cell;

pub const DEFAULT_FOREGROUND: Rgb = Rgb(0xff_ff_ff);
pub const DEFAULT_BACKGROUND: Rgb = Rgb(0x00_00_00);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Rgb(pub u32);

impl Rgb {
    pub fn r(self) -> u8 {
        (self.0 >> 16) as u8
    }

    pub fn g(self) -> u8 {
        (self.0 >> 8) as u8
    }

    pub fn b(self) -> u8 {
        self.0 as u8
    }
}

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:06x}", self.0 & 0xff_ff_ff)
    }
}

/// A color as carried by the palette op. The host encodes "use the default"
/// as a negative 32-bit value.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Color {
    Default,
    Rgb(Rgb),
}

impl Color {
    pub fn from_wire(raw: u32) -> Self {
        if (raw as i32) < 0 {
            Color::Default
        } else {
            Color::Rgb(Rgb(raw & 0xff_ff_ff))
        }
    }

    pub fn resolve(self, default: Rgb) -> Rgb {
        match self {
            Color::Default => default,
            Color::Rgb(rgb) => rgb,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PaletteEntry {
    pub attr: u8,
    pub fg: Rgb,
    pub bg: Rgb,
    pub sp: Rgb,
}

impl PaletteEntry {
    /// Resolves raw wire colors. An unset special color follows the
    /// entry's foreground.
    pub fn from_wire(attr: u8, fg: u32, bg: u32, sp: u32) -> Self {
        let fg = Color::from_wire(fg).resolve(DEFAULT_FOREGROUND);
        let bg = Color::from_wire(bg).resolve(DEFAULT_BACKGROUND);
        let sp = Color::from_wire(sp).resolve(fg);
        Self { attr, fg, bg, sp }
    }
}

impl Default for PaletteEntry {
    fn default() -> Self {
        Self {
            attr: 0,
            fg: DEFAULT_FOREGROUND,
            bg: DEFAULT_BACKGROUND,
            sp: DEFAULT_FOREGROUND,
        }
    }
}

/// Drawing state derived from a palette entry, with reverse video applied.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Brush {
    pub attr: u8,
    pub fg: Rgb,
    pub bg: Rgb,
    pub sp: Rgb,
}

impl Brush {
    pub fn has(&self, bit: u8) -> bool {
        self.attr & bit != 0
    }

    pub fn cell(&self, ch: char) -> Cell {
        Cell {
            ch,
            fg: self.fg,
            bg: self.bg,
            sp: self.sp,
            attr: self.attr,
        }
    }
}

impl From<&PaletteEntry> for Brush {
    fn from(entry: &PaletteEntry) -> Self {
        let (fg, bg) = if entry.attr & attr::REVERSE != 0 {
            (entry.bg, entry.fg)
        } else {
            (entry.fg, entry.bg)
        };
        Self {
            attr: entry.attr,
            fg,
            bg,
            sp: entry.sp,
        }
    }
}

impl Default for Brush {
    fn default() -> Self {
        Brush::from(&PaletteEntry::default())
    }
}

#[derive(Clone, Debug, Default)]
pub struct Palette {
    entries: HashMap<u32, PaletteEntry>,
}

impl Palette {
    pub fn get(&self, id: u32) -> Option<&PaletteEntry> {
        self.entries.get(&id)
    }

    pub fn insert(&mut self, id: u32, entry: PaletteEntry) {
        self.entries.insert(id, entry);
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TileKey {
    pub ch: char,
    pub fg: Rgb,
    pub bg: Rgb,
    pub sp: Rgb,
}

/// A pre-rendered cell stamped by repeated puts.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Tile {
    pub key: TileKey,
    pub cell: Cell,
}

/// Memo of repeated-put tiles. Only blank tiles are kept, until the next
/// clear.
#[derive(Debug, Default)]
pub struct TileCache {
    tiles: HashMap<TileKey, Tile>,
    hits: u64,
    misses: u64,
}

impl TileCache {
    pub fn tile(&mut self, ch: char, brush: &Brush) -> Tile {
        let key = TileKey {
            ch,
            fg: brush.fg,
            bg: brush.bg,
            sp: brush.sp,
        };
        if let Some(tile) = self.tiles.get(&key) {
            self.hits += 1;
            return *tile;
        }
        self.misses += 1;
        let tile = Tile {
            key,
            cell: brush.cell(ch),
        };
        if ch == ' ' {
            self.tiles.insert(key, tile);
        }
        tile
    }

    pub fn clear(&mut self) {
        self.tiles.clear();
    }

    pub fn len(&self) -> usize {
        self.tiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }

    pub fn hits(&self) -> u64 {
        self.hits
    }

    pub fn misses(&self) -> u64 {
        self.misses
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test_timeout::timeout]
    fn negative_colors_fall_back_to_defaults() {
        let entry = PaletteEntry::from_wire(0, u32::MAX, u32::MAX, u32::MAX);
        assert_eq!(entry.fg, DEFAULT_FOREGROUND);
        assert_eq!(entry.bg, DEFAULT_BACKGROUND);
        assert_eq!(entry.sp, DEFAULT_FOREGROUND);

        let entry = PaletteEntry::from_wire(0, 0x00ff00, 0x000080, 0x8000_0000);
        assert_eq!(entry.sp, Rgb(0x00ff00));
        assert_eq!(entry.fg.to_string(), "#00ff00");
    }

    #[test_timeout::timeout]
    fn reverse_swaps_brush_colors() {
        let entry = PaletteEntry::from_wire(attr::REVERSE | attr::BOLD, 0x111111, 0x222222, 0x333333);
        let brush = Brush::from(&entry);
        assert_eq!(brush.fg, Rgb(0x222222));
        assert_eq!(brush.bg, Rgb(0x111111));
        assert_eq!(brush.sp, Rgb(0x333333));
        assert!(brush.has(attr::BOLD));
    }

    #[test_timeout::timeout]
    fn only_blank_tiles_are_cached() {
        let mut cache = TileCache::default();
        let brush = Brush::default();
        cache.tile(' ', &brush);
        cache.tile(' ', &brush);
        cache.tile('x', &brush);
        cache.tile('x', &brush);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.hits(), 1);
        assert_eq!(cache.misses(), 3);

        let other = Brush::from(&PaletteEntry::from_wire(0, 0x123456, 0, 0));
        let tile = cache.tile(' ', &other);
        assert_eq!(tile.cell.fg, Rgb(0x123456));
        assert_eq!(cache.len(), 2);

        cache.clear();
        assert!(cache.is_empty());
    }
}
