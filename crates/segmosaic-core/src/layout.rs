//! Placement of the short-wave detector tiles (A1-A4, B1-B4) in a
//! segment-ID mosaic, used to annotate the composited image.
//!
//! Coordinates are mosaic pixels with `y` increasing upwards from the
//! bottom row of tiles, matching how the viewer draws data coordinates.

use serde::{Deserialize, Serialize};

/// Spacing of the tile grid, all in mosaic pixels.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DetectorLayout {
    pub tile_size: u32,
    /// Label inset from the tile's left and top edges.
    pub label_offset: u32,
    /// Gap between tiles of the same module.
    pub module_separation: u32,
    /// Gap between modules A and B.
    pub module_gap: u32,
}

/// One detector tile: its label anchor and its extent in the mosaic.
#[derive(Clone, Debug, PartialEq)]
pub struct Tile {
    pub name: &'static str,
    pub label_x: f64,
    pub label_y: f64,
    pub x0: f64,
    pub y0: f64,
    pub size: f64,
}

impl Tile {
    pub fn contains(&self, x: f64, y: f64) -> bool {
        x >= self.x0 && x < self.x0 + self.size && y >= self.y0 && y < self.y0 + self.size
    }
}

/// Column slot (0-3, with the module gap between 1 and 2) and row (0 =
/// bottom) of each tile. Module B is mirrored relative to A.
const TILES: [(&str, u32, u32); 8] = [
    ("A1", 0, 0),
    ("A2", 0, 1),
    ("A3", 1, 0),
    ("A4", 1, 1),
    ("B1", 3, 1),
    ("B2", 3, 0),
    ("B3", 2, 1),
    ("B4", 2, 0),
];

impl Default for DetectorLayout {
    fn default() -> Self {
        Self::nircam_short_wave(256)
    }
}

impl DetectorLayout {
    /// Standard short-wave arrangement for tiles of `tile_size` pixels.
    pub fn nircam_short_wave(tile_size: u32) -> Self {
        Self {
            tile_size,
            label_offset: 20,
            module_separation: 21,
            module_gap: 150,
        }
    }

    fn column_x(&self, slot: u32) -> u32 {
        // Separations crossed: one inside each module, none across the gap.
        let (separations, gap) = match slot {
            0 => (0, 0),
            1 => (1, 0),
            2 => (1, self.module_gap),
            _ => (2, self.module_gap),
        };
        slot * self.tile_size + separations * self.module_separation + gap
    }

    fn row_y(&self, row: u32) -> u32 {
        row * (self.tile_size + self.module_separation)
    }

    /// All tiles in A1..A4, B1..B4 order.
    pub fn tiles(&self) -> Vec<Tile> {
        let size = self.tile_size as f64;
        let bottom = self.tile_size.saturating_sub(self.label_offset);
        TILES
            .iter()
            .map(|&(name, slot, row)| {
                let x0 = self.column_x(slot);
                let y0 = self.row_y(row);
                Tile {
                    name,
                    label_x: (x0 + self.label_offset) as f64,
                    label_y: (bottom + y0) as f64,
                    x0: x0 as f64,
                    y0: y0 as f64,
                    size,
                }
            })
            .collect()
    }

    /// Label anchors `(name, x, y)` for annotating the mosaic.
    pub fn labels(&self) -> Vec<(&'static str, f64, f64)> {
        self.tiles().into_iter().map(|t| (t.name, t.label_x, t.label_y)).collect()
    }

    /// Tile covering mosaic pixel `(x, y)`, if any.
    pub fn tile_at(&self, x: f64, y: f64) -> Option<&'static str> {
        self.tiles().into_iter().find(|t| t.contains(x, y)).map(|t| t.name)
    }

    /// Total extent `(width, height)` of the tile arrangement.
    pub fn extent(&self) -> (u32, u32) {
        (self.column_x(3) + self.tile_size, self.row_y(1) + self.tile_size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_anchors() {
        let labels = DetectorLayout::nircam_short_wave(256).labels();
        let get = |n: &str| labels.iter().find(|l| l.0 == n).map(|l| (l.1, l.2)).unwrap();
        assert_eq!(get("A1"), (20.0, 236.0));
        assert_eq!(get("A2"), (20.0, 513.0));
        assert_eq!(get("A3"), (297.0, 236.0));
        assert_eq!(get("A4"), (297.0, 513.0));
        assert_eq!(get("B3"), (703.0, 513.0));
        assert_eq!(get("B4"), (703.0, 236.0));
        assert_eq!(get("B1"), (980.0, 513.0));
        assert_eq!(get("B2"), (980.0, 236.0));
    }

    #[test]
    fn test_tile_lookup() {
        let layout = DetectorLayout::default();
        assert_eq!(layout.tile_at(10.0, 10.0), Some("A1"));
        assert_eq!(layout.tile_at(300.0, 300.0), Some("A4"));
        assert_eq!(layout.tile_at(1000.0, 100.0), Some("B2"));
        // Module gap.
        assert_eq!(layout.tile_at(600.0, 100.0), None);
        assert_eq!(layout.extent(), (1216, 533));
    }
}
