//! Block-wise iteration over a pixel buffer.

use super::PixelBuffer;

/// One tile cut from a larger buffer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tile {
    /// Left edge of the tile in the source image
    pub x: u32,
    /// Top edge of the tile in the source image
    pub y: u32,
    pub buffer: PixelBuffer,
}

/// Iterator over the tiles of a buffer, row-major
pub struct Tiles<'a> {
    source: &'a PixelBuffer,
    tile_width: u32,
    tile_height: u32,
    next_x: u32,
    next_y: u32,
}

impl<'a> Tiles<'a> {
    pub(super) fn new(source: &'a PixelBuffer, tile_width: u32, tile_height: u32) -> Self {
        // A zero-sized tile would never advance; start past the end instead.
        let next_y = if tile_width == 0 || tile_height == 0 {
            source.height()
        } else {
            0
        };
        Self {
            source,
            tile_width,
            tile_height,
            next_x: 0,
            next_y,
        }
    }

    fn cut(&self, x: u32, y: u32) -> Option<Tile> {
        let w = self.tile_width.min(self.source.width() - x);
        let h = self.tile_height.min(self.source.height() - y);
        let stride = self.source.channels() as usize;
        let row_bytes = self.source.width() as usize * stride;

        let mut data = Vec::with_capacity(w as usize * h as usize * stride);
        for row in y..y + h {
            let start = row as usize * row_bytes + x as usize * stride;
            data.extend_from_slice(&self.source.as_bytes()[start..start + w as usize * stride]);
        }

        PixelBuffer::new(w, h, self.source.channels(), data)
            .ok()
            .map(|buffer| Tile { x, y, buffer })
    }
}

impl Iterator for Tiles<'_> {
    type Item = Tile;

    fn next(&mut self) -> Option<Tile> {
        if self.next_y >= self.source.height() {
            return None;
        }

        let (x, y) = (self.next_x, self.next_y);
        self.next_x += self.tile_width;
        if self.next_x >= self.source.width() {
            self.next_x = 0;
            self.next_y += self.tile_height;
        }

        self.cut(x, y)
    }
}
