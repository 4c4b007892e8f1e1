use serde::{Deserialize, Serialize};

use crate::color_pipeline::common::error::{ColorError, Result};

/// Axis-aligned pixel rectangle, `x`/`y` is the upper-left corner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub x: usize,
    pub y: usize,
    pub width: usize,
    pub height: usize,
}

impl Rect {
    pub fn new(x: usize, y: usize, width: usize, height: usize) -> Self {
        Self { x, y, width, height }
    }

    pub fn area(&self) -> usize {
        self.width * self.height
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Geometric center, matching the integer center of the pixel block.
    pub fn center(&self) -> (f32, f32) {
        (
            self.x as f32 + self.width as f32 / 2.0,
            self.y as f32 + self.height as f32 / 2.0,
        )
    }

    pub fn right(&self) -> usize {
        self.x + self.width
    }

    pub fn bottom(&self) -> usize {
        self.y + self.height
    }

    /// Fails unless the rectangle is non-empty and lies inside `width`x`height`.
    pub fn check_within(&self, width: usize, height: usize) -> Result<()> {
        if self.is_empty() || self.right() > width || self.bottom() > height {
            return Err(ColorError::RectOutOfBounds {
                rect: (self.x, self.y, self.width, self.height),
                width,
                height,
            });
        }
        Ok(())
    }

    /// Row-major indices covered by the rectangle in an image of the given width.
    pub fn indices(&self, image_width: usize) -> impl Iterator<Item = usize> + '_ {
        (self.y..self.bottom())
            .flat_map(move |y| (self.x..self.right()).map(move |x| y * image_width + x))
    }
}
