//! Guillotine free-rectangle bookkeeping for one sheet.

const EPS: f64 = 1e-9;

/// An empty axis-aligned region of a sheet.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct FreeRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl FreeRect {
    pub(crate) fn area(&self) -> f64 {
        self.width * self.height
    }

    pub(crate) fn fits(&self, width: f64, height: f64) -> bool {
        width <= self.width + EPS && height <= self.height + EPS
    }

    fn is_empty(&self) -> bool {
        self.width <= EPS || self.height <= EPS
    }

    /// Splits the space left after placing `width` × `height` at the
    /// bottom-left corner, cutting along the shorter leftover axis.
    fn split(&self, width: f64, height: f64) -> [Self; 2] {
        let leftover_w = self.width - width;
        let leftover_h = self.height - height;
        if leftover_w <= leftover_h {
            // Horizontal cut: the strip to the right stays as tall as the part.
            [
                Self {
                    x: self.x + width,
                    y: self.y,
                    width: leftover_w,
                    height,
                },
                Self {
                    x: self.x,
                    y: self.y + height,
                    width: self.width,
                    height: leftover_h,
                },
            ]
        } else {
            // Vertical cut: the strip above stays as wide as the part.
            [
                Self {
                    x: self.x + width,
                    y: self.y,
                    width: leftover_w,
                    height: self.height,
                },
                Self {
                    x: self.x,
                    y: self.y + height,
                    width,
                    height: leftover_h,
                },
            ]
        }
    }

    /// Union of two rectangles sharing a full edge.
    fn merged(&self, other: &Self) -> Option<Self> {
        let close = |a: f64, b: f64| (a - b).abs() <= EPS;
        if close(self.x, other.x) && close(self.width, other.width) {
            if close(self.y + self.height, other.y) {
                return Some(Self {
                    height: self.height + other.height,
                    ..*self
                });
            }
            if close(other.y + other.height, self.y) {
                return Some(Self {
                    height: self.height + other.height,
                    ..*other
                });
            }
        }
        if close(self.y, other.y) && close(self.height, other.height) {
            if close(self.x + self.width, other.x) {
                return Some(Self {
                    width: self.width + other.width,
                    ..*self
                });
            }
            if close(other.x + other.width, self.x) {
                return Some(Self {
                    width: self.width + other.width,
                    ..*other
                });
            }
        }
        None
    }
}

/// Disjoint free rectangles covering the unused part of a sheet.
#[derive(Debug, Clone)]
pub(crate) struct FreeRectangles {
    rects: Vec<FreeRect>,
}

impl FreeRectangles {
    pub(crate) fn new(width: f64, height: f64) -> Self {
        let initial = FreeRect {
            x: 0.0,
            y: 0.0,
            width,
            height,
        };
        Self {
            rects: if initial.is_empty() {
                Vec::new()
            } else {
                vec![initial]
            },
        }
    }

    pub(crate) fn rects(&self) -> &[FreeRect] {
        &self.rects
    }

    /// Occupies `width` × `height` at the bottom-left corner of rectangle
    /// `index` and replaces it by its guillotine remainders.
    pub(crate) fn place(&mut self, index: usize, width: f64, height: f64, merge: bool) {
        let rect = self.rects.remove(index);
        let width = width.min(rect.width);
        let height = height.min(rect.height);
        self.rects.extend(
            rect.split(width, height)
                .into_iter()
                .filter(|r| !r.is_empty()),
        );
        if merge {
            self.merge();
        }
    }

    /// Joins pairs of rectangles that share a full edge until none is left.
    pub(crate) fn merge(&mut self) {
        'outer: loop {
            for i in 0..self.rects.len() {
                for j in (i + 1)..self.rects.len() {
                    if let Some(joined) = self.rects[i].merged(&self.rects[j]) {
                        self.rects[i] = joined;
                        self.rects.remove(j);
                        continue 'outer;
                    }
                }
            }
            break;
        }
    }

    pub(crate) fn free_area(&self) -> f64 {
        self.rects.iter().map(FreeRect::area).sum()
    }
}
