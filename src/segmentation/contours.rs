//! Connected foreground regions and their ranking by pixel mass.

use crate::error::CaptchaError;
use crate::raster::RasterBuffer;
use image::GrayImage;
use imageproc::contours::{find_contours, BorderType};
use serde::Serialize;

/// Axis-aligned rectangle in image coordinates. Width and height are
/// always positive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct BoundingBox {
    x: u32,
    y: u32,
    width: u32,
    height: u32,
}

impl BoundingBox {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Option<Self> {
        (width > 0 && height > 0).then_some(Self {
            x,
            y,
            width,
            height,
        })
    }

    pub fn x(&self) -> u32 {
        self.x
    }

    pub fn y(&self) -> u32 {
        self.y
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn aspect_ratio(&self) -> f64 {
        self.width as f64 / self.height as f64
    }

    /// Cut into a left and right half of `width / 2` each, sharing `y` and
    /// `height`. Boxes narrower than two pixels cannot be split.
    pub fn split_halves(&self) -> Option<(Self, Self)> {
        let half = self.width / 2;
        if half == 0 {
            return None;
        }
        let left = Self { width: half, ..*self };
        let right = Self {
            x: self.x + half,
            width: half,
            ..*self
        };
        Some((left, right))
    }

    /// Grow by `margin` on every side, clipped to a `width × height` image.
    /// Returns `None` when nothing of the box lies inside the image.
    pub fn expand_within(&self, margin: u32, width: u32, height: u32) -> Option<Self> {
        let x1 = self.x.saturating_sub(margin);
        let y1 = self.y.saturating_sub(margin);
        let x2 = (self.x + self.width + margin).min(width);
        let y2 = (self.y + self.height + margin).min(height);
        if x2 <= x1 || y2 <= y1 {
            return None;
        }
        Self::new(x1, y1, x2 - x1, y2 - y1)
    }
}

/// A top-level foreground region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Contour {
    pub bounds: BoundingBox,
    /// Non-zero pixels inside `bounds`.
    pub mass: u32,
}

/// Top-level regions of one single-channel image in discovery (raster) order.
#[derive(Debug, Clone, Default)]
pub struct ContourIndex {
    regions: Vec<Contour>,
}

impl ContourIndex {
    pub fn build(image: &GrayImage) -> Self {
        let regions = find_contours::<u32>(image)
            .into_iter()
            .filter(|c| c.border_type == BorderType::Outer && c.parent.is_none())
            .filter_map(|c| {
                let min_x = c.points.iter().map(|p| p.x).min()?;
                let max_x = c.points.iter().map(|p| p.x).max()?;
                let min_y = c.points.iter().map(|p| p.y).min()?;
                let max_y = c.points.iter().map(|p| p.y).max()?;
                BoundingBox::new(min_x, min_y, max_x - min_x + 1, max_y - min_y + 1)
            })
            .map(|bounds| Contour {
                bounds,
                mass: foreground_mass(image, &bounds),
            })
            .collect();

        Self { regions }
    }

    pub fn regions(&self) -> &[Contour] {
        &self.regions
    }

    /// Bounding boxes of the `limit` heaviest regions, heaviest first.
    /// Equal masses keep discovery order.
    ///
    /// Mass rather than box area keeps thin noise strokes with large but
    /// sparse boxes from crowding out real glyphs.
    pub fn rank(&self, limit: usize) -> Vec<BoundingBox> {
        let mut ranked: Vec<&Contour> = self.regions.iter().collect();
        ranked.sort_by(|a, b| b.mass.cmp(&a.mass));
        ranked.into_iter().take(limit).map(|c| c.bounds).collect()
    }
}

/// Rank the regions of a single-channel buffer.
pub fn rank(buffer: &RasterBuffer, limit: usize) -> Result<Vec<BoundingBox>, CaptchaError> {
    let gray = buffer.as_gray().ok_or_else(|| {
        CaptchaError::invalid_operation(
            "rank",
            format!("[{}]", limit),
            format!(
                "contour ranking requires a single-channel image, found {} channels",
                buffer.channels()
            ),
        )
    })?;
    Ok(ContourIndex::build(gray).rank(limit))
}

fn foreground_mass(image: &GrayImage, bounds: &BoundingBox) -> u32 {
    let mut mass = 0;
    for y in bounds.y..bounds.y + bounds.height {
        for x in bounds.x..bounds.x + bounds.width {
            if image.get_pixel(x, y).0[0] != 0 {
                mass += 1;
            }
        }
    }
    mass
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Luma, RgbImage};

    fn fill(img: &mut GrayImage, x: u32, y: u32, w: u32, h: u32) {
        for yy in y..y + h {
            for xx in x..x + w {
                img.put_pixel(xx, yy, Luma([255]));
            }
        }
    }

    #[test]
    fn test_bounding_box_rejects_empty() {
        assert!(BoundingBox::new(0, 0, 0, 5).is_none());
        assert!(BoundingBox::new(0, 0, 5, 0).is_none());
        let b = BoundingBox::new(1, 2, 9, 6).unwrap();
        assert!((b.aspect_ratio() - 1.5).abs() < 1e-12);
    }

    #[test]
    fn test_split_halves() {
        let b = BoundingBox::new(10, 3, 9, 5).unwrap();
        let (left, right) = b.split_halves().unwrap();
        assert_eq!(left, BoundingBox::new(10, 3, 4, 5).unwrap());
        assert_eq!(right, BoundingBox::new(14, 3, 4, 5).unwrap());
        assert!(BoundingBox::new(0, 0, 1, 5).unwrap().split_halves().is_none());
    }

    #[test]
    fn test_expand_within_clamps() {
        let b = BoundingBox::new(1, 1, 4, 4).unwrap();
        assert_eq!(b.expand_within(2, 6, 100), BoundingBox::new(0, 0, 6, 7));
    }

    #[test]
    fn test_rank_orders_by_mass_not_area() {
        let mut img = GrayImage::new(60, 30);
        // Sparse diagonal stroke: large box, little mass
        for i in 0..20 {
            img.put_pixel(2 + i, 2 + i, Luma([255]));
        }
        // Solid 8x8 block
        fill(&mut img, 40, 5, 8, 8);

        let boxes = ContourIndex::build(&img).rank(2);
        assert_eq!(boxes.len(), 2);
        assert_eq!(boxes[0], BoundingBox::new(40, 5, 8, 8).unwrap());
        assert_eq!(boxes[1], BoundingBox::new(2, 2, 20, 20).unwrap());

        let top = ContourIndex::build(&img).rank(1);
        assert_eq!(top, vec![BoundingBox::new(40, 5, 8, 8).unwrap()]);
    }

    #[test]
    fn test_rank_ties_keep_discovery_order() {
        let mut img = GrayImage::new(40, 20);
        fill(&mut img, 20, 2, 4, 4);
        fill(&mut img, 2, 10, 4, 4);
        fill(&mut img, 30, 10, 4, 4);

        let boxes = ContourIndex::build(&img).rank(3);
        let xs: Vec<u32> = boxes.iter().map(|b| b.x()).collect();
        // Raster discovery: top row first, then left to right
        assert_eq!(xs, vec![20, 2, 30]);
    }

    #[test]
    fn test_nested_regions_are_not_reported() {
        let mut img = GrayImage::new(30, 30);
        fill(&mut img, 2, 2, 20, 20);
        // Carve a hole and put an island inside it
        for y in 6..18 {
            for x in 6..18 {
                img.put_pixel(x, y, Luma([0]));
            }
        }
        fill(&mut img, 10, 10, 3, 3);

        let index = ContourIndex::build(&img);
        assert_eq!(index.regions().len(), 1);
        // The island still counts towards the outer region's mass
        assert_eq!(index.regions()[0].mass, 400 - 144 + 9);
    }

    #[test]
    fn test_rank_requires_single_channel() {
        let buffer = RasterBuffer::from_rgb(RgbImage::new(5, 5));
        assert!(matches!(
            rank(&buffer, 4),
            Err(CaptchaError::InvalidOperation { .. })
        ));
    }
}
