use image::{GrayImage, Luma};
use imageproc::drawing::draw_line_segment_mut;
use imageproc::edges::canny;
use imageproc::hough::{detect_lines, LineDetectionOptions, PolarLine};

const CANNY_LOW: f32 = 50.0;
const CANNY_HIGH: f32 = 150.0;
/// Small enough that the two edges of a thin stroke survive as separate lines.
const SUPPRESSION_RADIUS: u32 = 2;
/// Largest angle difference, in degrees, between the two edges of one stroke.
const PAIR_ANGLE_TOLERANCE: u32 = 2;
/// Extra distance allowed between paired edges beyond the stroke width.
const PAIR_EDGE_SPREAD: f32 = 6.0;

/// Remove straight strike-through lines.
///
/// Edges are found with Canny, straight lines with a Hough transform. A thin
/// stroke yields two parallel edge lines; the band between such a pair is
/// masked, and an unpaired line is masked as a `line_width` stroke. The
/// masked pixels are rebuilt from their surroundings.
pub fn apply(image: &GrayImage, line_width: u32) -> GrayImage {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return image.clone();
    }

    let edges = canny(image, CANNY_LOW, CANNY_HIGH);
    let options = LineDetectionOptions {
        vote_threshold: (width.max(height) / 2).max(1),
        suppression_radius: SUPPRESSION_RADIUS,
    };
    let lines = detect_lines(&edges, options);
    tracing::debug!(line_count = lines.len(), "Hough lines detected");

    if lines.is_empty() {
        return image.clone();
    }

    inpaint(image, &line_mask(width, height, &lines, line_width.max(1)))
}

/// Rasterise detected lines into a mask, filling between edge pairs.
pub fn line_mask(width: u32, height: u32, lines: &[PolarLine], line_width: u32) -> GrayImage {
    let mut mask = GrayImage::new(width, height);
    let reach = (width + height) as f32;
    let half = (line_width as f32 - 1.0) / 2.0;
    let max_gap = line_width as f32 + PAIR_EDGE_SPREAD;

    let mut paired = vec![false; lines.len()];
    for i in 0..lines.len() {
        if paired[i] {
            continue;
        }
        let line = &lines[i];

        // The opposite edge is the farthest parallel line within reach
        let partner = (i + 1..lines.len())
            .filter(|&j| {
                !paired[j]
                    && line.angle_in_degrees.abs_diff(lines[j].angle_in_degrees)
                        <= PAIR_ANGLE_TOLERANCE
                    && (line.r - lines[j].r).abs() <= max_gap
            })
            .max_by(|&a, &b| {
                let gap = |j: usize| (line.r - lines[j].r).abs();
                gap(a).total_cmp(&gap(b))
            });

        // Accumulator bins truncate, so a line lies within [r, r + 1)
        let (low, high) = match partner {
            Some(j) => {
                paired[j] = true;
                (line.r.min(lines[j].r), line.r.max(lines[j].r) + 1.0)
            }
            None => (line.r + 0.5, line.r + 0.5),
        };
        paired[i] = true;

        draw_band(&mut mask, line.angle_in_degrees, low - half, high + half, reach);
    }

    mask
}

/// Draw parallel lines at half-pixel spacing for every distance in
/// `from..=to` along the normal at `angle_in_degrees`.
fn draw_band(mask: &mut GrayImage, angle_in_degrees: u32, from: f32, to: f32, reach: f32) {
    let theta = (angle_in_degrees as f32).to_radians();
    let (normal_x, normal_y) = (theta.cos(), theta.sin());

    let mut r = from;
    while r <= to + f32::EPSILON {
        let (cx, cy) = (normal_x * r, normal_y * r);
        let start = (cx - reach * normal_y, cy + reach * normal_x);
        let end = (cx + reach * normal_y, cy - reach * normal_x);
        draw_line_segment_mut(mask, start, end, Luma([255u8]));
        r += 0.5;
    }
}

/// Rebuild masked pixels layer by layer, each from the mean of its already
/// known 8-neighbours.
pub fn inpaint(image: &GrayImage, mask: &GrayImage) -> GrayImage {
    let (width, height) = image.dimensions();
    let mut output = image.clone();
    let mut known: Vec<bool> = mask.pixels().map(|p| p.0[0] == 0).collect();
    let index = |x: u32, y: u32| (y * width + x) as usize;

    loop {
        let mut layer = Vec::new();

        for y in 0..height {
            for x in 0..width {
                if known[index(x, y)] {
                    continue;
                }

                let mut sum = 0u32;
                let mut count = 0u32;
                for ny in y.saturating_sub(1)..=(y + 1).min(height - 1) {
                    for nx in x.saturating_sub(1)..=(x + 1).min(width - 1) {
                        if known[index(nx, ny)] {
                            sum += output.get_pixel(nx, ny).0[0] as u32;
                            count += 1;
                        }
                    }
                }

                if count > 0 {
                    layer.push((x, y, ((sum + count / 2) / count) as u8));
                }
            }
        }

        if layer.is_empty() {
            break;
        }

        for (x, y, value) in layer {
            output.put_pixel(x, y, Luma([value]));
            known[index(x, y)] = true;
        }
    }

    output
}
