//! Pipeline operations and their configuration syntax.

use super::steps::{
    self,
    border::{BorderMode, MAX_BORDER},
    morphology::MAX_KERNEL,
};
use crate::raster::RasterBuffer;
use image::{DynamicImage, GrayImage};
use serde_json::Value;

/// One raster operation with validated parameters.
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    Grey,
    Erode { kernel: u32, iterations: u32 },
    Dilate { kernel: u32, iterations: u32 },
    Opening { kernel: u32 },
    Closing { kernel: u32 },
    Gradient { kernel: u32 },
    Threshold { level: u8, inverted: bool },
    ThresholdOtsu,
    AdaptiveThreshold { block_size: u32, c: f64 },
    FillHoles,
    LineRemoval { width: u32 },
    Blur { kernel: u32 },
    RemoveContours { area: u32 },
    HistogramEqualisation,
    Border {
        vertical: u32,
        horizontal: u32,
        mode: BorderMode,
    },
    Resize { width: u32, height: u32 },
}

impl Operation {
    /// Every name accepted in a style's `functions` list.
    pub const NAMES: &'static [&'static str] = &[
        "grey",
        "erode",
        "dilate",
        "opening",
        "closing",
        "gradient",
        "threshold",
        "thresholdOtsu",
        "adaptiveThreshold",
        "fillHoles",
        "lineRemoval",
        "blur",
        "removeContours",
        "histogramEqualisation",
        "border",
        "resize",
    ];

    /// Parse a configured operation.
    ///
    /// Anything after the first `_` in `name` is ignored, so the same
    /// operation can appear under several keys (`erode_1`, `erode_2`).
    pub fn parse(name: &str, params: &[Value]) -> Result<Self, String> {
        let base = name.split('_').next().unwrap_or(name);
        let mut p = Params::new(params);

        let operation = match base {
            "grey" => Self::Grey,
            "erode" => Self::Erode {
                kernel: p.morph_kernel()?,
                iterations: p.uint_or("iterations", 1)?,
            },
            "dilate" => Self::Dilate {
                kernel: p.morph_kernel()?,
                iterations: p.uint_or("iterations", 1)?,
            },
            "opening" => Self::Opening {
                kernel: p.morph_kernel()?,
            },
            "closing" => Self::Closing {
                kernel: p.morph_kernel()?,
            },
            "gradient" => Self::Gradient {
                kernel: p.morph_kernel()?,
            },
            "threshold" => Self::Threshold {
                level: p.level("threshold level")?,
                inverted: p.boolean_or("inverted", false)?,
            },
            "thresholdOtsu" => Self::ThresholdOtsu,
            "adaptiveThreshold" => {
                let block_size = p.uint("block size")?;
                if block_size < 3 || block_size % 2 == 0 {
                    return Err(format!("block size must be odd and >= 3, got {}", block_size));
                }
                Self::AdaptiveThreshold {
                    block_size,
                    c: p.float("constant")?,
                }
            }
            "fillHoles" => Self::FillHoles,
            "lineRemoval" => Self::LineRemoval {
                width: p.kernel("line width")?,
            },
            "blur" => {
                let kernel = p.kernel("kernel size")?;
                if kernel % 2 == 0 {
                    return Err(format!("blur kernel size must be odd, got {}", kernel));
                }
                Self::Blur { kernel }
            }
            "removeContours" => Self::RemoveContours {
                area: p.uint("area threshold")?,
            },
            "histogramEqualisation" => Self::HistogramEqualisation,
            "border" => {
                let vertical = p.at_most("height", MAX_BORDER)?;
                let horizontal = p.at_most("width", MAX_BORDER)?;
                let replicate = p.boolean_or("replicate", false)?;
                let colour = p.colour_or([0, 0, 0])?;
                Self::Border {
                    vertical,
                    horizontal,
                    mode: if replicate {
                        BorderMode::Replicate
                    } else {
                        BorderMode::Constant(colour)
                    },
                }
            }
            "resize" => Self::Resize {
                width: p.kernel("width")?,
                height: p.kernel("height")?,
            },
            _ => {
                return Err(format!(
                    "unknown operation, expected one of: {}",
                    Self::NAMES.join(", ")
                ))
            }
        };

        p.finish()?;
        Ok(operation)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Grey => "grey",
            Self::Erode { .. } => "erode",
            Self::Dilate { .. } => "dilate",
            Self::Opening { .. } => "opening",
            Self::Closing { .. } => "closing",
            Self::Gradient { .. } => "gradient",
            Self::Threshold { .. } => "threshold",
            Self::ThresholdOtsu => "thresholdOtsu",
            Self::AdaptiveThreshold { .. } => "adaptiveThreshold",
            Self::FillHoles => "fillHoles",
            Self::LineRemoval { .. } => "lineRemoval",
            Self::Blur { .. } => "blur",
            Self::RemoveContours { .. } => "removeContours",
            Self::HistogramEqualisation => "histogramEqualisation",
            Self::Border { .. } => "border",
            Self::Resize { .. } => "resize",
        }
    }

    /// Run the operation. Errors carry only the cause; the pipeline adds
    /// the operation name and parameters.
    pub fn apply(&self, buffer: RasterBuffer) -> Result<RasterBuffer, String> {
        buffer.map_image(|image| match *self {
            Self::Grey => Ok(steps::grayscale::apply(image)),
            Self::Border {
                vertical,
                horizontal,
                mode,
            } => match steps::border::padded_size(image.width(), image.height(), vertical, horizontal) {
                Some(_) => Ok(steps::border::apply(image, vertical, horizontal, mode)),
                None => Err(format!(
                    "padding a {}x{} image by {}x{} overflows the image size",
                    image.width(),
                    image.height(),
                    horizontal,
                    vertical
                )),
            },
            Self::Resize { width, height } => Ok(steps::resize::apply(image, width, height)),
            Self::Erode { kernel, iterations } => on_gray(image, |g| {
                steps::morphology::erode(g, kernel, iterations)
            }),
            Self::Dilate { kernel, iterations } => on_gray(image, |g| {
                steps::morphology::dilate(g, kernel, iterations)
            }),
            Self::Opening { kernel } => on_gray(image, |g| steps::morphology::opening(g, kernel)),
            Self::Closing { kernel } => on_gray(image, |g| steps::morphology::closing(g, kernel)),
            Self::Gradient { kernel } => on_gray(image, |g| steps::morphology::gradient(g, kernel)),
            Self::Threshold { level, inverted } => {
                on_gray(image, |g| steps::threshold::fixed(g, level, inverted))
            }
            Self::ThresholdOtsu => on_gray(image, steps::threshold::otsu),
            Self::AdaptiveThreshold { block_size, c } => {
                on_gray(image, |g| steps::threshold::adaptive(g, block_size, c))
            }
            Self::FillHoles => on_gray(image, steps::fill_holes::apply),
            Self::LineRemoval { width } => on_gray(image, |g| steps::line_removal::apply(g, width)),
            Self::Blur { kernel } => on_gray(image, |g| steps::blur::apply(g, kernel)),
            Self::RemoveContours { area } => {
                on_gray(image, |g| steps::remove_contours::apply(g, area))
            }
            Self::HistogramEqualisation => on_gray(image, steps::equalise::apply),
        })
    }
}

fn on_gray<F>(image: DynamicImage, op: F) -> Result<DynamicImage, String>
where
    F: FnOnce(&GrayImage) -> GrayImage,
{
    match image.as_luma8() {
        Some(gray) => Ok(DynamicImage::ImageLuma8(op(gray))),
        None => Err(format!(
            "requires a single-channel image but the buffer has {} channels (apply grey first)",
            image.color().channel_count()
        )),
    }
}

/// Positional parameter reader.
struct Params<'a> {
    values: &'a [Value],
    position: usize,
}

impl<'a> Params<'a> {
    fn new(values: &'a [Value]) -> Self {
        Self {
            values,
            position: 0,
        }
    }

    fn next(&mut self) -> Option<&'a Value> {
        let value = self.values.get(self.position);
        if value.is_some() {
            self.position += 1;
        }
        value
    }

    fn uint(&mut self, what: &str) -> Result<u32, String> {
        let value = self
            .next()
            .ok_or_else(|| format!("missing parameter: {}", what))?;
        as_uint(value).ok_or_else(|| format!("{} must be a non-negative integer, got {}", what, value))
    }

    fn uint_or(&mut self, what: &str, default: u32) -> Result<u32, String> {
        match self.next() {
            Some(value) => as_uint(value)
                .ok_or_else(|| format!("{} must be a non-negative integer, got {}", what, value)),
            None => Ok(default),
        }
    }

    fn kernel(&mut self, what: &str) -> Result<u32, String> {
        let value = self.uint(what)?;
        if value == 0 {
            return Err(format!("{} must be positive", what));
        }
        Ok(value)
    }

    fn morph_kernel(&mut self) -> Result<u32, String> {
        let value = self.kernel("kernel size")?;
        if value > MAX_KERNEL {
            return Err(format!("kernel size must be at most {}, got {}", MAX_KERNEL, value));
        }
        Ok(value)
    }

    fn at_most(&mut self, what: &str, max: u32) -> Result<u32, String> {
        let value = self.uint(what)?;
        if value > max {
            return Err(format!("{} must be at most {}, got {}", what, max, value));
        }
        Ok(value)
    }

    fn level(&mut self, what: &str) -> Result<u8, String> {
        let value = self.uint(what)?;
        u8::try_from(value).map_err(|_| format!("{} must be within 0-255, got {}", what, value))
    }

    fn float(&mut self, what: &str) -> Result<f64, String> {
        let value = self
            .next()
            .ok_or_else(|| format!("missing parameter: {}", what))?;
        value
            .as_f64()
            .ok_or_else(|| format!("{} must be a number, got {}", what, value))
    }

    fn boolean_or(&mut self, what: &str, default: bool) -> Result<bool, String> {
        match self.next() {
            None => Ok(default),
            Some(Value::Bool(b)) => Ok(*b),
            Some(Value::Number(n)) => Ok(n.as_f64().map(|f| f != 0.0).unwrap_or(false)),
            Some(other) => Err(format!("{} must be a boolean, got {}", what, other)),
        }
    }

    fn colour_or(&mut self, default: [u8; 3]) -> Result<[u8; 3], String> {
        let value = match self.next() {
            None => return Ok(default),
            Some(value) => value,
        };

        let channel = |v: &Value| {
            as_uint(v)
                .and_then(|c| u8::try_from(c).ok())
                .ok_or_else(|| format!("colour components must be within 0-255, got {}", v))
        };

        match value {
            Value::Array(items) if !items.is_empty() && items.len() <= 3 => {
                let mut colour = [0u8; 3];
                for (slot, item) in colour.iter_mut().zip(items) {
                    *slot = channel(item)?;
                }
                Ok(colour)
            }
            Value::Number(_) => {
                let c = channel(value)?;
                Ok([c, c, c])
            }
            other => Err(format!("colour must be a number or a list of 1-3 numbers, got {}", other)),
        }
    }

    fn finish(self) -> Result<(), String> {
        if self.position < self.values.len() {
            return Err(format!(
                "expected at most {} parameters, got {}",
                self.position,
                self.values.len()
            ));
        }
        Ok(())
    }
}

/// Non-negative integers; floats are truncated towards zero.
fn as_uint(value: &Value) -> Option<u32> {
    if let Some(n) = value.as_u64() {
        return u32::try_from(n).ok();
    }
    value
        .as_f64()
        .filter(|f| *f >= 0.0 && f.is_finite() && *f <= u32::MAX as f64)
        .map(|f| f as u32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma, RgbImage};
    use serde_json::json;

    fn parse(name: &str, params: Value) -> Result<Operation, String> {
        let params = params.as_array().cloned().unwrap_or_default();
        Operation::parse(name, &params)
    }

    #[test]
    fn test_parse_defaults() {
        assert_eq!(
            parse("erode", json!([3])).unwrap(),
            Operation::Erode {
                kernel: 3,
                iterations: 1
            }
        );
        assert_eq!(
            parse("threshold", json!([127])).unwrap(),
            Operation::Threshold {
                level: 127,
                inverted: false
            }
        );
        assert_eq!(
            parse("border", json!([4, 4])).unwrap(),
            Operation::Border {
                vertical: 4,
                horizontal: 4,
                mode: BorderMode::Constant([0, 0, 0])
            }
        );
    }

    #[test]
    fn test_parse_ignores_suffix() {
        assert_eq!(
            parse("dilate_2", json!([2, 3])).unwrap(),
            Operation::Dilate {
                kernel: 2,
                iterations: 3
            }
        );
        assert_eq!(parse("grey_again", json!([])).unwrap(), Operation::Grey);
    }

    #[test]
    fn test_parse_border_replicate_and_colour() {
        assert_eq!(
            parse("border", json!([1, 2, true])).unwrap(),
            Operation::Border {
                vertical: 1,
                horizontal: 2,
                mode: BorderMode::Replicate
            }
        );
        assert_eq!(
            parse("border", json!([1, 2, false, [255, 255, 255]])).unwrap(),
            Operation::Border {
                vertical: 1,
                horizontal: 2,
                mode: BorderMode::Constant([255, 255, 255])
            }
        );
    }

    #[test]
    fn test_parse_accepts_integral_floats() {
        assert_eq!(parse("blur", json!([3.0])).unwrap(), Operation::Blur { kernel: 3 });
    }

    #[test]
    fn test_parse_rejects_bad_input() {
        assert!(parse("sharpen", json!([])).unwrap_err().contains("unknown operation"));
        assert!(parse("erode", json!([])).is_err());
        assert!(parse("erode", json!([0])).is_err());
        assert!(parse("blur", json!([4])).is_err());
        assert!(parse("threshold", json!([300])).is_err());
        assert!(parse("adaptiveThreshold", json!([4, 2])).is_err());
        assert!(parse("grey", json!([1])).unwrap_err().contains("at most 0"));
        assert!(parse("resize", json!([28, "28"])).is_err());
    }

    #[test]
    fn test_parse_bounds_kernel_and_border_sizes() {
        assert!(parse("closing", json!([511])).is_ok());
        assert!(parse("closing", json!([512])).unwrap_err().contains("at most 511"));
        assert!(parse("erode_2", json!([4000, 2])).is_err());
        assert!(parse("border", json!([4096, 1])).is_ok());
        assert!(parse("border", json!([1, 4097])).unwrap_err().contains("width"));
        assert!(parse("border", json!([u32::MAX, u32::MAX])).is_err());
    }

    #[test]
    fn test_oversized_border_is_an_error_not_an_overflow() {
        let buffer = RasterBuffer::from_gray(GrayImage::new(4, 4));
        let err = Operation::Border {
            vertical: 0,
            horizontal: u32::MAX / 2,
            mode: BorderMode::Replicate,
        }
        .apply(buffer)
        .unwrap_err();
        assert!(err.contains("overflows"));
    }

    #[test]
    fn test_single_channel_operation_rejects_colour_buffer() {
        let buffer = RasterBuffer::from_rgb(RgbImage::new(4, 4));
        let err = Operation::Erode {
            kernel: 3,
            iterations: 1,
        }
        .apply(buffer)
        .unwrap_err();
        assert!(err.contains("3 channels"));
    }

    #[test]
    fn test_colour_operations_accept_three_channels() {
        let buffer = RasterBuffer::from_rgb(RgbImage::new(6, 3));
        let resized = Operation::Resize {
            width: 10,
            height: 10,
        }
        .apply(buffer)
        .unwrap();
        assert_eq!(resized.dimensions(), (10, 10));
        assert_eq!(resized.channels(), 3);

        let grey = Operation::Grey.apply(resized).unwrap();
        assert_eq!(grey.channels(), 1);
    }

    #[test]
    fn test_apply_threshold() {
        let buffer = RasterBuffer::from_gray(GrayImage::from_pixel(2, 2, Luma([90])));
        let result = Operation::Threshold {
            level: 50,
            inverted: true,
        }
        .apply(buffer)
        .unwrap();
        assert_eq!(result.as_gray().unwrap().get_pixel(0, 0).0[0], 0);
    }
}
