//! Aspect ratios, crop strategies, and crop-window sizing.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::geometry::{Frame, Point, Rect, SafeArea, Size};

/// A target aspect ratio such as `9:16`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AspectRatio {
    pub width: u32,
    pub height: u32,
}

/// Errors parsing an aspect ratio string.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AspectRatioError {
    #[error("aspect ratio must look like W:H, got {0:?}")]
    Malformed(String),

    #[error("aspect ratio terms must be positive, got {0:?}")]
    NonPositive(String),
}

impl AspectRatio {
    pub const VERTICAL: AspectRatio = AspectRatio::new_const(9, 16);
    pub const PORTRAIT: AspectRatio = AspectRatio::new_const(4, 5);
    pub const SQUARE: AspectRatio = AspectRatio::new_const(1, 1);
    pub const LANDSCAPE: AspectRatio = AspectRatio::new_const(16, 9);

    const fn new_const(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn new(width: u32, height: u32) -> Result<Self, AspectRatioError> {
        if width == 0 || height == 0 {
            return Err(AspectRatioError::NonPositive(format!("{width}:{height}")));
        }
        Ok(Self { width, height })
    }

    /// Ratio as `width / height`.
    pub fn value(&self) -> f64 {
        self.width as f64 / self.height as f64
    }
}

impl fmt::Display for AspectRatio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.width, self.height)
    }
}

impl FromStr for AspectRatio {
    type Err = AspectRatioError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (w, h) = s
            .trim()
            .split_once(':')
            .ok_or_else(|| AspectRatioError::Malformed(s.to_string()))?;
        let width = w
            .trim()
            .parse::<u32>()
            .map_err(|_| AspectRatioError::Malformed(s.to_string()))?;
        let height = h
            .trim()
            .parse::<u32>()
            .map_err(|_| AspectRatioError::Malformed(s.to_string()))?;
        Self::new(width, height).map_err(|_| AspectRatioError::NonPositive(s.to_string()))
    }
}

impl TryFrom<String> for AspectRatio {
    type Error = AspectRatioError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<AspectRatio> for String {
    fn from(value: AspectRatio) -> Self {
        value.to_string()
    }
}

/// How clips are turned into pixels at export time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CropStrategy {
    /// Follow detected subjects with a hard crop (letterbox where flagged).
    SmartCrop,
    /// Ignore detections; scale the full frame to fit and pad.
    CenterCrop,
}

impl CropStrategy {
    pub fn as_str(self) -> &'static str {
        match self {
            CropStrategy::SmartCrop => "smart-crop",
            CropStrategy::CenterCrop => "center-crop",
        }
    }
}

impl fmt::Display for CropStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CropStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "smart-crop" | "smart" => Ok(CropStrategy::SmartCrop),
            "center-crop" | "center" => Ok(CropStrategy::CenterCrop),
            other => Err(format!(
                "unknown crop strategy {other:?} (expected smart-crop or center-crop)"
            )),
        }
    }
}

/// Largest rectangle of `ratio` that fits inside `source`, rounded down to
/// even pixel counts.
pub fn crop_size_for_ratio(source: Size, ratio: AspectRatio) -> Size {
    let target = ratio.value();
    let (w, h) = if source.aspect() > target {
        // Source is wider: keep the full height.
        (source.height * target, source.height)
    } else {
        (source.width, source.width / target)
    };
    Size::new(
        floor_even(w.min(source.width)),
        floor_even(h.min(source.height)),
    )
}

fn floor_even(v: f64) -> f64 {
    let v = v.max(0.0).floor() as u64;
    (v - v % 2) as f64
}

/// The crop window for one (safe area, target ratio) pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CropRegion {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    pub target_aspect_ratio: AspectRatio,
}

impl CropRegion {
    /// Crop window of `ratio` centered inside the safe area.
    pub fn centered(safe_area: &SafeArea, ratio: AspectRatio) -> Self {
        let bounds = safe_area.rect();
        let size = crop_size_for_ratio(bounds.size(), ratio);
        Self {
            x: bounds.x + ((bounds.width - size.width) / 2.0).max(0.0),
            y: bounds.y + ((bounds.height - size.height) / 2.0).max(0.0),
            width: size.width,
            height: size.height,
            target_aspect_ratio: ratio,
        }
    }

    pub fn size(&self) -> Size {
        Size::new(self.width, self.height)
    }

    pub fn origin(&self) -> Point<Frame> {
        Point::new(self.x, self.y)
    }

    /// The same window moved to a new top-left.
    pub fn at(&self, origin: Point<Frame>) -> Rect<Frame> {
        Rect::at(origin, self.size())
    }
}


#[cfg(test)]
mod proptests {
    use super::*;
    use crate::geometry::clamp_crop_origin;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn crop_size_fits_source_and_is_even(
            w in 16.0..8000.0f64,
            h in 16.0..8000.0f64,
            rw in 1u32..32,
            rh in 1u32..32,
        ) {
            let ratio = AspectRatio::new(rw, rh).unwrap();
            let crop = crop_size_for_ratio(Size::new(w, h), ratio);
            prop_assert!(crop.width <= w && crop.height <= h);
            prop_assert_eq!(crop.width % 2.0, 0.0);
            prop_assert_eq!(crop.height % 2.0, 0.0);
        }

        #[test]
        fn clamped_crop_stays_inside(
            x in -5000.0..5000.0f64,
            y in -5000.0..5000.0f64,
            cw in 2.0..1920.0f64,
            ch in 2.0..1080.0f64,
        ) {
            let bounds = Size::new(1920.0, 1080.0);
            let p: Point = clamp_crop_origin(Point::new(x, y), bounds, Size::new(cw, ch));
            prop_assert!(p.x >= 0.0 && p.y >= 0.0);
            prop_assert!(p.x + cw <= bounds.width + 1e-9);
            prop_assert!(p.y + ch <= bounds.height + 1e-9);
        }
    }
}
