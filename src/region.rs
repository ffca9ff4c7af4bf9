//! Watermark region configuration and filter-spec math.
//!
//! A [`RegionConfig`] anchors the watermark rectangle by percentage offsets
//! (x, y in 0–100) while width and height are absolute pixels, independent of
//! the frame resolution. [`RegionConfig::to_filter_spec`] converts the anchor
//! into the source frame's *native* pixel space. Any on-screen preview works
//! in scaled coordinates and must remap through its own scale factors; the
//! spec handed to the engine always uses native dimensions untouched.

use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// Default region width in pixels (typical Sora watermark is ~200x60).
pub const DEFAULT_REGION_WIDTH: u32 = 200;
/// Default region height in pixels.
pub const DEFAULT_REGION_HEIGHT: u32 = 60;

/// A named corner preset, expressed as fixed percentage offsets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Preset {
    /// Bottom-right corner (x=82%, y=88%). The usual Sora placement.
    BottomRight,
    /// Bottom-left corner (x=2%, y=88%).
    BottomLeft,
    /// Top-right corner (x=82%, y=2%).
    TopRight,
    /// Top-left corner (x=2%, y=2%).
    TopLeft,
    /// User-edited position; no fixed constants.
    Custom,
}

impl Preset {
    /// The fixed `(x, y)` percentage anchor for a named preset.
    ///
    /// Returns `None` for [`Preset::Custom`], which has no constants.
    #[must_use]
    pub fn anchor(self) -> Option<(u32, u32)> {
        match self {
            Preset::BottomRight => Some((82, 88)),
            Preset::BottomLeft => Some((2, 88)),
            Preset::TopRight => Some((82, 2)),
            Preset::TopLeft => Some((2, 2)),
            Preset::Custom => None,
        }
    }

    /// All named (non-custom) presets.
    #[must_use]
    pub fn named() -> [Preset; 4] {
        [
            Preset::BottomRight,
            Preset::BottomLeft,
            Preset::TopRight,
            Preset::TopLeft,
        ]
    }
}

impl fmt::Display for Preset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Preset::BottomRight => "bottom-right",
            Preset::BottomLeft => "bottom-left",
            Preset::TopRight => "top-right",
            Preset::TopLeft => "top-left",
            Preset::Custom => "custom",
        };
        f.write_str(name)
    }
}

impl FromStr for Preset {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "bottom-right" => Ok(Preset::BottomRight),
            "bottom-left" => Ok(Preset::BottomLeft),
            "top-right" => Ok(Preset::TopRight),
            "top-left" => Ok(Preset::TopLeft),
            "custom" => Ok(Preset::Custom),
            other => Err(Error::InvalidPreset(other.to_string())),
        }
    }
}

/// The watermark rectangle: percentage anchor plus pixel dimensions.
///
/// Invariant: `x` and `y` are within 0–100, `width` and `height` are
/// positive. Nothing ties the rectangle to the actual frame bounds; it may
/// extend past the frame edge, which is accepted rather than corrected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegionConfig {
    x: u32,
    y: u32,
    width: u32,
    height: u32,
    preset: Preset,
}

impl Default for RegionConfig {
    /// Bottom-right preset with a 200x60 rectangle.
    fn default() -> Self {
        let (x, y) = Preset::BottomRight.anchor().unwrap_or((0, 0));
        Self {
            x,
            y,
            width: DEFAULT_REGION_WIDTH,
            height: DEFAULT_REGION_HEIGHT,
            preset: Preset::BottomRight,
        }
    }
}

impl RegionConfig {
    /// Create a region from explicit fields.
    ///
    /// The preset tag is inferred: if `(x, y)` coincide with a named preset's
    /// constants the tag is that preset, otherwise [`Preset::Custom`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidRegionField`] if `x`/`y` exceed 100 or
    /// `width`/`height` are zero.
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Result<Self> {
        let mut config = Self::default();
        config.set_x(x)?;
        config.set_y(y)?;
        config.set_width(width)?;
        config.set_height(height)?;
        Ok(config)
    }

    /// Horizontal anchor as a percentage of frame width.
    #[must_use]
    pub fn x(&self) -> u32 {
        self.x
    }

    /// Vertical anchor as a percentage of frame height.
    #[must_use]
    pub fn y(&self) -> u32 {
        self.y
    }

    /// Region width in pixels.
    #[must_use]
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Region height in pixels.
    #[must_use]
    pub fn height(&self) -> u32 {
        self.height
    }

    /// The current preset tag.
    #[must_use]
    pub fn preset(&self) -> Preset {
        self.preset
    }

    /// Apply a named preset: overwrites `x`/`y` with the preset's constants
    /// and records the preset. `width`/`height` are untouched.
    ///
    /// Applying [`Preset::Custom`] only changes the tag; the anchor keeps its
    /// current values.
    pub fn apply_preset(&mut self, preset: Preset) {
        if let Some((x, y)) = preset.anchor() {
            self.x = x;
            self.y = y;
        }
        self.preset = preset;
    }

    /// Set the horizontal anchor percentage.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidRegionField`] for values above 100.
    pub fn set_x(&mut self, x: u32) -> Result<()> {
        if x > 100 {
            return Err(Error::InvalidRegionField {
                field: "x",
                value: i64::from(x),
            });
        }
        self.x = x;
        self.retag();
        Ok(())
    }

    /// Set the vertical anchor percentage.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidRegionField`] for values above 100.
    pub fn set_y(&mut self, y: u32) -> Result<()> {
        if y > 100 {
            return Err(Error::InvalidRegionField {
                field: "y",
                value: i64::from(y),
            });
        }
        self.y = y;
        self.retag();
        Ok(())
    }

    /// Set the region width in pixels.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidRegionField`] for zero.
    pub fn set_width(&mut self, width: u32) -> Result<()> {
        if width == 0 {
            return Err(Error::InvalidRegionField {
                field: "width",
                value: 0,
            });
        }
        self.width = width;
        Ok(())
    }

    /// Set the region height in pixels.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidRegionField`] for zero.
    pub fn set_height(&mut self, height: u32) -> Result<()> {
        if height == 0 {
            return Err(Error::InvalidRegionField {
                field: "height",
                value: 0,
            });
        }
        self.height = height;
        Ok(())
    }

    /// Re-derive the preset tag after an anchor edit: a named preset if the
    /// anchor coincides with its constants, otherwise custom.
    fn retag(&mut self) {
        self.preset = Preset::named()
            .into_iter()
            .find(|p| p.anchor() == Some((self.x, self.y)))
            .unwrap_or(Preset::Custom);
    }

    /// Produce the removal-region parameters for the engine, in the source
    /// frame's *native* resolution.
    ///
    /// Position scales by the frame dimensions (`x_px = frame_w * x / 100`);
    /// width and height pass through in absolute pixels unchanged.
    #[must_use]
    pub fn to_filter_spec(&self, frame_width: u32, frame_height: u32) -> FilterSpec {
        FilterSpec {
            x: frame_width * self.x / 100,
            y: frame_height * self.y / 100,
            width: self.width,
            height: self.height,
        }
    }
}

/// The rectangle handed to the engine, in native pixel space.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FilterSpec {
    /// Left edge in pixels.
    pub x: u32,
    /// Top edge in pixels.
    pub y: u32,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl FilterSpec {
    /// Render the engine filter expression for blanking this rectangle.
    #[must_use]
    pub fn to_filter_string(&self) -> String {
        format!(
            "delogo=x={}:y={}:w={}:h={}:show=0",
            self.x, self.y, self.width, self.height
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_bottom_right_200x60() {
        let config = RegionConfig::default();
        assert_eq!(config.preset(), Preset::BottomRight);
        assert_eq!((config.x(), config.y()), (82, 88));
        assert_eq!((config.width(), config.height()), (200, 60));
    }

    #[test]
    fn preset_anchors_match_documented_constants() {
        assert_eq!(Preset::BottomRight.anchor(), Some((82, 88)));
        assert_eq!(Preset::BottomLeft.anchor(), Some((2, 88)));
        assert_eq!(Preset::TopRight.anchor(), Some((82, 2)));
        assert_eq!(Preset::TopLeft.anchor(), Some((2, 2)));
        assert_eq!(Preset::Custom.anchor(), None);
    }

    #[test]
    fn preset_parses_from_kebab_case() {
        assert_eq!("bottom-right".parse::<Preset>().unwrap(), Preset::BottomRight);
        assert_eq!("top-left".parse::<Preset>().unwrap(), Preset::TopLeft);
        assert!(matches!(
            "middle".parse::<Preset>(),
            Err(Error::InvalidPreset(_))
        ));
    }

    #[test]
    fn apply_preset_overwrites_anchor_keeps_dimensions() {
        let mut config = RegionConfig::new(10, 20, 320, 90).unwrap();
        config.apply_preset(Preset::TopLeft);
        assert_eq!((config.x(), config.y()), (2, 2));
        assert_eq!((config.width(), config.height()), (320, 90));
        assert_eq!(config.preset(), Preset::TopLeft);
    }

    #[test]
    fn preset_anchor_maps_to_documented_fraction_of_frame() {
        // Property 1: preset then to_filter_spec yields the documented
        // percentage of the frame, independent of width/height.
        for preset in Preset::named() {
            let mut config = RegionConfig::new(50, 50, 17, 333).unwrap();
            config.apply_preset(preset);
            let spec = config.to_filter_spec(1920, 1080);
            let (px, py) = preset.anchor().unwrap();
            assert_eq!(spec.x, 1920 * px / 100);
            assert_eq!(spec.y, 1080 * py / 100);
            assert_eq!(spec.width, 17);
            assert_eq!(spec.height, 333);
        }
    }

    #[test]
    fn filter_spec_scales_position_but_not_dimensions() {
        let config = RegionConfig::new(50, 25, 200, 60).unwrap();

        let spec = config.to_filter_spec(1920, 1080);
        assert_eq!(spec.x, 960);
        assert_eq!(spec.y, 270);
        assert_eq!(spec.width, 200);
        assert_eq!(spec.height, 60);

        // Same config, different resolution: position moves, size does not.
        let spec = config.to_filter_spec(640, 480);
        assert_eq!(spec.x, 320);
        assert_eq!(spec.y, 120);
        assert_eq!(spec.width, 200);
        assert_eq!(spec.height, 60);
    }

    #[test]
    fn anchor_edits_reject_out_of_range() {
        let mut config = RegionConfig::default();
        assert!(matches!(
            config.set_x(101),
            Err(Error::InvalidRegionField { field: "x", .. })
        ));
        assert!(matches!(
            config.set_y(999),
            Err(Error::InvalidRegionField { field: "y", .. })
        ));
        assert!(config.set_x(0).is_ok());
        assert!(config.set_x(100).is_ok());
    }

    #[test]
    fn dimension_edits_reject_zero() {
        let mut config = RegionConfig::default();
        assert!(config.set_width(0).is_err());
        assert!(config.set_height(0).is_err());
        assert!(config.set_width(1).is_ok());
    }

    #[test]
    fn field_edit_demotes_preset_to_custom() {
        let mut config = RegionConfig::default();
        config.set_x(50).unwrap();
        assert_eq!(config.preset(), Preset::Custom);
    }

    #[test]
    fn field_edit_matching_preset_constants_keeps_preset_tag() {
        let mut config = RegionConfig::default();
        config.set_x(50).unwrap();
        assert_eq!(config.preset(), Preset::Custom);

        // Editing back to the bottom-right constants re-tags the preset.
        config.set_x(82).unwrap();
        assert_eq!(config.preset(), Preset::BottomRight);
    }

    #[test]
    fn filter_string_renders_delogo_expression() {
        let spec = FilterSpec {
            x: 1574,
            y: 950,
            width: 200,
            height: 60,
        };
        assert_eq!(
            spec.to_filter_string(),
            "delogo=x=1574:y=950:w=200:h=60:show=0"
        );
    }

    #[test]
    fn region_may_extend_past_frame_edge() {
        // Accepted, not corrected: a bottom-right anchor with a large
        // rectangle produces a spec that overhangs the frame.
        let config = RegionConfig::new(82, 88, 800, 400).unwrap();
        let spec = config.to_filter_spec(640, 480);
        assert!(spec.x + spec.width > 640);
        assert!(spec.y + spec.height > 480);
    }
}
