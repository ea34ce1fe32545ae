use crate::audio::BIN_COUNT;

/// Number of bars in the meter
pub const BAR_COUNT: usize = 20;

/// Bars never drop below this height, so a stopped meter still draws a
/// baseline
pub const MIN_BAR_HEIGHT: f32 = 3.0;

/// Height treated as full scale when rendering
pub const FULL_SCALE_HEIGHT: f32 = 50.0;

const HEIGHT_PER_LEVEL: f32 = 0.5;

const HUE_SPAN: f32 = 180.0;
const HUE_OFFSET: f32 = 200.0;
const SATURATION: f32 = 0.8;
const LIGHTNESS: f32 = 0.6;

/// Fixed-size bar set driven by frequency snapshots
///
/// Heights are pure functions of the sampled bin values; the meter holds no
/// other state, so resetting it on stop fully settles the display.
pub struct Visualizer {
    heights: [f32; BAR_COUNT],
}

impl Visualizer {
    /// All bars at minimum height
    #[must_use]
    pub const fn new() -> Self {
        Self {
            heights: [MIN_BAR_HEIGHT; BAR_COUNT],
        }
    }

    /// Update every bar from a frequency snapshot, one bin per bar at a
    /// fixed stride across the buffer
    pub fn update(&mut self, bins: &[u8]) {
        let step = bins.len() / BAR_COUNT;
        if step == 0 {
            self.reset();
            return;
        }
        for (i, height) in self.heights.iter_mut().enumerate() {
            *height = bar_height(bins[i * step]);
        }
    }

    /// Drop every bar back to minimum height
    pub fn reset(&mut self) {
        self.heights = [MIN_BAR_HEIGHT; BAR_COUNT];
    }

    /// Current bar heights
    #[must_use]
    pub const fn heights(&self) -> &[f32; BAR_COUNT] {
        &self.heights
    }
}

impl Default for Visualizer {
    fn default() -> Self {
        Self::new()
    }
}

/// Bar height for a sampled amplitude byte
#[must_use]
pub fn bar_height(value: u8) -> f32 {
    (f32::from(value) * HEIGHT_PER_LEVEL).max(MIN_BAR_HEIGHT)
}

/// Hue rotation across the bar index range
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn bar_hue(index: usize) -> f32 {
    (index as f32 / BAR_COUNT as f32) * HUE_SPAN + HUE_OFFSET
}

/// RGB color for a bar, fixed saturation and lightness
#[must_use]
pub fn bar_color(index: usize) -> (u8, u8, u8) {
    hsl_to_rgb(bar_hue(index), SATURATION, LIGHTNESS)
}

/// Default bin source width sanity check for [`Visualizer::update`]
#[must_use]
pub const fn default_stride() -> usize {
    BIN_COUNT / BAR_COUNT
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn hsl_to_rgb(hue: f32, saturation: f32, lightness: f32) -> (u8, u8, u8) {
    let h = hue.rem_euclid(360.0);
    let c = (1.0 - (2.0 * lightness - 1.0).abs()) * saturation;
    let x = c * (1.0 - ((h / 60.0).rem_euclid(2.0) - 1.0).abs());
    let m = lightness - c / 2.0;

    let (r, g, b) = match h {
        h if h < 60.0 => (c, x, 0.0),
        h if h < 120.0 => (x, c, 0.0),
        h if h < 180.0 => (0.0, c, x),
        h if h < 240.0 => (0.0, x, c),
        h if h < 300.0 => (x, 0.0, c),
        _ => (c, 0.0, x),
    };

    (
        ((r + m) * 255.0).round() as u8,
        ((g + m) * 255.0).round() as u8,
        ((b + m) * 255.0).round() as u8,
    )
}

#[cfg(test)]
#[allow(clippy::float_cmp)] // Heights come from exact arithmetic
mod tests {
    use super::*;

    #[test]
    fn test_new_starts_at_minimum() {
        let viz = Visualizer::new();
        assert!(viz.heights().iter().all(|&h| h == MIN_BAR_HEIGHT));
    }

    #[test]
    fn test_bar_height_floor() {
        assert_eq!(bar_height(0), MIN_BAR_HEIGHT);
        assert_eq!(bar_height(5), MIN_BAR_HEIGHT);
        assert_eq!(bar_height(6), MIN_BAR_HEIGHT);
    }

    #[test]
    fn test_bar_height_scales_linearly() {
        assert_eq!(bar_height(100), 50.0);
        assert_eq!(bar_height(40), 20.0);
    }

    #[test]
    fn test_update_uses_strided_bins() {
        let mut viz = Visualizer::new();
        let mut bins = [0_u8; BIN_COUNT];
        // Only values at stride positions should matter.
        let step = default_stride();
        bins[0] = 100;
        bins[step] = 60;
        bins[1] = 255; // Off-stride, must be ignored

        viz.update(&bins);
        assert_eq!(viz.heights()[0], 50.0);
        assert_eq!(viz.heights()[1], 30.0);
        assert_eq!(viz.heights()[2], MIN_BAR_HEIGHT);
    }

    #[test]
    fn test_update_with_empty_bins_resets() {
        let mut viz = Visualizer::new();
        viz.update(&[255_u8; BIN_COUNT]);
        assert!(viz.heights().iter().any(|&h| h > MIN_BAR_HEIGHT));

        viz.update(&[]);
        assert!(viz.heights().iter().all(|&h| h == MIN_BAR_HEIGHT));
    }

    #[test]
    fn test_reset_settles_all_bars() {
        let mut viz = Visualizer::new();
        viz.update(&[200_u8; BIN_COUNT]);
        viz.reset();
        assert!(viz.heights().iter().all(|&h| h == MIN_BAR_HEIGHT));
    }

    #[test]
    fn test_hue_rotation_range() {
        assert_eq!(bar_hue(0), 200.0);
        let last = bar_hue(BAR_COUNT - 1);
        assert!(last < 380.0 && last > 200.0);
    }

    #[test]
    fn test_bar_colors_vary_across_index() {
        assert_ne!(bar_color(0), bar_color(BAR_COUNT - 1));
    }

    #[test]
    fn test_hsl_to_rgb_known_values() {
        assert_eq!(hsl_to_rgb(0.0, 1.0, 0.5), (255, 0, 0));
        assert_eq!(hsl_to_rgb(120.0, 1.0, 0.5), (0, 255, 0));
        assert_eq!(hsl_to_rgb(240.0, 1.0, 0.5), (0, 0, 255));
    }
}
