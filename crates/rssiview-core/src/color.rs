//! Continuous cold→hot color scale used to tint the RSSI indicator.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }
}

/// Piecewise-linear color scale over `[0, 1]`.
#[derive(Debug, Clone)]
pub struct ColorScale {
    stops: &'static [(f64, Rgb)],
}

// Diverging blue→grey→red, sampled from the Moreland "cool to warm" map.
const COOLWARM: &[(f64, Rgb)] = &[
    (0.0, Rgb::new(59, 76, 192)),
    (0.125, Rgb::new(98, 130, 234)),
    (0.25, Rgb::new(141, 176, 254)),
    (0.375, Rgb::new(184, 208, 249)),
    (0.5, Rgb::new(221, 221, 221)),
    (0.625, Rgb::new(245, 196, 173)),
    (0.75, Rgb::new(244, 154, 123)),
    (0.875, Rgb::new(222, 96, 77)),
    (1.0, Rgb::new(180, 4, 38)),
];

impl ColorScale {
    pub fn coolwarm() -> Self {
        Self { stops: COOLWARM }
    }

    /// Color at `t`. Inputs outside `[0, 1]` (and NaN) are pinned to the ends.
    pub fn at(&self, t: f64) -> Rgb {
        let t = if t.is_nan() { 0.0 } else { t.clamp(0.0, 1.0) };

        let upper = self
            .stops
            .iter()
            .position(|&(pos, _)| pos >= t)
            .unwrap_or(self.stops.len() - 1);
        if upper == 0 {
            return self.stops[0].1;
        }

        let (p0, c0) = self.stops[upper - 1];
        let (p1, c1) = self.stops[upper];
        let f = (t - p0) / (p1 - p0);
        let lerp = |a: u8, b: u8| (a as f64 + (b as f64 - a as f64) * f).round() as u8;
        Rgb::new(lerp(c0.r, c1.r), lerp(c0.g, c1.g), lerp(c0.b, c1.b))
    }
}

impl Default for ColorScale {
    fn default() -> Self {
        Self::coolwarm()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoints_are_cold_and_hot() {
        let scale = ColorScale::coolwarm();
        let cold = scale.at(0.0);
        let hot = scale.at(1.0);
        assert!(cold.b > cold.r);
        assert!(hot.r > hot.b);
    }

    #[test]
    fn out_of_range_input_is_pinned() {
        let scale = ColorScale::coolwarm();
        assert_eq!(scale.at(-3.0), scale.at(0.0));
        assert_eq!(scale.at(7.5), scale.at(1.0));
        assert_eq!(scale.at(f64::NAN), scale.at(0.0));
    }

    #[test]
    fn interpolates_between_stops() {
        let scale = ColorScale::coolwarm();
        assert_eq!(scale.at(0.5), Rgb::new(221, 221, 221));
        let mid = scale.at(0.5625);
        assert!(mid.r > 221 && mid.r < 245);
    }
}
