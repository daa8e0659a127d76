//! RGBA color values
//!
//! Colors are stored as four `f32` channels in `[0, 1]`. Configuration files
//! write them either as a hex code (`#RGB`, `#RGBA`, `#RRGGBB`, `#RRGGBBAA`) or
//! as an array of three or four floats; both forms deserialize into [`Color`].

use serde::{Deserialize, Deserializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Color parsing errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ColorError {
    /// Hex code has a bad prefix, length, or digit
    #[error("invalid hex color code '{0}'")]
    InvalidHex(String),

    /// Channel array is not 3 or 4 values long
    #[error("expected 3 or 4 color channels, got {0}")]
    ChannelCount(usize),
}

/// Linear or sRGB-encoded RGBA color
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Color {
    /// Red channel
    pub r: f32,
    /// Green channel
    pub g: f32,
    /// Blue channel
    pub b: f32,
    /// Alpha channel
    pub a: f32,
}

impl Default for Color {
    fn default() -> Self {
        Self::rgb(0.0, 0.0, 0.0)
    }
}

impl Color {
    /// Create a color from all four channels
    pub const fn new(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }

    /// Create an opaque color
    pub const fn rgb(r: f32, g: f32, b: f32) -> Self {
        Self::new(r, g, b, 1.0)
    }

    /// Parse a `#RGB`, `#RGBA`, `#RRGGBB` or `#RRGGBBAA` hex code
    pub fn from_hex(code: &str) -> Result<Self, ColorError> {
        let invalid = || ColorError::InvalidHex(code.to_string());

        let digits = code.strip_prefix('#').ok_or_else(invalid)?;
        if !digits.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(invalid());
        }

        // Short forms repeat each digit: #F80 == #FF8800
        let expanded: String = match digits.len() {
            3 | 4 => digits.chars().flat_map(|c| [c, c]).collect(),
            6 | 8 => digits.to_string(),
            _ => return Err(invalid()),
        };

        let channel = |index: usize| -> Result<f32, ColorError> {
            let byte = u8::from_str_radix(&expanded[index * 2..index * 2 + 2], 16).map_err(|_| invalid())?;
            Ok(f32::from(byte) / 255.0)
        };

        let a = if expanded.len() == 8 { channel(3)? } else { 1.0 };
        Ok(Self::new(channel(0)?, channel(1)?, channel(2)?, a))
    }

    /// Build a color from 3 (RGB) or 4 (RGBA) channel values
    pub fn from_channels(channels: &[f32]) -> Result<Self, ColorError> {
        match *channels {
            [r, g, b] => Ok(Self::rgb(r, g, b)),
            [r, g, b, a] => Ok(Self::new(r, g, b, a)),
            _ => Err(ColorError::ChannelCount(channels.len())),
        }
    }

    /// Convert display-referred sRGB channels to linear; alpha is unchanged
    pub fn srgb_to_linear(self) -> Self {
        fn convert(c: f32) -> f32 {
            if c < 0.040_45 {
                c / 12.92
            } else {
                ((c + 0.055) / 1.055).powf(2.4)
            }
        }
        Self::new(convert(self.r), convert(self.g), convert(self.b), self.a)
    }

    /// Convert linear channels to display-referred sRGB; alpha is unchanged
    pub fn linear_to_srgb(self) -> Self {
        fn convert(c: f32) -> f32 {
            if c < 0.003_130_8 {
                c * 12.92
            } else {
                1.055f32.mul_add(c.powf(1.0 / 2.4), -0.055)
            }
        }
        Self::new(convert(self.r), convert(self.g), convert(self.b), self.a)
    }

    /// Channels as `[r, g, b, a]`
    pub const fn to_array(self) -> [f32; 4] {
        [self.r, self.g, self.b, self.a]
    }
}

impl FromStr for Color {
    type Err = ColorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}, {}, {}]", self.r, self.g, self.b, self.a)
    }
}

impl<'de> Deserialize<'de> for Color {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Hex(String),
            Channels(Vec<f32>),
        }

        match Repr::deserialize(deserializer)? {
            Repr::Hex(code) => Self::from_hex(&code),
            Repr::Channels(channels) => Self::from_channels(&channels),
        }
        .map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[derive(Deserialize)]
    struct Doc {
        color: Color,
    }

    #[test]
    fn test_short_hex_expands() {
        assert_eq!(Color::from_hex("#FFF").unwrap(), Color::new(1.0, 1.0, 1.0, 1.0));
        let c = Color::from_hex("#f008").unwrap();
        assert_eq!(c.to_array()[..3], [1.0, 0.0, 0.0]);
        assert_abs_diff_eq!(c.a, 136.0 / 255.0);
    }

    #[test]
    fn test_hex_defaults_to_opaque() {
        assert_eq!(Color::from_hex("#000000").unwrap(), Color::new(0.0, 0.0, 0.0, 1.0));
    }

    #[test]
    fn test_hex_with_alpha() {
        let c = Color::from_hex("#00000080").unwrap();
        assert_abs_diff_eq!(c.a, 0.502, epsilon = 0.001);
    }

    #[test]
    fn test_invalid_hex_rejected() {
        for code in ["FFF", "#GGG", "#12345", "#", "#1234567890", "#ff ff ff"] {
            assert_eq!(Color::from_hex(code), Err(ColorError::InvalidHex(code.to_string())), "{code}");
        }
    }

    #[test]
    fn test_channel_arrays() {
        assert_eq!(Color::from_channels(&[0.1, 0.2, 0.3]).unwrap().a, 1.0);
        assert_eq!(Color::from_channels(&[0.1, 0.2, 0.3, 0.4]).unwrap().a, 0.4);
        assert_eq!(Color::from_channels(&[0.1, 0.2]), Err(ColorError::ChannelCount(2)));
    }

    #[test]
    fn test_srgb_round_trip() {
        for step in 0..=100 {
            let v = step as f32 / 100.0;
            let back = Color::new(v, v, v, v).srgb_to_linear().linear_to_srgb();
            assert_abs_diff_eq!(back.r, v, epsilon = 1e-5);
            assert_abs_diff_eq!(back.a, v);
        }
    }

    #[test]
    fn test_srgb_to_linear_known_values() {
        let mid = Color::rgb(0.5, 0.0, 1.0).srgb_to_linear();
        assert_abs_diff_eq!(mid.r, 0.214, epsilon = 0.001);
        assert_abs_diff_eq!(mid.g, 0.0);
        assert_abs_diff_eq!(mid.b, 1.0, epsilon = 1e-6);
    }

    #[test]
    fn test_deserialize_both_forms() {
        let hex: Doc = toml::from_str(r##"color = "#336699""##).unwrap();
        assert_abs_diff_eq!(hex.color.g, 0.4);

        let floats: Doc = toml::from_str("color = [0.25, 0.5, 0.75]").unwrap();
        assert_eq!(floats.color, Color::rgb(0.25, 0.5, 0.75));

        assert!(toml::from_str::<Doc>("color = [1.0]").is_err());
        assert!(toml::from_str::<Doc>("color = 3").is_err());
    }
}
