use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::VisualizerError;

/// One of the four fixed looks of the particle field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Style {
    #[default]
    Color,
    Ink,
    Neon,
    Glass,
}

impl Style {
    pub const ALL: [Style; 4] = [Style::Color, Style::Ink, Style::Neon, Style::Glass];

    pub fn name(self) -> &'static str {
        match self {
            Style::Color => "color",
            Style::Ink => "ink",
            Style::Neon => "neon",
            Style::Glass => "glass",
        }
    }
}

impl fmt::Display for Style {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Style {
    type Err = VisualizerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Style::ALL
            .into_iter()
            .find(|style| style.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| VisualizerError::msg(format!("unknown style `{s}`")))
    }
}

/// 8-bit RGB triple.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const WHITE: Rgb = Rgb::new(255, 255, 255);

    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    pub const fn grey(level: u8) -> Self {
        Self::new(level, level, level)
    }

    /// Builds a color from `0xrrggbb`.
    pub const fn hex(value: u32) -> Self {
        Self::new((value >> 16) as u8, (value >> 8) as u8, value as u8)
    }

    pub fn to_unit(self) -> [f32; 3] {
        [
            self.r as f32 / 255.0,
            self.g as f32 / 255.0,
            self.b as f32 / 255.0,
        ]
    }
}

/// Color plus a color-local opacity. The final draw alpha multiplies this
/// by the per-cell alpha.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Paint {
    pub rgb: Rgb,
    pub opacity: f32,
}

impl Paint {
    pub const fn opaque(rgb: Rgb) -> Self {
        Self { rgb, opacity: 1.0 }
    }
}

const TEAL: Rgb = Rgb::hex(0x14b8a6);
const AMBER: Rgb = Rgb::hex(0xfbbf24);
const SLATE: Rgb = Rgb::hex(0x334155);
const CYAN: Rgb = Rgb::hex(0x00f2ff);
const MAGENTA: Rgb = Rgb::hex(0xff0070);

const INK_MAX_GREY: f32 = 220.0;
const GLASS_OPACITY: f32 = 0.4;

/// How a cell is colored when no image grid is present.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaletteRule {
    /// Three tones cycling on the column index.
    CyclicColumns,
    /// Grey that fades towards the vertical edges.
    Greyscale,
    /// Two tones alternating like a checkerboard.
    Checkerboard,
    /// Translucent white that fades towards the vertical edges.
    TranslucentWhite,
}

impl PaletteRule {
    /// Picks the paint for the cell at `(row, column)`. `distance` is the
    /// normalised distance from the vertical center, already clamped.
    pub fn paint(self, row: usize, column: usize, distance: f32) -> Paint {
        let falloff = (1.0 - distance).max(0.0);
        match self {
            PaletteRule::CyclicColumns => {
                let rgb = if column % 5 == 0 {
                    TEAL
                } else if column % 3 == 0 {
                    AMBER
                } else {
                    SLATE
                };
                Paint::opaque(rgb)
            }
            PaletteRule::Greyscale => {
                Paint::opaque(Rgb::grey((INK_MAX_GREY * falloff).floor() as u8))
            }
            PaletteRule::Checkerboard => {
                Paint::opaque(if (column + row) % 2 == 0 { CYAN } else { MAGENTA })
            }
            PaletteRule::TranslucentWhite => Paint {
                rgb: Rgb::WHITE,
                opacity: GLASS_OPACITY * falloff,
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShapeRule {
    /// Circle whose radius is the cell size.
    Circle,
    /// Axis-aligned square of side cell size, centered on the cell.
    Square,
}

/// Resolved drawing rules for a style.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StyleVariant {
    pub palette: PaletteRule,
    pub shape: ShapeRule,
}

/// Maps a style selector to its palette and shape rules.
pub fn resolve(style: Style) -> StyleVariant {
    match style {
        Style::Color => StyleVariant {
            palette: PaletteRule::CyclicColumns,
            shape: ShapeRule::Circle,
        },
        Style::Ink => StyleVariant {
            palette: PaletteRule::Greyscale,
            shape: ShapeRule::Circle,
        },
        Style::Neon => StyleVariant {
            palette: PaletteRule::Checkerboard,
            shape: ShapeRule::Square,
        },
        Style::Glass => StyleVariant {
            palette: PaletteRule::TranslucentWhite,
            shape: ShapeRule::Circle,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_neon_draws_squares() {
        for style in Style::ALL {
            let expected = if style == Style::Neon {
                ShapeRule::Square
            } else {
                ShapeRule::Circle
            };
            assert_eq!(resolve(style).shape, expected, "{style}");
        }
    }

    #[test]
    fn color_palette_cycles_on_columns() {
        let palette = resolve(Style::Color).palette;
        assert_eq!(palette.paint(3, 0, 0.5).rgb, TEAL);
        assert_eq!(palette.paint(3, 3, 0.5).rgb, AMBER);
        assert_eq!(palette.paint(3, 15, 0.5).rgb, TEAL);
        assert_eq!(palette.paint(3, 7, 0.5).rgb, SLATE);
    }

    #[test]
    fn ink_fades_with_distance() {
        let palette = resolve(Style::Ink).palette;
        assert_eq!(palette.paint(0, 0, 0.0).rgb, Rgb::grey(220));
        assert_eq!(palette.paint(0, 0, 0.5).rgb, Rgb::grey(110));
        assert_eq!(palette.paint(0, 0, 1.0).rgb, Rgb::grey(0));
    }

    #[test]
    fn neon_alternates_on_parity() {
        let palette = resolve(Style::Neon).palette;
        assert_eq!(palette.paint(0, 0, 0.0).rgb, CYAN);
        assert_eq!(palette.paint(0, 1, 0.0).rgb, MAGENTA);
        assert_eq!(palette.paint(1, 1, 0.0).rgb, CYAN);
    }

    #[test]
    fn glass_is_translucent_white() {
        let paint = resolve(Style::Glass).palette.paint(4, 4, 0.25);
        assert_eq!(paint.rgb, Rgb::WHITE);
        assert!((paint.opacity - 0.3).abs() < 1e-6);
    }

    #[test]
    fn parses_style_names() {
        assert_eq!("NEON".parse::<Style>().unwrap(), Style::Neon);
        assert_eq!(" glass ".parse::<Style>().unwrap(), Style::Glass);
        assert!("plasma".parse::<Style>().is_err());
    }
}
