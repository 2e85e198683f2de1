//! RGBA8 voxel colors

use std::fmt;

/// An RGBA color with 8 bits per channel
///
/// Colors are ordered (component-wise, red first) so that palettes derived
/// from a grid come out in a stable order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    pub const WHITE: Color = Color::rgb(255, 255, 255);
    pub const BLACK: Color = Color::rgb(0, 0, 0);

    /// Opaque color from RGB components
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }

    pub const fn rgba(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    /// Gray level as an opaque color
    pub const fn gray(level: u8) -> Self {
        Self::rgb(level, level, level)
    }

    /// Pack into `0xAARRGGBB`
    pub fn to_argb(self) -> u32 {
        u32::from_be_bytes([self.a, self.r, self.g, self.b])
    }

    /// Unpack from `0xAARRGGBB`
    pub fn from_argb(value: u32) -> Self {
        let [a, r, g, b] = value.to_be_bytes();
        Self { r, g, b, a }
    }

    /// Same color with alpha forced to 255
    pub fn opaque(self) -> Self {
        Self { a: 255, ..self }
    }

    /// Rec. 601 luma in 0-255
    pub fn luma(self) -> u8 {
        let y = 0.299 * self.r as f32 + 0.587 * self.g as f32 + 0.114 * self.b as f32;
        y.round().clamp(0.0, 255.0) as u8
    }

    /// Squared Euclidean distance in RGB space (alpha ignored)
    pub fn distance_sq(self, other: Color) -> u32 {
        let dr = self.r as i32 - other.r as i32;
        let dg = self.g as i32 - other.g as i32;
        let db = self.b as i32 - other.b as i32;
        (dr * dr + dg * dg + db * db) as u32
    }

    /// Components as an `[r, g, b]` array
    pub fn to_rgb_array(self) -> [u8; 3] {
        [self.r, self.g, self.b]
    }
}

impl From<[u8; 4]> for Color {
    fn from(c: [u8; 4]) -> Self {
        Self::rgba(c[0], c[1], c[2], c[3])
    }
}

impl From<[u8; 3]> for Color {
    fn from(c: [u8; 3]) -> Self {
        Self::rgb(c[0], c[1], c[2])
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_argb_packing() {
        let c = Color::rgba(0x12, 0x34, 0x56, 0x78);
        assert_eq!(c.to_argb(), 0x7812_3456);
        assert_eq!(Color::from_argb(0x7812_3456), c);
    }

    #[test]
    fn test_luma() {
        assert_eq!(Color::WHITE.luma(), 255);
        assert_eq!(Color::BLACK.luma(), 0);
        assert_eq!(Color::gray(128).luma(), 128);
    }

    #[test]
    fn test_distance_ignores_alpha() {
        let a = Color::rgba(10, 20, 30, 0);
        let b = Color::rgba(10, 20, 30, 255);
        assert_eq!(a.distance_sq(b), 0);
        assert_eq!(Color::BLACK.distance_sq(Color::rgb(3, 4, 0)), 25);
    }

    #[test]
    fn test_display() {
        assert_eq!(Color::rgb(255, 0, 16).to_string(), "#ff0010");
    }
}
