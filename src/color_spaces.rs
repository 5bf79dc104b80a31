//! Per-pixel conversion between RGB and the JFIF YCbCr color space (ITU-R BT.601 full range).
//!
//! Pixels travel as `0x00RRGGBB`. Every conversion truncates toward zero and clamps each
//! channel to `0..=255`.

#[inline]
fn clamp_channel(value: f32) -> u8 {
    (value as i32).clamp(0, 255) as u8
}

#[inline]
pub fn pack_rgb(r: u8, g: u8, b: u8) -> u32 {
    (r as u32) << 16 | (g as u32) << 8 | b as u32
}

#[inline]
pub fn unpack_rgb(pixel: u32) -> (u8, u8, u8) {
    ((pixel >> 16) as u8, (pixel >> 8) as u8, pixel as u8)
}

pub fn ycbcr_to_rgb(y: u8, cb: u8, cr: u8) -> u32 {
    let y = y as f32;
    let cb = cb as f32 - 128.0;
    let cr = cr as f32 - 128.0;

    let r = y + 1.402 * cr;
    let g = y - 0.344_136 * cb - 0.714_136 * cr;
    let b = y + 1.772 * cb;

    pack_rgb(clamp_channel(r), clamp_channel(g), clamp_channel(b))
}

pub fn rgb_to_ycbcr(pixel: u32) -> (u8, u8, u8) {
    let (r, g, b) = unpack_rgb(pixel);
    let (r, g, b) = (r as f32, g as f32, b as f32);

    let y = 0.299 * r + 0.587 * g + 0.114 * b;
    let cb = -0.168_736 * r - 0.331_264 * g + 0.5 * b + 128.0;
    let cr = 0.5 * r - 0.418_688 * g - 0.081_312 * b + 128.0;

    (clamp_channel(y), clamp_channel(cb), clamp_channel(cr))
}

pub fn gray_to_rgb(y: u8) -> u32 {
    pack_rgb(y, y, y)
}

/// Plain channel average, not a luma weighting.
pub fn rgb_to_gray(pixel: u32) -> u8 {
    let (r, g, b) = unpack_rgb(pixel);
    ((r as u32 + g as u32 + b as u32) / 3) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ycbcr_known_values() {
        assert_eq!(rgb_to_ycbcr(0x000000), (0, 128, 128));
        assert_eq!(rgb_to_ycbcr(0xC86432), (124, 86, 182));

        assert_eq!(ycbcr_to_rgb(124, 86, 182), pack_rgb(199, 99, 49));
        assert_eq!(ycbcr_to_rgb(128, 128, 128), 0x808080);
    }

    #[test]
    fn test_conversion_clamps() {
        // saturated chroma pushes red and blue out of range
        assert_eq!(unpack_rgb(ycbcr_to_rgb(255, 255, 255)).0, 255);
        assert_eq!(unpack_rgb(ycbcr_to_rgb(0, 0, 0)).2, 0);
    }

    #[test]
    fn test_round_trip_is_close() {
        for &pixel in &[0x102030u32, 0xFFFFFF, 0x7F7F7F, 0xC86432, 0x00FF00, 0x3366CC] {
            let (y, cb, cr) = rgb_to_ycbcr(pixel);
            let (r0, g0, b0) = unpack_rgb(pixel);
            let (r1, g1, b1) = unpack_rgb(ycbcr_to_rgb(y, cb, cr));

            for (a, b) in [(r0, r1), (g0, g1), (b0, b1)] {
                assert!((a as i32 - b as i32).abs() <= 3, "{pixel:06X}");
            }
        }
    }

    #[test]
    fn test_gray() {
        assert_eq!(gray_to_rgb(0x42), 0x424242);
        assert_eq!(rgb_to_gray(pack_rgb(10, 20, 33)), 21);
        assert_eq!(rgb_to_gray(0xFFFFFF), 255);
    }
}
