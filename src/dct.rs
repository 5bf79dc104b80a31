//! Separable 8x8 DCT using the Arai-Agui-Nakajima factorization.
//!
//! Both directions run eight 1-D butterflies over rows and eight over columns. The AAN
//! butterflies leave every output scaled by `AAN_SCALE[u] * AAN_SCALE[v]`, and the two passes
//! together amplify by the block size, so each direction applies a single combined correction:
//! the forward transform divides by `AAN_SCALE[u] * AAN_SCALE[v] * 8`, the inverse pre-scales
//! its input by `AAN_SCALE[u] * AAN_SCALE[v]` and divides its output by 8.

use crate::entropy::block::BLOCK_SIZE;

/// `cos(k * PI / 16) * sqrt(2)`, with 1 for k = 0.
const AAN_SCALE: [f32; 8] = [
    1.0,
    1.387_039_8,
    1.306_563,
    1.175_875_6,
    1.0,
    0.785_694_96,
    0.541_196_1,
    0.275_899_38,
];

const SAMPLE_CENTER: f32 = 128.0;

fn forward_1d(data: &mut [f32; BLOCK_SIZE], offset: usize, stride: usize) {
    let at = |k: usize| offset + k * stride;

    let tmp0 = data[at(0)] + data[at(7)];
    let tmp7 = data[at(0)] - data[at(7)];
    let tmp1 = data[at(1)] + data[at(6)];
    let tmp6 = data[at(1)] - data[at(6)];
    let tmp2 = data[at(2)] + data[at(5)];
    let tmp5 = data[at(2)] - data[at(5)];
    let tmp3 = data[at(3)] + data[at(4)];
    let tmp4 = data[at(3)] - data[at(4)];

    // even part
    let tmp10 = tmp0 + tmp3;
    let tmp13 = tmp0 - tmp3;
    let tmp11 = tmp1 + tmp2;
    let tmp12 = tmp1 - tmp2;

    data[at(0)] = tmp10 + tmp11;
    data[at(4)] = tmp10 - tmp11;

    let z1 = (tmp12 + tmp13) * 0.707_106_77;
    data[at(2)] = tmp13 + z1;
    data[at(6)] = tmp13 - z1;

    // odd part
    let tmp10 = tmp4 + tmp5;
    let tmp11 = tmp5 + tmp6;
    let tmp12 = tmp6 + tmp7;

    let z5 = (tmp10 - tmp12) * 0.382_683_43;
    let z2 = 0.541_196_1 * tmp10 + z5;
    let z4 = 1.306_563 * tmp12 + z5;
    let z3 = tmp11 * 0.707_106_77;

    let z11 = tmp7 + z3;
    let z13 = tmp7 - z3;

    data[at(5)] = z13 + z2;
    data[at(3)] = z13 - z2;
    data[at(1)] = z11 + z4;
    data[at(7)] = z11 - z4;
}

fn inverse_1d(data: &mut [f32; BLOCK_SIZE], offset: usize, stride: usize) {
    let at = |k: usize| offset + k * stride;

    // even part
    let tmp0 = data[at(0)];
    let tmp1 = data[at(2)];
    let tmp2 = data[at(4)];
    let tmp3 = data[at(6)];

    let tmp10 = tmp0 + tmp2;
    let tmp11 = tmp0 - tmp2;
    let tmp13 = tmp1 + tmp3;
    let tmp12 = (tmp1 - tmp3) * 1.414_213_5 - tmp13;

    let tmp0 = tmp10 + tmp13;
    let tmp3 = tmp10 - tmp13;
    let tmp1 = tmp11 + tmp12;
    let tmp2 = tmp11 - tmp12;

    // odd part
    let tmp4 = data[at(1)];
    let tmp5 = data[at(3)];
    let tmp6 = data[at(5)];
    let tmp7 = data[at(7)];

    let z13 = tmp6 + tmp5;
    let z10 = tmp6 - tmp5;
    let z11 = tmp4 + tmp7;
    let z12 = tmp4 - tmp7;

    let tmp7 = z11 + z13;
    let tmp11 = (z11 - z13) * 1.414_213_5;

    let z5 = (z10 + z12) * 1.847_759;
    let tmp10 = 1.082_392_2 * z12 - z5;
    let tmp12 = -2.613_126 * z10 + z5;

    let tmp6 = tmp12 - tmp7;
    let tmp5 = tmp11 - tmp6;
    let tmp4 = tmp10 + tmp5;

    data[at(0)] = tmp0 + tmp7;
    data[at(7)] = tmp0 - tmp7;
    data[at(1)] = tmp1 + tmp6;
    data[at(6)] = tmp1 - tmp6;
    data[at(2)] = tmp2 + tmp5;
    data[at(5)] = tmp2 - tmp5;
    data[at(4)] = tmp3 + tmp4;
    data[at(3)] = tmp3 - tmp4;
}

/// Transforms a row-major block of samples into row-major coefficients, truncated toward zero.
pub fn forward_dct(samples: &[u8; BLOCK_SIZE]) -> [i32; BLOCK_SIZE] {
    let mut data = [0f32; BLOCK_SIZE];
    for (d, &s) in data.iter_mut().zip(samples) {
        *d = s as f32 - SAMPLE_CENTER;
    }

    for row in 0..8 {
        forward_1d(&mut data, row * 8, 1);
    }
    for col in 0..8 {
        forward_1d(&mut data, col, 8);
    }

    let mut coeffs = [0i32; BLOCK_SIZE];
    for (i, coeff) in coeffs.iter_mut().enumerate() {
        let scale = AAN_SCALE[i / 8] * AAN_SCALE[i % 8] * 8.0;
        *coeff = (data[i] / scale) as i32;
    }
    coeffs
}

/// Transforms row-major coefficients back into samples, re-centered at 128, truncated and
/// clamped to `0..=255`.
pub fn inverse_dct(coeffs: &[i32; BLOCK_SIZE]) -> [u8; BLOCK_SIZE] {
    let mut data = [0f32; BLOCK_SIZE];
    for (i, d) in data.iter_mut().enumerate() {
        *d = coeffs[i] as f32 * AAN_SCALE[i / 8] * AAN_SCALE[i % 8];
    }

    for col in 0..8 {
        inverse_1d(&mut data, col, 8);
    }
    for row in 0..8 {
        inverse_1d(&mut data, row * 8, 1);
    }

    let mut samples = [0u8; BLOCK_SIZE];
    for (s, &d) in samples.iter_mut().zip(&data) {
        *s = ((d / 8.0 + SAMPLE_CENTER) as i32).clamp(0, 255) as u8;
    }
    samples
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    /// Smooth gradients with a little noise, seeded deterministically.
    fn natural_blocks(count: usize) -> Vec<[u8; BLOCK_SIZE]> {
        let mut state = 0x9E37_79B9u32;
        let mut next = || {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            state
        };

        (0..count)
            .map(|n| {
                let mut block = [0u8; BLOCK_SIZE];
                for y in 0..8 {
                    for x in 0..8 {
                        let noise = (next() % 7) as i32 - 3;
                        let v = 60 + (n as i32 % 16) * 6 + 9 * x + 5 * y + noise;
                        block[(y * 8 + x) as usize] = v.clamp(0, 255) as u8;
                    }
                }
                block
            })
            .collect()
    }

    /// The O(n^4) definition, without truncation.
    fn reference_dct(samples: &[u8; BLOCK_SIZE]) -> [f64; BLOCK_SIZE] {
        let mut out = [0f64; BLOCK_SIZE];
        for u in 0..8 {
            for v in 0..8 {
                let mut sum = 0.0;
                for x in 0..8 {
                    for y in 0..8 {
                        sum += (samples[x * 8 + y] as f64 - 128.0)
                            * ((2 * x + 1) as f64 * u as f64 * PI / 16.0).cos()
                            * ((2 * y + 1) as f64 * v as f64 * PI / 16.0).cos();
                    }
                }
                let cu = if u == 0 { 0.5f64.sqrt() } else { 1.0 };
                let cv = if v == 0 { 0.5f64.sqrt() } else { 1.0 };
                out[u * 8 + v] = 0.25 * cu * cv * sum;
            }
        }
        out
    }

    #[test]
    fn test_zero_coefficients_are_mid_gray() {
        assert_eq!(inverse_dct(&[0; BLOCK_SIZE]), [128u8; BLOCK_SIZE]);
    }

    #[test]
    fn test_uniform_block_is_exact() {
        for value in [0u8, 17, 128, 200, 255] {
            let coeffs = forward_dct(&[value; BLOCK_SIZE]);
            assert_eq!(coeffs[0], 8 * (value as i32 - 128));
            assert!(coeffs[1..].iter().all(|&c| c == 0));
            assert_eq!(inverse_dct(&coeffs), [value; BLOCK_SIZE]);
        }
    }

    #[test]
    fn test_matches_direct_definition() {
        for block in natural_blocks(20) {
            let fast = forward_dct(&block);
            let reference = reference_dct(&block);
            for i in 0..BLOCK_SIZE {
                // truncation loses less than one unit
                assert!((fast[i] as f64 - reference[i]).abs() < 1.05, "coefficient {i}");
            }
        }
    }

    #[test]
    fn test_round_trip_within_three() {
        for block in natural_blocks(500) {
            let restored = inverse_dct(&forward_dct(&block));
            for (a, b) in block.iter().zip(&restored) {
                assert!((*a as i32 - *b as i32).abs() <= 3, "{a} vs {b}");
            }
        }
    }
}
