//! Moves component samples between 8x8 blocks, a component's own plane inside an MCU, and the
//! full-resolution MCU grid.

use crate::entropy::block::BLOCK_SIZE;

/// Lays out `blocks_h * blocks_v` row-major blocks as one plane `8 * blocks_h` samples wide.
pub fn blocks_to_plane(blocks: &[[u8; BLOCK_SIZE]], blocks_h: usize, blocks_v: usize) -> Vec<u8> {
    let width = blocks_h * 8;
    let mut plane = vec![0u8; width * blocks_v * 8];

    for (idx, block) in blocks.iter().enumerate().take(blocks_h * blocks_v) {
        let (bx, by) = (idx % blocks_h, idx / blocks_h);
        for row in 0..8 {
            let start = (by * 8 + row) * width + bx * 8;
            plane[start..start + 8].copy_from_slice(&block[row * 8..row * 8 + 8]);
        }
    }

    plane
}

/// Inverse of [`blocks_to_plane`].
pub fn plane_to_blocks(plane: &[u8], blocks_h: usize, blocks_v: usize) -> Vec<[u8; BLOCK_SIZE]> {
    let width = blocks_h * 8;
    let mut blocks = vec![[0u8; BLOCK_SIZE]; blocks_h * blocks_v];

    for (idx, block) in blocks.iter_mut().enumerate() {
        let (bx, by) = (idx % blocks_h, idx / blocks_h);
        for row in 0..8 {
            let start = (by * 8 + row) * width + bx * 8;
            block[row * 8..row * 8 + 8].copy_from_slice(&plane[start..start + 8]);
        }
    }

    blocks
}

/// Nearest-neighbor upsampling: every source sample covers `factor_x * factor_y` samples of
/// the output.
pub fn upsample(
    plane: &[u8],
    width: usize,
    height: usize,
    factor_x: usize,
    factor_y: usize,
) -> Vec<u8> {
    if factor_x == 1 && factor_y == 1 {
        return plane.to_vec();
    }

    let out_width = width * factor_x;
    let mut out = vec![0u8; out_width * height * factor_y];

    for (y, row) in out.chunks_exact_mut(out_width).enumerate() {
        let src = &plane[(y / factor_y) * width..][..width];
        for (x, sample) in row.iter_mut().enumerate() {
            *sample = src[x / factor_x];
        }
    }

    out
}

/// Box-filter downsampling: every output sample is the truncated mean of the
/// `factor_x * factor_y` source samples it covers.
pub fn downsample(
    plane: &[u8],
    width: usize,
    height: usize,
    factor_x: usize,
    factor_y: usize,
) -> Vec<u8> {
    if factor_x == 1 && factor_y == 1 {
        return plane.to_vec();
    }

    let (out_width, out_height) = (width / factor_x, height / factor_y);
    let area = (factor_x * factor_y) as u32;
    let mut out = vec![0u8; out_width * out_height];

    for y in 0..out_height {
        for x in 0..out_width {
            let mut sum = 0u32;
            for dy in 0..factor_y {
                let row = &plane[(y * factor_y + dy) * width..];
                for dx in 0..factor_x {
                    sum += row[x * factor_x + dx] as u32;
                }
            }
            out[y * out_width + x] = (sum / area) as u8;
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_plane_round_trip() {
        let blocks: Vec<[u8; BLOCK_SIZE]> = (0..4u8)
            .map(|b| {
                let mut block = [0u8; BLOCK_SIZE];
                for (i, s) in block.iter_mut().enumerate() {
                    *s = b * 64 + i as u8;
                }
                block
            })
            .collect();

        let plane = blocks_to_plane(&blocks, 2, 2);
        assert_eq!(plane.len(), 256);
        // second block starts at column 8 of the first row
        assert_eq!(plane[8], 64);
        // third block starts on row 8
        assert_eq!(plane[8 * 16], 128);
        assert_eq!(plane[16 + 9], 64 + 9);

        assert_eq!(plane_to_blocks(&plane, 2, 2), blocks);
    }

    #[test]
    fn test_upsample_replicates() {
        let plane = [1u8, 2, 3, 4];
        assert_eq!(
            upsample(&plane, 2, 2, 2, 2),
            vec![1, 1, 2, 2, 1, 1, 2, 2, 3, 3, 4, 4, 3, 3, 4, 4]
        );
        assert_eq!(upsample(&plane, 2, 2, 2, 1), vec![1, 1, 2, 2, 3, 3, 4, 4]);
        assert_eq!(upsample(&plane, 2, 2, 1, 2), vec![1, 2, 1, 2, 3, 4, 3, 4]);
    }

    #[test]
    fn test_downsample_averages() {
        let plane = [10u8, 20, 30, 41, 10, 20, 30, 40];
        assert_eq!(downsample(&plane, 4, 2, 2, 2), vec![15, 35]);
        assert_eq!(downsample(&plane, 4, 2, 2, 1), vec![15, 35, 15, 35]);

        // downsampling what was upsampled gives back the source
        let source = [7u8, 200, 33, 90];
        let up = upsample(&source, 2, 2, 2, 2);
        assert_eq!(downsample(&up, 4, 4, 2, 2), source.to_vec());
    }
}
