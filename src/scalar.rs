//! Scalar RFC 1321 MD5 block compression.
//!
//! This module holds the per-lane primitive: a single 64-round MD5
//! compression over one 64-byte block. The multi-lane kernel in
//! [`crate::compressor`] applies it once per lane; the one-shot [`digest`]
//! helper drives it directly without any scheduling.

use crate::{Block, Digest, BLOCK_SIZE};

/// MD5 initial state constants (RFC 1321).
const INIT_A: u32 = 0x6745_2301;
const INIT_B: u32 = 0xefcd_ab89;
const INIT_C: u32 = 0x98ba_dcfe;
const INIT_D: u32 = 0x1032_5476;

/// Pre-computed K constants for MD5 rounds (RFC 1321).
///
/// K[i] = floor(2^32 × abs(sin(i + 1))).
const K: [u32; 64] = [
    0xd76a_a478, 0xe8c7_b756, 0x2420_70db, 0xc1bd_ceee,
    0xf57c_0faf, 0x4787_c62a, 0xa830_4613, 0xfd46_9501,
    0x6980_98d8, 0x8b44_f7af, 0xffff_5bb1, 0x895c_d7be,
    0x6b90_1122, 0xfd98_7193, 0xa679_438e, 0x49b4_0821,
    0xf61e_2562, 0xc040_b340, 0x265e_5a51, 0xe9b6_c7aa,
    0xd62f_105d, 0x0244_1453, 0xd8a1_e681, 0xe7d3_fbc8,
    0x21e1_cde6, 0xc337_07d6, 0xf4d5_0d87, 0x455a_14ed,
    0xa9e3_e905, 0xfcef_a3f8, 0x676f_02d9, 0x8d2a_4c8a,
    0xfffa_3942, 0x8771_f681, 0x6d9d_6122, 0xfde5_380c,
    0xa4be_ea44, 0x4bde_cfa9, 0xf6bb_4b60, 0xbebf_bc70,
    0x289b_7ec6, 0xeaa1_27fa, 0xd4ef_3085, 0x0488_1d05,
    0xd9d4_d039, 0xe6db_99e5, 0x1fa2_7cf8, 0xc4ac_5665,
    0xf429_2244, 0x432a_ff97, 0xab94_23a7, 0xfc93_a039,
    0x655b_59c3, 0x8f0c_cc92, 0xffef_f47d, 0x8584_5dd1,
    0x6fa8_7e4f, 0xfe2c_e6e0, 0xa301_4314, 0x4e08_11a1,
    0xf753_7e82, 0xbd3a_f235, 0x2ad7_d2bb, 0xeb86_d391,
];

/// Per-operation left-rotation amounts (RFC 1321).
const S: [u32; 64] = [
    7, 12, 17, 22, 7, 12, 17, 22, 7, 12, 17, 22, 7, 12, 17, 22,
    5, 9, 14, 20, 5, 9, 14, 20, 5, 9, 14, 20, 5, 9, 14, 20,
    4, 11, 16, 23, 4, 11, 16, 23, 4, 11, 16, 23, 4, 11, 16, 23,
    6, 10, 15, 21, 6, 10, 15, 21, 6, 10, 15, 21, 6, 10, 15, 21,
];

/// Running MD5 accumulator state for one stream.
///
/// Four 32-bit words (A, B, C, D). The digest serialization is each word in
/// little-endian order, matching RFC 1321 output; see [`Md5State::digest`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Md5State {
    words: [u32; 4],
}

impl Md5State {
    /// The initial accumulator state of a fresh stream.
    pub const INIT: Self = Self {
        words: [INIT_A, INIT_B, INIT_C, INIT_D],
    };

    /// The four accumulator words, in A, B, C, D order.
    #[must_use]
    pub const fn words(&self) -> [u32; 4] {
        self.words
    }

    /// Mutable access to the accumulator words for external kernels.
    pub fn words_mut(&mut self) -> &mut [u32; 4] {
        &mut self.words
    }

    /// Serializes the accumulator as a finished digest: each of the four
    /// words written little-endian, A first (RFC 1321 output order).
    #[must_use]
    pub fn digest(&self) -> Digest {
        let mut out = [0_u8; 16];
        for (chunk, word) in out.chunks_exact_mut(4).zip(self.words) {
            chunk.copy_from_slice(&word.to_le_bytes());
        }
        out
    }
}

impl Default for Md5State {
    fn default() -> Self {
        Self::INIT
    }
}

/// Applies one 64-byte block to the accumulator (RFC 1321 compression).
pub fn compress_block(state: &mut Md5State, block: &Block) {
    let mut m = [0_u32; 16];
    for (word, chunk) in m.iter_mut().zip(block.chunks_exact(4)) {
        *word = u32::from_le_bytes(chunk.try_into().expect("chunk is 4 bytes"));
    }

    let [mut a, mut b, mut c, mut d] = state.words;

    for i in 0..64 {
        let (f, g) = match i / 16 {
            0 => ((b & c) | (!b & d), i),
            1 => ((d & b) | (!d & c), (5 * i + 1) % 16),
            2 => (b ^ c ^ d, (3 * i + 5) % 16),
            _ => (c ^ (b | !d), (7 * i) % 16),
        };
        let rotated = a
            .wrapping_add(f)
            .wrapping_add(K[i])
            .wrapping_add(m[g])
            .rotate_left(S[i]);
        a = d;
        d = c;
        c = b;
        b = b.wrapping_add(rotated);
    }

    state.words[0] = state.words[0].wrapping_add(a);
    state.words[1] = state.words[1].wrapping_add(b);
    state.words[2] = state.words[2].wrapping_add(c);
    state.words[3] = state.words[3].wrapping_add(d);
}

/// Computes the MD5 digest of `input` in one shot, without a server.
#[must_use]
pub fn digest(input: &[u8]) -> Digest {
    let mut state = Md5State::INIT;

    let mut blocks = input.chunks_exact(BLOCK_SIZE);
    for block in &mut blocks {
        let block: &Block = block.try_into().expect("chunk is one block");
        compress_block(&mut state, block);
    }

    // Padding: 0x80 terminator, zeros to 56 mod 64, then the 64-bit
    // little-endian bit length of the whole input.
    let rem = blocks.remainder();
    let mut tail = [0_u8; 2 * BLOCK_SIZE];
    tail[..rem.len()].copy_from_slice(rem);
    tail[rem.len()] = 0x80;
    let tail_len = if rem.len() < 56 { BLOCK_SIZE } else { 2 * BLOCK_SIZE };
    let bit_len = (input.len() as u64) << 3;
    tail[tail_len - 8..tail_len].copy_from_slice(&bit_len.to_le_bytes());

    for block in tail[..tail_len].chunks_exact(BLOCK_SIZE) {
        let block: &Block = block.try_into().expect("chunk is one block");
        compress_block(&mut state, block);
    }

    state.digest()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn to_hex(bytes: &[u8]) -> String {
        use std::fmt::Write as _;

        let mut out = String::with_capacity(bytes.len() * 2);
        for byte in bytes {
            write!(&mut out, "{byte:02x}").expect("write! to String cannot fail");
        }
        out
    }

    #[test]
    fn digest_matches_rfc1321_vectors() {
        let vectors = [
            (b"".as_slice(), "d41d8cd98f00b204e9800998ecf8427e"),
            (b"a".as_slice(), "0cc175b9c0f1b6a831c399e269772661"),
            (b"abc".as_slice(), "900150983cd24fb0d6963f7d28e17f72"),
            (
                b"message digest".as_slice(),
                "f96b697d7cb7938d525a2f31aaf161d0",
            ),
            (
                b"abcdefghijklmnopqrstuvwxyz".as_slice(),
                "c3fcd3d76192e4007dfb496cca67e13b",
            ),
            (
                b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789".as_slice(),
                "d174ab98d277d9f5a5611c2c9f419d9f",
            ),
            (
                b"12345678901234567890123456789012345678901234567890123456789012345678901234567890"
                    .as_slice(),
                "57edf4a22be3c955ac49da2e2107b67a",
            ),
        ];

        for (input, expected_hex) in vectors {
            assert_eq!(to_hex(&digest(input)), expected_hex);
        }
    }

    #[test]
    fn digest_handles_block_boundary_lengths() {
        // 55/56 bytes straddle the one-vs-two tail block split; 64 is an
        // exact block.
        for len in [55, 56, 63, 64, 65, 128] {
            let input = vec![0xa5_u8; len];
            let expected = {
                use md5::Digest as _;
                let mut reference = md5::Md5::new();
                reference.update(&input);
                let out: [u8; 16] = reference.finalize().into();
                out
            };
            assert_eq!(digest(&input), expected, "length {len}");
        }
    }

    #[test]
    fn compress_block_advances_state() {
        let mut state = Md5State::INIT;
        compress_block(&mut state, &[0_u8; 64]);
        assert_ne!(state, Md5State::INIT);
    }

    #[test]
    fn state_digest_layout_is_little_endian_words() {
        let state = Md5State {
            words: [0x0403_0201, 0x0807_0605, 0x0c0b_0a09, 0x100f_0e0d],
        };
        assert_eq!(
            state.digest(),
            [1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16]
        );
    }
}
