//! Multi-lane MD5 hashing.
//!
//! This crate computes many independent MD5 digests concurrently by batching
//! their block compression: a scheduling server multiplexes any number of
//! digest streams onto a fixed number of lanes and advances all of them with
//! one multi-lane kernel invocation per round, instead of one compression
//! per stream. Each stream is hashed exactly as if it were processed alone;
//! lanes never leak state into each other.
//!
//! # Example
//!
//! ```
//! use md5_lanes::{Md5Server, ServerConfig};
//!
//! let server = Md5Server::with_config(ServerConfig::default().with_lanes(8));
//!
//! // Streams may live on any threads; here two on one.
//! let mut a = server.new_hasher();
//! let mut b = server.new_hasher();
//! a.update(b"first stream").unwrap();
//! b.update(b"second stream").unwrap();
//!
//! assert_eq!(a.sum(), md5_lanes::digest(b"first stream"));
//! assert_eq!(b.sum(), md5_lanes::digest(b"second stream"));
//! ```
//!
//! # Plugging in a kernel
//!
//! The server drives any [`BlockCompressor`]: a SIMD kernel advancing W
//! states by one block each per call. The portable [`ScalarCompressor`]
//! ships as the default, sized to the detected vector width of the machine
//! ([`Backend::detect`]), so the scheduling layer behaves identically with
//! or without vector hardware.

#![cfg_attr(docsrs, feature(doc_cfg))]
#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

mod compressor;
mod error;
mod hasher;
mod lanes;
mod server;
mod trace;

pub mod scalar;

#[cfg(feature = "rayon")]
mod rayon_support;

pub use compressor::{Backend, BlockCompressor, ScalarCompressor};
pub use error::StreamError;
pub use hasher::Md5Hasher;
pub use scalar::Md5State;
pub use server::{Md5Server, ServerConfig};

#[cfg(feature = "rayon")]
#[cfg_attr(docsrs, doc(cfg(feature = "rayon")))]
pub use rayon_support::ParallelMd5;

/// MD5 block size in bytes: the unit one lane consumes per round.
pub const BLOCK_SIZE: usize = 64;

/// MD5 digest size in bytes.
pub const DIGEST_SIZE: usize = 16;

/// One input block.
pub type Block = [u8; BLOCK_SIZE];

/// MD5 digest type (16 bytes / 128 bits).
pub type Digest = [u8; DIGEST_SIZE];

/// Computes the MD5 digest of a single input in one shot.
///
/// Runs the scalar block function directly, with no server involved. For
/// many inputs, prefer [`Md5Server::digest_batch`] or per-stream
/// [`Md5Hasher`]s.
#[must_use]
pub fn digest(input: &[u8]) -> Digest {
    scalar::digest(input)
}
