//! Property tests: the digest is a pure function of the byte stream, never
//! of how the bytes were delivered.

use proptest::prelude::*;

use md5_lanes::{Md5Server, ServerConfig};

fn reference(data: &[u8]) -> [u8; 16] {
    use md5::Digest as _;
    let mut hasher = md5::Md5::new();
    hasher.update(data);
    hasher.finalize().into()
}

proptest! {
    #[test]
    fn digest_matches_reference_for_any_chunking(
        data in proptest::collection::vec(any::<u8>(), 0..2048),
        chunk_size in 1_usize..=130,
    ) {
        let server = Md5Server::with_config(ServerConfig::default().with_lanes(4));
        let mut hasher = server.new_hasher();
        for chunk in data.chunks(chunk_size) {
            hasher.update(chunk).expect("stream open");
        }
        prop_assert_eq!(hasher.sum(), reference(&data));
    }

    #[test]
    fn reset_erases_all_prior_input(
        discarded in proptest::collection::vec(any::<u8>(), 0..512),
        kept in proptest::collection::vec(any::<u8>(), 0..512),
    ) {
        let server = Md5Server::with_config(ServerConfig::default().with_lanes(2));
        let mut hasher = server.new_hasher();
        hasher.update(&discarded).expect("stream open");
        hasher.reset();
        hasher.update(&kept).expect("stream open");
        prop_assert_eq!(hasher.sum(), reference(&kept));
    }

    #[test]
    fn concurrent_neighbor_never_changes_the_digest(
        data in proptest::collection::vec(any::<u8>(), 0..1024),
        neighbor in proptest::collection::vec(any::<u8>(), 0..1024),
    ) {
        let server = Md5Server::with_config(ServerConfig::default().with_lanes(2));
        let mut subject = server.new_hasher();
        let mut other = server.new_hasher();
        // Interleave writes; the neighbor is never finalized.
        for (a, b) in data.chunks(64).zip(neighbor.chunks(32)) {
            subject.update(a).expect("stream open");
            other.update(b).expect("stream open");
        }
        let fed: usize = data.chunks(64).zip(neighbor.chunks(32)).map(|(a, _)| a.len()).sum();
        subject.update(&data[fed..]).expect("stream open");
        prop_assert_eq!(subject.sum(), reference(&data));
    }
}
