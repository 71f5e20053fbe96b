//! Rayon integration for hashing many inputs as concurrent streams.

use rayon::prelude::*;

use crate::{Digest, Md5Server};

/// Extension trait for hashing a parallel iterator through a shared server.
///
/// Each rayon task opens its own stream, so batching happens server-side
/// across however many tasks are in flight. Tasks beyond the server's lane
/// width simply wait their turn for a lane (backpressure), so any level of
/// parallelism is safe.
///
/// # Example
///
/// ```
/// use rayon::prelude::*;
/// use md5_lanes::{Md5Server, ParallelMd5, ServerConfig};
///
/// let server = Md5Server::with_config(ServerConfig::default().with_lanes(8));
/// let data: Vec<Vec<u8>> = vec![
///     b"hello".to_vec(),
///     b"world".to_vec(),
///     b"test".to_vec(),
/// ];
///
/// let digests = data.par_iter().md5_digest(&server);
/// assert_eq!(digests.len(), 3);
/// assert_eq!(digests[0], md5_lanes::digest(b"hello"));
/// ```
pub trait ParallelMd5<T> {
    /// Computes MD5 digests for all items, in input order.
    fn md5_digest(self, server: &Md5Server) -> Vec<Digest>;
}

impl<I, T> ParallelMd5<T> for I
where
    I: IndexedParallelIterator<Item = T>,
    T: AsRef<[u8]> + Send,
{
    fn md5_digest(self, server: &Md5Server) -> Vec<Digest> {
        self.map(|input| {
            let mut hasher = server.new_hasher();
            hasher
                .update(input.as_ref())
                .expect("scheduling server disconnected");
            hasher.sum()
        })
        .collect()
    }
}
