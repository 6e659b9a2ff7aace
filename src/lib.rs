//! Random access to gzip-compressed streams through a precomputed index.
//!
//! Gzip does not normally support random access: every DEFLATE block may
//! reference up to 32KB of output produced by the blocks before it, so a
//! decoder must start at the beginning of the stream. To get around this we
//! make one forward pass over the file and record an *access point* roughly
//! every 1MB of uncompressed output. Each point captures just enough decoder
//! state to restart mid-stream: the compressed and uncompressed offsets of a
//! block boundary, the sub-byte bit alignment of that boundary, and the 32KB
//! of output that precedes it (the dictionary for the restarted decoder).
//!
//! The index is saved next to the compressed file, as `<file>.idx`, so it is
//! built once and reused. Reading an arbitrary range then costs one restart
//! from the nearest preceding access point plus at most ~1MB of discarded
//! decompression, a few milliseconds on a desktop CPU.
//!
//! Each access point stores a full 32KB window, so the index grows by about
//! 32KB per 1MB of uncompressed data before the sidecar's own gzip
//! compression; in practice the sidecar is a few percent of the compressed
//! file size.
//!
//! Both gzip and zlib streams are supported; the format is detected from the
//! leading magic bytes. Only the first member of a multi-member file is
//! indexed.
//!
//! # Usage example
//!
//! ```no_run
//! fn main() -> gzseek::Result<()> {
//!     // One forward pass over example.gz, saved to example.gz.idx
//!     gzseek::build("example.gz")?;
//!
//!     // Later (or in another process): random access in uncompressed
//!     // coordinates
//!     let mut reader = gzseek::Reader::open("example.gz")?;
//!     reader.seek(5_000_000);
//!     let mut buf = vec![0; 4096];
//!     let n = reader.read(&mut buf)?;
//!     println!("read {} bytes at offset {}", n, reader.tell() - n as i64);
//!     Ok(())
//! }
//! ```

mod builder;
mod engine;
mod index;
mod reader;

pub use index::{index_path, AccessPoint, Index};
pub use reader::Reader;

/// DEFLATE max window size, and the size of the dictionary stored per
/// access point
pub(crate) const WINDOW_SIZE: usize = 32768;

/// Compressed input is read in chunks of this size
pub(crate) const CHUNK: usize = 16384;

/// Circular output buffer. Must be at least the window size (32KB) and a
/// power of two. Larger than the input buffer so a whole input chunk can
/// usually be inflated in one call.
pub(crate) const OUTPUT_BUF_SIZE: usize = 65536;

/// Default distance between access points, in uncompressed bytes. Larger
/// spans give smaller indexes but slower seeks.
pub const SPAN: u64 = 1024 * 1024;

/// Uncompressed-byte distance between access points, for
/// [`Index::build_with_span`].
#[derive(Copy, Clone, Debug)]
pub struct Span(pub(crate) u64);

impl Span {
    pub const fn new(span: u64) -> Self {
        Self(span)
    }
}

impl Default for Span {
    fn default() -> Self {
        Self(SPAN)
    }
}

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("IO error")]
    Io(#[from] std::io::Error),
    #[error("failed to open a file")]
    Open(#[source] std::io::Error),
    #[error("failed to read a file")]
    Read(#[source] std::io::Error),
    #[error("failed to write a file")]
    Write(#[source] std::io::Error),
    #[error("the compressed data is corrupted")]
    Data,
    #[error("the index file is incompatible")]
    Incompatible,
    #[error("error in the gzip layer of the index file")]
    Zlib,
}

pub type Result<T> = std::result::Result<T, Error>;

/// Builds an index for the gzip (or zlib) file at `path` and saves it to
/// the sidecar `<path>.idx`, overwriting any previous index.
///
/// This makes one pass over the entire compressed stream; the result can be
/// reused by every subsequent [`Reader::open`].
pub fn build<P: AsRef<std::path::Path>>(path: P) -> Result<()> {
    let path = path.as_ref();
    let file = std::fs::File::open(path).map_err(Error::Open)?;
    let index = Index::build(file)?;
    index.save(index_path(path))
}
