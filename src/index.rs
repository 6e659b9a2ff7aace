//! The access-point index and its on-disk sidecar format.
//!
//! Sidecar layout, inside a gzip wrapper:
//!
//! ```text
//! magic:    b"ZSEK"
//! off_size: u32    // byte width of the offset fields; always 8
//! count:    u32
//! count * {
//!   out:    i64    // uncompressed offset the entry restarts at
//!   in:     i64    // compressed offset of the first whole byte
//!   bits:   i32    // 0-7 leading bits shared with the byte at in - 1
//!   window: [u8; 32768]
//! }
//! ```
//!
//! All integers are little-endian regardless of host.

use std::fmt;
use std::fs::File;
use std::io::{ErrorKind, Read, Write};
use std::path::{Path, PathBuf};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use flate2::{read::GzDecoder, write::GzEncoder, Compression};

use crate::{Error, Result, WINDOW_SIZE};

const MAGIC: [u8; 4] = *b"ZSEK";

/// Offsets are always stored 64-bit; an index built with another width is
/// refused as incompatible.
const OFF_SIZE: u32 = 8;

/// Returns the sidecar path for `path`: the same name with `.idx` appended.
pub fn index_path<P: AsRef<Path>>(path: P) -> PathBuf {
    let mut name = path.as_ref().as_os_str().to_owned();
    name.push(".idx");
    PathBuf::from(name)
}

/// One resumable DEFLATE restart state: a block boundary's position in both
/// coordinate spaces, its bit alignment, and the 32KB of uncompressed output
/// that precedes it.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessPoint {
    out_pos: u64,
    in_pos: u64,
    num_bits: u8,
    window: Box<[u8; WINDOW_SIZE]>,
}

impl AccessPoint {
    pub(crate) fn new(
        out_pos: u64,
        in_pos: u64,
        num_bits: u8,
        window: Box<[u8; WINDOW_SIZE]>,
    ) -> Self {
        debug_assert!(num_bits <= 7);
        Self {
            out_pos,
            in_pos,
            num_bits,
            window,
        }
    }

    /// Uncompressed offset at which this entry restarts output
    pub fn out_pos(&self) -> u64 {
        self.out_pos
    }

    /// Compressed file offset of the first whole byte to feed the decoder
    pub fn in_pos(&self) -> u64 {
        self.in_pos
    }

    /// Number of bits of the byte at `in_pos - 1` that belong to the block
    /// starting here; 0 when the boundary is byte-aligned
    pub fn num_bits(&self) -> u8 {
        self.num_bits
    }

    pub(crate) fn window(&self) -> &[u8; WINDOW_SIZE] {
        &self.window
    }

    fn read<R: Read>(mut r: R) -> Result<AccessPoint> {
        let out_pos = r.read_i64::<LittleEndian>().map_err(sidecar_err)?;
        let in_pos = r.read_i64::<LittleEndian>().map_err(sidecar_err)?;
        let bits = r.read_i32::<LittleEndian>().map_err(sidecar_err)?;
        if out_pos < 0 || in_pos < 0 || !(0..=7).contains(&bits) {
            return Err(Error::Data);
        }
        if bits != 0 && in_pos == 0 {
            // A mid-byte boundary always has the shared byte before it
            return Err(Error::Data);
        }

        let mut window = Box::new([0u8; WINDOW_SIZE]);
        r.read_exact(&mut window[..]).map_err(sidecar_err)?;

        Ok(AccessPoint {
            out_pos: out_pos as u64,
            in_pos: in_pos as u64,
            num_bits: bits as u8,
            window,
        })
    }

    fn write<W: Write>(&self, mut w: W) -> Result<()> {
        w.write_i64::<LittleEndian>(self.out_pos as i64)
            .map_err(Error::Write)?;
        w.write_i64::<LittleEndian>(self.in_pos as i64)
            .map_err(Error::Write)?;
        w.write_i32::<LittleEndian>(i32::from(self.num_bits))
            .map_err(Error::Write)?;
        w.write_all(&self.window[..]).map_err(Error::Write)?;
        Ok(())
    }
}

impl fmt::Debug for AccessPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessPoint")
            .field("out_pos", &self.out_pos)
            .field("in_pos", &self.in_pos)
            .field("num_bits", &self.num_bits)
            .finish_non_exhaustive()
    }
}

/// An ordered list of access points over one compressed stream, sorted by
/// uncompressed offset. Built by [`Index::build`], persisted with
/// [`Index::save`], and consumed through [`Index::locate`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Index {
    points: Vec<AccessPoint>,
}

impl Index {
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Self {
            points: Vec::with_capacity(capacity),
        }
    }

    pub(crate) fn push(&mut self, point: AccessPoint) {
        if let Some(last) = self.points.last() {
            debug_assert!(last.out_pos < point.out_pos);
        }
        self.points.push(point);
    }

    pub(crate) fn shrink_to_fit(&mut self) {
        self.points.shrink_to_fit();
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn points(&self) -> &[AccessPoint] {
        &self.points
    }

    /// Returns the entry with the largest `out_pos <= offset`, or `None`
    /// when no entry precedes `offset` (only possible for negative offsets,
    /// since every index carries an anchor at 0).
    pub fn locate(&self, offset: i64) -> Option<&AccessPoint> {
        if offset < 0 {
            return None;
        }
        let partition = self
            .points
            .partition_point(|p| p.out_pos <= offset as u64);
        if partition == 0 {
            None
        } else {
            Some(&self.points[partition - 1])
        }
    }

    /// Serializes the index through a gzip wrapper onto `w`.
    pub fn write_to<W: Write>(&self, w: W) -> Result<()> {
        let mut gz = GzEncoder::new(w, Compression::default());
        gz.write_all(&MAGIC).map_err(Error::Write)?;
        gz.write_u32::<LittleEndian>(OFF_SIZE).map_err(Error::Write)?;
        gz.write_u32::<LittleEndian>(self.points.len() as u32)
            .map_err(Error::Write)?;
        for point in &self.points {
            point.write(&mut gz)?;
        }
        gz.finish().map_err(Error::Write)?;
        Ok(())
    }

    /// Deserializes an index from the gzip-wrapped stream `r`.
    pub fn read_from<R: Read>(r: R) -> Result<Index> {
        let mut gz = GzDecoder::new(r);

        let mut magic = [0u8; 4];
        gz.read_exact(&mut magic).map_err(sidecar_err)?;
        if magic != MAGIC {
            return Err(Error::Incompatible);
        }
        if gz.read_u32::<LittleEndian>().map_err(sidecar_err)? != OFF_SIZE {
            return Err(Error::Incompatible);
        }

        let count = gz.read_u32::<LittleEndian>().map_err(sidecar_err)? as usize;
        let mut points = Vec::with_capacity(count.min(1024));
        for _ in 0..count {
            points.push(AccessPoint::read(&mut gz)?);
        }

        // Drive the wrapper to end of stream; the gzip footer is only
        // verified once the decoder reaches it, and a clean close is part
        // of the format
        let mut trailer = [0u8; 1];
        loop {
            match gz.read(&mut trailer).map_err(sidecar_err)? {
                0 => break,
                _ => return Err(Error::Data),
            }
        }

        Ok(Index { points })
    }

    /// Writes the index to the sidecar file at `path`.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let file = File::create(path).map_err(Error::Open)?;
        self.write_to(file)
    }

    /// Reads the index back from the sidecar file at `path`.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Index> {
        let file = File::open(path).map_err(Error::Open)?;
        Index::read_from(file)
    }
}

/// The gzip wrapper reports corruption and truncation through IO errors;
/// anything else is a plain read failure.
fn sidecar_err(e: std::io::Error) -> Error {
    match e.kind() {
        ErrorKind::InvalidInput | ErrorKind::InvalidData | ErrorKind::UnexpectedEof => Error::Zlib,
        _ => Error::Read(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(out_pos: u64) -> AccessPoint {
        AccessPoint::new(out_pos, out_pos / 2 + 10, 0, Box::new([0; WINDOW_SIZE]))
    }

    #[test]
    fn locate_picks_latest_preceding_point() {
        let mut index = Index::with_capacity(8);
        index.push(point(0));
        index.push(point(1000));
        index.push(point(5000));

        assert_eq!(index.locate(0).unwrap().out_pos(), 0);
        assert_eq!(index.locate(999).unwrap().out_pos(), 0);
        assert_eq!(index.locate(1000).unwrap().out_pos(), 1000);
        assert_eq!(index.locate(4999).unwrap().out_pos(), 1000);
        assert_eq!(index.locate(1_i64 << 40).unwrap().out_pos(), 5000);
        assert!(index.locate(-1).is_none());
    }

    #[test]
    fn locate_on_empty_index() {
        let index = Index::with_capacity(0);
        assert!(index.locate(0).is_none());
    }
}
