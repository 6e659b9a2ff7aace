//! The reader handle: seek/tell/read over the uncompressed coordinate
//! space of an indexed gzip file.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::Path;

use miniz_oxide::inflate::TINFLStatus;

use crate::engine::Engine;
use crate::{index_path, Error, Index, Result};

/// Random-access reader over a gzip (or zlib) file indexed by
/// [`build`](crate::build).
///
/// The handle owns the opened compressed file and the loaded index, and
/// tracks a logical offset in uncompressed bytes. Every [`Reader::read`]
/// restarts a fresh decoder from the nearest preceding access point, so the
/// handle keeps no decode state between calls: seeks are free, and a failed
/// read leaves the handle fully usable.
///
/// A handle is single-owner; open the file again for concurrent access.
/// Everything is released when the handle is dropped.
pub struct Reader {
    file: File,
    index: Index,
    offset: i64,
}

impl Reader {
    /// Opens the compressed file at `path` and its `<path>.idx` sidecar.
    /// The logical offset starts at 0.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Reader> {
        let path = path.as_ref();
        let file = File::open(path).map_err(Error::Open)?;
        let index = Index::load(index_path(path))?;
        Ok(Reader {
            file,
            index,
            offset: 0,
        })
    }

    /// Sets the logical offset. The value is not validated against the
    /// stream length; reads past the end simply return 0 bytes.
    pub fn seek(&mut self, offset: i64) {
        self.offset = offset;
    }

    /// The current logical offset
    pub fn tell(&self) -> i64 {
        self.offset
    }

    /// The loaded access-point index
    pub fn index(&self) -> &Index {
        &self.index
    }

    /// Reads up to `buf.len()` uncompressed bytes at the logical offset,
    /// advancing the offset by the count returned.
    ///
    /// A short count means end of stream was reached; 0 means the offset is
    /// at or past end of stream (or no access point precedes it, which only
    /// happens for negative offsets). On error the offset is unchanged and
    /// the handle remains usable.
    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let n = self.extract(self.offset, buf)?;
        self.offset += n as i64;
        Ok(n)
    }

    /// Restarts DEFLATE from the access point preceding `offset`, skips up
    /// to the offset, and decodes into `buf`.
    fn extract(&mut self, offset: i64, buf: &mut [u8]) -> Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        let Some(point) = self.index.locate(offset) else {
            return Ok(0);
        };

        // Position the compressed stream at the first whole byte. When the
        // block starts mid-byte, back up one byte and recover the leading
        // bits the boundary shares with it.
        let first_byte = point.in_pos() - u64::from(point.num_bits() != 0);
        self.file
            .seek(SeekFrom::Start(first_byte))
            .map_err(Error::Read)?;
        let bit_buf = if point.num_bits() != 0 {
            let mut byte = [0u8; 1];
            self.file.read_exact(&mut byte).map_err(Error::Read)?;
            byte[0] >> (8 - point.num_bits())
        } else {
            0
        };

        let mut engine = Engine::resume(&mut self.file, point, bit_buf);

        // Discard until the requested offset, then fill `buf`
        let mut skip = offset as u64 - point.out_pos();
        let mut filled = 0;
        loop {
            if skip > 0 {
                skip -= engine.discard(skip);
            }
            if skip == 0 {
                filled += engine.take(&mut buf[filled..]);
                if filled == buf.len() {
                    break;
                }
            }
            if engine.is_done() {
                // End of stream before the request was satisfied; return
                // the partial count
                break;
            }
            match engine.step(0)? {
                TINFLStatus::Done
                | TINFLStatus::NeedsMoreInput
                | TINFLStatus::HasMoreOutput => {}
                _ => return Err(Error::Data),
            }
        }

        Ok(filled)
    }
}

impl Read for Reader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Reader::read(self, buf).map_err(io::Error::other)
    }
}

impl Seek for Reader {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(n) => i64::try_from(n)
                .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "offset out of range"))?,
            SeekFrom::Current(n) => self.offset + n,
            SeekFrom::End(_) => {
                // The uncompressed length is not recorded in the index
                return Err(io::Error::new(
                    io::ErrorKind::Unsupported,
                    "SeekFrom::End not supported",
                ));
            }
        };
        if target < 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "seek before start of stream",
            ));
        }
        self.offset = target;
        Ok(target as u64)
    }
}
