//! The index build pass: one forward decompression of the whole stream,
//! stopping at every DEFLATE block boundary to decide whether enough output
//! has gone by to justify a new access point.

use std::io::{ErrorKind, Read};

use miniz_oxide::inflate::{core::inflate_flags, TINFLStatus};

use crate::engine::Engine;
use crate::{AccessPoint, Error, Index, Result, Span, WINDOW_SIZE};

const GZ_MAGIC: [u8; 2] = [0x1f, 0x8b];

impl Index {
    /// Builds an index over the gzip or zlib stream `src` with the default
    /// access-point spacing of [`SPAN`](crate::SPAN) uncompressed bytes.
    ///
    /// The whole stream is decompressed once; anything after the first
    /// member is ignored.
    pub fn build<R: Read>(src: R) -> Result<Index> {
        Index::build_with_span(src, Span::default())
    }

    /// Builds an index with a custom spacing between access points.
    pub fn build_with_span<R: Read>(src: R, span: Span) -> Result<Index> {
        let mut src = CountingReader::new(src);
        consume_header(&mut src)?;
        let header_len = src.position();

        let mut engine = Engine::start(src, header_len);

        // Growth starts at eight slots; trimmed to fit after the pass
        let mut index = Index::with_capacity(8);

        // Anchor immediately after the stream header. Its window is never
        // referenced: the first block cannot look behind the start of the
        // output.
        index.push(AccessPoint::new(
            0,
            header_len,
            0,
            Box::new([0; WINDOW_SIZE]),
        ));
        let mut last = 0u64;

        loop {
            let status = engine.step(inflate_flags::TINFL_FLAG_STOP_ON_BLOCK_BOUNDARY)?;

            // The build pass only inspects the stream; the ring still holds
            // the trailing 32KB for window capture after the watermark moves
            engine.discard(u64::MAX);

            match status {
                TINFLStatus::Done => break,
                TINFLStatus::NeedsMoreInput | TINFLStatus::HasMoreOutput => {}
                TINFLStatus::BlockBoundary => {
                    // The decoder never stops here after the final block, so
                    // every emitted point has at least one block to resume
                    // into
                    if engine.output_pos() - last > span.0 {
                        last = engine.output_pos();
                        index.push(AccessPoint::new(
                            engine.output_pos(),
                            engine.input_pos(),
                            engine.boundary_bits(),
                            engine.window(),
                        ));
                    }
                }
                _ => return Err(Error::Data),
            }
        }

        index.shrink_to_fit();
        Ok(index)
    }
}

/// Gzip-or-zlib detection. Consumes the stream header, leaving `src`
/// positioned at the first byte of raw DEFLATE data.
fn consume_header<R: Read>(src: &mut CountingReader<R>) -> Result<()> {
    let mut magic = [0u8; 2];
    src.read_exact(&mut magic).map_err(header_err)?;

    if magic == GZ_MAGIC {
        // Re-attach the magic so the header parser sees the whole member
        // header
        let mut header = (&magic[..]).chain(&mut *src);
        gzip_header::read_gz_header(&mut header).map_err(header_err)?;
        return Ok(());
    }

    // zlib: compression method 8, window size in range, valid check bits
    let cm = magic[0] & 0x0f;
    let cinfo = magic[0] >> 4;
    let check = u16::from_be_bytes(magic) % 31 == 0;
    if cm != 8 || cinfo > 7 || !check {
        return Err(Error::Data);
    }
    if magic[1] & 0x20 != 0 {
        // FDICT: the stream wants a preset dictionary we cannot supply
        return Err(Error::Data);
    }
    Ok(())
}

/// Header-stage failures: a stream too short or malformed to carry a
/// gzip/zlib header is corrupt input, not an IO problem.
fn header_err(e: std::io::Error) -> Error {
    match e.kind() {
        ErrorKind::UnexpectedEof | ErrorKind::InvalidInput | ErrorKind::InvalidData => Error::Data,
        _ => Error::Read(e),
    }
}

/// Tracks the absolute position of a forward-only stream, so the header
/// length can be recorded without requiring `Seek`.
struct CountingReader<R> {
    inner: R,
    pos: u64,
}

impl<R> CountingReader<R> {
    fn new(inner: R) -> Self {
        Self { inner, pos: 0 }
    }

    fn position(&self) -> u64 {
        self.pos
    }
}

impl<R: Read> Read for CountingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.pos += n as u64;
        Ok(n)
    }
}
