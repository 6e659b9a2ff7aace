//! Shared DEFLATE driver for the index build pass and the extract path.
//!
//! The decompressor writes into a circular output buffer whose tail doubles
//! as the 32KB sliding window. Restarting at an access point means seeding
//! a fresh decompressor with the boundary's bit alignment and copying the
//! point's window into the ring just behind the resume position.

use std::io::Read;

use miniz_oxide::inflate::{
    core::{decompress, inflate_flags, BlockBoundaryState, DecompressorOxide},
    TINFLStatus,
};

use crate::{AccessPoint, Error, Result, CHUNK, OUTPUT_BUF_SIZE, WINDOW_SIZE};

pub(crate) struct Engine<R> {
    src: R,

    decomp: Box<DecompressorOxide>,

    // Input buffer, and the slice currently containing valid data
    input: Vec<u8>, // CHUNK
    input_offset: usize,
    input_size: usize,

    /// Absolute offset in the compressed file of `input[input_offset]`
    input_pos: u64,

    /// Circular buffer for output. Size is `OUTPUT_BUF_SIZE`
    output: Vec<u8>,
    /// Uncompressed bytes decoded so far (not wrapped to the buffer size)
    output_dec: u64,
    /// Uncompressed bytes handed to the consumer, now available for reuse
    output_ret: u64,

    done: bool,
}

impl<R: Read> Engine<R> {
    /// A fresh decoder positioned at the first DEFLATE block. `input_pos` is
    /// the absolute file offset of that block (just past the stream header).
    pub(crate) fn start(src: R, input_pos: u64) -> Self {
        Self::with_decomp(src, input_pos, Box::new(DecompressorOxide::new()), 0)
    }

    /// A decoder restarted at `point`. The caller has already positioned
    /// `src` at the first whole compressed byte and recovered `bit_buf`, the
    /// leading bits shared with the previous block.
    pub(crate) fn resume(src: R, point: &AccessPoint, bit_buf: u8) -> Self {
        let decomp = Box::new(DecompressorOxide::from_block_boundary_state(
            &BlockBoundaryState {
                num_bits: point.num_bits(),
                bit_buf,
                ..Default::default()
            },
        ));

        let mut engine = Self::with_decomp(src, point.in_pos(), decomp, point.out_pos());

        // Install the dictionary: the window occupies the 32KB of the ring
        // immediately behind the resume position.
        let start = (point.out_pos().wrapping_sub(WINDOW_SIZE as u64) % OUTPUT_BUF_SIZE as u64)
            as usize;
        let head = WINDOW_SIZE.min(OUTPUT_BUF_SIZE - start);
        engine.output[start..start + head].copy_from_slice(&point.window()[..head]);
        engine.output[..WINDOW_SIZE - head].copy_from_slice(&point.window()[head..]);

        engine
    }

    fn with_decomp(src: R, input_pos: u64, decomp: Box<DecompressorOxide>, out_pos: u64) -> Self {
        Self {
            src,
            decomp,
            input: vec![0; CHUNK],
            input_offset: 0,
            input_size: 0,
            input_pos,
            output: vec![0; OUTPUT_BUF_SIZE],
            output_dec: out_pos,
            output_ret: out_pos,
            done: false,
        }
    }

    pub(crate) fn is_done(&self) -> bool {
        self.done
    }

    /// Absolute file offset of the next unconsumed compressed byte
    pub(crate) fn input_pos(&self) -> u64 {
        self.input_pos
    }

    /// Total uncompressed bytes produced
    pub(crate) fn output_pos(&self) -> u64 {
        self.output_dec
    }

    pub(crate) fn has_output(&self) -> bool {
        self.output_dec != self.output_ret
    }

    /// Inflates some more of the stream. The output buffer must be fully
    /// consumed first, because the call may overwrite it.
    pub(crate) fn step(&mut self, flags: u32) -> Result<TINFLStatus> {
        debug_assert!(!self.has_output());

        // Refill the input buffer if it is empty; at EOF it stays empty and
        // the missing TINFL_FLAG_HAS_MORE_INPUT tells the decoder so
        if self.input_offset >= self.input_size {
            self.input_offset = 0;
            self.input_size = self.src.read(&mut self.input).map_err(Error::Read)?;
        }

        let flags = flags
            | if self.input_size > 0 {
                inflate_flags::TINFL_FLAG_HAS_MORE_INPUT
            } else {
                0
            };

        let (status, in_consumed, out_produced) = decompress(
            &mut self.decomp,
            &self.input[self.input_offset..self.input_size],
            &mut self.output,
            (self.output_dec % OUTPUT_BUF_SIZE as u64) as usize,
            flags,
        );

        self.input_offset += in_consumed;
        self.input_pos += in_consumed as u64;
        self.output_dec += out_produced as u64;

        if status == TINFLStatus::Done {
            self.done = true;
        }

        Ok(status)
    }

    /// Drops up to `amount` pending output bytes, returning how many went
    pub(crate) fn discard(&mut self, amount: u64) -> u64 {
        let dropped = (self.output_dec - self.output_ret).min(amount);
        self.output_ret += dropped;
        dropped
    }

    /// Copies pending output into `buf`, returning the number of bytes copied
    pub(crate) fn take(&mut self, buf: &mut [u8]) -> usize {
        let copied = ((self.output_dec - self.output_ret) as usize).min(buf.len());

        // The region may wrap in the ring, so copy in up to two parts
        let start = (self.output_ret % OUTPUT_BUF_SIZE as u64) as usize;
        let head = copied.min(OUTPUT_BUF_SIZE - start);
        buf[..head].copy_from_slice(&self.output[start..start + head]);
        if head < copied {
            buf[head..copied].copy_from_slice(&self.output[..copied - head]);
        }

        self.output_ret += copied as u64;
        copied
    }

    /// Snapshots the most recent 32KB of output from the ring. When fewer
    /// than 32KB have been produced the leading bytes keep the buffer's
    /// initial contents, which a restarted decoder can never reference.
    pub(crate) fn window(&self) -> Box<[u8; WINDOW_SIZE]> {
        let mut window = Box::new([0u8; WINDOW_SIZE]);
        let start = (self.output_dec.wrapping_sub(WINDOW_SIZE as u64) % OUTPUT_BUF_SIZE as u64)
            as usize;
        let head = WINDOW_SIZE.min(OUTPUT_BUF_SIZE - start);
        window[..head].copy_from_slice(&self.output[start..start + head]);
        window[head..].copy_from_slice(&self.output[..WINDOW_SIZE - head]);
        window
    }

    /// Bit alignment of the block boundary the decoder is stopped at. Only
    /// meaningful right after `step` returned `TINFLStatus::BlockBoundary`.
    pub(crate) fn boundary_bits(&self) -> u8 {
        self.decomp.block_boundary_state().unwrap().num_bits
    }
}
