//! Raw sample formats and magnitude sources
//!
//! A `MagnitudeSource` fills the chunk loop's buffer with one magnitude per
//! IQ pair. Two sources exist: a synchronous byte stream (stdin or a file,
//! used for piped capture tools and replays) and the ring buffer fed by a
//! device capture thread. Both run the optional IQ pipeline per pair.

use std::io::Read;
use std::marker::PhantomData;

use tracing::warn;

use crate::pipeline::IqPipeline;
use crate::ring::RingReader;
use crate::shutdown;

/// A raw IQ component format as it arrives from the capture tool.
pub trait RawFormat {
    type Raw: Copy + Default + Send + 'static;
    const BYTES_PER_VALUE: usize;

    /// Center and scale one component to roughly −1.0..1.0.
    fn to_float(raw: Self::Raw) -> f32;

    fn value_from_le(bytes: &[u8]) -> Self::Raw;
}

/// 8-bit unsigned IQ (rtl_sdr output).
pub struct IqU8;

impl RawFormat for IqU8 {
    type Raw = u8;
    const BYTES_PER_VALUE: usize = 1;

    #[inline]
    fn to_float(raw: u8) -> f32 {
        (raw as f32 - 127.5) * (1.0 / 127.5)
    }

    fn value_from_le(bytes: &[u8]) -> u8 {
        bytes[0]
    }
}

/// 16-bit raw IQ, 12 significant bits (airspy_rx output).
pub struct IqU16;

impl RawFormat for IqU16 {
    type Raw = u16;
    const BYTES_PER_VALUE: usize = 2;

    #[inline]
    fn to_float(raw: u16) -> f32 {
        (raw as f32 - 2047.5) * (1.0 / 2047.5)
    }

    fn value_from_le(bytes: &[u8]) -> u16 {
        u16::from_le_bytes([bytes[0], bytes[1]])
    }
}

/// 32-bit float IQ, already centered.
pub struct IqF32;

impl RawFormat for IqF32 {
    type Raw = f32;
    const BYTES_PER_VALUE: usize = 4;

    #[inline]
    fn to_float(raw: f32) -> f32 {
        raw
    }

    fn value_from_le(bytes: &[u8]) -> f32 {
        f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
    }
}

/// Converts raw IQ pairs to magnitudes through the pipeline. The pipeline
/// variant is resolved once per block, keeping the per-sample loops
/// monomorphic.
pub(crate) fn magnitudes_from_raw<F: RawFormat>(
    raw: &[F::Raw],
    pipeline: &mut IqPipeline,
    out: &mut [f32],
) {
    debug_assert_eq!(raw.len(), out.len() * 2);
    match pipeline {
        IqPipeline::Bypass => {
            for (k, pair) in raw.chunks_exact(2).enumerate() {
                let i = F::to_float(pair[0]);
                let q = F::to_float(pair[1]);
                out[k] = (i * i + q * q).sqrt();
            }
        }
        IqPipeline::Filtered(chain) => {
            for (k, pair) in raw.chunks_exact(2).enumerate() {
                let (i, q) = chain.apply(F::to_float(pair[0]), F::to_float(pair[1]));
                out[k] = (i * i + q * q).sqrt();
            }
        }
    }
}

/// One chunk of magnitudes per call; `eof` gates the chunk loop.
pub trait MagnitudeSource {
    fn read_magnitude(&mut self, out: &mut [f32]);
    fn eof(&mut self) -> bool;
}

/// Synchronous source over any byte stream.
pub struct StreamSource<F: RawFormat, R: Read> {
    stream: R,
    bytes: Vec<u8>,
    raw: Vec<F::Raw>,
    pipeline: IqPipeline,
    done: bool,
    _format: PhantomData<F>,
}

impl<F: RawFormat, R: Read> StreamSource<F, R> {
    /// `input_len` is the number of IQ pairs (magnitudes) per chunk.
    pub fn new(stream: R, pipeline: IqPipeline, input_len: usize) -> Self {
        StreamSource {
            stream,
            bytes: vec![0; input_len * 2 * F::BYTES_PER_VALUE],
            raw: vec![F::Raw::default(); input_len * 2],
            pipeline,
            done: false,
            _format: PhantomData,
        }
    }
}

impl<F: RawFormat, R: Read> MagnitudeSource for StreamSource<F, R> {
    fn read_magnitude(&mut self, out: &mut [f32]) {
        debug_assert_eq!(out.len() * 2 * F::BYTES_PER_VALUE, self.bytes.len());

        let mut filled = 0;
        while filled < self.bytes.len() {
            match self.stream.read(&mut self.bytes[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    warn!("input read failed: {e}");
                    break;
                }
            }
        }

        if filled < self.bytes.len() {
            // zero the tail so stale buffer content cannot resurface as
            // duplicate frames on the final chunk
            self.bytes[filled..].fill(0);
            self.done = true;
        }

        for (v, chunk) in self.raw.iter_mut().zip(self.bytes.chunks_exact(F::BYTES_PER_VALUE)) {
            *v = F::value_from_le(chunk);
        }
        magnitudes_from_raw::<F>(&self.raw, &mut self.pipeline, out);
    }

    fn eof(&mut self) -> bool {
        self.done || shutdown::requested()
    }
}

/// Source over the device ring buffer; each ring block is one chunk.
pub struct RingSource<F: RawFormat> {
    reader: RingReader<F::Raw>,
    pipeline: IqPipeline,
}

impl<F: RawFormat> RingSource<F> {
    pub fn new(reader: RingReader<F::Raw>, pipeline: IqPipeline) -> Self {
        RingSource { reader, pipeline }
    }
}

impl<F: RawFormat> MagnitudeSource for RingSource<F> {
    fn read_magnitude(&mut self, out: &mut [f32]) {
        let pipeline = &mut self.pipeline;
        let mut got = false;
        self.reader.process(|block| {
            magnitudes_from_raw::<F>(block, pipeline, out);
            got = true;
        });
        if !got {
            out.fill(0.0);
        }
    }

    fn eof(&mut self) -> bool {
        // no shutdown-flag short cut here: the capture thread observes the
        // flag and shuts the ring down, and committed blocks must still be
        // drained before we leave
        self.reader.eof()
    }
}
