//! Chunk loop: magnitudes → resampled samples → bits → dispatcher
//!
//! Per chunk: pull magnitudes from the source, upsample to the internal
//! rate, then slice bits with the Manchester comparator — a data bit is the
//! comparison of two magnitudes half a symbol apart, evaluated at every
//! sub-sample phase:
//!
//! ```text
//! phase 0 compares sample 0 and N/2
//! phase 1 compares sample 1 and N/2 + 1
//! ...
//! ```
//!
//! Both buffers keep a small tail from the previous chunk so kernels and
//! comparator windows that reach past a chunk boundary stay seamless.

use std::io::Write;
use std::marker::PhantomData;

use crate::demod::DemodCore;
use crate::input::MagnitudeSource;
use crate::sampler::Sampler;

pub struct SampleStream<S: Sampler, const N: usize> {
    magnitudes: Vec<f32>,
    samples: Vec<f32>,
    _sampler: PhantomData<S>,
}

impl<S: Sampler, const N: usize> SampleStream<S, N> {
    pub fn new() -> Self {
        assert_eq!(S::NUM_STREAMS, N);
        SampleStream {
            magnitudes: vec![0.0; S::INPUT_LEN + S::INPUT_OVERLAP],
            samples: vec![0.0; S::SAMPLE_LEN + S::SAMPLE_OVERLAP],
            _sampler: PhantomData,
        }
    }

    /// Drive the demodulator until the source reports end of input.
    pub fn run<R, W>(&mut self, source: &mut R, demod: &mut DemodCore<N, W>)
    where
        R: MagnitudeSource,
        W: Write,
    {
        let mut bits = [0u32; N];

        while !source.eof() {
            source.read_magnitude(&mut self.magnitudes[S::INPUT_OVERLAP..]);
            S::resample(&self.magnitudes, &mut self.samples[S::SAMPLE_OVERLAP..]);

            let mut i = 0;
            while i < S::SAMPLE_LEN {
                for (j, bit) in bits.iter_mut().enumerate() {
                    *bit = (self.samples[i + j] > self.samples[i + j + N / 2]) as u32;
                }
                demod.shift_in_new_bits(&bits);
                i += N;
            }

            // carry the tails into the next chunk
            self.magnitudes.copy_within(S::INPUT_LEN.., 0);
            self.samples.copy_within(S::SAMPLE_LEN.., 0);
        }

        demod.finish();
    }
}

#[cfg(all(test, not(feature = "raw-frames")))]
mod tests {
    use super::*;
    use crate::bits::Bits128;
    use crate::crc;
    use crate::input::MagnitudeSource;
    use crate::output::FrameWriter;
    use crate::sampler::Passthrough6;

    /// Canned magnitude source; zero-pads the final chunk like the stream
    /// reader does.
    struct VecSource {
        data: Vec<f32>,
        pos: usize,
    }

    impl MagnitudeSource for VecSource {
        fn read_magnitude(&mut self, out: &mut [f32]) {
            for v in out.iter_mut() {
                *v = self.data.get(self.pos).copied().unwrap_or(0.0);
                self.pos += 1;
            }
        }

        fn eof(&mut self) -> bool {
            self.pos >= self.data.len()
        }
    }

    /// PPM-modulate a short frame at 6 samples per bit (1 at 6 MHz): a one
    /// is energy in the first half symbol, a zero in the second.
    fn modulate_at_6mhz(frame: u64, out: &mut Vec<f32>) {
        for k in (0..56).rev() {
            let bit = (frame >> k) & 1;
            for half in 0..2 {
                let high = (bit == 1) == (half == 0);
                for _ in 0..3 {
                    out.push(if high { 1.0 } else { 0.0 });
                }
            }
        }
    }

    #[test]
    fn demodulates_a_modulated_df11_from_magnitudes() {
        let data = (0b01011u64 << 51) | (5u64 << 48) | (0xABCDEFu64 << 24);
        let frame = data | crc::compute(Bits128::from(data), 56) as u64;

        let mut signal = Vec::new();
        signal.extend(std::iter::repeat(0.0).take(600));
        modulate_at_6mhz(frame, &mut signal);
        signal.extend(std::iter::repeat(0.0).take(600));
        modulate_at_6mhz(frame, &mut signal);
        signal.extend(std::iter::repeat(0.0).take(600));

        let mut source = VecSource { data: signal, pos: 0 };
        let mut demod: DemodCore<6, Vec<u8>> = DemodCore::new(FrameWriter::new(Vec::new()));
        let mut stream: SampleStream<Passthrough6, 6> = SampleStream::new();
        stream.run(&mut source, &mut demod);

        let out = String::from_utf8(demod.output().clone()).unwrap();
        let lines: Vec<&str> = out.lines().collect();
        // first reception caches the address, second is emitted once
        assert_eq!(lines.len(), 1, "{out}");
        assert!(lines[0].contains("5DABCDEF"), "{out}");
    }
}
