//! Preset dispatch and the two run modes
//!
//! Each supported (format, input rate, output rate) triple resolves to one
//! monomorphized pipeline instantiation, mirroring the preset table in
//! `config`. Within a run the per-sample code paths carry no dynamic
//! dispatch; the only runtime split is stdin versus device ring, decided
//! once before the loop starts.

use std::io;

use anyhow::Result;
use tracing::info;

use crate::config::{RawFormatKind, SampleRate};
use crate::demod::DemodCore;
use crate::device::{self, DeviceKind};
use crate::ini::Section;
use crate::input::{IqF32, IqU16, IqU8, RawFormat, RingSource, StreamSource};
use crate::output::FrameWriter;
use crate::pipeline::IqPipeline;
use crate::ring::RingBuffer;
use crate::sampler::{
    Passthrough10, Passthrough6, Sampler, Upsample10To24, Upsample2p4To8, Upsample6To12,
    Upsample6To24,
};
use crate::stream::SampleStream;

/// Blocks the device ring holds; at 2 input chunks per block this buffers a
/// few hundred milliseconds of samples.
const RING_BLOCKS: usize = 8;

pub struct RunConfig {
    pub format: RawFormatKind,
    pub input_rate: SampleRate,
    pub output_rate: SampleRate,
    pub iq_filter: bool,
    pub taps: Option<Vec<f32>>,
    pub device: Option<(DeviceKind, Section)>,
}

/// Run the pipeline for the configured triple. Returns false when no preset
/// matches.
pub fn dispatch(cfg: RunConfig) -> Result<bool> {
    use RawFormatKind as F;
    use SampleRate as R;

    match (cfg.format, cfg.input_rate, cfg.output_rate) {
        (F::U8, R::R2_4, R::R8_0) => run::<IqU8, Upsample2p4To8, 8>(cfg)?,
        (F::F32, R::R2_4, R::R8_0) => run::<IqF32, Upsample2p4To8, 8>(cfg)?,
        (F::U16, R::R6_0, R::R6_0) => run::<IqU16, Passthrough6, 6>(cfg)?,
        (F::F32, R::R6_0, R::R6_0) => run::<IqF32, Passthrough6, 6>(cfg)?,
        (F::U16, R::R6_0, R::R12_0) => run::<IqU16, Upsample6To12, 12>(cfg)?,
        (F::F32, R::R6_0, R::R12_0) => run::<IqF32, Upsample6To12, 12>(cfg)?,
        (F::U16, R::R6_0, R::R24_0) => run::<IqU16, Upsample6To24, 24>(cfg)?,
        (F::F32, R::R6_0, R::R24_0) => run::<IqF32, Upsample6To24, 24>(cfg)?,
        (F::U16, R::R10_0, R::R10_0) => run::<IqU16, Passthrough10, 10>(cfg)?,
        (F::F32, R::R10_0, R::R10_0) => run::<IqF32, Passthrough10, 10>(cfg)?,
        (F::U16, R::R10_0, R::R24_0) => run::<IqU16, Upsample10To24, 24>(cfg)?,
        (F::F32, R::R10_0, R::R24_0) => run::<IqF32, Upsample10To24, 24>(cfg)?,
        _ => return Ok(false),
    }
    Ok(true)
}

fn run<F, S, const N: usize>(cfg: RunConfig) -> Result<()>
where
    F: RawFormat + 'static,
    S: Sampler,
{
    info!("input rate: {} MHz, output rate: {} MHz", S::INPUT_RATE.mhz(), S::OUTPUT_RATE.mhz());
    info!("input to output ratio: {}:{}", S::RATIO_IN, S::RATIO_OUT);
    info!("streams: {}, chunk: {} in / {} out samples", N, S::INPUT_LEN, S::SAMPLE_LEN);

    let pipeline = IqPipeline::from_options(cfg.iq_filter, cfg.taps, S::INPUT_RATE);
    info!("iq pipeline: {}", pipeline.describe());

    let mut demod: DemodCore<N, _> = DemodCore::new(FrameWriter::new(io::stdout().lock()));
    let mut stream: SampleStream<S, N> = SampleStream::new();

    match cfg.device {
        Some((kind, section)) => {
            device::validate(kind, cfg.format)?;
            let (ring_writer, ring_reader) =
                RingBuffer::<F::Raw>::new(2 * S::INPUT_LEN, RING_BLOCKS);
            let mut dev = device::start::<F>(kind, &section, S::INPUT_RATE, ring_writer)?;
            info!("device capture running");

            let mut source = RingSource::<F>::new(ring_reader, pipeline);
            stream.run(&mut source, &mut demod);

            info!("shutting down device");
            dev.stop();
        }
        None => {
            info!("reading samples from stdin");
            let stdin = io::stdin().lock();
            let mut source = StreamSource::<F, _>::new(stdin, pipeline, S::INPUT_LEN);
            stream.run(&mut source, &mut demod);
        }
    }

    info!("finished");
    Ok(())
}
