//! adsb-stream - real-time Mode S / ADS-B demodulator
//!
//! Consumes IQ samples from stdin or a capture tool, recovers Mode S
//! downlink frames with a polyphase shift-register demodulator, validates
//! them against the 24-bit CRC and a per-aircraft trust cache, and prints
//! one hex line per accepted frame with a 12 MHz MLAT timestamp.

use std::process;

use anyhow::Result;
use clap::Parser;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

use adsb_stream::config::{self, Cli, RawFormatKind, SampleRate};
use adsb_stream::{device, ini, runner, shutdown};

fn main() {
    shutdown::install_handlers();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let code = if e.use_stderr() { 1 } else { 0 };
            let _ = e.print();
            process::exit(code);
        }
    };

    FmtSubscriber::builder()
        .with_max_level(if cli.verbose { Level::DEBUG } else { Level::INFO })
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    match run(cli) {
        Ok(true) => {}
        Ok(false) => {
            error!("configuration is not supported");
            config::print_supported_rates();
            process::exit(-1);
        }
        Err(e) => {
            error!("{e:#}");
            process::exit(1);
        }
    }
}

fn run(cli: Cli) -> Result<bool> {
    let input_rate = SampleRate::parse(&cli.sample_rate)?;

    let output_rate = match &cli.upsample_rate {
        Some(raw) => SampleRate::parse(raw)?,
        None => match config::default_output_rate(input_rate) {
            Some(rate) => {
                info!("auto-selected output rate: {} MHz", rate.mhz());
                rate
            }
            None => return Ok(false),
        },
    };

    let format = match &cli.input_format {
        Some(raw) => RawFormatKind::parse(raw)?,
        None => RawFormatKind::default_for(input_rate),
    };

    if !config::is_supported(format, input_rate, output_rate) {
        return Ok(false);
    }

    let taps = cli.taps_file.as_ref().map(config::load_taps).transpose()?;

    let device = match &cli.device_config {
        Some(path) => {
            let ini = ini::IniFile::load(path)?;
            let found = device::kind_from_ini(&ini);
            if found.is_none() {
                info!(
                    "no [rtlsdr] or [airspy] section in {}, reading from stdin",
                    path.display()
                );
            }
            found
        }
        None => None,
    };

    runner::dispatch(runner::RunConfig {
        format,
        input_rate,
        output_rate,
        iq_filter: cli.iq_filter,
        taps,
        device,
    })
}
