//! Command line, sample rates and the preset table
//!
//! The demodulator is monomorphized per (raw format, input rate, output
//! rate); the preset table lists the instantiated combinations. Rates
//! outside the recognized set fail to parse; recognized rates without a
//! preset are reported as an unsupported configuration.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser;

#[derive(Parser, Debug)]
#[command(
    name = "adsb-stream",
    about = "Real-time Mode S / ADS-B demodulator for SDR sample streams",
    version
)]
pub struct Cli {
    /// Input sample rate in MHz (e.g. 2.4, 6, 10)
    #[arg(short = 's', value_name = "RATE")]
    pub sample_rate: String,

    /// Output/upsample rate in MHz; defaults from the input rate
    #[arg(short = 'u', value_name = "RATE")]
    pub upsample_rate: Option<String>,

    /// Device configuration INI file with one [rtlsdr] or [airspy] section
    #[arg(short = 'd', value_name = "FILE")]
    pub device_config: Option<PathBuf>,

    /// Enable the IQ FIR filter with the built-in taps
    #[arg(short = 'q')]
    pub iq_filter: bool,

    /// Load custom FIR taps (one float per line, up to 64)
    #[arg(short = 'f', value_name = "FILE")]
    pub taps_file: Option<PathBuf>,

    /// Raw input format: u8, u16 or f32; defaults from the input rate
    #[arg(short = 'i', value_name = "FORMAT")]
    pub input_format: Option<String>,

    /// Verbose logs on stderr
    #[arg(short = 'v')]
    pub verbose: bool,
}

/// The recognized input/output rates.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SampleRate {
    R2_0,
    R2_4,
    R2_56,
    R3_0,
    R3_2,
    R4_0,
    R6_0,
    R8_0,
    R10_0,
    R12_0,
    R16_0,
    R20_0,
    R24_0,
    R40_0,
    R48_0,
}

impl SampleRate {
    pub fn hz(self) -> u32 {
        use SampleRate::*;
        match self {
            R2_0 => 2_000_000,
            R2_4 => 2_400_000,
            R2_56 => 2_560_000,
            R3_0 => 3_000_000,
            R3_2 => 3_200_000,
            R4_0 => 4_000_000,
            R6_0 => 6_000_000,
            R8_0 => 8_000_000,
            R10_0 => 10_000_000,
            R12_0 => 12_000_000,
            R16_0 => 16_000_000,
            R20_0 => 20_000_000,
            R24_0 => 24_000_000,
            R40_0 => 40_000_000,
            R48_0 => 48_000_000,
        }
    }

    pub fn mhz(self) -> f32 {
        self.hz() as f32 / 1e6
    }

    /// Parse a rate given in MHz, with an optional trailing 'M'.
    pub fn parse(raw: &str) -> Result<SampleRate> {
        let s = raw.trim().trim_end_matches(['M', 'm']);
        let mhz: f32 = s
            .parse()
            .with_context(|| format!("invalid sample rate: {raw}"))?;
        let hz = (mhz * 1e6 + 0.5) as u32;

        use SampleRate::*;
        for rate in [
            R2_0, R2_4, R2_56, R3_0, R3_2, R4_0, R6_0, R8_0, R10_0, R12_0, R16_0, R20_0, R24_0,
            R40_0, R48_0,
        ] {
            if rate.hz() == hz {
                return Ok(rate);
            }
        }
        bail!("unsupported sample rate: {raw}");
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RawFormatKind {
    U8,
    U16,
    F32,
}

impl RawFormatKind {
    pub fn parse(raw: &str) -> Result<RawFormatKind> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "u8" => Ok(RawFormatKind::U8),
            "u16" => Ok(RawFormatKind::U16),
            "f32" => Ok(RawFormatKind::F32),
            _ => bail!("unknown input format: {raw} (expected u8, u16 or f32)"),
        }
    }

    /// The capture tools dictate the default: 8-bit IQ below 6 MHz
    /// (rtl_sdr), 16-bit raw at and above (airspy_rx).
    pub fn default_for(rate: SampleRate) -> RawFormatKind {
        if rate.hz() < 6_000_000 {
            RawFormatKind::U8
        } else {
            RawFormatKind::U16
        }
    }
}

/// An instantiated (format, input rate, output rate) combination.
#[derive(Clone, Copy, Debug)]
pub struct Preset {
    pub format: RawFormatKind,
    pub input: SampleRate,
    pub output: SampleRate,
}

const fn preset(format: RawFormatKind, input: SampleRate, output: SampleRate) -> Preset {
    Preset { format, input, output }
}

/// Every monomorphized pipeline. f32 input is available for each rate pair.
pub const PRESETS: &[Preset] = &[
    preset(RawFormatKind::U8, SampleRate::R2_4, SampleRate::R8_0),
    preset(RawFormatKind::F32, SampleRate::R2_4, SampleRate::R8_0),
    preset(RawFormatKind::U16, SampleRate::R6_0, SampleRate::R6_0),
    preset(RawFormatKind::F32, SampleRate::R6_0, SampleRate::R6_0),
    preset(RawFormatKind::U16, SampleRate::R6_0, SampleRate::R12_0),
    preset(RawFormatKind::F32, SampleRate::R6_0, SampleRate::R12_0),
    preset(RawFormatKind::U16, SampleRate::R6_0, SampleRate::R24_0),
    preset(RawFormatKind::F32, SampleRate::R6_0, SampleRate::R24_0),
    preset(RawFormatKind::U16, SampleRate::R10_0, SampleRate::R10_0),
    preset(RawFormatKind::F32, SampleRate::R10_0, SampleRate::R10_0),
    preset(RawFormatKind::U16, SampleRate::R10_0, SampleRate::R24_0),
    preset(RawFormatKind::F32, SampleRate::R10_0, SampleRate::R24_0),
];

/// First preset output for the given input rate, in table order.
pub fn default_output_rate(input: SampleRate) -> Option<SampleRate> {
    PRESETS.iter().find(|p| p.input == input).map(|p| p.output)
}

pub fn is_supported(format: RawFormatKind, input: SampleRate, output: SampleRate) -> bool {
    PRESETS
        .iter()
        .any(|p| p.format == format && p.input == input && p.output == output)
}

pub fn print_supported_rates() {
    eprintln!("Supported sample rate combinations:");
    for p in PRESETS {
        eprintln!(
            "  {:>5} MHz -> {:>4} MHz ({})",
            p.input.mhz(),
            p.output.mhz(),
            match p.format {
                RawFormatKind::U8 => "uint8 IQ",
                RawFormatKind::U16 => "uint16 IQ",
                RawFormatKind::F32 => "float32 IQ",
            }
        );
    }
}

/// Load FIR taps from a file: one float per line, `#` comments, 64 at most.
pub fn load_taps(path: &PathBuf) -> Result<Vec<f32>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read taps file {}", path.display()))?;

    let mut taps = Vec::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let v: f32 = line
            .parse()
            .with_context(|| format!("malformed tap line: {line}"))?;
        taps.push(v);
        if taps.len() > 64 {
            bail!("too many taps in {} (limit 64)", path.display());
        }
    }
    if taps.is_empty() {
        bail!("no taps found in {}", path.display());
    }
    Ok(taps)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rates_parse_in_mhz() {
        assert_eq!(SampleRate::parse("2.4").unwrap(), SampleRate::R2_4);
        assert_eq!(SampleRate::parse("6").unwrap(), SampleRate::R6_0);
        assert_eq!(SampleRate::parse("10M").unwrap(), SampleRate::R10_0);
        assert_eq!(SampleRate::parse("2.56").unwrap(), SampleRate::R2_56);
        assert!(SampleRate::parse("5").is_err());
        assert!(SampleRate::parse("fast").is_err());
    }

    #[test]
    fn default_output_follows_the_preset_table() {
        assert_eq!(default_output_rate(SampleRate::R2_4), Some(SampleRate::R8_0));
        assert_eq!(default_output_rate(SampleRate::R6_0), Some(SampleRate::R6_0));
        assert_eq!(default_output_rate(SampleRate::R48_0), None);
    }

    #[test]
    fn support_requires_the_exact_triple() {
        assert!(is_supported(RawFormatKind::U8, SampleRate::R2_4, SampleRate::R8_0));
        assert!(!is_supported(RawFormatKind::U16, SampleRate::R2_4, SampleRate::R8_0));
        assert!(!is_supported(RawFormatKind::U16, SampleRate::R6_0, SampleRate::R8_0));
    }

    #[test]
    fn format_defaults_split_at_6_mhz() {
        assert_eq!(RawFormatKind::default_for(SampleRate::R2_4), RawFormatKind::U8);
        assert_eq!(RawFormatKind::default_for(SampleRate::R6_0), RawFormatKind::U16);
    }
}
