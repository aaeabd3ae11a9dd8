//! Subprocess capture backends
//!
//! Device access goes through the stock capture tools (`rtl_sdr`,
//! `airspy_rx`) rather than linking the driver libraries: the tool is
//! spawned with the INI settings mapped to its flags, its stderr is relayed
//! through the log, and a dedicated capture thread copies its stdout into
//! the ring buffer. The demodulator consumes the ring on the main thread.

use std::io::{BufRead, BufReader, Read};
use std::process::{Child, Command, Stdio};
use std::thread::{self, JoinHandle};

use anyhow::{bail, Context, Result};
use tracing::{debug, error, info, warn};

use crate::config::SampleRate;
use crate::ini::Section;
use crate::input::RawFormat;
use crate::ring::RingWriter;
use crate::shutdown;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeviceKind {
    RtlSdr,
    Airspy,
}

pub struct Device {
    child: Child,
    capture: Option<JoinHandle<()>>,
}

impl Device {
    /// Kill the capture tool and join the capture thread. The thread ends
    /// once the tool's stdout closes.
    pub fn stop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
        if let Some(handle) = self.capture.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Spawn the capture tool and start the thread that feeds the ring.
pub fn start<F: RawFormat + 'static>(
    kind: DeviceKind,
    section: &Section,
    rate: SampleRate,
    writer: RingWriter<F::Raw>,
) -> Result<Device> {
    let mut cmd = match kind {
        DeviceKind::RtlSdr => rtl_sdr_command(section, rate),
        DeviceKind::Airspy => airspy_command(section, rate),
    };
    cmd.stdout(Stdio::piped()).stderr(Stdio::piped());

    info!("starting capture process: {:?}", cmd);
    let mut child = cmd
        .spawn()
        .context("failed to start the capture tool; is it installed and in PATH?")?;

    let stdout = child.stdout.take().context("capture tool has no stdout")?;

    if let Some(stderr) = child.stderr.take() {
        thread::spawn(move || {
            for line in BufReader::new(stderr).lines().map_while(Result::ok) {
                if !line.trim().is_empty() {
                    info!("[capture] {}", line.trim());
                }
            }
        });
    }

    let capture = thread::Builder::new()
        .name("sdr-capture".to_string())
        .spawn(move || run_capture::<F>(stdout, writer))
        .context("failed to spawn the capture thread")?;

    Ok(Device { child, capture: Some(capture) })
}

/// Copy the tool's byte stream into the typed ring until EOF or shutdown.
fn run_capture<F: RawFormat>(mut stdout: impl Read, mut writer: RingWriter<F::Raw>) {
    let mut bytes = vec![0u8; 64 * 1024];
    let mut raw: Vec<F::Raw> = Vec::with_capacity(bytes.len() / F::BYTES_PER_VALUE);
    // bytes carried over when a read splits a value
    let mut pending = 0usize;

    loop {
        if shutdown::requested() {
            debug!("capture thread leaving on shutdown request");
            break;
        }

        match stdout.read(&mut bytes[pending..]) {
            Ok(0) => {
                info!("capture stream ended");
                break;
            }
            Ok(n) => {
                let total = pending + n;
                let usable = total - total % F::BYTES_PER_VALUE;

                raw.clear();
                raw.extend(bytes[..usable].chunks_exact(F::BYTES_PER_VALUE).map(F::value_from_le));
                let written = writer.write(&raw);
                if written < raw.len() {
                    // ring shut down underneath us
                    break;
                }

                bytes.copy_within(usable..total, 0);
                pending = total - usable;
            }
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => {
                error!("capture read failed: {e}");
                break;
            }
        }
    }

    writer.finish_block(F::Raw::default());
    writer.shutdown();
}

fn rtl_sdr_command(section: &Section, rate: SampleRate) -> Command {
    let mut cmd = Command::new("rtl_sdr");

    let frequency = section.get("frequency").map(String::as_str).unwrap_or("1090000000");
    cmd.arg("-f").arg(frequency);
    cmd.arg("-s").arg(rate.hz().to_string());

    for (key, value) in section {
        match key.as_str() {
            "frequency" => {}
            "gain" => {
                cmd.arg("-g").arg(value);
            }
            "ppm" => {
                cmd.arg("-p").arg(value);
            }
            "device_index" => {
                cmd.arg("-d").arg(value);
            }
            "bias_tee" => {
                if is_enabled(value) {
                    cmd.arg("-T");
                }
            }
            _ => warn!("ignoring unsupported rtlsdr setting: {key}"),
        }
    }

    cmd.arg("-");
    cmd
}

fn airspy_command(section: &Section, rate: SampleRate) -> Command {
    let mut cmd = Command::new("airspy_rx");

    let freq_mhz = section
        .get("frequency")
        .and_then(|v| v.parse::<f64>().ok())
        .map(|hz| hz / 1e6)
        .unwrap_or(1090.0);
    cmd.arg("-f").arg(format!("{freq_mhz:.3}"));
    cmd.arg("-a").arg(rate.hz().to_string());
    // raw unpacked 12-bit samples
    cmd.arg("-t").arg("4");

    for (key, value) in section {
        match key.as_str() {
            "frequency" => {}
            "serial" => {
                cmd.arg("-s").arg(value);
            }
            "linearity_gain" => {
                cmd.arg("-g").arg(value);
            }
            "lna_gain" => {
                cmd.arg("-l").arg(value);
            }
            "mixer_gain" => {
                cmd.arg("-m").arg(value);
            }
            "vga_gain" => {
                cmd.arg("-v").arg(value);
            }
            "bias_tee" => {
                if is_enabled(value) {
                    cmd.arg("-b").arg("1");
                }
            }
            _ => warn!("ignoring unsupported airspy setting: {key}"),
        }
    }

    cmd.arg("-r").arg("-");
    cmd
}

fn is_enabled(value: &str) -> bool {
    matches!(value.trim(), "1" | "true" | "on" | "yes")
}

/// Which kind of device a loaded INI file selects, if any.
pub fn kind_from_ini(ini: &crate::ini::IniFile) -> Option<(DeviceKind, Section)> {
    if let Some(section) = ini.section("airspy") {
        return Some((DeviceKind::Airspy, section.clone()));
    }
    if let Some(section) = ini.section("rtlsdr") {
        return Some((DeviceKind::RtlSdr, section.clone()));
    }
    None
}

/// The raw format each capture tool produces.
pub fn expected_format(kind: DeviceKind) -> crate::config::RawFormatKind {
    match kind {
        DeviceKind::RtlSdr => crate::config::RawFormatKind::U8,
        DeviceKind::Airspy => crate::config::RawFormatKind::U16,
    }
}

/// Reject INI/CLI combinations the capture tools cannot produce.
pub fn validate(kind: DeviceKind, format: crate::config::RawFormatKind) -> Result<()> {
    if expected_format(kind) != format {
        bail!(
            "device kind {:?} produces {:?} samples, which does not match the configured input format {:?}",
            kind,
            expected_format(kind),
            format
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn section(pairs: &[(&str, &str)]) -> Section {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect::<BTreeMap<_, _>>()
    }

    fn args_of(cmd: &Command) -> Vec<String> {
        cmd.get_args().map(|a| a.to_string_lossy().into_owned()).collect()
    }

    fn has_pair(args: &[String], flag: &str, value: &str) -> bool {
        args.windows(2).any(|w| w[0] == flag && w[1] == value)
    }

    #[test]
    fn rtl_sdr_flags() {
        let cmd = rtl_sdr_command(
            &section(&[("gain", "49.6"), ("ppm", "1"), ("bias_tee", "on")]),
            SampleRate::R2_4,
        );
        assert_eq!(cmd.get_program(), "rtl_sdr");
        let args = args_of(&cmd);
        assert!(has_pair(&args, "-f", "1090000000"));
        assert!(has_pair(&args, "-s", "2400000"));
        assert!(has_pair(&args, "-g", "49.6"));
        assert!(has_pair(&args, "-p", "1"));
        assert!(args.contains(&"-T".to_string()));
        assert_eq!(args.last().unwrap(), "-");
    }

    #[test]
    fn airspy_flags() {
        let cmd = airspy_command(
            &section(&[("frequency", "1090000000"), ("lna_gain", "14"), ("serial", "0xA5")]),
            SampleRate::R6_0,
        );
        assert_eq!(cmd.get_program(), "airspy_rx");
        let args = args_of(&cmd);
        assert!(has_pair(&args, "-f", "1090.000"));
        assert!(has_pair(&args, "-a", "6000000"));
        assert!(has_pair(&args, "-l", "14"));
        assert!(has_pair(&args, "-s", "0xA5"));
        assert!(has_pair(&args, "-t", "4"));
    }

    #[test]
    fn device_kind_prefers_airspy_section() {
        let ini = crate::ini::IniFile::parse("[airspy]\n[rtlsdr]\n");
        assert_eq!(kind_from_ini(&ini).unwrap().0, DeviceKind::Airspy);
        let ini = crate::ini::IniFile::parse("[rtlsdr]\n");
        assert_eq!(kind_from_ini(&ini).unwrap().0, DeviceKind::RtlSdr);
        let ini = crate::ini::IniFile::parse("[other]\n");
        assert!(kind_from_ini(&ini).is_none());
    }

    #[test]
    fn format_validation() {
        assert!(validate(DeviceKind::RtlSdr, crate::config::RawFormatKind::U8).is_ok());
        assert!(validate(DeviceKind::RtlSdr, crate::config::RawFormatKind::U16).is_err());
        assert!(validate(DeviceKind::Airspy, crate::config::RawFormatKind::U16).is_ok());
    }
}
