//! Validated frame serialization
//!
//! Default output is the MLAT text format: one line per frame,
//! `@` + 12 hex digits of the 48-bit 12 MHz timestamp + 14 (short) or 28
//! (long) hex digits of the frame + `;`. The `raw-frames` feature switches
//! to 24-byte binary records: frame low u64, frame high u64 (upper 16 bits
//! zero, and all high bits zero for short frames) and a wall-clock
//! millisecond stamp, all little-endian.

use std::io::Write;

use crate::bits::Bits128;

/// Mask for the 48-bit MLAT counter.
pub const MLAT_MASK: u64 = 0xFFFF_FFFF_FFFF;

pub struct FrameWriter<W: Write> {
    out: W,
}

impl<W: Write> FrameWriter<W> {
    pub fn new(out: W) -> Self {
        FrameWriter { out }
    }

    /// Access to the underlying sink.
    pub fn get_ref(&self) -> &W {
        &self.out
    }

    #[cfg(not(feature = "raw-frames"))]
    pub fn write_long(&mut self, timestamp: u64, frame: Bits128) -> std::io::Result<()> {
        writeln!(
            self.out,
            "@{:012X}{:012X}{:016X};",
            timestamp & MLAT_MASK,
            frame.high() & MLAT_MASK,
            frame.low()
        )?;
        self.out.flush()
    }

    #[cfg(not(feature = "raw-frames"))]
    pub fn write_short(&mut self, timestamp: u64, frame: u64) -> std::io::Result<()> {
        writeln!(
            self.out,
            "@{:012X}{:014X};",
            timestamp & MLAT_MASK,
            frame & 0x00FF_FFFF_FFFF_FFFF
        )?;
        self.out.flush()
    }

    #[cfg(feature = "raw-frames")]
    pub fn write_long(&mut self, _timestamp: u64, frame: Bits128) -> std::io::Result<()> {
        self.write_raw(frame.low(), frame.high() & MLAT_MASK)
    }

    #[cfg(feature = "raw-frames")]
    pub fn write_short(&mut self, _timestamp: u64, frame: u64) -> std::io::Result<()> {
        self.write_raw(frame & 0x00FF_FFFF_FFFF_FFFF, 0)
    }

    #[cfg(feature = "raw-frames")]
    fn write_raw(&mut self, low: u64, high: u64) -> std::io::Result<()> {
        let millis = chrono::Utc::now().timestamp_millis() as u64;
        let mut record = [0u8; 24];
        record[0..8].copy_from_slice(&low.to_le_bytes());
        record[8..16].copy_from_slice(&high.to_le_bytes());
        record[16..24].copy_from_slice(&millis.to_le_bytes());
        self.out.write_all(&record)?;
        self.out.flush()
    }
}

#[cfg(all(test, not(feature = "raw-frames")))]
mod tests {
    use super::*;

    #[test]
    fn long_frame_line_layout() {
        let mut w = FrameWriter::new(Vec::new());
        let frame = Bits128::from_halves(0x8D12_3456_7890, 0xAABB_CCDD_EEFF_0011);
        w.write_long(0x0000_0001_2345, frame).unwrap();
        assert_eq!(
            String::from_utf8(w.out).unwrap(),
            "@0000000123458D1234567890AABBCCDDEEFF0011;\n"
        );
    }

    #[test]
    fn short_frame_line_layout() {
        let mut w = FrameWriter::new(Vec::new());
        w.write_short(0xFFFF_FFFF_FFFF, 0x5D_ABCDEF_123456).unwrap();
        assert_eq!(
            String::from_utf8(w.out).unwrap(),
            "@FFFFFFFFFFFF5DABCDEF123456;\n"
        );
    }

    #[test]
    fn timestamp_wraps_at_48_bits() {
        let mut w = FrameWriter::new(Vec::new());
        w.write_short(0x1_0000_0000_0001, 0).unwrap();
        assert!(String::from_utf8(w.out).unwrap().starts_with("@000000000001"));
    }
}
