//! Per-tick frame dispatcher and validation
//!
//! Every 1 MHz tick shifts one bit into each phase of the register bank and
//! then inspects each phase for a complete downlink frame: short formats by
//! the cached 5-bit DF at the 56-bit window start, long formats at the
//! 112-bit start. There is no preamble detection; the CRC accumulators and
//! the ICAO cache are the gate that separates real transmissions from
//! CRC-collision garbage.
//!
//! Duplicate suppression has two layers. The phase gate drops a window that
//! the previous phase already inspected with the same content (adjacent
//! phases sampling the same symbol). The emission gate drops a frame equal
//! to the last one sent within the last N phase steps (the same symbol
//! completing one tick later on a neighbouring phase).
//!
//! Trust rule: only a clean-CRC extended squitter (DF 17/18/19) ever makes
//! an address trusted. Error-corrected frames can confirm a trusted address
//! but never promote one, and DF11 never promotes.

use std::io::Write;

use tracing::warn;

use crate::bits::Bits128;
use crate::crc::{Crc, DF11_ERROR_TABLE, DF17_ERROR_TABLE};
use crate::icao::IcaoTable;
use crate::modes;
use crate::output::{FrameWriter, MLAT_MASK};
use crate::registers::ShiftRegisterBank;
use crate::stats::StatsLog;

pub struct DemodCore<const N: usize, W: Write> {
    regs: ShiftRegisterBank<N>,
    cache: IcaoTable,
    writer: FrameWriter<W>,
    stats: StatsLog,

    // window of the previously inspected phase, for the phase gate
    prev_low: u64,
    prev_high: u64,
    prev_crc_56: Crc,
    prev_crc_112: Crc,

    // last emitted frames, for the emission gate
    last_long: Bits128,
    last_long_time: u64,
    last_short: u64,
    last_short_time: u64,

    /// Phase-step clock: N increments per 1 MHz tick.
    curr_time: u64,
}

impl<const N: usize, W: Write> DemodCore<N, W> {
    pub fn new(writer: FrameWriter<W>) -> Self {
        DemodCore {
            regs: ShiftRegisterBank::new(),
            cache: IcaoTable::new(),
            writer,
            stats: StatsLog::new(),
            prev_low: 0,
            prev_high: 0,
            prev_crc_56: 0,
            prev_crc_112: 0,
            last_long: Bits128::new(),
            last_long_time: 0,
            last_short: 0,
            last_short_time: 0,
            curr_time: 0,
        }
    }

    /// Main entry: one new bit per phase, then dispatch every phase.
    pub fn shift_in_new_bits(&mut self, new_bits: &[u32; N]) {
        self.regs.shift_in(new_bits);

        for i in 0..N {
            // a found short frame makes the long check pointless this phase
            if !self.handle_short(i) {
                self.handle_long(i);
            }

            self.prev_low = self.regs.low(i);
            self.prev_high = self.regs.high(i);
            self.prev_crc_56 = self.regs.crc_56(i);
            self.prev_crc_112 = self.regs.crc_112(i);
            self.curr_time += 1;
        }

        self.cache.tick();
        self.stats.tick();
    }

    /// Log the final statistics; call when the input ends.
    pub fn finish(&mut self) {
        self.stats.report_final();
    }

    fn handle_short(&mut self, i: usize) -> bool {
        let crc = self.regs.crc_56(i);
        if crc == self.prev_crc_56 && modes::equal_short(self.regs.low(i), self.prev_low) {
            // the previous phase already dealt with this content
            return false;
        }

        match self.regs.df_56(i) {
            df @ (0 | 4 | 5) => {
                let frame = self.regs.extract_frame_short(i);
                self.handle_surveillance(df, crc, frame)
            }
            11 => {
                let frame = self.regs.extract_frame_short(i);
                self.handle_all_call(crc, frame)
            }
            _ => false,
        }
    }

    fn handle_long(&mut self, i: usize) -> bool {
        let crc = self.regs.crc_112(i);
        if crc == self.prev_crc_112
            && modes::equal_long(self.regs.low(i), self.regs.high(i), self.prev_low, self.prev_high)
        {
            return false;
        }

        match self.regs.df_112(i) {
            df @ (17 | 18 | 19) => {
                let frame = self.regs.extract_frame_long(i);
                self.handle_ext_squitter(df, crc, frame)
            }
            df @ (16 | 20 | 21) => {
                let frame = self.regs.extract_frame_long(i);
                self.handle_acas_comm_b(df, crc, frame)
            }
            _ => false,
        }
    }

    /// DF 0/4/5: the 24-bit address is XOR-overlaid on the parity, so the
    /// CRC residue of a valid frame is the sender's address.
    fn handle_surveillance(&mut self, df: u8, crc: Crc, frame: u64) -> bool {
        let Some(slot) = self.cache.find(crc) else {
            return false;
        };
        if !self.cache.is_alive(slot) {
            return false;
        }

        let plausible = match df {
            0 | 4 => self.cache.check_altitude(slot, modes::altitude_field_short(frame)),
            _ => self.cache.check_squawk(slot, modes::identity_field_short(frame)),
        };
        if !plausible {
            return false;
        }

        self.cache.mark_as_seen(slot);
        self.emit_short(df, frame);
        true
    }

    /// DF 16/20/21: long-frame address parity, same validation as DF 0/4/5.
    fn handle_acas_comm_b(&mut self, df: u8, crc: Crc, frame: Bits128) -> bool {
        let Some(slot) = self.cache.find(crc) else {
            return false;
        };
        if !self.cache.is_alive(slot) {
            return false;
        }

        let plausible = match df {
            16 | 20 => self.cache.check_altitude(slot, modes::altitude_field_long(frame)),
            _ => self.cache.check_squawk(slot, modes::identity_field_long(frame)),
        };
        if !plausible {
            return false;
        }

        self.cache.mark_as_seen(slot);
        self.emit_long(df, frame);
        true
    }

    /// DF 17/18/19 extended squitter. A clean CRC is the one and only way an
    /// address enters the trusted set.
    fn handle_ext_squitter(&mut self, df: u8, crc: Crc, frame: Bits128) -> bool {
        if crc == 0 {
            let icao_ca = modes::icao_ca_long(frame);
            if icao_ca == 0 {
                return false;
            }
            let slot = match self.cache.find_with_ca(icao_ca) {
                Some(slot) => slot,
                None => self.cache.insert_with_ca(icao_ca),
            };
            self.cache.mark_as_trusted_seen(slot);
            self.emit_long(df, frame);
            return true;
        }

        let fix = DF17_ERROR_TABLE.lookup(crc);
        if fix.valid() {
            let repaired = fix.apply_long(frame);
            let icao_ca = modes::icao_ca_long(repaired);
            // repairing and an unknown address at the same time is too
            // dangerous; only confirm already-trusted senders
            if let Some(slot) = self.cache.find_with_ca(icao_ca) {
                if self.cache.is_trusted(slot) {
                    self.cache.mark_as_seen(slot);
                    self.stats.log_df17_repair();
                    self.emit_long(df, repaired);
                    return true;
                }
            }
        }
        self.stats.log_df17_repair_failed();
        false
    }

    /// DF 11 all-call reply: plaintext ICAO+CA, CRC zero when clean.
    fn handle_all_call(&mut self, crc: Crc, frame: u64) -> bool {
        if crc == 0 {
            return self.all_call_with_zero_crc(frame, true);
        }

        let fix = DF11_ERROR_TABLE.lookup(crc);
        if fix.valid() {
            self.stats.log_df11_repair();
            // repaired unknowns are not inserted
            return self.all_call_with_zero_crc(fix.apply_short(frame), false);
        }

        // Last resort: if the claimed address is trusted, assume only the
        // parity block was hit and clear it with the residue.
        let icao_ca = modes::icao_ca_short(frame);
        if let Some(slot) = self.cache.find_with_ca(icao_ca) {
            if self.cache.is_trusted(slot) {
                let repaired = frame ^ crc as u64;
                self.cache.mark_as_seen(slot);
                self.emit_short(11, repaired);
                return true;
            }
        }
        false
    }

    fn all_call_with_zero_crc(&mut self, frame: u64, insert_unknown: bool) -> bool {
        let icao_ca = modes::icao_ca_short(frame);
        if icao_ca == 0 {
            return false;
        }

        let Some(slot) = self.cache.find_with_ca(icao_ca) else {
            if insert_unknown {
                // first sighting: cache it, emit nothing yet
                let slot = self.cache.insert_with_ca(icao_ca);
                self.cache.mark_as_seen(slot);
            }
            return false;
        };

        if self.cache.is_alive(slot) {
            self.cache.mark_as_seen(slot);
            self.emit_short(11, frame);
            true
        } else {
            self.cache.mark_as_seen(slot);
            false
        }
    }

    /// Sample clock (N MHz phase steps) to the 48-bit 12 MHz MLAT counter.
    fn mlat_timestamp(&self) -> u64 {
        let t = self.curr_time;
        match N {
            6 => t * 2,
            8 => t + t / 2,
            10 => t + t / 5,
            12 => t,
            24 => t / 2,
            _ => t * 12 / N as u64,
        }
    }

    fn emit_long(&mut self, df: u8, frame: Bits128) {
        if self.curr_time.wrapping_sub(self.last_long_time) < N as u64
            && modes::equal_long(
                frame.low(),
                frame.high(),
                self.last_long.low(),
                self.last_long.high(),
            )
        {
            self.stats.log_dup(df);
            return;
        }
        self.stats.log_sent(df);
        self.last_long = frame;
        self.last_long_time = self.curr_time;

        // the message started 112 bit periods (of 12 ticks each) ago
        let ts = self.mlat_timestamp().wrapping_sub(112 * 12) & MLAT_MASK;
        if let Err(e) = self.writer.write_long(ts, frame) {
            warn!("frame output failed: {e}");
        }
    }

    fn emit_short(&mut self, df: u8, frame: u64) {
        if self.curr_time.wrapping_sub(self.last_short_time) < N as u64 && frame == self.last_short
        {
            self.stats.log_dup(df);
            return;
        }
        self.stats.log_sent(df);
        self.last_short = frame;
        self.last_short_time = self.curr_time;

        let ts = self.mlat_timestamp().wrapping_sub(56 * 12) & MLAT_MASK;
        if let Err(e) = self.writer.write_short(ts, frame) {
            warn!("frame output failed: {e}");
        }
    }

    #[cfg(test)]
    pub fn output(&self) -> &W {
        self.writer.get_ref()
    }
}
