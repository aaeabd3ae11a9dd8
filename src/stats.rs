//! Demodulation statistics
//!
//! Counters are kept per downlink format and logged as single summary lines
//! to stderr: once every five simulated seconds while running, and once at
//! the end of the input. The simulated clock is the 1 MHz iteration counter,
//! so file replays report in stream time, not wall time.

use tracing::info;

/// 1 MHz iterations between periodic summaries (5 simulated seconds).
const REPORT_INTERVAL: u64 = 5_000_000;

const NUM_DF: usize = 25;

#[derive(Default)]
pub struct StatsLog {
    sent: [u64; NUM_DF],
    dups: [u64; NUM_DF],
    df11_repaired: u64,
    df17_repaired: u64,
    df17_repair_failed: u64,
    iterations: u64,
    total_sent: u64,
}

impl StatsLog {
    pub fn new() -> Self {
        StatsLog::default()
    }

    pub fn log_sent(&mut self, df: u8) {
        self.sent[(df as usize).min(NUM_DF - 1)] += 1;
    }

    pub fn log_dup(&mut self, df: u8) {
        self.dups[(df as usize).min(NUM_DF - 1)] += 1;
    }

    pub fn log_df11_repair(&mut self) {
        self.df11_repaired += 1;
    }

    pub fn log_df17_repair(&mut self) {
        self.df17_repaired += 1;
    }

    pub fn log_df17_repair_failed(&mut self) {
        self.df17_repair_failed += 1;
    }

    /// Advance the 1 MHz iteration clock; emits a summary line every
    /// `REPORT_INTERVAL` iterations.
    pub fn tick(&mut self) {
        self.iterations += 1;
        if self.iterations % REPORT_INTERVAL == 0 {
            self.report_interval();
        }
    }

    fn sent_in(&self, dfs: &[usize]) -> u64 {
        dfs.iter().map(|&d| self.sent[d]).sum()
    }

    fn report_interval(&mut self) {
        let interval_sent: u64 = self.sent.iter().sum();
        let secs = REPORT_INTERVAL as f64 / 1_000_000.0;
        info!(
            "[stats] {:.0}s stream time: {} msgs ({:.1}/s) | ES {} | Comm-B {} | ACAS {} | Surv {} | DF11 {} | repaired {}+{} | dups {}",
            self.iterations as f64 / 1_000_000.0,
            interval_sent,
            interval_sent as f64 / secs,
            self.sent_in(&[17, 18, 19]),
            self.sent_in(&[20, 21]),
            self.sent_in(&[0, 16]),
            self.sent_in(&[4, 5]),
            self.sent[11],
            self.df17_repaired,
            self.df11_repaired,
            self.dups.iter().sum::<u64>(),
        );
        self.total_sent += interval_sent;
        self.sent = [0; NUM_DF];
        self.dups = [0; NUM_DF];
        self.df11_repaired = 0;
        self.df17_repaired = 0;
        self.df17_repair_failed = 0;
    }

    /// Final summary, logged when the input ends.
    pub fn report_final(&mut self) {
        let interval_sent: u64 = self.sent.iter().sum();
        self.total_sent += interval_sent;
        info!(
            "[stats] done: {} msgs total over {:.1}s of stream time",
            self.total_sent,
            self.iterations as f64 / 1_000_000.0,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate() {
        let mut s = StatsLog::new();
        s.log_sent(17);
        s.log_sent(17);
        s.log_sent(11);
        s.log_dup(17);
        assert_eq!(s.sent[17], 2);
        assert_eq!(s.sent[11], 1);
        assert_eq!(s.dups[17], 1);
    }

    #[test]
    fn interval_report_resets_window() {
        let mut s = StatsLog::new();
        s.log_sent(17);
        for _ in 0..REPORT_INTERVAL {
            s.tick();
        }
        assert_eq!(s.sent[17], 0);
        assert_eq!(s.total_sent, 1);
    }
}
