//! Real-time Mode S / ADS-B demodulator
//!
//! The hot path is a polyphase shift-register demodulator: every 1 MHz tick
//! shifts one bit into N parallel sub-sample phases, keeps two CRC
//! accumulators per phase incrementally updated, and asks a dispatcher
//! whether any phase currently holds a valid 56- or 112-bit downlink frame.
//! Validated frames pass a per-aircraft trust cache before they are printed
//! with a 12 MHz multilateration timestamp.
//!
//! Module map, roughly in data-flow order: [`device`] or stdin produce raw
//! IQ, [`ring`] hands blocks to the consumer thread, [`input`] converts to
//! magnitudes through [`pipeline`], [`sampler`] upsamples to the internal
//! rate, [`stream`] slices bits, [`demod`] dispatches frames against
//! [`crc`], [`registers`] and [`icao`], and [`output`] serializes them.

pub mod bits;
pub mod config;
pub mod crc;
pub mod demod;
pub mod device;
pub mod icao;
pub mod ini;
pub mod input;
pub mod modes;
pub mod output;
pub mod pipeline;
pub mod registers;
pub mod ring;
pub mod runner;
pub mod sampler;
pub mod shutdown;
pub mod stats;
pub mod stream;
