//! ICAO address trust cache
//!
//! Direct-mapped cache over the low 16 bits of the 27-bit ICAO+CA key. One
//! occupant per bucket; a colliding aircraft simply overwrites (the decay
//! sweep restores consistency within a second). Key 0 doubles as the empty
//! sentinel, so the invalid address 000000 with CA 0 is never cached.
//!
//! Liveness and trust are TTLs in whole seconds. `tick()` runs at 1 MHz and
//! decays exactly one bucket per tick while the second-counter is below the
//! bucket count, so every bucket is visited once per simulated second at a
//! bounded per-tick cost.
//!
//! Trust separates real transponders from CRC-collision garbage: only clean
//! extended squitters grant it (see the dispatcher), and address-parity
//! messages are only accepted for addresses this cache knows.

/// Seconds an address stays alive without being seen.
pub const TTL_NOT_TRUSTED: u16 = 10;

/// Seconds a trust grant lasts without a fresh clean extended squitter.
pub const TTL_TRUSTED: u16 = 30;

const INDEX_BITS: u32 = 16;
const NUM_BUCKETS: usize = 1 << INDEX_BITS;
const BUCKET_MASK: u32 = (NUM_BUCKETS - 1) as u32;

/// Ticks per simulated second (the table is ticked at 1 MHz).
const TICKS_PER_SECOND: u32 = 1_000_000;

/// Altitude plausibility window in 25 ft units (~2000 ft).
const ALTITUDE_WINDOW: u16 = 80;

/// Consecutive disagreements before a plausibility record resets.
const MAX_STRIKES: u8 = 2;

#[derive(Clone, Copy, Default)]
struct Entry {
    /// 27-bit ICAO+CA key; 0 = empty.
    key: u32,
    ttl: u16,
    ttl_trusted: u16,
}

#[derive(Clone, Copy, Default)]
struct Plausibility {
    altitude: u16,
    altitude_cnt: u8,
    squawk: u16,
    squawk_cnt: u8,
}

/// Bucket handle returned by the lookup operations.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Slot(u16);

pub struct IcaoTable {
    entries: Box<[Entry]>,
    plausibility: Box<[Plausibility]>,
    tick_in_second: u32,
}

impl IcaoTable {
    pub fn new() -> Self {
        IcaoTable {
            entries: vec![Entry::default(); NUM_BUCKETS].into_boxed_slice(),
            plausibility: vec![Plausibility::default(); NUM_BUCKETS].into_boxed_slice(),
            tick_in_second: 0,
        }
    }

    #[inline]
    fn bucket(key: u32) -> usize {
        (key & BUCKET_MASK) as usize
    }

    /// Insert an address, overwriting any prior occupant of the bucket.
    /// TTL and trust start at zero; callers mark the entry seen themselves.
    pub fn insert_with_ca(&mut self, icao_ca: u32) -> Slot {
        let b = Self::bucket(icao_ca);
        self.entries[b] = Entry { key: icao_ca, ttl: 0, ttl_trusted: 0 };
        self.plausibility[b] = Plausibility::default();
        Slot(b as u16)
    }

    /// Exact-match lookup including the 3-bit CA field.
    pub fn find_with_ca(&self, icao_ca: u32) -> Option<Slot> {
        let b = Self::bucket(icao_ca);
        let stored = self.entries[b].key;
        (stored != 0 && stored == icao_ca).then(|| Slot(b as u16))
    }

    /// Lookup by the bare 24-bit address, ignoring the stored CA bits. Used
    /// by the address-parity formats, which do not transmit the CA.
    pub fn find(&self, icao: u32) -> Option<Slot> {
        let b = Self::bucket(icao);
        let stored = self.entries[b].key;
        (stored != 0 && stored & 0xFF_FFFF == icao).then(|| Slot(b as u16))
    }

    pub fn mark_as_seen(&mut self, slot: Slot) {
        self.entries[slot.0 as usize].ttl = TTL_NOT_TRUSTED;
    }

    pub fn mark_as_trusted_seen(&mut self, slot: Slot) {
        let e = &mut self.entries[slot.0 as usize];
        e.ttl_trusted = TTL_TRUSTED;
        e.ttl = TTL_NOT_TRUSTED;
    }

    pub fn is_alive(&self, slot: Slot) -> bool {
        self.entries[slot.0 as usize].ttl > 0
    }

    pub fn is_trusted(&self, slot: Slot) -> bool {
        let e = &self.entries[slot.0 as usize];
        e.ttl > 0 && e.ttl_trusted > 0
    }

    /// Altitude plausibility. Accepts the 13-bit AC field iff it agrees with
    /// the previously accepted value within the window; two disagreements in
    /// a row forget the record. Metric-coded altitudes are rejected.
    pub fn check_altitude(&mut self, slot: Slot, field: u16) -> bool {
        let Some(units) = ac13_units(field) else {
            // M bit set: metric altitude, currently not accepted
            return false;
        };
        let p = &mut self.plausibility[slot.0 as usize];
        if p.altitude_cnt == 0 || units.abs_diff(p.altitude) <= ALTITUDE_WINDOW {
            p.altitude = units;
            p.altitude_cnt = 1;
            return true;
        }
        p.altitude_cnt += 1;
        if p.altitude_cnt > MAX_STRIKES {
            p.altitude = 0;
            p.altitude_cnt = 0;
        }
        false
    }

    /// Squawk plausibility: exact match against the previously accepted
    /// identity code, with the same two-strike reset.
    pub fn check_squawk(&mut self, slot: Slot, field: u16) -> bool {
        let p = &mut self.plausibility[slot.0 as usize];
        if p.squawk_cnt == 0 || field == p.squawk {
            p.squawk = field;
            p.squawk_cnt = 1;
            return true;
        }
        p.squawk_cnt += 1;
        if p.squawk_cnt > MAX_STRIKES {
            p.squawk = 0;
            p.squawk_cnt = 0;
        }
        false
    }

    /// Advance the 1 MHz clock. While the in-second counter is below the
    /// bucket count, decay the bucket it indexes; an entry whose ttl reaches
    /// zero is cleared entirely.
    pub fn tick(&mut self) {
        let t = self.tick_in_second;
        self.tick_in_second = (t + 1) % TICKS_PER_SECOND;

        if (t as usize) < NUM_BUCKETS {
            let b = t as usize;
            let e = &mut self.entries[b];
            if e.key == 0 {
                return;
            }
            if e.ttl_trusted > 0 {
                e.ttl_trusted -= 1;
            }
            if e.ttl > 0 {
                e.ttl -= 1;
            }
            if e.ttl == 0 {
                *e = Entry::default();
                self.plausibility[b] = Plausibility::default();
            }
        }
    }
}

/// Decode a 13-bit AC altitude field into comparable units by removing the M
/// and Q bits (the dump1090 bit surgery). Returns `None` for metric (M = 1)
/// altitudes. With Q = 1 the result counts 25 ft steps from −1000 ft; Q = 0
/// Gillham codes pass through as opaque values under the same comparison.
pub fn ac13_units(field: u16) -> Option<u16> {
    if field & 0x0040 != 0 {
        return None;
    }
    Some(((field & 0x1F80) >> 2) | ((field & 0x0020) >> 1) | (field & 0x000F))
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Inverse of `ac13_units` for Q=1 fields, for building test frames.
    fn units_to_ac13(n: u16) -> u16 {
        ((n & 0x7E0) << 2) | ((n & 0x010) << 1) | 0x0010 | (n & 0x00F)
    }

    fn advance_seconds(table: &mut IcaoTable, secs: u32) {
        for _ in 0..secs * TICKS_PER_SECOND {
            table.tick();
        }
    }

    #[test]
    fn find_semantics() {
        let mut t = IcaoTable::new();
        let key = (5 << 24) | 0xABCDEF;
        let slot = t.insert_with_ca(key);

        assert_eq!(t.find_with_ca(key), Some(slot));
        // a different CA is a different exact key
        assert_eq!(t.find_with_ca((4 << 24) | 0xABCDEF), None);
        // masked lookup ignores the CA
        assert_eq!(t.find(0xABCDEF), Some(slot));
        // empty buckets never match, not even for address 0
        assert_eq!(t.find(0), None);
        assert_eq!(t.find_with_ca(0), None);
    }

    #[test]
    fn bucket_collisions_overwrite() {
        let mut t = IcaoTable::new();
        let a = (1 << 24) | 0x111234;
        let b = (2 << 24) | 0x221234; // same low 16 bits
        t.insert_with_ca(a);
        t.insert_with_ca(b);
        assert_eq!(t.find_with_ca(a), None);
        assert!(t.find_with_ca(b).is_some());
    }

    #[test]
    fn insert_is_not_seen() {
        let mut t = IcaoTable::new();
        let slot = t.insert_with_ca(0x5A5A5A);
        assert!(!t.is_alive(slot));
        t.mark_as_seen(slot);
        assert!(t.is_alive(slot));
        assert!(!t.is_trusted(slot));
    }

    #[test]
    fn ttl_expires_after_silence() {
        let mut t = IcaoTable::new();
        let key = (5 << 24) | 0xABCDEF;
        let slot = t.insert_with_ca(key);
        t.mark_as_seen(slot);

        advance_seconds(&mut t, TTL_NOT_TRUSTED as u32 - 1);
        assert!(t.is_alive(slot));

        advance_seconds(&mut t, 1);
        // cleared entirely, not just dead
        assert_eq!(t.find_with_ca(key), None);
    }

    #[test]
    fn ttl_is_monotonic_without_sightings() {
        let mut t = IcaoTable::new();
        let slot = t.insert_with_ca((5 << 24) | 0xABCDEF);
        t.mark_as_seen(slot);
        let mut was_alive = true;
        for _ in 0..TTL_NOT_TRUSTED + 2 {
            let alive = t.is_alive(slot);
            assert!(was_alive || !alive, "entry came back to life");
            was_alive = alive;
            advance_seconds(&mut t, 1);
        }
        assert!(!t.is_alive(slot));
    }

    #[test]
    fn trust_outlives_the_untrusted_ttl_only_with_sightings() {
        let mut t = IcaoTable::new();
        let key = (5 << 24) | 0x123456;
        let slot = t.insert_with_ca(key);
        t.mark_as_trusted_seen(slot);
        assert!(t.is_trusted(slot));

        // keep it alive with plain sightings; trust decays on its own
        for _ in 0..TTL_TRUSTED {
            advance_seconds(&mut t, 1);
            t.mark_as_seen(slot);
        }
        assert!(t.is_alive(slot));
        assert!(!t.is_trusted(slot));

        // a fresh trusted sighting restores it
        t.mark_as_trusted_seen(slot);
        assert!(t.is_trusted(slot));
    }

    #[test]
    fn altitude_window_and_strikes() {
        let mut t = IcaoTable::new();
        let slot = t.insert_with_ca((5 << 24) | 0x123456);
        t.mark_as_seen(slot);

        let ft35000 = units_to_ac13((35_000 + 1_000) / 25);
        let ft35025 = units_to_ac13((35_025 + 1_000) / 25);
        let ft70000 = units_to_ac13(((70_000u32 + 1_000) / 25) as u16);

        assert!(t.check_altitude(slot, ft35000));
        assert!(t.check_altitude(slot, ft35025));
        // implausible jump: first strike
        assert!(!t.check_altitude(slot, ft70000));
        // second strike resets the record ...
        assert!(!t.check_altitude(slot, ft70000));
        // ... so the next value is accepted fresh
        assert!(t.check_altitude(slot, ft70000));
    }

    #[test]
    fn metric_altitude_rejected() {
        let mut t = IcaoTable::new();
        let slot = t.insert_with_ca((5 << 24) | 0x123456);
        assert_eq!(ac13_units(0x0040), None);
        assert!(!t.check_altitude(slot, 0x0040));
    }

    #[test]
    fn squawk_is_exact() {
        let mut t = IcaoTable::new();
        let slot = t.insert_with_ca((5 << 24) | 0x123456);

        assert!(t.check_squawk(slot, 0x0AF5));
        assert!(t.check_squawk(slot, 0x0AF5));
        assert!(!t.check_squawk(slot, 0x0AF4));
        assert!(!t.check_squawk(slot, 0x0AF4));
        // record reset after two strikes
        assert!(t.check_squawk(slot, 0x0AF4));
    }

    #[test]
    fn ac13_unit_decoding() {
        // 25 ft steps: N = (alt + 1000) / 25
        let n = (35_000u16 + 1_000) / 25;
        assert_eq!(ac13_units(units_to_ac13(n)), Some(n));
        // neighbouring codes differ by one unit
        assert_eq!(ac13_units(units_to_ac13(n + 1)), Some(n + 1));
    }
}
