//! Optional IQ conditioning ahead of the magnitude computation
//!
//! Three stages in fixed order: single-pole DC removal, alternating sign
//! flip (recentres a half-rate spur), and an IQ FIR low-pass with either a
//! built-in tap set per input rate or taps loaded from a file. When no
//! filtering is requested the pipeline is a bypass and samples go straight
//! to the magnitude.

use crate::config::SampleRate;

/// Single-pole high-pass on both components.
pub struct DcRemoval {
    alpha: f32,
    avg_i: f32,
    avg_q: f32,
}

impl DcRemoval {
    pub fn new() -> Self {
        DcRemoval { alpha: 0.005, avg_i: 0.0, avg_q: 0.0 }
    }

    #[inline]
    fn apply(&mut self, i: f32, q: f32) -> (f32, f32) {
        let di = i - self.avg_i;
        let dq = q - self.avg_q;
        self.avg_i += di * self.alpha;
        self.avg_q += dq * self.alpha;
        (di, dq)
    }
}

/// Negate every second pair.
pub struct FlipSigns {
    flip: bool,
}

impl FlipSigns {
    pub fn new() -> Self {
        FlipSigns { flip: false }
    }

    #[inline]
    fn apply(&mut self, i: f32, q: f32) -> (f32, f32) {
        let flip = self.flip;
        self.flip = !flip;
        if flip {
            (-i, -q)
        } else {
            (i, q)
        }
    }
}

/// FIR low-pass applied to I and Q independently.
pub struct FirFilter {
    taps: Vec<f32>,
    hist_i: Vec<f32>,
    hist_q: Vec<f32>,
    pos: usize,
}

impl FirFilter {
    pub fn new(taps: Vec<f32>) -> Self {
        assert!(!taps.is_empty());
        let n = taps.len();
        FirFilter { taps, hist_i: vec![0.0; n], hist_q: vec![0.0; n], pos: 0 }
    }

    /// Built-in taps for the input rate; a 1-tap identity where no filter
    /// has been designed.
    pub fn builtin(rate: SampleRate) -> Self {
        FirFilter::new(builtin_taps(rate).to_vec())
    }

    #[inline]
    fn apply(&mut self, i: f32, q: f32) -> (f32, f32) {
        let n = self.taps.len();
        self.hist_i[self.pos] = i;
        self.hist_q[self.pos] = q;

        let mut acc_i = 0.0;
        let mut acc_q = 0.0;
        let mut idx = self.pos;
        for &tap in &self.taps {
            acc_i += tap * self.hist_i[idx];
            acc_q += tap * self.hist_q[idx];
            idx = if idx == 0 { n - 1 } else { idx - 1 };
        }

        self.pos = (self.pos + 1) % n;
        (acc_i, acc_q)
    }
}

fn builtin_taps(rate: SampleRate) -> &'static [f32] {
    match rate {
        SampleRate::R6_0 => &TAPS_6_MHZ,
        SampleRate::R10_0 => &TAPS_10_MHZ,
        _ => &[1.0],
    }
}

// best_filter_6M_1
static TAPS_6_MHZ: [f32; 31] = [
    0.04691808, -0.02944228, 0.02481813, 0.00687245, -0.03778376, -0.05536104, -0.03637546,
    -0.06929483, 0.04111258, -0.0142561, -0.05956734, -0.00396889, -0.04647978, -0.06260861,
    0.38121662, 0.8284003, 0.38121662, -0.06260861, -0.04647978, -0.00396889, -0.05956734,
    -0.0142561, 0.04111258, -0.06929483, -0.03637546, -0.05536104, -0.03778376, 0.00687245,
    0.02481813, -0.02944228, 0.04691808,
];

// best_filter_10M_2
static TAPS_10_MHZ: [f32; 31] = [
    0.00055077, -0.01847956, 0.00234699, -0.01789507, 0.00318175, 0.05594195, 0.01237755,
    -0.06771679, 0.05199363, -0.02546499, 0.16795284, -0.07870515, -0.16818146, 0.2712337,
    0.2018848, 0.21795812, 0.2018848, 0.2712337, -0.16818146, -0.07870515, 0.16795284,
    -0.02546499, 0.05199363, -0.06771679, 0.01237755, 0.05594195, 0.00318175, -0.01789507,
    0.00234699, -0.01847956, 0.00055077,
];

/// Stage chain run on each IQ pair when filtering is enabled.
pub struct FilterChain {
    dc: DcRemoval,
    flip: FlipSigns,
    fir: FirFilter,
}

impl FilterChain {
    pub fn new(fir: FirFilter) -> Self {
        FilterChain { dc: DcRemoval::new(), flip: FlipSigns::new(), fir }
    }

    #[inline]
    pub fn apply(&mut self, i: f32, q: f32) -> (f32, f32) {
        let (i, q) = self.dc.apply(i, q);
        let (i, q) = self.flip.apply(i, q);
        self.fir.apply(i, q)
    }
}

/// What happens to IQ pairs before the magnitude.
pub enum IqPipeline {
    Bypass,
    Filtered(Box<FilterChain>),
}

impl IqPipeline {
    /// Build from the command-line selection: custom taps beat the built-in
    /// filter, no selection means bypass.
    pub fn from_options(iq_filter: bool, taps: Option<Vec<f32>>, rate: SampleRate) -> IqPipeline {
        match taps {
            Some(taps) => IqPipeline::Filtered(Box::new(FilterChain::new(FirFilter::new(taps)))),
            None if iq_filter => {
                IqPipeline::Filtered(Box::new(FilterChain::new(FirFilter::builtin(rate))))
            }
            None => IqPipeline::Bypass,
        }
    }

    pub fn describe(&self) -> &'static str {
        match self {
            IqPipeline::Bypass => "bypass",
            IqPipeline::Filtered(_) => "dc-removal + sign-flip + fir",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dc_removal_converges_on_constant_input() {
        let mut dc = DcRemoval::new();
        let mut out = (0.0, 0.0);
        for _ in 0..5000 {
            out = dc.apply(1.0, -0.5);
        }
        assert!(out.0.abs() < 1e-3);
        assert!(out.1.abs() < 1e-3);
    }

    #[test]
    fn sign_flip_alternates() {
        let mut flip = FlipSigns::new();
        assert_eq!(flip.apply(1.0, 2.0), (1.0, 2.0));
        assert_eq!(flip.apply(1.0, 2.0), (-1.0, -2.0));
        assert_eq!(flip.apply(1.0, 2.0), (1.0, 2.0));
    }

    #[test]
    fn identity_fir_passes_through() {
        let mut fir = FirFilter::new(vec![1.0]);
        assert_eq!(fir.apply(0.25, -0.75), (0.25, -0.75));
        assert_eq!(fir.apply(0.5, 0.5), (0.5, 0.5));
    }

    #[test]
    fn fir_convolves_history() {
        // moving average of the last two samples
        let mut fir = FirFilter::new(vec![0.5, 0.5]);
        assert_eq!(fir.apply(1.0, 0.0), (0.5, 0.0));
        assert_eq!(fir.apply(1.0, 2.0), (1.0, 1.0));
        assert_eq!(fir.apply(3.0, 2.0), (2.0, 2.0));
    }

    #[test]
    fn builtin_taps_are_unity_gain_at_dc() {
        for taps in [&TAPS_6_MHZ[..], &TAPS_10_MHZ[..]] {
            let sum: f32 = taps.iter().sum();
            assert!((sum - 1.0).abs() < 0.15, "sum = {sum}");
        }
    }
}
