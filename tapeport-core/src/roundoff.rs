// Copyright (c) 2024, 2025 The tapeport developers
//
// Permission to use, copy, modify, and distribute this software for any
// purpose with or without fee is hereby granted, provided that the above
// copyright notice and this permission notice appear in all copies.
//
// THE SOFTWARE IS PROVIDED "AS IS" AND THE AUTHOR DISCLAIMS ALL WARRANTIES
// WITH REGARD TO THIS SOFTWARE INCLUDING ALL IMPLIED WARRANTIES OF
// MERCHANTABILITY AND FITNESS. IN NO EVENT SHALL THE AUTHOR BE LIABLE FOR
// ANY SPECIAL, DIRECT, INDIRECT, OR CONSEQUENTIAL DAMAGES OR ANY DAMAGES
// WHATSOEVER RESULTING FROM LOSS OF USE, DATA OR PROFITS, WHETHER IN AN
// ACTION OF CONTRACT, NEGLIGENCE OR OTHER TORTIOUS ACTION, ARISING OUT OF
// OR IN CONNECTION WITH THE USE OR PERFORMANCE OF THIS SOFTWARE.
//

// Tape timing is continuous; ticks and PCM samples are not.  Rounding
// each transition independently would let the quantization error drift
// without bound (at 11025Hz a 13.33us pulse is 0.147 samples; a long
// leader is thousands of them).  The accumulator carries the running
// error so each rounded value is pulled back toward the ideal waveform.
//
// The engine keeps one accumulator per direction, since a read and a
// write session never share a timeline.

#[derive(Clone, Copy, Debug)]
pub struct Roundoff {
    error: f64,
}

impl Roundoff {
    pub fn new() -> Roundoff {
        Roundoff { error: 0.0 }
    }

    /// Round `raw` to a whole number of units, remembering the error.
    /// Each result is within one unit of the ideal value, and the errors
    /// cancel over a run instead of accumulating.
    pub fn round(&mut self, raw: f64) -> u64 {
        let ideal = raw - self.error;
        let chosen = if ideal <= 0.0 {
            0
        } else {
            (ideal + 0.5).floor() as u64
        };
        self.error = chosen as f64 - ideal;

        chosen
    }

    /// The error-corrected value, for callers that quantize in units
    /// other than the one the error is carried in (the PCM codec rounds
    /// sample counts but carries its error in microseconds).  Such a
    /// caller follows up with `commit()`; plain inspection without a
    /// commit leaves the accumulator untouched.
    pub fn corrected(&self, raw: f64) -> f64 {
        raw - self.error
    }

    /// Record the quantization actually performed: `chosen` and `ideal`
    /// in the carried unit.
    pub fn commit(&mut self, chosen: f64, ideal: f64) {
        self.error = chosen - ideal;
    }

    /// Forget the accumulated error.  Done at motor-on and when a sound
    /// session truncates a long silence, where continuity with the
    /// previous timeline would be a lie.
    pub fn reset(&mut self) {
        self.error = 0.0;
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    use proptest::prelude::*;

    #[test]
    fn fractional_deltas_average_out() {
        let mut roundoff = Roundoff::new();

        let mut total: u64 = 0;
        for _ in 0..100_000 {
            let rounded = roundoff.round(13.33);
            assert!(rounded == 13 || rounded == 14);
            total += rounded;
        }

        let ideal = 100_000.0 * 13.33;
        assert!((total as f64 - ideal).abs() < 1.0);
    }

    #[test]
    fn negative_ideal_clamps_to_zero() {
        let mut roundoff = Roundoff::new();

        roundoff.commit(1.0, 0.2);
        assert_eq!(roundoff.round(0.3), 0);
    }

    #[test]
    fn reset_forgets_the_error() {
        let mut roundoff = Roundoff::new();

        roundoff.round(13.33);
        roundoff.reset();
        assert_eq!(roundoff.round(10.0), 10);
    }

    proptest! {
        #[test]
        fn error_stays_below_one_unit(
            deltas in proptest::collection::vec(0.1f64..20_000.0, 1..500)
        ) {
            let mut roundoff = Roundoff::new();

            let mut total_rounded = 0u64;
            let mut total_raw     = 0.0f64;
            for &delta in deltas.iter() {
                let rounded = roundoff.round(delta);
                prop_assert!((rounded as f64 - delta).abs() <= 1.0);

                total_rounded += rounded;
                total_raw     += delta;
            }

            // The running total never drifts more than half a unit off.
            prop_assert!((total_rounded as f64 - total_raw).abs() <= 0.5 + 1e-9);
        }
    }
}
