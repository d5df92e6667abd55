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

// Recordings of real tapes arrive at wildly different levels, and the
// hiss between pulses mustn't read as signal.  The estimator tracks a
// slow average of the deviation from the midline together with a peak
// envelope (fast attack, slow decay), and puts the decision threshold
// halfway between the two.  It's a heuristic, not signal processing
// theory, but it has digested decades of dusty tapes.

/// Threshold seed at motor-on, conservative until the estimator has
/// seen some signal.
pub const NOISE_FLOOR: i32 = 64;

#[derive(Clone, Copy, Debug)]
pub struct NoiseFloor {
    avg:   f32,
    env:   f32,
    floor: i32,
}

impl NoiseFloor {
    pub fn new() -> NoiseFloor {
        NoiseFloor {
            avg:   NOISE_FLOOR as f32,
            env:   127.0,
            floor: NOISE_FLOOR,
        }
    }

    pub fn reset(&mut self) {
        *self = NoiseFloor::new();
    }

    pub fn floor(&self) -> i32 {
        self.floor
    }

    /// Classify one unsigned 8-bit sample against the current threshold
    /// (above the midline by more than the floor is HIGH, at or below it
    /// by the floor is LOW, anything else is neutral), then adapt the
    /// threshold for the next sample.
    ///
    /// High-speed recordings are assumed to be machine-generated and
    /// clean; the threshold is pinned low so narrow pulses aren't eaten.
    pub fn classify(&mut self, sample: u8, high_speed: bool) -> u8 {
        let level = sample as i32;
        let value = if level > 127 + self.floor {
            1
        } else if level <= 127 - self.floor {
            2
        } else {
            0
        };

        if high_speed {
            self.floor = 2;
        } else {
            let dev = (level - 127).abs() as f32;

            if dev > 1.0 {
                self.avg = (99.0 * self.avg + dev) / 100.0;
            }
            if dev > self.env {
                self.env = (self.env + 9.0 * dev) / 10.0;
            } else if dev > 10.0 {
                self.env = (99.0 * self.env + dev) / 100.0;
            }
            self.floor = ((self.avg + self.env) / 2.0) as i32;
        }

        value
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seed_threshold_is_conservative() {
        let mut noise = NoiseFloor::new();

        assert_eq!(noise.classify(192, false), 1);

        noise.reset();
        assert_eq!(noise.classify(191, false), 0);

        noise.reset();
        assert_eq!(noise.classify(63, false), 2);

        noise.reset();
        assert_eq!(noise.classify(64, false), 0);
    }

    #[test]
    fn high_speed_pins_the_floor() {
        let mut noise = NoiseFloor::new();

        // The seed floor still applies to the first sample.
        assert_eq!(noise.classify(140, true), 0);
        assert_eq!(noise.floor(), 2);

        assert_eq!(noise.classify(130, true), 1);
        assert_eq!(noise.classify(125, true), 2);
        assert_eq!(noise.classify(127, true), 0);
    }

    #[test]
    fn adapts_to_a_weak_recording() {
        let mut noise = NoiseFloor::new();

        // A quiet tape the seed threshold would reject outright.
        for _ in 0..1000 {
            noise.classify(150, false);
            noise.classify(104, false);
        }
        let floor = noise.floor();
        assert!(floor < 33, "floor didn't come down: {}", floor);
        assert!(floor > 10, "floor collapsed into the hiss: {}", floor);

        assert_eq!(noise.classify(165, false), 1);
        assert_eq!(noise.classify(95, false), 2);
    }

    #[test]
    fn hiss_stays_neutral_after_adaptation() {
        let mut noise = NoiseFloor::new();

        for _ in 0..1000 {
            noise.classify(150, false);
            noise.classify(104, false);
        }
        for sample in 120..=134 {
            assert_eq!(noise.classify(sample, false), 0, "sample {}", sample);
        }
    }
}
