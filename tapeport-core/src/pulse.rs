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

// The line waveforms the tape routines in ROM produce for a single bit,
// as measured from the real machine.  Replaying a recovered byte stream
// means walking one of these step lists per bit.
//
// Low speed frames every bit with a clock pulse; a one carries a second
// pulse mid-cell, a zero stays quiet.  High speed is frequency keyed
// instead, a wide pulse pair for zero and a narrow one for one, and the
// line rests high between bits rather than low.

/// One step of a bit's waveform: wait `delta_us`, then drive the line
/// to `next` (0 neutral, 1 high, 2 low).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PulseStep {
    pub delta_us: u32,
    pub next:     u8,
}

const fn step(delta_us: u32, next: u8) -> PulseStep {
    PulseStep { delta_us: delta_us, next: next }
}

static LOW_SPEED_ZERO: [PulseStep; 4] = [
    step(0,    1),
    step(128,  2),
    step(128,  0),
    step(1750, 0),
];

static LOW_SPEED_ONE: [PulseStep; 7] = [
    step(0,   1),
    step(128, 2),
    step(128, 0),
    step(747, 1),
    step(128, 2),
    step(128, 0),
    step(747, 0),
];

static HIGH_SPEED_ZERO: [PulseStep; 3] = [
    step(0,   1),
    step(376, 2),
    step(376, 1),
];

static HIGH_SPEED_ONE: [PulseStep; 3] = [
    step(0,   1),
    step(188, 2),
    step(188, 1),
];

pub fn shape(high_speed: bool, bit: bool) -> &'static [PulseStep] {
    match (high_speed, bit) {
        (false, false) => &LOW_SPEED_ZERO,
        (false, true)  => &LOW_SPEED_ONE,
        (true,  false) => &HIGH_SPEED_ZERO,
        (true,  true)  => &HIGH_SPEED_ONE,
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    fn duration(steps: &[PulseStep]) -> u32 {
        steps.iter().map(|s| s.delta_us).sum()
    }

    #[test]
    fn low_speed_cells_have_equal_length() {
        // 500 baud only works if zero and one cells take the same time.
        assert_eq!(duration(shape(false, false)), duration(shape(false, true)));
        assert_eq!(duration(shape(false, false)), 2006);
    }

    #[test]
    fn high_speed_one_is_the_narrow_pulse() {
        assert_eq!(duration(shape(true, true)), 376);
        assert_eq!(duration(shape(true, false)), 752);
    }

    #[test]
    fn every_shape_starts_with_an_immediate_rise() {
        for &(speed, bit) in &[(false, false), (false, true), (true, false), (true, true)] {
            let first = shape(speed, bit)[0];
            assert_eq!(first.delta_us, 0);
            assert_eq!(first.next, 1);
        }
    }
}
