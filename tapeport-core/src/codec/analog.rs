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

// Conversion between line values and unsigned 8-bit PCM, shared by the
// wave-file codec and the live audio codec.

use crate::codec::DecodeContext;
use crate::error::CassetteError;

// Line value to amplitude.  Value 3 is electrically close to the
// neutral level; the out-of-range flush sentinel maps to neutral too,
// through the lookup fallback.
pub static VALUE_TO_SAMPLE: [u8; 4] = [127, 254, 0, 127];

pub fn period_us(sample_rate: u32) -> f64 {
    1_000_000.0 / sample_rate as f64
}

/// How many samples to emit for a (corrected) delta.  Never zero; a
/// transition that rounds away entirely would silently vanish from the
/// recording.
pub fn samples_for(ddelta_us: f64, period_us: f64) -> u64 {
    let nsamples = (ddelta_us / period_us + 0.5) as u64;
    if nsamples == 0 {
        1
    } else {
        nsamples
    }
}

/// Pull samples until the line value changes, a hundredth of a second
/// passes, or an operator reset comes in; report the new value and the
/// time scanned.  `None` from `read_sample` is the end of the tape and
/// ends the scan even mid-pulse.
pub fn scan_transition<F>(mut read_sample: F, sample_rate: u32,
                          ctx: &mut DecodeContext)
                          -> Result<Option<(u8, f64)>, CassetteError>
where F: FnMut() -> Result<Option<u8>, CassetteError>
{
    let mut remaining = sample_rate as u64 / 100;
    let mut nsamples  = 0u64;

    let next;
    loop {
        let sample = match read_sample()? {
            Some(sample) => sample,
            None         => return Ok(None),
        };
        let value = ctx.noise.classify(sample, ctx.high_speed);
        nsamples += 1;

        // The reset button must work during a long leader.
        if ctx.timebase.nmi_pending() {
            next = value;
            break;
        }
        if value != ctx.current || remaining == 0 {
            next = value;
            break;
        }
        remaining -= 1;
    }

    Ok(Some((next, nsamples as f64 * period_us(sample_rate))))
}
