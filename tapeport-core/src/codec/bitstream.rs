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

// The plain byte-stream image format: just the data bytes the ROM
// routines would have recovered, MSB first, nothing else.
//
// Writing one means demodulating the line on the fly.  A small state
// machine watches the transitions the program produces and decides, per
// bit cell, whether the mid-cell data pulse showed up (low speed) or
// whether the pulse pair was narrow or wide (high speed).  Reading one
// replays each bit through the measured pulse-shape tables.

use std::fs;
use std::io::{Read, Seek, Write};
use std::io;

use crate::codec::{DecodeContext, TransitionCodec, WriteOp};
use crate::error::CassetteError;
use crate::pulse;
use crate::roundoff::Roundoff;

// A pulse later than this after the low-speed clock is the next clock
// (bit was 0); earlier is the data pulse (bit was 1).
const LOW_SPEED_THRESHOLD_US:  f64 = 1250.0;

// High speed is frequency keyed; a fall this soon after the rise is
// the narrow (one) pulse.
const HIGH_SPEED_THRESHOLD_US: f64 = 282.0;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Recognizer {
    Initial,
    GotClock,
    GotData,
    High,
}

// Reading a byte past the end of the image yields exactly one
// all-zero synthetic byte before the tape ends; images written by
// some other emulators lack their final byte and won't load without
// it.  `PAST_END` both supplies the zero bits and marks that the
// workaround has been spent.
const PAST_END: u16 = 0x100;

pub struct BitstreamCodec {
    file: fs::File,

    // Demodulator (write side).
    recognizer: Recognizer,
    out_byte:   u8,
    out_bit:    i32,

    // Replay (read side).
    in_byte:     u16,
    in_bit:      i32,
    pulse_state: usize,
}

impl BitstreamCodec {
    /// The file is already positioned by the session.
    pub fn new(file: fs::File) -> BitstreamCodec {
        BitstreamCodec {
            file:        file,
            recognizer:  Recognizer::Initial,
            out_byte:    0,
            out_bit:     0,
            in_byte:     0,
            in_bit:      0,
            pulse_state: 0,
        }
    }

    fn take_bit(&mut self, bit: u8) -> Result<(), CassetteError> {
        self.out_bit -= 1;
        if self.out_bit < 0 {
            self.out_bit = 7;
        }
        self.out_byte |= bit << self.out_bit;
        if self.out_bit == 0 {
            self.file.write_all(&[self.out_byte])?;
            self.out_byte = 0;
        }
        Ok(())
    }
}

impl TransitionCodec for BitstreamCodec {
    fn encode(&mut self, op: WriteOp, current: u8, delta_us: f64,
              roundoff: &mut Roundoff) -> Result<(), CassetteError> {
        let value = match op {
            WriteOp::Transition(value) => value,
            WriteOp::Flush => {
                // Emit a partial byte as-is, zero-padded at the bottom.
                if self.out_bit != 0 {
                    self.file.write_all(&[self.out_byte])?;
                    self.out_byte = 0;
                }
                return Ok(());
            },
        };

        // Peek at the corrected delta; the recognizer quantizes to
        // bits, not to time, so nothing is committed back.
        let ddelta_us = roundoff.corrected(delta_us);

        let mut bit = None;
        match self.recognizer {
            Recognizer::Initial => {
                if current == 2 && value == 0 {
                    // Low speed, end of first pulse.  Assume clock.
                    self.recognizer = Recognizer::GotClock;
                } else if current == 2 && value == 1 {
                    // High speed, nothing interesting yet.
                    self.recognizer = Recognizer::High;
                }
            },
            Recognizer::GotClock => {
                if current == 0 && value == 1 {
                    if ddelta_us > LOW_SPEED_THRESHOLD_US {
                        // The next clock; the cell had no data pulse.
                        bit = Some(0);
                        self.recognizer = Recognizer::Initial;
                    } else {
                        // The data pulse; skip its falling edge.
                        bit = Some(1);
                        self.recognizer = Recognizer::GotData;
                    }
                }
            },
            Recognizer::GotData => {
                if current == 2 && value == 0 {
                    // Data pulse over; watch for the end of the next
                    // clock.
                    self.recognizer = Recognizer::Initial;
                }
            },
            Recognizer::High => {
                if current == 1 && value == 2 {
                    bit = Some((ddelta_us < HIGH_SPEED_THRESHOLD_US) as u8);
                }
            },
        }

        if let Some(bit) = bit {
            self.take_bit(bit)?;
        }
        Ok(())
    }

    fn decode(&mut self, ctx: &mut DecodeContext)
              -> Result<Option<(u8, f64)>, CassetteError> {
        if self.pulse_state == 0 {
            self.in_bit -= 1;
        }
        if self.in_bit < 0 {
            let mut byte = [0u8; 1];
            self.in_byte = match self.file.read(&mut byte)? {
                0 => {
                    if self.in_byte == PAST_END {
                        return Ok(None);
                    }
                    PAST_END
                },
                _ => byte[0] as u16,
            };
            self.in_bit = 7;
        }
        let bit = (self.in_byte >> self.in_bit) & 1 != 0;

        let steps = pulse::shape(ctx.high_speed, bit);
        let step  = steps[self.pulse_state];

        self.pulse_state += 1;
        if self.pulse_state == steps.len() {
            self.pulse_state = 0;
        }

        Ok(Some((step.next, step.delta_us as f64)))
    }

    fn close(&mut self) -> Result<u64, CassetteError> {
        self.file.flush()?;
        let position = self.file.seek(io::SeekFrom::Current(0))?;
        Ok(position)
    }
}
