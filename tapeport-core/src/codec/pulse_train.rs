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

// The compact pulse-train format: exact transition timing with none of
// the bulk of a PCM recording.  Each transition is normally one 16-bit
// little-endian word, the delta in the upper 14 bits and the new line
// value in the lower 2.  Deltas too big for 14 bits (gaps between
// recordings, mostly) use an escape word of 0xFFFF followed by one
// value byte and a 32-bit little-endian delta.

use std::fs;
use std::io::{Read, Seek, Write};
use std::io;

use crate::codec::{DecodeContext, TransitionCodec, WriteOp};
use crate::error::CassetteError;
use crate::roundoff::Roundoff;

const ESCAPE:    u16 = 0xFFFF;
const MAX_PACKED: u64 = 0x3FFF;

pub struct PulseTrainCodec {
    file: fs::File,
}

impl PulseTrainCodec {
    /// The file is already positioned by the session.
    pub fn new(file: fs::File) -> PulseTrainCodec {
        PulseTrainCodec { file: file }
    }

    // EOF mid-record means a truncated image; the tape simply ends.
    fn read_bytes(&mut self, buffer: &mut [u8]) -> Result<bool, CassetteError> {
        let mut filled = 0;
        while filled < buffer.len() {
            let count = self.file.read(&mut buffer[filled..])?;
            if count == 0 {
                return Ok(false);
            }
            filled += count;
        }
        Ok(true)
    }
}

impl TransitionCodec for PulseTrainCodec {
    fn encode(&mut self, op: WriteOp, current: u8, delta_us: f64,
              roundoff: &mut Roundoff) -> Result<(), CassetteError> {
        // A flush records the time spent at the final value.
        let value = match op {
            WriteOp::Transition(value) => value,
            WriteOp::Flush             => current,
        };
        let delta_us = roundoff.round(delta_us);

        if delta_us < MAX_PACKED {
            let word = ((delta_us as u16) << 2) | (value as u16);
            self.file.write_all(&word.to_le_bytes())?;
        } else {
            self.file.write_all(&ESCAPE.to_le_bytes())?;
            self.file.write_all(&[value])?;
            self.file.write_all(&(delta_us as u32).to_le_bytes())?;
        }
        Ok(())
    }

    fn decode(&mut self, _ctx: &mut DecodeContext)
              -> Result<Option<(u8, f64)>, CassetteError> {
        let mut word = [0u8; 2];
        if !self.read_bytes(&mut word)? {
            return Ok(None);
        }
        let word = u16::from_le_bytes(word);

        if word == ESCAPE {
            let mut value = [0u8; 1];
            let mut delta = [0u8; 4];
            if !self.read_bytes(&mut value)? || !self.read_bytes(&mut delta)? {
                return Ok(None);
            }
            let delta_us = u32::from_le_bytes(delta);
            Ok(Some((value[0], delta_us as f64)))
        } else {
            let value    = (word & 0x03) as u8;
            let delta_us = word >> 2;
            Ok(Some((value, delta_us as f64)))
        }
    }

    fn close(&mut self) -> Result<u64, CassetteError> {
        self.file.flush()?;
        let position = self.file.seek(io::SeekFrom::Current(0))?;
        Ok(position)
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    use std::io::SeekFrom;

    use proptest::prelude::*;

    use crate::noise::NoiseFloor;
    use crate::timing::EventQueue;

    fn encode_all(transitions: &[(u8, u64)]) -> fs::File {
        let file = tempfile::tempfile().unwrap();
        let mut codec = PulseTrainCodec::new(file.try_clone().unwrap());
        let mut roundoff = Roundoff::new();

        for &(value, delta_us) in transitions {
            codec.encode(WriteOp::Transition(value), 0, delta_us as f64,
                         &mut roundoff).unwrap();
        }
        codec.close().unwrap();

        let mut file = file;
        file.seek(SeekFrom::Start(0)).unwrap();
        file
    }

    fn decode_all(file: fs::File) -> Vec<(u8, u64)> {
        let mut codec = PulseTrainCodec::new(file);
        let mut noise = NoiseFloor::new();
        let queue = EventQueue::new();
        let mut ctx = DecodeContext {
            current:    0,
            high_speed: false,
            noise:      &mut noise,
            timebase:   &queue,
        };

        let mut transitions = Vec::new();
        while let Some((value, delta_us)) = codec.decode(&mut ctx).unwrap() {
            transitions.push((value, delta_us as u64));
        }
        transitions
    }

    #[test]
    fn packed_and_escaped_records_have_the_expected_bytes() {
        let mut file = encode_all(&[(1, 188), (2, 0x3FFF)]);

        let mut bytes = Vec::new();
        file.read_to_end(&mut bytes).unwrap();

        // 188 << 2 | 1 = 0x02F1 packed; 0x3FFF needs the escape.
        assert_eq!(bytes,
                   vec![0xF1, 0x02,
                        0xFF, 0xFF, 0x02, 0xFF, 0x3F, 0x00, 0x00]);
    }

    #[test]
    fn largest_packable_delta_stays_packed() {
        let mut file = encode_all(&[(0, 0x3FFE)]);

        let mut bytes = Vec::new();
        file.read_to_end(&mut bytes).unwrap();
        assert_eq!(bytes.len(), 2);
    }

    #[test]
    fn truncated_record_ends_the_tape() {
        let mut file = tempfile::tempfile().unwrap();
        file.write_all(&[0xFF, 0xFF, 0x01]).unwrap();
        file.seek(SeekFrom::Start(0)).unwrap();

        assert_eq!(decode_all(file), vec![]);
    }

    proptest! {
        #[test]
        fn transitions_round_trip(
            transitions in proptest::collection::vec(
                (0u8..=2, prop_oneof![1u64..0x3FFF,
                                      0x3FFF..5_000_000u64]),
                1..100)
        ) {
            let file = encode_all(&transitions);
            prop_assert_eq!(decode_all(file), transitions);
        }
    }
}
