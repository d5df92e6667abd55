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

// Transition log in plain text, one `<value> <delta_us>` line per
// transition.  Useless for loading programs, indispensable for staring
// at what a tape routine actually put on the wire.

use std::fs;
use std::io::{Read, Seek, Write};
use std::io;

use log::warn;

use crate::codec::{DecodeContext, TransitionCodec, WriteOp};
use crate::error::CassetteError;
use crate::roundoff::Roundoff;

pub struct DebugTextCodec {
    file: fs::File,
}

impl DebugTextCodec {
    /// The file is already positioned by the session.
    pub fn new(file: fs::File) -> DebugTextCodec {
        DebugTextCodec { file: file }
    }

    // Byte-at-a-time line read, so the underlying file offset is the
    // exact resume position after every line.  Buffered readers would
    // wind the tape past where we've looked.
    fn read_line(&mut self) -> Result<Option<String>, CassetteError> {
        let mut line = String::new();
        let mut byte = [0u8; 1];

        loop {
            match self.file.read(&mut byte)? {
                0 => {
                    if line.is_empty() {
                        return Ok(None);
                    }
                    return Ok(Some(line));
                },
                _ => {
                    if byte[0] == b'\n' {
                        return Ok(Some(line));
                    }
                    line.push(byte[0] as char);
                },
            }
        }
    }
}

impl TransitionCodec for DebugTextCodec {
    fn encode(&mut self, op: WriteOp, current: u8, delta_us: f64,
              roundoff: &mut Roundoff) -> Result<(), CassetteError> {
        // A flush logs the time spent at the final value.
        let value = match op {
            WriteOp::Transition(value) => value,
            WriteOp::Flush             => current,
        };
        let delta_us = roundoff.round(delta_us);
        writeln!(self.file, "{} {}", value, delta_us)?;
        Ok(())
    }

    fn decode(&mut self, _ctx: &mut DecodeContext)
              -> Result<Option<(u8, f64)>, CassetteError> {
        let line = match self.read_line()? {
            Some(line) => line,
            None       => return Ok(None),
        };

        let mut fields = line.split_whitespace();
        let parsed = (|| {
            let value    = fields.next()?.parse::<u8>().ok()?;
            let delta_us = fields.next()?.parse::<u64>().ok()?;
            Some((value, delta_us as f64))
        })();

        match parsed {
            Some(transition) => Ok(Some(transition)),
            None => {
                // Treat garbage like the end of the recording, the way
                // a failed text scan always has.
                warn!("Unparsable transition log line `{}', stopping.", line);
                Ok(None)
            },
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

    use crate::noise::NoiseFloor;
    use crate::timing::EventQueue;

    #[test]
    fn logged_transitions_read_back() {
        let file = tempfile::tempfile().unwrap();
        let mut codec = DebugTextCodec::new(file.try_clone().unwrap());
        let mut roundoff = Roundoff::new();

        codec.encode(WriteOp::Transition(1), 0, 188.0, &mut roundoff).unwrap();
        codec.encode(WriteOp::Transition(2), 1, 188.4, &mut roundoff).unwrap();
        codec.encode(WriteOp::Flush, 2, 1000.0, &mut roundoff).unwrap();
        codec.close().unwrap();

        let mut file = file;
        file.seek(SeekFrom::Start(0)).unwrap();
        let mut codec = DebugTextCodec::new(file);

        let mut noise = NoiseFloor::new();
        let queue = EventQueue::new();
        let mut ctx = DecodeContext {
            current:    0,
            high_speed: false,
            noise:      &mut noise,
            timebase:   &queue,
        };

        assert_eq!(codec.decode(&mut ctx).unwrap(), Some((1, 188.0)));
        assert_eq!(codec.decode(&mut ctx).unwrap(), Some((2, 188.0)));

        // The flush logged the tail end as one more record at the
        // final value.
        assert_eq!(codec.decode(&mut ctx).unwrap(), Some((2, 1000.0)));
        assert_eq!(codec.decode(&mut ctx).unwrap(), None);
    }

    #[test]
    fn close_reports_the_read_position() {
        let mut file = tempfile::tempfile().unwrap();
        file.write_all(b"1 100\n2 200\n").unwrap();
        file.seek(SeekFrom::Start(0)).unwrap();

        let mut codec = DebugTextCodec::new(file);
        let mut noise = NoiseFloor::new();
        let queue = EventQueue::new();
        let mut ctx = DecodeContext {
            current:    0,
            high_speed: false,
            noise:      &mut noise,
            timebase:   &queue,
        };

        codec.decode(&mut ctx).unwrap();
        assert_eq!(codec.close().unwrap(), 6);
    }

    #[test]
    fn garbage_ends_the_tape() {
        let mut file = tempfile::tempfile().unwrap();
        file.write_all(b"over the rainbow\n1 100\n").unwrap();
        file.seek(SeekFrom::Start(0)).unwrap();

        let mut codec = DebugTextCodec::new(file);
        let mut noise = NoiseFloor::new();
        let queue = EventQueue::new();
        let mut ctx = DecodeContext {
            current:    0,
            high_speed: false,
            noise:      &mut noise,
            timebase:   &queue,
        };

        assert_eq!(codec.decode(&mut ctx).unwrap(), None);
    }
}
