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

// Wave-file tape images: unsigned 8-bit mono PCM in a minimal RIFF
// wrapper.  The parser understands exactly as much RIFF as those three
// constraints need (plus an oversized `fmt ` chunk, which some encoders
// produce); anything fancier should be converted externally first.
//
// The header's size fields can only be filled in once the recording is
// done, so a write session remembers where they live and patches them
// at close.

use std::fs;
use std::io::{Read, Seek, Write};
use std::io;

use crate::codec::analog;
use crate::codec::{DecodeContext, TransitionCodec, WriteOp};
use crate::error::CassetteError;
use crate::roundoff::Roundoff;

const FORMAT_PCM: u16 = 1;
const CHANNELS_MONO: u16 = 1;
const BITS_PER_SAMPLE: u16 = 8;

// "RIFF" chunk size field, and the start of its payload.
const RIFF_SIZE_OFFSET: u64 = 4;
const RIFF_PAYLOAD_OFFSET: u64 = 8;

struct WavInfo {
    sample_rate:     u32,
    datasize_offset: u64,
    data_offset:     u64,
}

pub struct PcmCodec {
    file:            fs::File,
    writing:         bool,
    sample_rate:     u32,
    datasize_offset: u64,
    data_offset:     u64,
}

impl PcmCodec {
    /// Open an existing image for decoding.  `position` below the data
    /// payload is treated as a fully rewound tape.
    pub fn open_read(file: fs::File, position: u64)
                     -> Result<PcmCodec, CassetteError> {
        PcmCodec::open(file, position, false, None)
    }

    /// Open for recording.  An empty file gets a fresh header at
    /// `sample_rate`; an existing one keeps its own rate.
    pub fn open_write(file: fs::File, position: u64, sample_rate: u32)
                      -> Result<PcmCodec, CassetteError> {
        PcmCodec::open(file, position, true, Some(sample_rate))
    }

    fn open(mut file: fs::File, position: u64, writing: bool,
            create_rate: Option<u32>) -> Result<PcmCodec, CassetteError> {
        let empty = file.metadata()?.len() == 0;
        let info = match create_rate {
            Some(sample_rate) if empty => create_header(&mut file, sample_rate)?,
            _                          => parse_header(&mut file)?,
        };

        let position = if position < info.data_offset {
            info.data_offset
        } else {
            position
        };
        file.seek(io::SeekFrom::Start(position))?;

        Ok(PcmCodec {
            file:            file,
            writing:         writing,
            sample_rate:     info.sample_rate,
            datasize_offset: info.datasize_offset,
            data_offset:     info.data_offset,
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}

impl TransitionCodec for PcmCodec {
    fn encode(&mut self, op: WriteOp, current: u8, delta_us: f64,
              roundoff: &mut Roundoff) -> Result<(), CassetteError> {
        // The delta was spent at the old value, so that's the
        // amplitude to emit; a flush emits nothing else.
        let sample = analog::VALUE_TO_SAMPLE.get(current as usize)
                                            .cloned().unwrap_or(127);

        let period = analog::period_us(self.sample_rate);
        let ddelta_us = roundoff.corrected(delta_us);
        let nsamples = analog::samples_for(ddelta_us, period);
        roundoff.commit(nsamples as f64 * period, ddelta_us);

        self.file.write_all(&vec![sample; nsamples as usize])?;

        if let WriteOp::Flush = op {
            self.file.flush()?;
        }
        Ok(())
    }

    fn decode(&mut self, ctx: &mut DecodeContext)
              -> Result<Option<(u8, f64)>, CassetteError> {
        let file = &mut self.file;
        let sample_rate = self.sample_rate;

        analog::scan_transition(|| {
            let mut byte = [0u8; 1];
            match file.read(&mut byte)? {
                0 => Ok(None),
                _ => Ok(Some(byte[0])),
            }
        }, sample_rate, ctx)
    }

    fn close(&mut self) -> Result<u64, CassetteError> {
        self.file.flush()?;
        let position = self.file.seek(io::SeekFrom::Current(0))?;

        if self.writing {
            self.file.seek(io::SeekFrom::Start(RIFF_SIZE_OFFSET))?;
            let riff_size = (position - RIFF_PAYLOAD_OFFSET) as u32;
            self.file.write_all(&riff_size.to_le_bytes())?;

            self.file.seek(io::SeekFrom::Start(self.datasize_offset))?;
            let data_size = (position - self.data_offset) as u32;
            self.file.write_all(&data_size.to_le_bytes())?;
            self.file.flush()?;
        }
        Ok(position)
    }
}

fn create_header(file: &mut fs::File, sample_rate: u32)
                 -> Result<WavInfo, CassetteError> {
    let byte_rate = sample_rate * CHANNELS_MONO as u32
                    * (BITS_PER_SAMPLE as u32 / 8);
    let block_align = CHANNELS_MONO * BITS_PER_SAMPLE / 8;

    file.write_all(b"RIFF")?;
    file.write_all(&0u32.to_le_bytes())?;
    file.write_all(b"WAVE")?;
    file.write_all(b"fmt ")?;
    file.write_all(&16u32.to_le_bytes())?;
    file.write_all(&FORMAT_PCM.to_le_bytes())?;
    file.write_all(&CHANNELS_MONO.to_le_bytes())?;
    file.write_all(&sample_rate.to_le_bytes())?;
    file.write_all(&byte_rate.to_le_bytes())?;
    file.write_all(&block_align.to_le_bytes())?;
    file.write_all(&BITS_PER_SAMPLE.to_le_bytes())?;
    file.write_all(b"data")?;
    file.write_all(&0u32.to_le_bytes())?;

    Ok(WavInfo {
        sample_rate:     sample_rate,
        datasize_offset: 40,
        data_offset:     44,
    })
}

fn parse_header(file: &mut fs::File) -> Result<WavInfo, CassetteError> {
    file.seek(io::SeekFrom::Start(0))?;

    expect_chunk_id(file, b"RIFF")?;
    read_u32(file)?; // size, stale in many files
    expect_chunk_id(file, b"WAVE")?;

    expect_chunk_id(file, b"fmt ")?;
    let fmt_size = read_u32(file)?;
    if fmt_size < 16 {
        return Err(CassetteError::UnusableWav(
            format!("fmt chunk too small ({} bytes)", fmt_size)));
    }
    if read_u16(file)? != FORMAT_PCM {
        return Err(CassetteError::UnusableWav("must be pcm".to_string()));
    }
    if read_u16(file)? != CHANNELS_MONO {
        return Err(CassetteError::UnusableWav("must be mono".to_string()));
    }
    let sample_rate = read_u32(file)?;
    read_u32(file)?; // byte rate, implied by the rest
    if read_u16(file)? != CHANNELS_MONO * BITS_PER_SAMPLE / 8 {
        return Err(CassetteError::UnusableWav(
            "must be 1 byte per sample".to_string()));
    }
    if read_u16(file)? != BITS_PER_SAMPLE {
        return Err(CassetteError::UnusableWav(
            "must be 8 bits per sample".to_string()));
    }
    // Tolerate extension bytes on the fmt chunk.
    file.seek(io::SeekFrom::Current((fmt_size - 16) as i64))?;

    expect_chunk_id(file, b"data")?;
    let datasize_offset = file.seek(io::SeekFrom::Current(0))?;
    read_u32(file)?; // size, stale in many files
    let data_offset = file.seek(io::SeekFrom::Current(0))?;

    Ok(WavInfo {
        sample_rate:     sample_rate,
        datasize_offset: datasize_offset,
        data_offset:     data_offset,
    })
}

fn expect_chunk_id(file: &mut fs::File, expected: &[u8; 4])
                   -> Result<(), CassetteError> {
    let mut id = [0u8; 4];
    file.read_exact(&mut id)
        .map_err(|_| CassetteError::UnusableWav(
            format!("missing chunk id '{}'",
                    String::from_utf8_lossy(expected))))?;
    if &id != expected {
        return Err(CassetteError::UnusableWav(
            format!("expected chunk id '{}', got '{}'",
                    String::from_utf8_lossy(expected),
                    String::from_utf8_lossy(&id))));
    }
    Ok(())
}

fn read_u16(file: &mut fs::File) -> Result<u16, CassetteError> {
    let mut bytes = [0u8; 2];
    file.read_exact(&mut bytes)
        .map_err(|_| CassetteError::UnusableWav("truncated header".to_string()))?;
    Ok(u16::from_le_bytes(bytes))
}

fn read_u32(file: &mut fs::File) -> Result<u32, CassetteError> {
    let mut bytes = [0u8; 4];
    file.read_exact(&mut bytes)
        .map_err(|_| CassetteError::UnusableWav("truncated header".to_string()))?;
    Ok(u32::from_le_bytes(bytes))
}
