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

// Inside the engine a tape is a stream of line transitions, `(value,
// delta)` pairs.  A codec translates that stream to and from one of the
// on-disk tape image formats, or the live audio device.  The engine
// drives whichever codec the session opened through the one
// `TransitionCodec` trait and never knows which format is loaded.

pub mod analog;
pub mod bitstream;
pub mod debug_text;
pub mod live_audio;
pub mod pcm;
pub mod pulse_train;

pub use self::bitstream::BitstreamCodec;
pub use self::debug_text::DebugTextCodec;
pub use self::live_audio::LiveAudioCodec;
pub use self::pcm::PcmCodec;
pub use self::pulse_train::PulseTrainCodec;

use crate::error::CassetteError;
use crate::noise::NoiseFloor;
use crate::roundoff::Roundoff;
use crate::timing::Timebase;

// The numeric ids are the ones that have always lived in users'
// control files; they are part of the on-disk interface.
//
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Format {
    Cas,
    Cpt,
    Wav,
    Direct,
    Debug,
    Autodetect,
}

impl Format {
    pub fn id(&self) -> u32 {
        match *self {
            Format::Cas        => 1,
            Format::Cpt        => 2,
            Format::Wav        => 3,
            Format::Direct     => 4,
            Format::Debug      => 5,
            Format::Autodetect => 6,
        }
    }

    pub fn from_id(id: u32) -> Option<Format> {
        match id {
            1 => Some(Format::Cas),
            2 => Some(Format::Cpt),
            3 => Some(Format::Wav),
            4 => Some(Format::Direct),
            5 => Some(Format::Debug),
            6 => Some(Format::Autodetect),
            _ => None,
        }
    }

    pub fn tag(&self) -> &'static str {
        match *self {
            Format::Cas        => "cas",
            Format::Cpt        => "cpt",
            Format::Wav        => "wav",
            Format::Direct     => "direct",
            Format::Debug      => "debug",
            Format::Autodetect => "autodetect",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Format> {
        match tag {
            "cas"        => Some(Format::Cas),
            "cpt"        => Some(Format::Cpt),
            "wav"        => Some(Format::Wav),
            "direct"     => Some(Format::Direct),
            "debug"      => Some(Format::Debug),
            "autodetect" => Some(Format::Autodetect),
            _            => None,
        }
    }
}

// What the engine asks a codec to record: either the line moving to a
// new value after `ddelta_us`, or a flush of whatever the codec is
// holding back (a partial byte, queued device samples).
//
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WriteOp {
    Transition(u8),
    Flush,
}

// Engine state a decoding codec gets to look at.  The timebase is here
// for the NMI check that lets an operator reset break out of a long
// scan through silence.
//
pub struct DecodeContext<'a> {
    pub current:    u8,
    pub high_speed: bool,
    pub noise:      &'a mut NoiseFloor,
    pub timebase:   &'a dyn Timebase,
}

pub trait TransitionCodec {
    /// Record one write operation.  `current` is the line value before
    /// the transition; `delta_us` is the raw time since the previous
    /// one.  Quantizing codecs run it through the session's encode
    /// accumulator; the bitstream recognizer only peeks at the
    /// corrected value and commits nothing.
    fn encode(&mut self, op: WriteOp, current: u8, delta_us: f64,
              roundoff: &mut Roundoff) -> Result<(), CassetteError>;

    /// Produce the next transition as `(new_value, ideal_delay_us)`, or
    /// `None` once the tape has run out.
    fn decode(&mut self, ctx: &mut DecodeContext)
              -> Result<Option<(u8, f64)>, CassetteError>;

    /// Finish the session and report the byte position to persist.
    fn close(&mut self) -> Result<u64, CassetteError>;
}
