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

// The core crate never links an audio library.  A frontend that wants
// live tape audio hands the session an `AudioBackend`; everything the
// codecs need from the platform is behind these two traits, which also
// makes the sound path testable against a recording fake.

use crate::error::CassetteError;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    Playback,
    Capture,
}

/// An open 8-bit mono unsigned PCM stream.
pub trait AudioDevice {
    /// The rate the device actually runs at, which may differ from the
    /// rate requested at open.
    fn sample_rate(&self) -> u32;

    /// Queue samples for playback.  May block until the device has
    /// room; callers suspend pacing around it.
    fn queue(&mut self, samples: &[u8]) -> Result<(), CassetteError>;

    /// Capture samples, blocking; returns how many were filled in.
    fn read(&mut self, samples: &mut [u8]) -> Result<usize, CassetteError>;

    /// Block until everything queued has been heard.
    fn drain(&mut self) -> Result<(), CassetteError>;
}

pub trait AudioBackend {
    fn open(&mut self, direction: Direction, sample_rate: u32)
            -> Result<Box<dyn AudioDevice>, CassetteError>;
}

/// Discrete game-sound hardware (an attached amplifier driven straight
/// off the port lines).  When the engine has one of these, motor-off
/// port writes go here instead of opening a live audio session.
pub trait AmplitudeSink {
    fn set_level(&mut self, level: u8);
}
