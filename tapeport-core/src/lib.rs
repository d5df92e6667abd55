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

// Emulation core for the cassette tape port of a vintage microcomputer,
// together with the "game sound" output path that reuses the same port.
//
// The port is a single digital line; software wiggles it with `out`
// instructions and samples it with `in` instructions, and the tape deck
// (or an amplifier, when the motor is off) sees the resulting waveform.
// This crate translates between that line and the various ways the same
// signal can be persisted or made audible: a recovered byte stream, an
// exact pulse-timing log, a PCM wave file, a live audio device, or a
// human-readable text log.
//
// The CPU emulator, the event scheduler and the user interface are the
// embedder's business; they talk to this crate through `CassetteRecorder`,
// the `Timebase` trait and the `Sink` trait.

pub mod audio;
pub mod cassette;
pub mod codec;
pub mod control;
pub mod error;
pub mod noise;
pub mod pulse;
pub mod roundoff;
pub mod session;
pub mod timing;
pub mod util;

pub use crate::cassette::{CassetteConfig, CassetteEvent, CassetteRecorder, LatchMode};
pub use crate::codec::Format;
pub use crate::error::CassetteError;
pub use crate::session::{Mode, Session, DEFAULT_SAMPLE_RATE};
pub use crate::timing::{EventQueue, EventToken, SchedEvent, Timebase};
