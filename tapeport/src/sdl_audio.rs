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

// SDL2 implementation of the core's audio device interface.  Playback
// only; capturing off a real tape deck needs a queue-less callback
// design that hasn't been written yet.

use std::thread;
use std::time;

use sdl2::audio::{AudioQueue, AudioSpecDesired};

use tapeport_core::audio::{AudioBackend, AudioDevice, Direction};
use tapeport_core::error::CassetteError;

// Small fragments keep the sound path responsive to the program's
// port-poking rhythm.
const FRAGMENT_SIZE: u16 = 256;

pub struct SdlAudioBackend {
    audio: sdl2::AudioSubsystem,
}

impl SdlAudioBackend {
    pub fn new() -> Result<SdlAudioBackend, CassetteError> {
        let context = sdl2::init().map_err(CassetteError::Device)?;
        let audio = context.audio().map_err(CassetteError::Device)?;

        Ok(SdlAudioBackend { audio: audio })
    }
}

impl AudioBackend for SdlAudioBackend {
    fn open(&mut self, direction: Direction, sample_rate: u32)
            -> Result<Box<dyn AudioDevice>, CassetteError> {
        match direction {
            Direction::Capture => {
                Err(CassetteError::NotImplemented(
                    "capture through the SDL audio backend"))
            },
            Direction::Playback => {
                let desired = AudioSpecDesired {
                    freq:     Some(sample_rate as i32),
                    channels: Some(1),
                    samples:  Some(FRAGMENT_SIZE),
                };
                let queue = self.audio.open_queue::<u8, _>(None, &desired)
                                      .map_err(CassetteError::Device)?;
                queue.resume();

                Ok(Box::new(SdlPlaybackDevice { queue: queue }))
            },
        }
    }
}

struct SdlPlaybackDevice {
    queue: AudioQueue<u8>,
}

impl AudioDevice for SdlPlaybackDevice {
    fn sample_rate(&self) -> u32 {
        self.queue.spec().freq as u32
    }

    fn queue(&mut self, samples: &[u8]) -> Result<(), CassetteError> {
        self.queue.queue_audio(samples).map_err(CassetteError::Device)
    }

    fn read(&mut self, _samples: &mut [u8]) -> Result<usize, CassetteError> {
        Err(CassetteError::NotImplemented(
            "capture through the SDL audio backend"))
    }

    fn drain(&mut self) -> Result<(), CassetteError> {
        while self.queue.size() > 0 {
            thread::sleep(time::Duration::from_millis(10));
        }
        Ok(())
    }
}
