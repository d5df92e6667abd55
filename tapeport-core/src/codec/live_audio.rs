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

// The same sample conversion as the wave-file codec, pointed at a live
// audio device instead of a file: the tape output becomes audible, and
// with a capturing device a real tape can be loaded straight in.
//
// Game-sound sessions route through here too.  Those are driven by
// whatever rhythm the game pokes the port at, with arbitrarily long
// quiet stretches in between; queueing the quiet literally would put
// the next sound effect minutes behind.  Silences beyond 20ms get
// truncated, and the timing accumulator starts over, since continuity
// across a cut makes no sense.

use crate::audio::AudioDevice;
use crate::codec::analog;
use crate::codec::{DecodeContext, TransitionCodec, WriteOp};
use crate::error::CassetteError;
use crate::roundoff::Roundoff;

const MAX_SILENCE_US: f64 = 20_000.0;

pub struct LiveAudioCodec {
    device:        Box<dyn AudioDevice>,
    sound_session: bool,
}

impl LiveAudioCodec {
    pub fn new(device: Box<dyn AudioDevice>, sound_session: bool)
               -> LiveAudioCodec {
        LiveAudioCodec {
            device:        device,
            sound_session: sound_session,
        }
    }
}

impl TransitionCodec for LiveAudioCodec {
    fn encode(&mut self, op: WriteOp, current: u8, delta_us: f64,
              roundoff: &mut Roundoff) -> Result<(), CassetteError> {
        let sample = analog::VALUE_TO_SAMPLE.get(current as usize)
                                            .cloned().unwrap_or(127);

        let mut ddelta_us = roundoff.corrected(delta_us);
        if self.sound_session && ddelta_us > MAX_SILENCE_US {
            ddelta_us = MAX_SILENCE_US;
            roundoff.reset();
        }

        let period = analog::period_us(self.device.sample_rate());
        let nsamples = analog::samples_for(ddelta_us, period);
        roundoff.commit(nsamples as f64 * period, ddelta_us);

        self.device.queue(&vec![sample; nsamples as usize])?;

        if let WriteOp::Flush = op {
            self.device.drain()?;
        }
        Ok(())
    }

    fn decode(&mut self, ctx: &mut DecodeContext)
              -> Result<Option<(u8, f64)>, CassetteError> {
        let device = &mut self.device;
        let sample_rate = device.sample_rate();

        analog::scan_transition(|| {
            let mut byte = [0u8; 1];
            match device.read(&mut byte)? {
                0 => Ok(None),
                _ => Ok(Some(byte[0])),
            }
        }, sample_rate, ctx)
    }

    fn close(&mut self) -> Result<u64, CassetteError> {
        // Let whatever is still queued play out.  A live device has no
        // resume position.
        self.device.drain()?;
        Ok(0)
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    use std::cell::RefCell;
    use std::rc::Rc;

    use crate::noise::NoiseFloor;
    use crate::timing::EventQueue;

    #[derive(Default)]
    struct FakeState {
        queued:   Vec<u8>,
        drains:   usize,
        to_serve: Vec<u8>,
        served:   usize,
    }

    struct FakeDevice {
        rate:  u32,
        state: Rc<RefCell<FakeState>>,
    }

    impl AudioDevice for FakeDevice {
        fn sample_rate(&self) -> u32 {
            self.rate
        }

        fn queue(&mut self, samples: &[u8]) -> Result<(), CassetteError> {
            self.state.borrow_mut().queued.extend_from_slice(samples);
            Ok(())
        }

        fn read(&mut self, samples: &mut [u8]) -> Result<usize, CassetteError> {
            let mut state = self.state.borrow_mut();
            if state.served >= state.to_serve.len() {
                return Ok(0);
            }
            samples[0] = state.to_serve[state.served];
            state.served += 1;
            Ok(1)
        }

        fn drain(&mut self) -> Result<(), CassetteError> {
            self.state.borrow_mut().drains += 1;
            Ok(())
        }
    }

    fn fake(rate: u32) -> (Box<dyn AudioDevice>, Rc<RefCell<FakeState>>) {
        let state = Rc::new(RefCell::new(FakeState::default()));
        (Box::new(FakeDevice { rate: rate, state: state.clone() }), state)
    }

    #[test]
    fn sound_sessions_truncate_long_silences() {
        let (device, state) = fake(10_000);
        let mut codec = LiveAudioCodec::new(device, true);
        let mut roundoff = Roundoff::new();

        codec.encode(WriteOp::Transition(1), 0, 100_000.0,
                     &mut roundoff).unwrap();

        // 20ms at 10kHz, not 100ms.
        assert_eq!(state.borrow().queued.len(), 200);
        assert!(state.borrow().queued.iter().all(|&s| s == 127));
    }

    #[test]
    fn tape_sessions_keep_the_silence() {
        let (device, state) = fake(10_000);
        let mut codec = LiveAudioCodec::new(device, false);
        let mut roundoff = Roundoff::new();

        codec.encode(WriteOp::Transition(1), 0, 100_000.0,
                     &mut roundoff).unwrap();

        assert_eq!(state.borrow().queued.len(), 1000);
    }

    #[test]
    fn flush_queues_the_tail_and_drains() {
        let (device, state) = fake(11025);
        let mut codec = LiveAudioCodec::new(device, true);
        let mut roundoff = Roundoff::new();

        codec.encode(WriteOp::Transition(1), 2, 1_000.0,
                     &mut roundoff).unwrap();
        codec.encode(WriteOp::Flush, 1, 1_000.0, &mut roundoff).unwrap();

        let state = state.borrow();
        assert_eq!(state.drains, 1);
        // The second batch is at the high amplitude held since the
        // last transition.
        assert_eq!(state.queued[state.queued.len() - 1], 254);
        assert_eq!(state.queued[0], 0);
    }

    #[test]
    fn close_drains_the_device() {
        let (device, state) = fake(11025);
        let mut codec = LiveAudioCodec::new(device, true);

        assert_eq!(codec.close().unwrap(), 0);
        assert_eq!(state.borrow().drains, 1);
    }

    #[test]
    fn capture_decodes_into_transitions() {
        let (device, state) = fake(11025);
        state.borrow_mut().to_serve = vec![254, 254, 254, 0];
        let mut codec = LiveAudioCodec::new(device, false);

        let mut noise = NoiseFloor::new();
        let queue = EventQueue::new();
        let mut ctx = DecodeContext {
            current:    0,
            high_speed: false,
            noise:      &mut noise,
            timebase:   &queue,
        };

        let (next, _) = codec.decode(&mut ctx).unwrap().unwrap();
        assert_eq!(next, 1);

        ctx.current = 1;
        let (next, _) = codec.decode(&mut ctx).unwrap().unwrap();
        assert_eq!(next, 2);

        ctx.current = 2;
        assert_eq!(codec.decode(&mut ctx).unwrap(), None);
    }
}
