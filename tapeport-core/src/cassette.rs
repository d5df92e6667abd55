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

// The cassette port itself.  `CassetteRecorder` sits between the CPU
// emulation and the tape session: port writes become recorded line
// transitions, port reads replay recorded transitions into the input
// flip-flop, and when the motor relay is off the same port drives the
// game-sound path.
//
// Everything here is driven by the embedder's clock.  Each operation
// takes the current tick count, a `Timebase` for booking callbacks,
// and a `Sink` that receives the machine-facing events (interrupt
// requests, motor relay changes).

use std::path;

use log::error;

use crate::audio::{AmplitudeSink, AudioBackend};
use crate::codec::{Format, DecodeContext, WriteOp};
use crate::noise::NoiseFloor;
use crate::roundoff::Roundoff;
use crate::session::{Mode, Session, StateChange};
use crate::timing::{EventToken, PacingPause, SchedEvent, Timebase};
use crate::util::Sink;

/// What the port input latch returns on a read.  The oldest machines
/// expose the raw flip-flop; later ones OR in "the last pulse was
/// positive" for hysteresis in the high-speed zero-crossing detector.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LatchMode {
    FlipFlopOnly,
    FlipFlopOrHigh,
}

/// Events the engine raises toward the machine.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CassetteEvent {
    RiseInterrupt,
    FallInterrupt,
    ClearInterrupts,
    MotorOn,
    MotorOff,
}

pub struct CassetteConfig {
    pub control_dir:         path::PathBuf,
    pub clock_hz:            u64,
    pub default_sample_rate: u32,
    pub latch_mode:          LatchMode,

    /// Whether the machine has the high-speed cassette circuit (and
    /// with it the kickoff probe after motor-on).
    pub high_speed_port:     bool,
}

// The line value parked after a bitstream flush.  Out of range of any
// real port write, so the next write always registers as a change.
const LINE_FLUSHED: u8 = 4;

// No further transitions; keeps the catch-up loop idle until motor-off.
const END_OF_TAPE: u64 = u64::MAX;

// Sound sessions flush 25ms after the last transition and close 5
// million ticks after the last flush.
const SOUND_FLUSH_DELAY_US:    f64 = 25_000.0;
const SOUND_CLOSE_DELAY_TICKS: u64 = 5_000_000;

const KICKOFF_DELAY_US: f64 = 1_000_000.0;

pub struct CassetteRecorder {
    session:   Session,
    amplitude: Option<Box<dyn AmplitudeSink>>,

    clock_mhz:          f64,
    latch_mode:         LatchMode,
    high_speed_port:    bool,
    interrupts_enabled: bool,

    motor:      bool,
    high_speed: bool,
    noise:      NoiseFloor,

    // The line as the machine sees it: current value, the buffered
    // next transition, and the input flip-flop.
    value:        u8,
    next:         u8,
    last_nonzero: u8,
    flipflop:     bool,

    transition: u64,
    delta:      u64,

    enc_roundoff: Roundoff,
    dec_roundoff: Roundoff,

    read_token:    Option<EventToken>,
    sound_token:   Option<EventToken>,
    kickoff_token: Option<EventToken>,
}

impl CassetteRecorder {
    pub fn new(config: CassetteConfig,
               backend: Option<Box<dyn AudioBackend>>,
               amplitude: Option<Box<dyn AmplitudeSink>>) -> CassetteRecorder {
        let session = Session::new(&config.control_dir,
                                   config.default_sample_rate, backend);

        CassetteRecorder {
            session:   session,
            amplitude: amplitude,

            clock_mhz:          config.clock_hz as f64 / 1_000_000.0,
            latch_mode:         config.latch_mode,
            high_speed_port:    config.high_speed_port,
            interrupts_enabled: false,

            motor:      false,
            high_speed: false,
            noise:      NoiseFloor::new(),

            value:        0,
            next:         0,
            last_nonzero: 0,
            flipflop:     false,

            transition: 0,
            delta:      0,

            enc_roundoff: Roundoff::new(),
            dec_roundoff: Roundoff::new(),

            read_token:    None,
            sound_token:   None,
            kickoff_token: None,
        }
    }

    pub fn motor(&self) -> bool {
        self.motor
    }

    pub fn mode(&self) -> Mode {
        self.session.mode()
    }

    pub fn high_speed(&self) -> bool {
        self.high_speed
    }

    /// The machine's rise/fall interrupt mask; the kickoff probe only
    /// fires when the program actually asked for tape interrupts.
    pub fn set_interrupts_enabled(&mut self, enabled: bool) {
        self.interrupts_enabled = enabled;
    }

    /// The program toggled the motor relay.
    pub fn set_motor(&mut self, on: bool, t: u64,
                     timebase: &mut dyn Timebase,
                     sink: &mut dyn Sink<CassetteEvent>) {
        if on && !self.motor {
            self.motor      = true;
            self.transition = t;
            self.value      = 0;
            self.next       = 0;
            self.delta      = 0;
            self.flipflop   = false;
            self.high_speed = false;
            self.enc_roundoff.reset();
            self.dec_roundoff.reset();
            self.noise.reset();

            if self.high_speed_port {
                let delay = (KICKOFF_DELAY_US * self.clock_mhz) as u64;
                self.kickoff_token =
                    Some(timebase.schedule(delay, SchedEvent::Kickoff));
            }
            sink.push(CassetteEvent::MotorOn);
        } else if !on && self.motor {
            if self.session.mode() == Mode::Writing {
                self.transition_out(WriteOp::Flush, t, timebase);
            }
            if let Err(cause) = self.session.request_state(Mode::Closed) {
                error!("Couldn't close the cassette: {}.", cause);
            }
            self.motor = false;
            if let Some(token) = self.kickoff_token.take() {
                timebase.cancel(token);
            }
            if let Some(token) = self.read_token.take() {
                timebase.cancel(token);
            }
            if let Some(token) = self.sound_token.take() {
                timebase.cancel(token);
            }
            sink.push(CassetteEvent::MotorOff);
        }
    }

    /// The program wrote the port lines.
    pub fn port_write(&mut self, value: u8, t: u64,
                      timebase: &mut dyn Timebase,
                      sink: &mut dyn Sink<CassetteEvent>) {
        let value = value & 0x03;

        if self.motor {
            if self.session.mode() == Mode::Reading {
                // Writing the port resets the input flip-flop.
                self.catch_up(t, timebase, sink);
                self.flipflop = false;
            }
            if self.session.mode() != Mode::Reading && value != self.value {
                match self.session.request_state(Mode::Writing) {
                    Ok(StateChange::Rejected) | Err(_) => return,
                    Ok(_)                              => {},
                }
                self.transition_out(WriteOp::Transition(value), t, timebase);
            }
            return;
        }

        // Motor off: the port is wired to the amplifier.
        if let Some(ref mut amplitude) = self.amplitude {
            amplitude.set_level(value);
            return;
        }
        self.sound_write(value, t, timebase);
    }

    /// The dedicated sound port of the later machines, a single level
    /// bit with no motor gating of its own.
    pub fn sound_out(&mut self, level: bool, t: u64,
                     timebase: &mut dyn Timebase) {
        let value = if level { 1 } else { 2 };

        if let Some(ref mut amplitude) = self.amplitude {
            amplitude.set_level(value);
            return;
        }
        if self.motor {
            return;
        }
        self.sound_write(value, t, timebase);
    }

    /// The program read the port.  Returns the input latch.
    pub fn port_read(&mut self, t: u64, timebase: &mut dyn Timebase,
                     sink: &mut dyn Sink<CassetteEvent>) -> bool {
        sink.push(CassetteEvent::ClearInterrupts);
        self.catch_up(t, timebase, sink);

        match self.latch_mode {
            LatchMode::FlipFlopOnly  => self.flipflop,
            LatchMode::FlipFlopOrHigh => {
                self.flipflop || self.last_nonzero == 1
            },
        }
    }

    /// A booked callback came due.
    pub fn scheduled(&mut self, event: SchedEvent, t: u64,
                     timebase: &mut dyn Timebase,
                     sink: &mut dyn Sink<CassetteEvent>) {
        match event {
            SchedEvent::Kickoff => {
                self.kickoff_token = None;
                // The port sat untouched for a second with tape
                // interrupts enabled; assume a high-speed read and
                // synthesize one interrupt of each kind to unstick
                // the polling loop.
                if self.motor && self.session.mode() == Mode::Closed
                   && self.interrupts_enabled {
                    self.high_speed = true;
                    self.transition = t;
                    sink.push(CassetteEvent::FallInterrupt);
                    sink.push(CassetteEvent::RiseInterrupt);
                }
            },
            SchedEvent::RiseInterrupt => {
                self.read_token = None;
                sink.push(CassetteEvent::RiseInterrupt);
            },
            SchedEvent::FallInterrupt => {
                self.read_token = None;
                sink.push(CassetteEvent::FallInterrupt);
            },
            SchedEvent::CatchUp => {
                self.read_token = None;
                self.catch_up(t, timebase, sink);
            },
            SchedEvent::SoundFlush => {
                self.sound_token = None;
                if self.session.mode() == Mode::Sound {
                    let mut pause = PacingPause::new(timebase);
                    self.transition_out(WriteOp::Flush, t, pause.timebase());
                }
            },
            SchedEvent::SoundClose => {
                self.sound_token = None;
                if self.session.mode() == Mode::Sound {
                    // Closing drains the device, which may block.
                    let _pause = PacingPause::new(timebase);
                    if let Err(cause) = self.session.request_state(Mode::Closed) {
                        error!("Couldn't close the sound session: {}.", cause);
                    }
                }
            },
        }
    }

    fn sound_write(&mut self, value: u8, t: u64,
                   timebase: &mut dyn Timebase) {
        // Don't open a device just to play silence.
        if self.session.mode() != Mode::Sound && value == 0 {
            return;
        }
        match self.session.request_state(Mode::Sound) {
            Ok(StateChange::Rejected) | Err(_) => return,
            Ok(_)                              => {},
        }

        // Device writes may block; don't let the speed throttle count
        // that time against the emulation.
        let mut pause = PacingPause::new(timebase);
        self.transition_out(WriteOp::Transition(value), t, pause.timebase());
    }

    fn transition_out(&mut self, op: WriteOp, t: u64,
                      timebase: &mut dyn Timebase) {
        if let WriteOp::Transition(value) = op {
            if value == self.value {
                return;
            }
        }
        let delta_us = t.wrapping_sub(self.transition) as f64 / self.clock_mhz;

        if self.session.mode() == Mode::Sound {
            // Supersede the idle timer rather than letting a stale one
            // fire.
            if let Some(token) = self.sound_token.take() {
                timebase.cancel(token);
            }
            let booking = match op {
                WriteOp::Flush => {
                    timebase.schedule(SOUND_CLOSE_DELAY_TICKS,
                                      SchedEvent::SoundClose)
                },
                WriteOp::Transition(_) => {
                    let delay = (SOUND_FLUSH_DELAY_US * self.clock_mhz) as u64;
                    timebase.schedule(delay, SchedEvent::SoundFlush)
                },
            };
            self.sound_token = Some(booking);
        }

        if let Err(cause) = self.session.encode(op, self.value, delta_us,
                                                &mut self.enc_roundoff) {
            // A write that didn't reach the tape must not be papered
            // over; fail the session so later writes are rejected.
            error!("Cassette write failed: {}.", cause);
            if let Err(cause) = self.session.request_state(Mode::Failed) {
                error!("Couldn't shut the failed session down: {}.", cause);
            }
        }

        self.transition = t;
        match op {
            WriteOp::Transition(value) => {
                self.value = value;
            },
            WriteOp::Flush => {
                if self.session.format() == Format::Cas {
                    self.value = LINE_FLUSHED;
                }
            },
        }
    }

    // Replay every transition that has come due by `t`, then (at high
    // speed) book a callback for the precise tick of the next one.
    fn catch_up(&mut self, t: u64, timebase: &mut dyn Timebase,
                _sink: &mut dyn Sink<CassetteEvent>) {
        if !self.motor || self.session.mode() == Mode::Writing {
            return;
        }
        match self.session.request_state(Mode::Reading) {
            Ok(StateChange::Rejected) | Err(_) => return,
            Ok(_)                              => {},
        }

        let mut newtrans = false;
        while t.wrapping_sub(self.transition) >= self.delta {
            // The input flip-flop latches on a rising edge out of the
            // neutral level.
            if self.next != 0 && self.value == 0 {
                self.flipflop = true;
            }

            // Deliver the buffered transition.
            self.value = self.next;
            self.transition = self.transition.wrapping_add(self.delta);
            if self.value != 0 {
                self.last_nonzero = self.value;
            }

            let decoded = {
                let mut ctx = DecodeContext {
                    current:    self.value,
                    high_speed: self.high_speed,
                    noise:      &mut self.noise,
                    timebase:   &*timebase,
                };
                self.session.decode(&mut ctx)
            };
            match decoded {
                Ok(Some((next, ideal_us))) => {
                    self.next = next;
                    self.delta =
                        self.dec_roundoff.round(ideal_us * self.clock_mhz);
                    newtrans = true;
                },
                Ok(None) => {
                    self.delta = END_OF_TAPE;
                    newtrans = false;
                },
                Err(cause) => {
                    error!("Cassette read failed: {}.", cause);
                    self.delta = END_OF_TAPE;
                    newtrans = false;
                },
            }

            // Let an operator reset through.
            if timebase.nmi_pending() {
                return;
            }
        }

        // High-speed loaders poll interrupts instead of the port, so
        // the next edge has to arrive on its own.
        if newtrans && self.high_speed {
            if let Some(token) = self.read_token.take() {
                timebase.cancel(token);
            }
            let delay = self.delta - t.wrapping_sub(self.transition);
            let event = if self.next == 2 && self.last_nonzero != 2 {
                SchedEvent::FallInterrupt
            } else if self.next == 1 && self.last_nonzero != 1 {
                SchedEvent::RiseInterrupt
            } else {
                SchedEvent::CatchUp
            };
            self.read_token = Some(timebase.schedule(delay, event));
        }
    }
}
