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

// The cassette engine doesn't own a clock; the embedder's machine loop
// does.  All it needs from that loop is the ability to book a one-shot
// callback some number of CPU ticks in the future, to revoke a booking
// that has been superseded, and to peek at two pieces of machine state
// that affect tape handling (a pending operator reset, and the speed
// throttle).  That contract is the `Timebase` trait.

// Events the engine asks the timebase to deliver back into it, through
// `CassetteRecorder::scheduled()`.
//
// `RiseInterrupt` and `FallInterrupt` are the precisely-timed interrupt
// deliveries of the high-speed tape routines; `CatchUp` is a plain "look
// at the tape again" poke; `Kickoff` probes for a high-speed read one
// second after motor-on; `SoundFlush` and `SoundClose` are the sound
// session's idle timers.
//
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SchedEvent {
    CatchUp,
    RiseInterrupt,
    FallInterrupt,
    Kickoff,
    SoundFlush,
    SoundClose,
}

// Identifies one pending callback, so that a superseded callback can be
// cancelled outright rather than delivered and ignored.
//
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EventToken(u64);

impl EventToken {
    pub fn raw(&self) -> u64 {
        self.0
    }
}

pub trait Timebase {
    /// Book `event` for delivery `delay_ticks` CPU ticks from now.
    fn schedule(&mut self, delay_ticks: u64, event: SchedEvent) -> EventToken;

    /// Revoke a booking.  Unknown (already fired or cancelled) tokens
    /// are ignored.
    fn cancel(&mut self, token: EventToken);

    /// Whether an operator reset (NMI) is waiting to be serviced; long
    /// decoding scans bail out when it is.
    fn nmi_pending(&self) -> bool;

    /// Suspend and resume the emulation speed throttle.  Nestable; the
    /// throttle stays off until every suspension has been resumed.
    fn pacing_suspend(&mut self);
    fn pacing_resume(&mut self);
}

// Scoped pacing suspension for blocking device I/O.  Dropping the guard
// resumes pacing on every exit path, including `?` returns.
//
pub struct PacingPause<'a> {
    timebase: &'a mut dyn Timebase,
}

impl<'a> PacingPause<'a> {
    pub fn new(timebase: &'a mut dyn Timebase) -> PacingPause<'a> {
        timebase.pacing_suspend();
        PacingPause { timebase: timebase }
    }

    // The timebase stays usable while paced out (the sound session
    // re-books its idle timers from under the guard).
    pub fn timebase(&mut self) -> &mut dyn Timebase {
        self.timebase
    }
}

impl<'a> Drop for PacingPause<'a> {
    fn drop(&mut self) {
        self.timebase.pacing_resume();
    }
}


// A single-threaded `Timebase` for embedders without a scheduler of
// their own, and for the test suite.  The embedder advances it with
// `pop_due()` from its machine loop and dispatches whatever comes out.
//
pub struct EventQueue {
    pending:      Vec<(u64, EventToken, SchedEvent)>,
    next_token:   u64,
    now:          u64,
    nmi:          bool,
    pacing_depth: u32,
}

impl EventQueue {
    pub fn new() -> EventQueue {
        EventQueue {
            pending:      Vec::new(),
            next_token:   0,
            now:          0,
            nmi:          false,
            pacing_depth: 0,
        }
    }

    /// Move the clock to `now` and deliver the earliest booking that has
    /// come due, if any.  Bookings come out in due-tick order.
    pub fn pop_due(&mut self, now: u64) -> Option<(EventToken, SchedEvent)> {
        if now > self.now {
            self.now = now;
        }

        let mut found: Option<usize> = None;
        for (index, &(due, _, _)) in self.pending.iter().enumerate() {
            if due <= self.now {
                match found {
                    Some(best) => {
                        if due < self.pending[best].0 {
                            found = Some(index);
                        }
                    },
                    None => {
                        found = Some(index);
                    },
                }
            }
        }
        found.map(|index| {
            let (_, token, event) = self.pending.remove(index);
            (token, event)
        })
    }

    pub fn set_nmi(&mut self, pending: bool) {
        self.nmi = pending;
    }

    pub fn pacing_suspended(&self) -> bool {
        self.pacing_depth > 0
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }
}

impl Timebase for EventQueue {
    fn schedule(&mut self, delay_ticks: u64, event: SchedEvent) -> EventToken {
        let token = EventToken(self.next_token);
        self.next_token += 1;

        self.pending.push((self.now + delay_ticks, token, event));
        token
    }

    fn cancel(&mut self, token: EventToken) {
        self.pending.retain(|&(_, pending_token, _)| pending_token != token);
    }

    fn nmi_pending(&self) -> bool {
        self.nmi
    }

    fn pacing_suspend(&mut self) {
        self.pacing_depth += 1;
    }

    fn pacing_resume(&mut self) {
        // An unbalanced resume is an engine bug; saturate rather than
        // panic in release use.
        self.pacing_depth = self.pacing_depth.saturating_sub(1);
    }
}
