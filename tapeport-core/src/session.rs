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

// Which tape image is open, for what, and how far along it is.  The
// engine above asks for the mode it needs (reading the port wants
// `Reading`, writing it wants `Writing`, game sound wants `Sound`);
// the session opens and closes the storage behind those requests and
// keeps the control store up to date so the tape position survives
// motor stops and whole emulator runs.

use std::fs;
use std::io::Seek;
use std::io;
use std::path;

use log::{error, info, warn};

use crate::audio::{AudioBackend, AudioDevice, Direction};
use crate::codec::{BitstreamCodec, DebugTextCodec, LiveAudioCodec, PcmCodec,
                   PulseTrainCodec};
use crate::codec::{DecodeContext, Format, TransitionCodec, WriteOp};
use crate::control::{ControlRecord, ControlStore};
use crate::error::CassetteError;
use crate::roundoff::Roundoff;

pub const DEFAULT_SAMPLE_RATE: u32 = 11_025;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mode {
    Closed,
    Reading,
    Writing,
    Sound,
    Failed,
}

/// What a mode request amounted to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StateChange {
    AlreadyThere,
    Changed,
    Rejected,
}

pub struct Session {
    store:    ControlStore,
    base_dir: path::PathBuf,

    mode:     Mode,
    filename: path::PathBuf,
    position: u64,
    format:   Format,

    default_sample_rate: u32,
    sample_rate:         u32,

    codec:   Option<Box<dyn TransitionCodec>>,
    backend: Option<Box<dyn AudioBackend>>,
}

impl Session {
    pub fn new(control_dir: &path::Path, default_sample_rate: u32,
               backend: Option<Box<dyn AudioBackend>>) -> Session {
        let store = ControlStore::new(control_dir);
        let record = store.load();

        Session {
            store:    store,
            base_dir: control_dir.to_path_buf(),

            mode:     Mode::Closed,
            filename: record.filename,
            position: record.position,
            format:   record.format,

            default_sample_rate: default_sample_rate,
            sample_rate:         default_sample_rate,

            codec:   None,
            backend: backend,
        }
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn format(&self) -> Format {
        self.format
    }

    /// The rate of the open analog session (a wave file's own rate, or
    /// the device's negotiated one); the default otherwise.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn position(&self) -> u64 {
        self.position
    }

    /// Move to `target`, closing and opening storage as needed.
    /// `Failed` is sticky: only a request for `Closed` leaves it, and
    /// anything else is rejected without side effects.
    pub fn request_state(&mut self, target: Mode)
                         -> Result<StateChange, CassetteError> {
        if self.mode == target {
            return Ok(StateChange::AlreadyThere);
        }
        if self.mode == Mode::Failed && target != Mode::Closed {
            return Ok(StateChange::Rejected);
        }

        if let Err(error) = self.close_current() {
            // The old codec is already gone; don't leave the mode
            // claiming its storage is still usable.
            self.mode = Mode::Failed;
            error!("Cassette session failed: {}.", error);
            return Err(error);
        }

        let result = match target {
            Mode::Closed | Mode::Failed => Ok(()),
            Mode::Reading               => self.open_storage(false),
            Mode::Writing               => self.open_storage(true),
            Mode::Sound                 => self.open_sound(),
        };
        match result {
            Ok(()) => {
                self.mode = target;
                Ok(StateChange::Changed)
            },
            Err(error) => {
                self.mode = Mode::Failed;
                error!("Cassette session failed: {}.", error);
                Err(error)
            },
        }
    }

    pub fn encode(&mut self, op: WriteOp, current: u8, delta_us: f64,
                  roundoff: &mut Roundoff) -> Result<(), CassetteError> {
        match self.codec {
            Some(ref mut codec) => codec.encode(op, current, delta_us, roundoff),
            None                => Ok(()),
        }
    }

    pub fn decode(&mut self, ctx: &mut DecodeContext)
                  -> Result<Option<(u8, f64)>, CassetteError> {
        match self.codec {
            Some(ref mut codec) => codec.decode(ctx),
            None                => Ok(None),
        }
    }

    // Close whatever is open, remembering the resume position.  Sound
    // sessions have no position worth keeping and don't touch the
    // control store.
    fn close_current(&mut self) -> Result<(), CassetteError> {
        let was_sound = self.mode == Mode::Sound;
        if self.mode != Mode::Reading && self.mode != Mode::Writing
           && !was_sound {
            return Ok(());
        }

        if let Some(mut codec) = self.codec.take() {
            let position = codec.close()?;
            if was_sound || self.format == Format::Direct {
                self.position = 0;
            } else {
                self.position = position;
            }
        }

        if !was_sound {
            let record = ControlRecord {
                filename: self.filename.clone(),
                position: self.position,
                format:   self.format,
            };
            if let Err(error) = self.store.save(&record) {
                // Position is lost across restarts, nothing worse.
                warn!("Couldn't update `{}': {}.",
                      self.store.path().display(), error);
            }
        }
        Ok(())
    }

    fn open_storage(&mut self, writing: bool) -> Result<(), CassetteError> {
        // Re-read the control store; the user may have swapped tapes
        // since the last session.
        let record = store_reload(&self.store);
        self.filename = record.filename;
        self.position = record.position;
        self.format   = record.format;
        self.sample_rate = self.default_sample_rate;

        let codec: Box<dyn TransitionCodec> = match self.format {
            Format::Autodetect => {
                return Err(CassetteError::NotImplemented("autodetect format"));
            },
            Format::Direct => {
                let direction = if writing {
                    Direction::Playback
                } else {
                    Direction::Capture
                };
                let device = self.open_device(direction)?;
                self.sample_rate = device.sample_rate();
                self.position = 0;
                Box::new(LiveAudioCodec::new(device, false))
            },
            Format::Wav => {
                let file = self.open_file(writing)?;
                let codec = if writing {
                    PcmCodec::open_write(file, self.position,
                                         self.default_sample_rate)?
                } else {
                    PcmCodec::open_read(file, self.position)?
                };
                self.sample_rate = codec.sample_rate();
                Box::new(codec)
            },
            Format::Cas => {
                let mut file = self.open_file(writing)?;
                file.seek(io::SeekFrom::Start(self.position))?;
                Box::new(BitstreamCodec::new(file))
            },
            Format::Cpt => {
                let mut file = self.open_file(writing)?;
                file.seek(io::SeekFrom::Start(self.position))?;
                Box::new(PulseTrainCodec::new(file))
            },
            Format::Debug => {
                let mut file = self.open_file(writing)?;
                file.seek(io::SeekFrom::Start(self.position))?;
                Box::new(DebugTextCodec::new(file))
            },
        };
        self.codec = Some(codec);

        info!("Cassette {} session on `{}' ({}), position {}.",
              if writing { "write" } else { "read" },
              self.filename.display(), self.format.tag(), self.position);
        Ok(())
    }

    fn open_sound(&mut self) -> Result<(), CassetteError> {
        self.format = Format::Direct;
        self.position = 0;
        let device = self.open_device(Direction::Playback)?;
        self.sample_rate = device.sample_rate();
        self.codec = Some(Box::new(LiveAudioCodec::new(device, true)));
        Ok(())
    }

    fn open_device(&mut self, direction: Direction)
                   -> Result<Box<dyn AudioDevice>, CassetteError> {
        let requested = self.default_sample_rate;
        let backend = match self.backend {
            Some(ref mut backend) => backend,
            None                  => return Err(CassetteError::NoAudioDevice),
        };

        let device = backend.open(direction, requested)?;
        let negotiated = device.sample_rate();
        if (negotiated as i64 - requested as i64).abs()
           > requested as i64 / 20 {
            return Err(CassetteError::DeviceRate {
                requested:  requested,
                negotiated: negotiated,
            });
        }
        Ok(device)
    }

    fn open_file(&self, writing: bool) -> Result<fs::File, CassetteError> {
        let path = if self.filename.is_absolute() {
            self.filename.clone()
        } else {
            self.base_dir.join(&self.filename)
        };

        let result = if writing {
            fs::OpenOptions::new().read(true).write(true).create(true)
                                  .open(&path)
        } else {
            fs::File::open(&path)
        };
        result.map_err(|error| CassetteError::Open {
            path:   path,
            source: error,
        })
    }
}

fn store_reload(store: &ControlStore) -> ControlRecord {
    let record = store.load();
    if !store.path().exists() {
        info!("No cassette control file yet; using `{}'.",
              record.filename.display());
    }
    record
}


#[cfg(test)]
mod tests {
    use super::*;

    use std::cell::RefCell;
    use std::rc::Rc;

    use crate::noise::NoiseFloor;
    use crate::timing::EventQueue;

    fn save_control(dir: &path::Path, filename: &str, position: u64,
                    format: Format) {
        let store = ControlStore::new(dir);
        store.save(&ControlRecord {
            filename: path::PathBuf::from(filename),
            position: position,
            format:   format,
        }).unwrap();
    }

    #[test]
    fn requesting_the_current_mode_is_a_noop() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = Session::new(dir.path(), DEFAULT_SAMPLE_RATE, None);

        assert_eq!(session.request_state(Mode::Closed).unwrap(),
                   StateChange::AlreadyThere);
        assert_eq!(session.mode(), Mode::Closed);
    }

    #[test]
    fn open_failure_is_sticky_until_closed() {
        let dir = tempfile::tempdir().unwrap();
        save_control(dir.path(), "no-such-tape.cas", 0, Format::Cas);
        let mut session = Session::new(dir.path(), DEFAULT_SAMPLE_RATE, None);

        match session.request_state(Mode::Reading) {
            Err(CassetteError::Open { .. }) => {},
            other => panic!("unexpected: {:?}", other),
        }
        assert_eq!(session.mode(), Mode::Failed);

        assert_eq!(session.request_state(Mode::Writing).unwrap(),
                   StateChange::Rejected);
        assert_eq!(session.mode(), Mode::Failed);

        assert_eq!(session.request_state(Mode::Closed).unwrap(),
                   StateChange::Changed);
        assert_eq!(session.mode(), Mode::Closed);
    }

    #[test]
    fn autodetect_refuses_without_io() {
        let dir = tempfile::tempdir().unwrap();
        save_control(dir.path(), "mystery.tape", 0, Format::Autodetect);
        let mut session = Session::new(dir.path(), DEFAULT_SAMPLE_RATE, None);

        match session.request_state(Mode::Reading) {
            Err(CassetteError::NotImplemented(_)) => {},
            other => panic!("unexpected: {:?}", other),
        }
        assert_eq!(session.mode(), Mode::Failed);
        assert!(!dir.path().join("mystery.tape").exists());
    }

    #[test]
    fn closing_a_write_session_persists_the_position() {
        let dir = tempfile::tempdir().unwrap();
        save_control(dir.path(), "out.cpt", 0, Format::Cpt);
        let mut session = Session::new(dir.path(), DEFAULT_SAMPLE_RATE, None);
        let mut roundoff = Roundoff::new();

        session.request_state(Mode::Writing).unwrap();
        session.encode(WriteOp::Transition(1), 0, 100.0, &mut roundoff)
               .unwrap();
        session.encode(WriteOp::Transition(0), 1, 100.0, &mut roundoff)
               .unwrap();
        session.request_state(Mode::Closed).unwrap();

        let record = ControlStore::new(dir.path()).load();
        assert_eq!(record.filename, path::PathBuf::from("out.cpt"));
        assert_eq!(record.position, 4);
        assert_eq!(record.format, Format::Cpt);
    }

    #[test]
    fn reading_resumes_where_writing_stopped() {
        let dir = tempfile::tempdir().unwrap();
        save_control(dir.path(), "tape.cpt", 0, Format::Cpt);
        let mut session = Session::new(dir.path(), DEFAULT_SAMPLE_RATE, None);
        let mut roundoff = Roundoff::new();

        session.request_state(Mode::Writing).unwrap();
        session.encode(WriteOp::Transition(1), 0, 250.0, &mut roundoff)
               .unwrap();
        session.request_state(Mode::Closed).unwrap();

        // Rewind by hand, as a user would.
        save_control(dir.path(), "tape.cpt", 0, Format::Cpt);

        session.request_state(Mode::Reading).unwrap();
        let mut noise = NoiseFloor::new();
        let queue = EventQueue::new();
        let mut ctx = DecodeContext {
            current:    0,
            high_speed: false,
            noise:      &mut noise,
            timebase:   &queue,
        };
        assert_eq!(session.decode(&mut ctx).unwrap(), Some((1, 250.0)));
        assert_eq!(session.decode(&mut ctx).unwrap(), None);
    }

    struct FakeBackend {
        rate:   u32,
        opened: Rc<RefCell<Vec<Direction>>>,
    }

    struct FakeDevice {
        rate: u32,
    }

    impl AudioDevice for FakeDevice {
        fn sample_rate(&self) -> u32 {
            self.rate
        }
        fn queue(&mut self, _samples: &[u8]) -> Result<(), CassetteError> {
            Ok(())
        }
        fn read(&mut self, _samples: &mut [u8]) -> Result<usize, CassetteError> {
            Ok(0)
        }
        fn drain(&mut self) -> Result<(), CassetteError> {
            Ok(())
        }
    }

    impl AudioBackend for FakeBackend {
        fn open(&mut self, direction: Direction, _sample_rate: u32)
                -> Result<Box<dyn AudioDevice>, CassetteError> {
            self.opened.borrow_mut().push(direction);
            Ok(Box::new(FakeDevice { rate: self.rate }))
        }
    }

    #[test]
    fn sound_sessions_skip_the_control_store() {
        let dir = tempfile::tempdir().unwrap();
        let opened = Rc::new(RefCell::new(Vec::new()));
        let backend = FakeBackend { rate: 11_025, opened: opened.clone() };
        let mut session =
            Session::new(dir.path(), 11_025, Some(Box::new(backend)));

        session.request_state(Mode::Sound).unwrap();
        assert_eq!(session.mode(), Mode::Sound);
        assert_eq!(*opened.borrow(), vec![Direction::Playback]);

        session.request_state(Mode::Closed).unwrap();
        assert!(!dir.path().join(crate::control::CONTROL_FILE_NAME).exists());
    }

    #[test]
    fn device_rate_must_land_within_five_percent() {
        let dir = tempfile::tempdir().unwrap();
        let opened = Rc::new(RefCell::new(Vec::new()));
        let backend = FakeBackend { rate: 8_000, opened: opened };
        let mut session =
            Session::new(dir.path(), 11_025, Some(Box::new(backend)));

        match session.request_state(Mode::Sound) {
            Err(CassetteError::DeviceRate { requested, negotiated }) => {
                assert_eq!(requested, 11_025);
                assert_eq!(negotiated, 8_000);
            },
            other => panic!("unexpected: {:?}", other),
        }
        assert_eq!(session.mode(), Mode::Failed);
    }

    struct StuckDevice;

    impl AudioDevice for StuckDevice {
        fn sample_rate(&self) -> u32 {
            11_025
        }
        fn queue(&mut self, _samples: &[u8]) -> Result<(), CassetteError> {
            Ok(())
        }
        fn read(&mut self, _samples: &mut [u8]) -> Result<usize, CassetteError> {
            Ok(0)
        }
        fn drain(&mut self) -> Result<(), CassetteError> {
            Err(CassetteError::Device("output stream stalled".to_owned()))
        }
    }

    struct StuckBackend;

    impl AudioBackend for StuckBackend {
        fn open(&mut self, _direction: Direction, _sample_rate: u32)
                -> Result<Box<dyn AudioDevice>, CassetteError> {
            Ok(Box::new(StuckDevice))
        }
    }

    #[test]
    fn a_failed_close_fails_the_session() {
        let dir = tempfile::tempdir().unwrap();
        let mut session =
            Session::new(dir.path(), 11_025, Some(Box::new(StuckBackend)));

        session.request_state(Mode::Sound).unwrap();
        match session.request_state(Mode::Closed) {
            Err(CassetteError::Device(_)) => {},
            other => panic!("unexpected: {:?}", other),
        }
        // The mode must not keep claiming a storage handle that is
        // already gone.
        assert_eq!(session.mode(), Mode::Failed);

        // An explicit reset still recovers.
        assert_eq!(session.request_state(Mode::Closed).unwrap(),
                   StateChange::Changed);
        assert_eq!(session.mode(), Mode::Closed);
    }

    #[test]
    fn missing_backend_is_a_typed_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = Session::new(dir.path(), 11_025, None);

        match session.request_state(Mode::Sound) {
            Err(CassetteError::NoAudioDevice) => {},
            other => panic!("unexpected: {:?}", other),
        }
    }
}
