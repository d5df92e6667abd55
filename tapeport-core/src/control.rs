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

// Between sessions, which tape is "in the deck" and how far it has
// wound lives in a one-line text file, so a user can rewind or swap
// tapes with a text editor while the emulated machine keeps running.
//
// The line is `filename position format_id`, whitespace-separated,
// which means image filenames cannot contain spaces.  Anything
// unreadable or unparsable falls back to a blank default tape with a
// warning; a broken control file must never take the machine down.

use std::fs;
use std::io::Write;
use std::path;

use log::warn;

use crate::codec::Format;
use crate::error::CassetteError;

pub const CONTROL_FILE_NAME:  &str = ".cassette.ctl";
pub const DEFAULT_IMAGE_NAME: &str = "cassette.cas";

#[derive(Clone, Debug, PartialEq)]
pub struct ControlRecord {
    pub filename: path::PathBuf,
    pub position: u64,
    pub format:   Format,
}

impl ControlRecord {
    pub fn fallback() -> ControlRecord {
        ControlRecord {
            filename: path::PathBuf::from(DEFAULT_IMAGE_NAME),
            position: 0,
            format:   Format::Cas,
        }
    }
}

pub struct ControlStore {
    path: path::PathBuf,
}

impl ControlStore {
    pub fn new(control_dir: &path::Path) -> ControlStore {
        ControlStore {
            path: control_dir.join(CONTROL_FILE_NAME),
        }
    }

    pub fn path(&self) -> &path::Path {
        &self.path
    }

    /// Read the record, falling back to the default tape on any
    /// trouble.  Never fails; the deck has to keep working with no
    /// control file at all (first run).
    pub fn load(&self) -> ControlRecord {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(_) => {
                return ControlRecord::fallback();
            },
        };

        match parse_line(&text) {
            Some(record) => record,
            None => {
                warn!("Malformed cassette control file `{}', falling back to `{}'.",
                      self.path.display(), DEFAULT_IMAGE_NAME);
                ControlRecord::fallback()
            },
        }
    }

    pub fn save(&self, record: &ControlRecord) -> Result<(), CassetteError> {
        let mut file = fs::File::create(&self.path)
            .map_err(|error| CassetteError::Open {
                path:   self.path.clone(),
                source: error,
            })?;

        writeln!(file, "{} {} {}", record.filename.display(),
                 record.position, record.format.id())?;
        Ok(())
    }
}

fn parse_line(text: &str) -> Option<ControlRecord> {
    let mut fields = text.split_whitespace();

    let filename = fields.next()?;
    let position = fields.next()?.parse::<u64>().ok()?;
    let format   = Format::from_id(fields.next()?.parse::<u32>().ok()?)?;

    Some(ControlRecord {
        filename: path::PathBuf::from(filename),
        position: position,
        format:   format,
    })
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_the_default_tape() {
        let dir = tempfile::tempdir().unwrap();
        let store = ControlStore::new(dir.path());

        let record = store.load();
        assert_eq!(record, ControlRecord::fallback());
        assert_eq!(record.filename, path::PathBuf::from("cassette.cas"));
        assert_eq!(record.format, Format::Cas);
    }

    #[test]
    fn records_survive_a_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = ControlStore::new(dir.path());

        let record = ControlRecord {
            filename: path::PathBuf::from("adventure.cpt"),
            position: 1234,
            format:   Format::Cpt,
        };
        store.save(&record).unwrap();

        assert_eq!(store.load(), record);
    }

    #[test]
    fn garbage_yields_the_default_tape() {
        let dir = tempfile::tempdir().unwrap();
        let store = ControlStore::new(dir.path());

        fs::write(store.path(), "what even is this\n").unwrap();
        assert_eq!(store.load(), ControlRecord::fallback());

        fs::write(store.path(), "tape.cas 12 99\n").unwrap();
        assert_eq!(store.load(), ControlRecord::fallback());

        fs::write(store.path(), "tape.cas -5 1\n").unwrap();
        assert_eq!(store.load(), ControlRecord::fallback());
    }

    #[test]
    fn hand_edited_lines_parse() {
        assert_eq!(parse_line("  game.wav   44   3 \n"),
                   Some(ControlRecord {
                       filename: path::PathBuf::from("game.wav"),
                       position: 44,
                       format:   Format::Wav,
                   }));
    }
}
