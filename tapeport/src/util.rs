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

use std::path::PathBuf;

use log::{Record, Level, LevelFilter, Metadata};

// A command-line tool has no message console to collect into; log
// records simply go to the standard error stream, info-level ones
// without the level prefix.
//
pub struct StderrLogger;

pub static LOGGER: StderrLogger = StderrLogger;

impl StderrLogger {
    pub fn set_logger(&'static self) -> Result<(), log::SetLoggerError> {
        log::set_logger(self)?;
        log::set_max_level(LevelFilter::Info);
        Ok(())
    }
}

impl log::Log for StderrLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= Level::Info
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            if record.level() == Level::Info {
                eprintln!("{}", record.args());
            } else {
                eprintln!("{}: {}", record.level(), record.args());
            }
        }
    }

    fn flush(&self) {}
}

// Shells don't expand a `~/' that arrives inside an option argument,
// so do it here.
//
pub fn resolve_path(input: &str) -> PathBuf {
    if input == "~" || input.starts_with("~/") {
        if let Some(home_dir) = home::home_dir() {
            return home_dir.join(input.trim_start_matches("~/"));
        }
    }
    PathBuf::from(input)
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_paths_pass_through() {
        assert_eq!(resolve_path("tape.cas"), PathBuf::from("tape.cas"));
        assert_eq!(resolve_path("/tmp/tape.cas"),
                   PathBuf::from("/tmp/tape.cas"));
    }

    #[test]
    fn tilde_prefix_lands_in_the_home_directory() {
        if let Some(home_dir) = home::home_dir() {
            assert_eq!(resolve_path("~/tape.cas"), home_dir.join("tape.cas"));
        }
    }
}
