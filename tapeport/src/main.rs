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

// Command-line tape image tool.  Converts between the tape image
// formats the cassette engine records, and plays images out to the
// sound card.  Every format reduces to the same stream of line
// transitions, so one pump loop drives any pairing.

mod sdl_audio;
mod util;

use std::env;
use std::fs;
use std::path::Path;
use std::process;

use getopts::Options;
use log::{info, error};

use tapeport_core::audio::{AudioBackend, Direction};
use tapeport_core::codec::{self, DecodeContext, Format, TransitionCodec,
                           WriteOp};
use tapeport_core::error::CassetteError;
use tapeport_core::noise::NoiseFloor;
use tapeport_core::roundoff::Roundoff;
use tapeport_core::session::DEFAULT_SAMPLE_RATE;
use tapeport_core::timing::EventQueue;

fn main() {
    process::exit(run());
}

fn run() -> i32 {
    if let Err(cause) = util::LOGGER.set_logger() {
        eprintln!("Failed to install the logger: {}", cause);
        return 1;
    }

    let args: Vec<String> = env::args().collect();
    let brief = format!("Usage: {} [options]", args[0]);

    let mut opts = Options::new();
    opts.optopt("i", "input",      "input tape image",                "FILE");
    opts.optopt("o", "output",     "output tape image",               "FILE");
    opts.optopt("",  "in-format",  "input image format \
                                    (cas, cpt, wav, debug)",          "FORMAT");
    opts.optopt("",  "out-format", "output image format \
                                    (cas, cpt, wav, debug)",          "FORMAT");
    opts.optopt("",  "rate",       "sample rate for wave output \
                                    and playback",                    "HZ");
    opts.optopt("",  "speed",      "recording speed of cas images \
                                    (low, high)",                     "SPEED");
    opts.optopt("",  "play",       "play a tape image out loud",      "FILE");
    opts.optflag("h", "help",      "show this help message");
    opts.optflag("v", "version",   "show the program version");

    let matches = match opts.parse(&args[1..]) {
        Ok(matches) => matches,
        Err(cause) => {
            error!("{}.", cause);
            eprint!("{}", opts.usage(&brief));
            return 1;
        },
    };
    if matches.opt_present("h") {
        print!("{}", opts.usage(&brief));
        return 0;
    }
    if matches.opt_present("v") {
        println!("tapeport {}", env!("CARGO_PKG_VERSION"));
        return 0;
    }

    let rate = match matches.opt_str("rate") {
        Some(text) => {
            match text.parse::<u32>() {
                Ok(rate) if rate > 0 => rate,
                _ => {
                    error!("Invalid sample rate `{}'.", text);
                    return 1;
                },
            }
        },
        None => DEFAULT_SAMPLE_RATE,
    };
    let high_speed = match matches.opt_str("speed").as_deref() {
        Some("low") | None => false,
        Some("high")       => true,
        Some(text) => {
            error!("Invalid speed `{}', expected `low' or `high'.", text);
            return 1;
        },
    };

    let outcome = if let Some(file) = matches.opt_str("play") {
        play(&util::resolve_path(&file),
             matches.opt_str("in-format").as_deref(), rate, high_speed)
    } else if let (Some(input), Some(output)) =
                  (matches.opt_str("i"), matches.opt_str("o")) {
        convert(&util::resolve_path(&input),
                matches.opt_str("in-format").as_deref(),
                &util::resolve_path(&output),
                matches.opt_str("out-format").as_deref(),
                rate, high_speed)
    } else {
        eprint!("{}", opts.usage(&brief));
        return 1;
    };

    match outcome {
        Ok(())     => 0,
        Err(cause) => {
            error!("{}.", cause);
            1
        },
    }
}

fn convert(input_path: &Path, in_tag: Option<&str>,
           output_path: &Path, out_tag: Option<&str>,
           rate: u32, high_speed: bool) -> Result<(), CassetteError> {
    let in_format  = pick_format(in_tag, input_path)?;
    let out_format = pick_format(out_tag, output_path)?;

    let mut input  = open_input(input_path, in_format)?;
    let mut output = open_output(output_path, out_format, rate)?;

    info!("Converting `{}' ({}) to `{}' ({}).",
          input_path.display(), in_format.tag(),
          output_path.display(), out_format.tag());

    pump(&mut *input, &mut *output, high_speed)?;
    input.close()?;
    let written = output.close()?;

    info!("Wrote {} bytes.", written);
    Ok(())
}

fn play(path: &Path, tag: Option<&str>, rate: u32, high_speed: bool)
        -> Result<(), CassetteError> {
    let format = pick_format(tag, path)?;
    let mut input = open_input(path, format)?;

    let mut backend = sdl_audio::SdlAudioBackend::new()?;
    let device = backend.open(Direction::Playback, rate)?;
    let negotiated = device.sample_rate();
    let mut output = codec::LiveAudioCodec::new(device, false);

    info!("Playing `{}' ({}) at {} Hz.", path.display(), format.tag(),
          negotiated);

    pump(&mut *input, &mut output, high_speed)?;
    input.close()?;
    output.close()?;
    Ok(())
}

// Decode transitions off one codec and feed them to another.  Decoders
// may report a scan that ends on the value it started at (the analog
// scanner gives up after a hundredth of a second of no change); those
// get folded into the delta of the next real transition.
fn pump(input: &mut dyn TransitionCodec, output: &mut dyn TransitionCodec,
        high_speed: bool) -> Result<(), CassetteError> {
    let queue = EventQueue::new();
    let mut noise = NoiseFloor::new();
    let mut roundoff = Roundoff::new();

    let mut current = 0u8;
    let mut carry   = 0.0f64;
    loop {
        let decoded = {
            let mut ctx = DecodeContext {
                current:    current,
                high_speed: high_speed,
                noise:      &mut noise,
                timebase:   &queue,
            };
            input.decode(&mut ctx)?
        };
        match decoded {
            Some((next, delta_us)) => {
                carry += delta_us;
                if next != current {
                    output.encode(WriteOp::Transition(next), current, carry,
                                  &mut roundoff)?;
                    current = next;
                    carry = 0.0;
                }
            },
            None => break,
        }
    }
    output.encode(WriteOp::Flush, current, carry, &mut roundoff)?;
    Ok(())
}

fn pick_format(tag: Option<&str>, path: &Path)
               -> Result<Format, CassetteError> {
    if let Some(tag) = tag {
        return match Format::from_tag(tag) {
            Some(format) => Ok(format),
            None => {
                Err(CassetteError::UnknownFormat(tag.to_owned()))
            },
        };
    }
    let extension = path.extension()
                        .and_then(|extension| extension.to_str())
                        .map(|extension| extension.to_lowercase());
    match extension.as_deref() {
        Some("cas") | Some("bin") => Ok(Format::Cas),
        Some("cpt")               => Ok(Format::Cpt),
        Some("wav")               => Ok(Format::Wav),
        Some("txt")               => Ok(Format::Debug),
        _ => Err(CassetteError::UnknownFormat(
                 path.display().to_string())),
    }
}

fn open_input(path: &Path, format: Format)
              -> Result<Box<dyn TransitionCodec>, CassetteError> {
    let file = fs::File::open(path)
        .map_err(|cause| CassetteError::Open {
            path:   path.to_path_buf(),
            source: cause,
        })?;

    match format {
        Format::Cas   => Ok(Box::new(codec::BitstreamCodec::new(file))),
        Format::Cpt   => Ok(Box::new(codec::PulseTrainCodec::new(file))),
        Format::Debug => Ok(Box::new(codec::DebugTextCodec::new(file))),
        Format::Wav   => Ok(Box::new(codec::PcmCodec::open_read(file, 0)?)),
        Format::Direct | Format::Autodetect => {
            Err(CassetteError::NotImplemented(
                "this format outside a live cassette session"))
        },
    }
}

fn open_output(path: &Path, format: Format, rate: u32)
               -> Result<Box<dyn TransitionCodec>, CassetteError> {
    let file = fs::OpenOptions::new()
        .read(true).write(true).create(true).truncate(true)
        .open(path)
        .map_err(|cause| CassetteError::Open {
            path:   path.to_path_buf(),
            source: cause,
        })?;

    match format {
        Format::Cas   => Ok(Box::new(codec::BitstreamCodec::new(file))),
        Format::Cpt   => Ok(Box::new(codec::PulseTrainCodec::new(file))),
        Format::Debug => Ok(Box::new(codec::DebugTextCodec::new(file))),
        Format::Wav   => Ok(Box::new(codec::PcmCodec::open_write(file, 0,
                                                                 rate)?)),
        Format::Direct | Format::Autodetect => {
            Err(CassetteError::NotImplemented(
                "this format outside a live cassette session"))
        },
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    use std::io::{Read, Write};

    #[test]
    fn formats_are_guessed_from_the_extension() {
        assert_eq!(pick_format(None, Path::new("game.cas")).unwrap(),
                   Format::Cas);
        assert_eq!(pick_format(None, Path::new("game.CPT")).unwrap(),
                   Format::Cpt);
        assert_eq!(pick_format(None, Path::new("game.wav")).unwrap(),
                   Format::Wav);
        assert!(pick_format(None, Path::new("game.mp3")).is_err());

        // An explicit tag wins over the extension.
        assert_eq!(pick_format(Some("debug"), Path::new("game.cas")).unwrap(),
                   Format::Debug);
        assert!(pick_format(Some("mp3"), Path::new("game.cas")).is_err());
    }

    #[test]
    fn the_pump_replays_transitions_into_the_other_codec() {
        let dir = tempfile::tempdir().unwrap();
        let cpt_path = dir.path().join("tape.cpt");
        let txt_path = dir.path().join("tape.txt");

        // Rise after 100us, fall after 50 more.
        fs::File::create(&cpt_path).unwrap()
            .write_all(&[0x91, 0x01, 0xCA, 0x00]).unwrap();

        convert(&cpt_path, None, &txt_path, None,
                DEFAULT_SAMPLE_RATE, false).unwrap();

        let mut text = String::new();
        fs::File::open(&txt_path).unwrap()
            .read_to_string(&mut text).unwrap();
        assert_eq!(text, "1 100\n2 50\n2 0\n");
    }
}
