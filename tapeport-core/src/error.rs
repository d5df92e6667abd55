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

use std::io;
use std::path;

use thiserror::Error;

// Fatal session conditions.  These move the session into the `Failed`
// mode; the messages carry the underlying OS error text, since "couldn't
// read the tape" without the reason is useless in a log.
//
// End of file during decoding is deliberately *not* an error; it simply
// means the tape ran out.
//
#[derive(Debug, Error)]
pub enum CassetteError {
    #[error("couldn't open `{path}': {source}")]
    Open {
        path:   path::PathBuf,
        source: io::Error,
    },

    #[error("cassette i/o error: {0}")]
    Io(#[from] io::Error),

    #[error("unusable wav file: {0}")]
    UnusableWav(String),

    #[error("audio device rate {negotiated}Hz too far from requested {requested}Hz")]
    DeviceRate {
        requested:  u32,
        negotiated: u32,
    },

    #[error("audio device error: {0}")]
    Device(String),

    #[error("no audio device backend is available")]
    NoAudioDevice,

    #[error("couldn't determine the tape image format of `{0}'")]
    UnknownFormat(String),

    #[error("{0} is not implemented")]
    NotImplemented(&'static str),
}
