// Copyright (c) 2020 lumi <lumi@pew.im>
// Copyright (c) 2020 Emmanuel Gil Peyrot <linkmauve@linkmauve.fr>
// Copyright (c) 2020 Bastien Orivel <eijebong+minidom@bananium.fr>
// Copyright (c) 2020 Astro <astro@spaceboyz.net>
// Copyright (c) 2020 Maxime “pep” Buquet <pep@bouah.net>
// Copyright (c) 2020 Matt Bilker <me@mbilker.us>
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Provides an error type for this crate.

use std::io;

use core::{error::Error as StdError, fmt};

/// Our main error type.
#[derive(Debug)]
pub enum Error {
    /// I/O error from accessing the source or destination.
    Io(io::Error),

    /// The byte stream fed to the parser does not form well-formed XML:
    /// an unescaped `<`, a tag that never closes, a mismatched end tag,
    /// an attribute without a value, and so on.
    Syntax(String),

    /// The root element of a parsed document was not the expected
    /// `<stream:stream>`.
    UnexpectedRoot,

    /// More than one top-level element was produced by a single feed of
    /// data where only one was expected.
    MultipleRoots,

    /// An end tag was seen that does not match any currently open start
    /// tag.
    UnbalancedTags,

    /// A registered start/end handler aborted parsing with its own error
    /// (e.g. a stream-layer protocol violation noticed mid-document).
    Handler(Box<dyn StdError + Send + Sync>),
}

impl StdError for Error {
    fn cause(&self) -> Option<&dyn StdError> {
        match self {
            Error::Io(e) => Some(e),
            Error::Syntax(_) => None,
            Error::UnexpectedRoot => None,
            Error::MultipleRoots => None,
            Error::UnbalancedTags => None,
            Error::Handler(e) => Some(e.as_ref()),
        }
    }
}

impl From<io::Error> for Error {
    fn from(other: io::Error) -> Self {
        Self::Io(other)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Io(e) => write!(fmt, "I/O error: {}", e),
            Error::Syntax(msg) => write!(fmt, "malformed XML: {}", msg),
            Error::UnexpectedRoot => write!(fmt, "unexpected root element"),
            Error::MultipleRoots => write!(fmt, "more than one root element in a single parse"),
            Error::UnbalancedTags => write!(fmt, "end tag does not match any open start tag"),
            Error::Handler(e) => write!(fmt, "handler error: {}", e),
        }
    }
}

/// Our simplified Result type.
pub type Result<T> = ::core::result::Result<T, Error>;
