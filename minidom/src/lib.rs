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

//! A small, simple DOM implementation, targeting the subset of XML useful
//! for XMPP: raw namespace prefixes are kept as written rather than
//! resolved away, since a stream parser needs to see `stream:` exactly as
//! a peer sent it.
//!
//! The tree (`Node`) lives in a flat arena rather than `Rc`/`RefCell`
//! linked nodes — see [`tree`] for why. [`Parser`] is the incremental,
//! push-based builder that feeds that arena from a byte stream one `feed()`
//! call at a time, since XMPP stanzas routinely arrive split across
//! transport boundaries.
//!
//! # Example
//!
//! ```
//! use minidom::{Node, Parser};
//!
//! let mut parser = Parser::new("example");
//! parser.feed(b"<message to='juliet@example.com'><body>Hi</body></message>").unwrap();
//! let root = parser.roots().pop().unwrap();
//! assert_eq!(root.get_child("body").unwrap().text(), "Hi");
//! ```

pub mod error;
pub mod escape;
mod parser;
mod serializer;
mod tree;

pub use error::{Error, Result};
pub use escape::escape;
pub use parser::{Dispatch, Handler, NodeBuilder, Parser};
pub use serializer::{to_string, to_string_pretty};
pub use tree::{Node, NodeId, NodeRef};
