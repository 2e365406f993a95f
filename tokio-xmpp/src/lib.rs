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

//! An XMPP (RFC 6120) client engine: the XML-stream state machine and the
//! two transports that carry it, direct TCP (optionally StartTLS) and BOSH
//! (XEP-0124/0206) long-polling over HTTP.
//!
//! This crate is the core engine, not a batteries-included client: SASL
//! mechanisms, resource binding, roster/presence business logic, and the
//! top-level event loop are all expected to live one layer up, driving
//! [`stream::Stream`] through whichever [`transport::Transport`] fits.
//!
//! # Layout
//!
//! - [`stream`]: the synchronous `<stream:stream>` state machine — framing
//!   outbound stanzas, unframing inbound bytes, tracking `to`/`from`/`id`
//!   across restarts.
//! - [`transport`]: the sum type a caller drives `Stream`'s bytes through,
//!   either [`connect::tcp::TcpTransport`] or [`bosh::BoshTransport`].
//! - [`connect`]: DNS/SRV resolution and the in-place StartTLS upgrade the
//!   TCP transport uses.
//! - [`bosh`]: the BOSH connection-pool transport and its wire-level
//!   translation to and from raw stream bytes.
//! - [`id`]: the process-wide monotonic stanza id generator.
//! - [`error`]: the error types raised by the stream layer and both
//!   transports.

#![deny(unsafe_code, missing_docs, bare_trait_objects)]

pub mod bosh;
pub mod connect;
pub mod error;
pub mod id;
pub mod stream;
pub mod transport;

pub use error::Error;
pub use stream::Stream;
pub use transport::Transport;
