// Copyright (c) 2020 lumi <lumi@pew.im>
// Copyright (c) 2020 Emmanuel Gil Peyrot <linkmauve@linkmauve.fr>
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! A process-wide monotonic id generator for outbound stanzas.
//!
//! `message`/`presence`/`iq` stanzas that don't already carry an `id`
//! attribute get one assigned by [`next_id`] when they're serialized via
//! [`crate::stream::Stream::sendnode`]. The counter is shared across every
//! `Stream` in the process — two streams handed to the same process never
//! hand out the same id — which is why it lives here as a single static
//! rather than as a field on `Stream`.

use std::sync::atomic::{AtomicU64, Ordering};

static COUNTER: AtomicU64 = AtomicU64::new(1);

/// Returns the next id in the process-wide monotonic sequence, formatted
/// as a decimal string suitable for an `id="…"` attribute.
///
/// Successive calls, from any thread and any `Stream`, always compare
/// greater than every prior call (P3).
pub fn next_id() -> String {
    COUNTER.fetch_add(1, Ordering::Relaxed).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strictly_increasing_across_calls() {
        let a: u64 = next_id().parse().unwrap();
        let b: u64 = next_id().parse().unwrap();
        assert!(b > a);
    }
}
