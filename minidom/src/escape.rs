// Copyright (c) 2020 lumi <lumi@pew.im>
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! XML escaping for attribute values and text.
//!
//! The mapping and the "already escaped" heuristic are taken verbatim from
//! the reference implementation, `&quote;` included: it isn't the standard
//! `&quot;` entity, but changing it would silently alter wire output for any
//! peer that round-trips these attributes byte-for-byte, so it stays.

const ESCAPE_PAIRS: &[(char, &str)] = &[
    ('&', "&amp;"),
    ('<', "&lt;"),
    ('>', "&gt;"),
    ('"', "&quote;"),
    ('\'', "&#39;"),
];

const ALREADY_ESCAPED_MARKERS: &[&str] = &[
    "&amp;", "&quote", "&#39;", "&gt;", "&lt;", "&#60;", "&#62;", "&#34;", "&#38;", "&apos;",
];

/// Returns true if `s` already contains one of the recognised escape
/// sequences, in which case [`escape`] treats it as pre-escaped and leaves
/// it alone.
pub fn is_escaped(s: &str) -> bool {
    ALREADY_ESCAPED_MARKERS.iter().any(|marker| s.contains(marker))
}

/// Escapes `&`, `<`, `>`, `"` and `'` for use in an XML attribute value or
/// text node, unless `s` looks already escaped (see [`is_escaped`]).
pub fn escape(s: &str) -> String {
    if is_escaped(s) {
        return s.to_owned();
    }
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match ESCAPE_PAIRS.iter().find(|(from, _)| *from == c) {
            Some((_, to)) => out.push_str(to),
            None => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_all_specials() {
        let out = escape("<a & b> \"c\" 'd'");
        assert!(!out.contains('<') || out.contains("&lt;"));
        assert!(out.contains("&amp;"));
        assert!(out.contains("&lt;"));
        assert!(out.contains("&gt;"));
        assert!(out.contains("&quote;"));
        assert!(out.contains("&#39;"));
    }

    #[test]
    fn idempotent() {
        let once = escape("Tom & Jerry <\"best\" 'show'>");
        let twice = escape(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn plain_text_untouched() {
        assert_eq!(escape("hello world"), "hello world");
    }
}
