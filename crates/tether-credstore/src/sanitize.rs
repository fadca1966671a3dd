// SPDX-FileCopyrightText: 2026 Tether Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Credential key to file name mapping.
//!
//! Rules, applied in order:
//!
//! 1. `::` becomes `__`
//! 2. `@` becomes `_at_`
//! 3. characters that are illegal in file names (`/ \ : * ? " < > |` and
//!    control characters) become `%XX`, one escape per UTF-8 byte
//! 4. the names `.` and `..` become `%2E` and `%2E%2E`
//!
//! No substitute contains a character that any rule rewrites, so the mapping
//! is idempotent. It is reversible, and therefore collision-free, for keys that
//! contain no `%` and whose underscores sit between alphanumerics without
//! starting an `_at` sequence. Every key the pairing protocol produces
//! (`pre-key-7`, `session-1555:3@s.whatsapp.net`, `sender-key-g@g.us::u@s.whatsapp.net`,
//! `app-state-sync-version-critical_block`) satisfies that.
//!
//! Case is preserved, so distinctness assumes a case-sensitive filesystem.
//! App-state sync key ids are base64 and can differ only in case; on a
//! case-insensitive volume (default APFS, NTFS) two such keys share one file
//! and the later write wins. Point `credentials.root_dir` at a case-sensitive
//! volume, or use the redis backend there.

use std::fmt::Write;

fn is_illegal(ch: char) -> bool {
    matches!(ch, '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|') || ch.is_control()
}

/// Map a credential key to a safe file stem.
pub fn sanitize(key: &str) -> String {
    if key == "." || key == ".." {
        return "%2E".repeat(key.len());
    }

    let replaced = key.replace("::", "__").replace('@', "_at_");
    let mut out = String::with_capacity(replaced.len());
    let mut buf = [0u8; 4];
    for ch in replaced.chars() {
        if is_illegal(ch) {
            for byte in ch.encode_utf8(&mut buf).bytes() {
                let _ = write!(out, "%{byte:02X}");
            }
        } else {
            out.push(ch);
        }
    }
    out
}

/// Invert [`sanitize`] for keys in the reversible domain.
///
/// Returns `None` when the input holds a malformed escape.
pub fn unsanitize(name: &str) -> Option<String> {
    let bytes = name.as_bytes();
    let mut out: Vec<u8> = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        let rest = &bytes[i..];
        if rest.starts_with(b"_at_") {
            out.push(b'@');
            i += 4;
        } else if rest.starts_with(b"__") {
            out.extend_from_slice(b"::");
            i += 2;
        } else if rest[0] == b'%' {
            let hex = std::str::from_utf8(rest.get(1..3)?).ok()?;
            out.push(u8::from_str_radix(hex, 16).ok()?);
            i += 3;
        } else {
            out.push(rest[0]);
            i += 1;
        }
    }
    String::from_utf8(out).ok()
}
