//! Variable expansion performed on the raw command line before tokenizing.
//!
//! Supported forms: `$$`, `$?`, `$NAME`, `${NAME}` and `${NAME:-default}`.
//! Nothing is substituted inside single quotes; double quotes allow
//! substitution. Quote characters are copied through untouched so the
//! tokenizer can still see them.

use crate::command::ExitCode;
use crate::env::VarLookup;

/// Size of the line buffer; expanded output holds at most `MAX_LINE - 1` bytes.
pub const MAX_LINE: usize = 4096;

/// Rewrites raw input text, substituting variable references.
pub struct Expander<'a> {
    vars: &'a dyn VarLookup,
    pid: u32,
    last_status: ExitCode,
    capacity: usize,
}

impl<'a> Expander<'a> {
    /// Creates an expander that reads variables from `vars`, substitutes
    /// `pid` for `$$` and `last_status` for `$?`.
    pub fn new(vars: &'a dyn VarLookup, pid: u32, last_status: ExitCode) -> Self {
        Self {
            vars,
            pid,
            last_status,
            capacity: MAX_LINE - 1,
        }
    }

    /// Overrides the output capacity in bytes.
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Expands `raw`.
    ///
    /// Output that would exceed the capacity is silently truncated on a
    /// character boundary; this is a degraded result, not an error.
    pub fn expand(&self, raw: &str) -> String {
        let mut out = Bounded::new(self.capacity);
        let mut in_single = false;
        let mut in_double = false;
        let mut rest = raw;

        while !out.is_full() {
            let Some(c) = rest.chars().next() else {
                break;
            };
            rest = &rest[c.len_utf8()..];
            match c {
                '\'' if !in_double => {
                    in_single = !in_single;
                    out.push(c);
                }
                '"' if !in_single => {
                    in_double = !in_double;
                    out.push(c);
                }
                '$' if !in_single => rest = self.substitute(rest, &mut out),
                c => out.push(c),
            }
        }
        out.into_string()
    }

    /// Handles the text following a `$`; returns the unconsumed remainder.
    fn substitute<'s>(&self, after: &'s str, out: &mut Bounded) -> &'s str {
        match after.as_bytes().first() {
            Some(b'$') => {
                out.push_str(&self.pid.to_string());
                return &after[1..];
            }
            Some(b'?') => {
                out.push_str(&self.last_status.to_string());
                return &after[1..];
            }
            Some(b'{') => {
                if let Some(rest) = self.braced(&after[1..], out) {
                    return rest;
                }
            }
            Some(&b) if b.is_ascii_alphabetic() || b == b'_' => {
                let len = name_len(after);
                if let Some(value) = self.vars.var(&after[..len]) {
                    out.push_str(&value);
                }
                return &after[len..];
            }
            _ => {}
        }
        out.push('$');
        after
    }

    /// `inner` is the text after `${`. Returns `None` when the braces do not
    /// form a recognized pattern, in which case the `$` is literal.
    fn braced<'s>(&self, inner: &'s str, out: &mut Bounded) -> Option<&'s str> {
        let name_end = name_len(inner);
        let name = &inner[..name_end];
        let tail = &inner[name_end..];

        if let Some(fallback) = tail.strip_prefix(":-") {
            // The default ends at the first `}`; without one it runs to the
            // end of the input.
            let (default, rest) = match fallback.find('}') {
                Some(close) => (&fallback[..close], &fallback[close + 1..]),
                None => (fallback, ""),
            };
            match self.vars.var(name).filter(|v| !v.is_empty()) {
                Some(value) => out.push_str(&value),
                None => out.push_str(&self.expand(default)),
            }
            return Some(rest);
        }

        let rest = tail.strip_prefix('}')?;
        if let Some(value) = self.vars.var(name) {
            out.push_str(&value);
        }
        Some(rest)
    }
}

/// Length of the leading run of ASCII alphanumerics and underscores.
fn name_len(s: &str) -> usize {
    s.bytes()
        .take_while(|b| b.is_ascii_alphanumeric() || *b == b'_')
        .count()
}

/// Output buffer with a hard byte capacity.
struct Bounded {
    buf: String,
    capacity: usize,
    full: bool,
}

impl Bounded {
    fn new(capacity: usize) -> Self {
        Self {
            buf: String::new(),
            capacity,
            full: capacity == 0,
        }
    }

    fn is_full(&self) -> bool {
        self.full
    }

    fn push(&mut self, c: char) {
        if self.full {
            return;
        }
        if self.buf.len() + c.len_utf8() > self.capacity {
            self.full = true;
            return;
        }
        self.buf.push(c);
        if self.buf.len() == self.capacity {
            self.full = true;
        }
    }

    fn push_str(&mut self, s: &str) {
        for c in s.chars() {
            if self.full {
                break;
            }
            self.push(c);
        }
    }

    fn into_string(self) -> String {
        self.buf
    }
}
