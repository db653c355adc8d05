//! Minimal G-code tokenizer shared by the parser, generator and validator
//!
//! Only what the resume pipeline needs: splitting off `;` comments, reading the
//! leading command code (`G1`, `M104`, `G28.1`) and walking `<letter><number>`
//! words, including compact forms such as `G1X10Y5Z0.3`. Extended (macro)
//! commands like `SET_HEATER_TEMPERATURE HEATER=heater_bed TARGET=60` are
//! recognised so callers can treat them separately.

use std::ops::Range;

/// A leading command code such as `G1`, `M104` or `G29.1`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandCode {
    /// Upper-cased command letter
    pub letter: char,
    /// Integer part of the code
    pub number: u32,
    /// Fractional sub-code (`G29.1` -> `Some(1)`)
    pub subcode: Option<u32>,
}

impl CommandCode {
    /// True for `G0`..`G3`
    pub fn is_motion(&self) -> bool {
        self.letter == 'G' && self.number <= 3 && self.subcode.is_none()
    }

    /// True when this is exactly `<letter><number>` with no sub-code
    pub fn is(&self, letter: char, number: u32) -> bool {
        self.letter == letter && self.number == number && self.subcode.is_none()
    }
}

impl std::fmt::Display for CommandCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.subcode {
            Some(sub) => write!(f, "{}{}.{}", self.letter, self.number, sub),
            None => write!(f, "{}{}", self.letter, self.number),
        }
    }
}

/// One `<letter><number>` word. `value` is `None` for bare axis letters
/// (`G28 X Y`) and for malformed numbers.
#[derive(Debug, Clone, PartialEq)]
pub struct Word {
    /// Upper-cased word letter
    pub letter: char,
    /// Parsed numeric value
    pub value: Option<f64>,
    /// Byte range of the whole word in the tokenized string
    pub span: Range<usize>,
}

/// Return the command portion of a line: everything before the first `;`,
/// with trailing whitespace removed. Leading whitespace is kept so that word
/// spans index into the original line.
pub fn code_part(line: &str) -> &str {
    match line.find(';') {
        Some(idx) => line[..idx].trim_end(),
        None => line.trim_end(),
    }
}

/// Parse the leading command code of a command string
pub fn command_code(code: &str) -> Option<CommandCode> {
    let trimmed = code.trim_start().as_bytes();
    let letter = *trimmed.first()?;
    if !letter.is_ascii_alphabetic() {
        return None;
    }

    let digits_end = trimmed[1..]
        .iter()
        .position(|b| !b.is_ascii_digit())
        .map_or(trimmed.len(), |p| p + 1);
    if digits_end == 1 {
        return None;
    }
    let number = std::str::from_utf8(&trimmed[1..digits_end]).ok()?.parse().ok()?;

    let mut subcode = None;
    if trimmed.get(digits_end) == Some(&b'.') {
        let sub_end = trimmed[digits_end + 1..]
            .iter()
            .position(|b| !b.is_ascii_digit())
            .map_or(trimmed.len(), |p| p + digits_end + 1);
        if sub_end > digits_end + 1 {
            subcode = std::str::from_utf8(&trimmed[digits_end + 1..sub_end])
                .ok()?
                .parse()
                .ok();
        }
    }

    Some(CommandCode {
        letter: letter.to_ascii_uppercase() as char,
        number,
        subcode,
    })
}

/// True for extended commands whose name is a word rather than a code,
/// e.g. `PRINT_START`, `SET_HEATER_TEMPERATURE`, `BED_MESH_PROFILE`
pub fn is_extended_command(code: &str) -> bool {
    let mut bytes = code.trim_start().bytes();
    match (bytes.next(), bytes.next()) {
        (Some(a), Some(b)) => a.is_ascii_alphabetic() && (b.is_ascii_alphabetic() || b == b'_'),
        _ => false,
    }
}

/// Iterate over the words of a command string
pub fn words(code: &str) -> Words<'_> {
    Words { src: code, pos: 0 }
}

/// Iterate over the parameter words, skipping the leading command code
pub fn params(code: &str) -> std::iter::Skip<Words<'_>> {
    words(code).skip(1)
}

/// First numeric value of a parameter letter
pub fn param(code: &str, letter: char) -> Option<f64> {
    params(code)
        .find(|w| w.letter == letter && w.value.is_some())
        .and_then(|w| w.value)
}

/// True if the parameter letter appears, with or without a value
pub fn has_param(code: &str, letter: char) -> bool {
    params(code).any(|w| w.letter == letter)
}

/// Iterator returned by [`words`]
#[derive(Debug, Clone)]
pub struct Words<'a> {
    src: &'a str,
    pos: usize,
}

fn is_number_start(b: u8) -> bool {
    b.is_ascii_digit() || matches!(b, b'+' | b'-' | b'.')
}

impl Iterator for Words<'_> {
    type Item = Word;

    fn next(&mut self) -> Option<Word> {
        let bytes = self.src.as_bytes();
        while self.pos < bytes.len() {
            let start = self.pos;
            self.pos += 1;
            if !bytes[start].is_ascii_alphabetic() {
                continue;
            }
            let letter = bytes[start].to_ascii_uppercase() as char;

            let mut i = self.pos;
            while i < bytes.len() && (bytes[i] == b' ' || bytes[i] == b'\t') {
                i += 1;
            }
            if i < bytes.len() && is_number_start(bytes[i]) {
                let num_start = i;
                while i < bytes.len() && is_number_start(bytes[i]) {
                    i += 1;
                }
                self.pos = i;
                return Some(Word {
                    letter,
                    value: self.src[num_start..i].parse().ok(),
                    span: start..i,
                });
            }

            return Some(Word {
                letter,
                value: None,
                span: start..self.pos,
            });
        }
        None
    }
}
