//! Prescanners: the byte sources a [`Scanner`](crate::Scanner) reads from.
//!
//! A prescanner appends decoded input to the scanner's working buffer on
//! demand. [`ByteSource`] passes bytes through unchanged; [`UnicodeEscapes`]
//! decodes `\uXXXX` escapes the way Java source files spell them.

use std::io::{self, Read};

/// Default number of bytes requested from the underlying reader per fill.
pub const DEFAULT_CHUNK_SIZE: usize = 4096;

pub trait Prescanner {
    /// Appends more decoded input to `buf` and returns the number of bytes
    /// appended. `0` means the input is exhausted.
    fn fill(&mut self, buf: &mut Vec<u8>) -> io::Result<usize>;

    /// Drains messages about malformed input seen since the last call.
    fn take_malformed(&mut self) -> Vec<String> {
        Vec::new()
    }
}

impl<P: Prescanner + ?Sized> Prescanner for Box<P> {
    fn fill(&mut self, buf: &mut Vec<u8>) -> io::Result<usize> {
        (**self).fill(buf)
    }

    fn take_malformed(&mut self) -> Vec<String> {
        (**self).take_malformed()
    }
}

/// Reads `size` bytes from `reader` into the tail of `buf`, retrying on
/// [`io::ErrorKind::Interrupted`].
fn read_chunk<R: Read>(reader: &mut R, buf: &mut Vec<u8>, size: usize) -> io::Result<usize> {
    let old = buf.len();
    buf.resize(old + size, 0);
    loop {
        match reader.read(&mut buf[old..]) {
            Ok(n) => {
                buf.truncate(old + n);
                return Ok(n);
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                buf.truncate(old);
                return Err(e);
            }
        }
    }
}

/// Plain byte stream.
#[derive(Debug)]
pub struct ByteSource<R> {
    reader: R,
    chunk_size: usize,
}

impl<R: Read> ByteSource<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    pub fn into_inner(self) -> R {
        self.reader
    }
}

impl<R: Read> Prescanner for ByteSource<R> {
    fn fill(&mut self, buf: &mut Vec<u8>) -> io::Result<usize> {
        read_chunk(&mut self.reader, buf, self.chunk_size)
    }
}

/// Decodes Java-style `\uXXXX` escapes.
///
/// A backslash starts an escape only when preceded by an even number of
/// backslashes, so `\\u0041` stays as written. Any number of `u`s may follow
/// the backslash. Surrogate pairs are combined and the result is emitted as
/// UTF-8. Malformed escapes are passed through verbatim; unpaired surrogates
/// become U+FFFD. Both are recorded for [`take_malformed`](Prescanner::take_malformed).
#[derive(Debug)]
pub struct UnicodeEscapes<R> {
    reader: R,
    chunk_size: usize,
    raw: Vec<u8>,
    raw_done: bool,
    backslashes: usize,
    high: Option<u16>,
    malformed: Vec<String>,
}

impl<R: Read> UnicodeEscapes<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            chunk_size: DEFAULT_CHUNK_SIZE,
            raw: Vec::new(),
            raw_done: false,
            backslashes: 0,
            high: None,
            malformed: Vec::new(),
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    fn flush_high(&mut self, out: &mut Vec<u8>) {
        if let Some(h) = self.high.take() {
            self.malformed
                .push(format!("unpaired high surrogate \\u{h:04X}"));
            push_char(out, char::REPLACEMENT_CHARACTER);
        }
    }

    fn emit_byte(&mut self, out: &mut Vec<u8>, b: u8) {
        self.flush_high(out);
        out.push(b);
        if b == b'\\' {
            self.backslashes += 1;
        } else {
            self.backslashes = 0;
        }
    }

    fn emit_unit(&mut self, out: &mut Vec<u8>, unit: u16) {
        match unit {
            0xD800..=0xDBFF => {
                self.flush_high(out);
                self.high = Some(unit);
            }
            0xDC00..=0xDFFF => match self.high.take() {
                Some(h) => {
                    let c = 0x10000 + ((u32::from(h) - 0xD800) << 10) + (u32::from(unit) - 0xDC00);
                    push_char(out, char::from_u32(c).unwrap_or(char::REPLACEMENT_CHARACTER));
                }
                None => {
                    self.malformed
                        .push(format!("unpaired low surrogate \\u{unit:04X}"));
                    push_char(out, char::REPLACEMENT_CHARACTER);
                }
            },
            _ => {
                self.flush_high(out);
                push_char(
                    out,
                    char::from_u32(u32::from(unit)).unwrap_or(char::REPLACEMENT_CHARACTER),
                );
            }
        }
        self.backslashes = 0;
    }

    /// Decodes as much of the raw buffer as can be decided without more input.
    fn decode(&mut self, out: &mut Vec<u8>) {
        let raw = std::mem::take(&mut self.raw);
        let len = raw.len();
        let mut i = 0;
        while i < len {
            let b = raw[i];
            if b != b'\\' || self.backslashes % 2 == 1 {
                self.emit_byte(out, b);
                i += 1;
                continue;
            }
            let mut j = i + 1;
            if j == len && !self.raw_done {
                break;
            }
            if j == len || raw[j] != b'u' {
                self.emit_byte(out, b);
                i += 1;
                continue;
            }
            while j < len && raw[j] == b'u' {
                j += 1;
            }
            if j + 4 > len && !self.raw_done {
                break;
            }
            let digits = &raw[j..(j + 4).min(len)];
            let unit = (digits.len() == 4)
                .then(|| std::str::from_utf8(digits).ok())
                .flatten()
                .and_then(|s| u16::from_str_radix(s, 16).ok());
            match unit {
                Some(unit) if digits.iter().all(u8::is_ascii_hexdigit) => {
                    self.emit_unit(out, unit);
                    i = j + 4;
                }
                _ => {
                    self.malformed.push(format!(
                        "malformed unicode escape {:?}",
                        String::from_utf8_lossy(&raw[i..(j + 4).min(len)])
                    ));
                    for &c in &raw[i..j] {
                        self.emit_byte(out, c);
                    }
                    // the escape's backslash does not pair with a later one
                    self.backslashes = 0;
                    i = j;
                }
            }
        }
        self.raw = raw;
        self.raw.drain(..i);
        if self.raw_done && self.raw.is_empty() {
            self.flush_high(out);
        }
    }
}

impl<R: Read> Prescanner for UnicodeEscapes<R> {
    fn fill(&mut self, buf: &mut Vec<u8>) -> io::Result<usize> {
        let old = buf.len();
        loop {
            if !self.raw_done {
                let n = read_chunk(&mut self.reader, &mut self.raw, self.chunk_size)?;
                if n == 0 {
                    self.raw_done = true;
                }
            }
            self.decode(buf);
            if buf.len() > old || (self.raw_done && self.raw.is_empty()) {
                return Ok(buf.len() - old);
            }
        }
    }

    fn take_malformed(&mut self) -> Vec<String> {
        std::mem::take(&mut self.malformed)
    }
}

fn push_char(out: &mut Vec<u8>, c: char) {
    let mut tmp = [0u8; 4];
    out.extend_from_slice(c.encode_utf8(&mut tmp).as_bytes());
}
