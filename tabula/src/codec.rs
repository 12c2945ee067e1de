//! Binary persistence of scanner and parser tables.
//!
//! A table file is a sequence of blocks. Each block starts with a 4-byte magic
//! and a format version, followed by the table body. Integers are stored as
//! little-endian `u32`/`i32`, strings as a `u32` byte length followed by UTF-8,
//! byte blobs (serialized DFAs) as a `u32` length followed by the bytes.
//!
//! [`write_tables`] and [`read_tables`] store the scanner block first and the
//! parser block second on the same stream.

use crate::{ParserTable, ScannerTable, TableError};
use smartstring::alias::String;
use std::io::{Read, Write};

/// Version written into every block header.
pub const FORMAT_VERSION: u32 = 1;
pub(crate) const SCANNER_MAGIC: [u8; 4] = *b"TBSC";
pub(crate) const PARSER_MAGIC: [u8; 4] = *b"TBPR";

/// Upper bound on a single length prefix; anything larger is a corrupt stream.
const MAX_LEN: usize = 1 << 30;

/// Most elements reserved up front for a length read from a stream.
const MAX_PREALLOC: usize = 1 << 12;

/// A vector sized for `n` elements read from a stream, reserving at most
/// [`MAX_PREALLOC`] so a corrupt count fails on the read, not the allocation.
pub(crate) fn prealloc<T>(n: usize) -> Vec<T> {
    Vec::with_capacity(n.min(MAX_PREALLOC))
}

/// Writes `scanner` and then `parser` to `w`.
pub fn write_tables<W: Write + ?Sized>(
    w: &mut W,
    scanner: &ScannerTable,
    parser: &ParserTable,
) -> Result<(), TableError> {
    scanner.write_to(w)?;
    parser.write_to(w)?;
    w.flush()?;
    Ok(())
}

/// Reads a scanner table and then a parser table from `r`.
pub fn read_tables<R: Read + ?Sized>(r: &mut R) -> Result<(ScannerTable, ParserTable), TableError> {
    let scanner = ScannerTable::read_from(r)?;
    let parser = ParserTable::read_from(r)?;
    Ok((scanner, parser))
}

pub(crate) struct Encoder<'a, W: Write + ?Sized> {
    w: &'a mut W,
}

impl<'a, W: Write + ?Sized> Encoder<'a, W> {
    pub(crate) fn new(w: &'a mut W) -> Self {
        Self { w }
    }

    pub(crate) fn header(&mut self, magic: [u8; 4]) -> Result<(), TableError> {
        self.w.write_all(&magic)?;
        self.u32(FORMAT_VERSION)
    }

    pub(crate) fn u32(&mut self, v: u32) -> Result<(), TableError> {
        self.w.write_all(&v.to_le_bytes())?;
        Ok(())
    }

    pub(crate) fn i32(&mut self, v: i32) -> Result<(), TableError> {
        self.w.write_all(&v.to_le_bytes())?;
        Ok(())
    }

    pub(crate) fn usize(&mut self, v: usize) -> Result<(), TableError> {
        let v = u32::try_from(v)
            .map_err(|_| TableError::Malformed(format!("value {v} does not fit in 32 bits")))?;
        self.u32(v)
    }

    pub(crate) fn bool(&mut self, v: bool) -> Result<(), TableError> {
        self.u32(v as u32)
    }

    pub(crate) fn bytes(&mut self, v: &[u8]) -> Result<(), TableError> {
        self.usize(v.len())?;
        self.w.write_all(v)?;
        Ok(())
    }

    pub(crate) fn str(&mut self, v: &str) -> Result<(), TableError> {
        self.bytes(v.as_bytes())
    }

    pub(crate) fn opt_str(&mut self, v: Option<&str>) -> Result<(), TableError> {
        self.bool(v.is_some())?;
        match v {
            Some(s) => self.str(s),
            None => Ok(()),
        }
    }
}

pub(crate) struct Decoder<'a, R: Read + ?Sized> {
    r: &'a mut R,
}

impl<'a, R: Read + ?Sized> Decoder<'a, R> {
    pub(crate) fn new(r: &'a mut R) -> Self {
        Self { r }
    }

    pub(crate) fn header(&mut self, magic: [u8; 4], what: &str) -> Result<(), TableError> {
        let mut found = [0u8; 4];
        self.r.read_exact(&mut found)?;
        if found != magic {
            return Err(TableError::Malformed(format!(
                "expected {what} table, found magic {}",
                hex::encode(found)
            )));
        }
        let version = self.u32()?;
        if version != FORMAT_VERSION {
            return Err(TableError::Malformed(format!(
                "unsupported {what} table version {version}"
            )));
        }
        Ok(())
    }

    pub(crate) fn u32(&mut self) -> Result<u32, TableError> {
        let mut b = [0u8; 4];
        self.r.read_exact(&mut b)?;
        Ok(u32::from_le_bytes(b))
    }

    pub(crate) fn i32(&mut self) -> Result<i32, TableError> {
        let mut b = [0u8; 4];
        self.r.read_exact(&mut b)?;
        Ok(i32::from_le_bytes(b))
    }

    pub(crate) fn usize(&mut self) -> Result<usize, TableError> {
        Ok(self.u32()? as usize)
    }

    /// Reads a count that prefixes a sequence or a blob.
    pub(crate) fn count(&mut self) -> Result<usize, TableError> {
        let n = self.usize()?;
        if n > MAX_LEN {
            return Err(TableError::Malformed(format!("length {n} out of bounds")));
        }
        Ok(n)
    }

    pub(crate) fn bool(&mut self) -> Result<bool, TableError> {
        match self.u32()? {
            0 => Ok(false),
            1 => Ok(true),
            n => Err(TableError::Malformed(format!("invalid flag {n}"))),
        }
    }

    pub(crate) fn bytes(&mut self) -> Result<Vec<u8>, TableError> {
        let n = self.count()?;
        let mut v = Vec::new();
        Read::take(&mut *self.r, n as u64).read_to_end(&mut v)?;
        if v.len() != n {
            return Err(TableError::Io(std::io::ErrorKind::UnexpectedEof.into()));
        }
        Ok(v)
    }

    pub(crate) fn std_string(&mut self) -> Result<std::string::String, TableError> {
        std::string::String::from_utf8(self.bytes()?)
            .map_err(|e| TableError::Malformed(format!("invalid string: {e}")))
    }

    pub(crate) fn string(&mut self) -> Result<String, TableError> {
        Ok(self.std_string()?.into())
    }

    pub(crate) fn opt_string(&mut self) -> Result<Option<String>, TableError> {
        if self.bool()? {
            Ok(Some(self.string()?))
        } else {
            Ok(None)
        }
    }
}
