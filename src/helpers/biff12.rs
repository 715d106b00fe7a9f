//! Microsoft Office Binary Interchange File Format (BIFF12)
//! Record reader for the binary parts of `.xlsb` workbooks.

use crate::error::SheetError;
use crate::helpers::string::to_f64;
use crate::helpers::string::to_u16;
use crate::helpers::string::to_u32;
use crate::helpers::string::to_usize;
use encoding_rs::UTF_16LE;
use std::borrow::Cow;
use std::io::BufRead;
use std::io::Read;
use thiserror::Error;

#[derive(Error, Debug)]
pub(crate) enum Biff12Error {
    #[error("No enough data: expect '{0}' bytes, actual '{1}' bytes")]
    NoEnoughData(usize, usize),
}

/// Reader over BIFF12 records. After each read, `buffer` holds exactly the record payload.
pub(crate) struct Biff12Reader<R: BufRead> {
    reader: R,
    pub(crate) buffer: Vec<u8>,
}

impl<R: BufRead> Biff12Reader<R> {
    pub(crate) fn new(reader: R) -> Biff12Reader<R> {
        Biff12Reader {
            reader,
            buffer: Vec::with_capacity(1024),
        }
    }

    /// Decodes an `XLWideString` at `at` and returns it with the offset just past it.
    pub(crate) fn get_str_and_bound(&'_ self, at: usize) -> Result<(Cow<'_, str>, usize), SheetError> {
        let lower_bound = at + 4;
        if lower_bound > self.buffer.len() {
            Err(Biff12Error::NoEnoughData(lower_bound, self.buffer.len()))?
        }
        let size = to_usize(&self.buffer[at..lower_bound]);
        let upper_bound = size
            .checked_mul(2)
            .and_then(|bytes| bytes.checked_add(lower_bound))
            .ok_or(Biff12Error::NoEnoughData(usize::MAX, self.buffer.len()))?;
        if upper_bound > self.buffer.len() {
            Err(Biff12Error::NoEnoughData(upper_bound, self.buffer.len()))?
        }
        let (value, _, _) = UTF_16LE.decode(&self.buffer[lower_bound..upper_bound]);
        Ok((value, upper_bound))
    }

    pub(crate) fn get_str(&'_ self, at: usize) -> Result<Cow<'_, str>, SheetError> {
        let (value, _) = self.get_str_and_bound(at)?;
        Ok(value)
    }

    /// Bytes of the current record from `at`, clamped to the record. Short reads zero-fill.
    fn bytes(&self, at: usize, length: usize) -> &[u8] {
        let upper = self.buffer.len().min(at.saturating_add(length));
        self.buffer.get(at..upper).unwrap_or(&[])
    }

    pub(crate) fn get_u8(&self, at: usize) -> u8 {
        self.buffer.get(at).copied().unwrap_or(0)
    }

    pub(crate) fn get_usize(&self, at: usize) -> usize {
        to_usize(self.bytes(at, 4))
    }

    pub(crate) fn get_u16(&self, at: usize) -> u16 {
        to_u16(self.bytes(at, 2))
    }

    pub(crate) fn get_u32(&self, at: usize) -> u32 {
        to_u32(self.bytes(at, 4))
    }

    pub(crate) fn get_f64(&self, at: usize) -> f64 {
        to_f64(self.bytes(at, 8))
    }

    /// Style index: 24 bits.
    pub(crate) fn get_style(&self, at: usize) -> usize {
        to_usize(self.bytes(at, 3))
    }

    fn read_7bit_continuation_integer(&mut self, limit: usize) -> Result<usize, SheetError> {
        let mut integer = 0usize;
        let mut byte = [0u8; 1];
        for index in 0..limit {
            self.reader.read_exact(&mut byte)?;
            integer += ((byte[0] & 0x7F) as usize) << (7 * index);
            if (byte[0] & 0x80) == 0 {
                break;
            }
        }
        Ok(integer)
    }

    pub(crate) fn next(&mut self) -> Result<u16, SheetError> {
        let (kind, _) = self.read()?;
        Ok(kind)
    }

    /// Reads the next record into `buffer`, returning its type and size.
    pub(crate) fn read(&mut self) -> Result<(u16, usize), SheetError> {
        let kind = self.read_7bit_continuation_integer(2)? as u16;
        let size = self.read_7bit_continuation_integer(4)?;
        self.buffer.clear();
        let actual = self.reader.by_ref().take(size as u64).read_to_end(&mut self.buffer)?;
        if actual != size {
            Err(Biff12Error::NoEnoughData(size, actual))?
        }
        Ok((kind, size))
    }

    /// Skips forward to the next `target` record, stepping over `(begin, end)` bracketed blocks.
    pub(crate) fn find_with(&mut self, target: u16, skips: &[(u16, u16)]) -> Result<usize, SheetError> {
        let mut expected = target;
        loop {
            let (actual, size) = self.read()?;
            if actual == expected && expected == target {
                return Ok(size);
            } else if actual == expected {
                expected = target;
            } else if let Some((_, ending)) = skips.iter().find(|(beginning, _)| actual == *beginning) {
                if expected == target {
                    expected = *ending;
                }
            }
        }
    }

    pub(crate) fn find(&mut self, target: u16) -> Result<usize, SheetError> {
        self.find_with(target, &[])
    }
}

#[macro_export]
macro_rules! match_biff12_record {
    ($reader:expr => { $($arms:tt)* }) => {
        loop {
            match $reader.next()? {
                $($arms)*
                _ => (),
            }
        }
    };
}
