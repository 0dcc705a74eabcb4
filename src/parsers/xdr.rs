//! Big-endian XDR cursor used by the energy file decoder.

use super::error::ParseError;

/// Floating point width of the reals stored in a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Precision {
    Single,
    Double,
}

/// Read cursor over an XDR encoded buffer.
#[derive(Debug)]
pub(crate) struct XdrReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> XdrReader<'a> {
    pub(crate) fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub(crate) fn position(&self) -> usize {
        self.pos
    }

    pub(crate) fn is_at_end(&self) -> bool {
        self.pos >= self.buf.len()
    }

    pub(crate) fn remaining(&self) -> usize {
        self.buf.len().saturating_sub(self.pos)
    }

    pub(crate) fn seek(&mut self, pos: usize) {
        self.pos = pos.min(self.buf.len());
    }

    fn take<const N: usize>(&mut self) -> Result<[u8; N], ParseError> {
        let end = self.pos + N;
        let bytes = self
            .buf
            .get(self.pos..end)
            .ok_or(ParseError::UnexpectedEof { offset: self.pos })?;
        let mut out = [0u8; N];
        out.copy_from_slice(bytes);
        self.pos = end;
        Ok(out)
    }

    pub(crate) fn skip(&mut self, len: usize) -> Result<(), ParseError> {
        let padded = len.div_ceil(4) * 4;
        if self.remaining() < padded {
            return Err(ParseError::UnexpectedEof { offset: self.pos });
        }
        self.pos += padded;
        Ok(())
    }

    pub(crate) fn int(&mut self) -> Result<i32, ParseError> {
        self.take::<4>().map(i32::from_be_bytes)
    }

    pub(crate) fn uint(&mut self) -> Result<u32, ParseError> {
        self.take::<4>().map(u32::from_be_bytes)
    }

    /// 64-bit integers are stored as two 32-bit halves, high word first.
    pub(crate) fn int64(&mut self) -> Result<i64, ParseError> {
        self.take::<8>().map(i64::from_be_bytes)
    }

    pub(crate) fn float(&mut self) -> Result<f32, ParseError> {
        self.take::<4>().map(f32::from_be_bytes)
    }

    pub(crate) fn double(&mut self) -> Result<f64, ParseError> {
        self.take::<8>().map(f64::from_be_bytes)
    }

    pub(crate) fn real(&mut self, precision: Precision) -> Result<f64, ParseError> {
        match precision {
            Precision::Single => self.float().map(f64::from),
            Precision::Double => self.double(),
        }
    }

    /// A count field that must be non-negative.
    pub(crate) fn count(&mut self, what: &str) -> Result<usize, ParseError> {
        let value = self.int()?;
        usize::try_from(value).map_err(|_| ParseError::Corrupt(format!("negative {what}: {value}")))
    }

    /// A plain XDR string: `u32` byte length, bytes, zero padding to 4.
    pub(crate) fn xdr_string(&mut self) -> Result<String, ParseError> {
        let len = self.uint()? as usize;
        let start = self.pos;
        let bytes = self
            .buf
            .get(start..start.saturating_add(len))
            .ok_or(ParseError::UnexpectedEof { offset: start })?;
        let text = String::from_utf8_lossy(bytes)
            .trim_end_matches('\0')
            .to_string();
        self.skip(len)?;
        Ok(text)
    }

    /// Strings inside frame sub-blocks: an `int` holding the C length
    /// (including the terminating NUL), then an XDR string.
    pub(crate) fn gmx_string(&mut self) -> Result<String, ParseError> {
        let _c_len = self.int()?;
        self.xdr_string()
    }
}
