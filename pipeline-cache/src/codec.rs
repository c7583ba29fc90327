// SPDX-License-Identifier: LGPL-2.1-or-later
// See Notices.txt for copyright information

use shader_compiler_ir::{ParseError, ShaderStage};
use thiserror::Error;

/// error from decoding a cache entry
#[derive(Clone, Debug, Eq, PartialEq, Error)]
pub enum DecodeError {
    /// the data ended early
    #[error("unexpected end of data")]
    UnexpectedEnd,
    /// a field held an out-of-range value
    #[error("invalid {what}: {value}")]
    InvalidValue {
        /// the field
        what: &'static str,
        /// the value found
        value: u64,
    },
    /// text was not UTF-8
    #[error("invalid UTF-8 text")]
    InvalidUtf8,
    /// bytes were left after the payload
    #[error("{0} trailing bytes")]
    TrailingBytes(usize),
    /// a cached program failed to parse
    #[error("invalid cached program: {0}")]
    Program(#[from] ParseError),
}

#[derive(Default)]
pub(crate) struct Writer {
    pub(crate) bytes: Vec<u8>,
}

impl Writer {
    pub(crate) fn u8(&mut self, v: u8) {
        self.bytes.push(v);
    }
    pub(crate) fn bool(&mut self, v: bool) {
        self.u8(v as u8);
    }
    pub(crate) fn u32(&mut self, v: u32) {
        self.bytes.extend_from_slice(&v.to_le_bytes());
    }
    pub(crate) fn u64(&mut self, v: u64) {
        self.bytes.extend_from_slice(&v.to_le_bytes());
    }
    pub(crate) fn raw(&mut self, v: &[u8]) {
        self.bytes.extend_from_slice(v);
    }
    pub(crate) fn bytes(&mut self, v: &[u8]) {
        self.u32(v.len() as u32);
        self.raw(v);
    }
    pub(crate) fn str(&mut self, v: &str) {
        self.bytes(v.as_bytes());
    }
    pub(crate) fn opt_str(&mut self, v: Option<&str>) {
        match v {
            Some(v) => {
                self.bool(true);
                self.str(v);
            }
            None => self.bool(false),
        }
    }
}

pub(crate) struct Reader<'a> {
    data: &'a [u8],
}

impl<'a> Reader<'a> {
    pub(crate) fn new(data: &'a [u8]) -> Self {
        Self { data }
    }
    pub(crate) fn remaining(&self) -> usize {
        self.data.len()
    }
    pub(crate) fn raw(&mut self, len: usize) -> Result<&'a [u8], DecodeError> {
        if self.data.len() < len {
            return Err(DecodeError::UnexpectedEnd);
        }
        let (retval, rest) = self.data.split_at(len);
        self.data = rest;
        Ok(retval)
    }
    pub(crate) fn array<const N: usize>(&mut self) -> Result<[u8; N], DecodeError> {
        let mut retval = [0; N];
        retval.copy_from_slice(self.raw(N)?);
        Ok(retval)
    }
    pub(crate) fn u8(&mut self) -> Result<u8, DecodeError> {
        Ok(self.array::<1>()?[0])
    }
    pub(crate) fn bool(&mut self) -> Result<bool, DecodeError> {
        match self.u8()? {
            0 => Ok(false),
            1 => Ok(true),
            value => Err(DecodeError::InvalidValue {
                what: "bool",
                value: value.into(),
            }),
        }
    }
    pub(crate) fn u32(&mut self) -> Result<u32, DecodeError> {
        Ok(u32::from_le_bytes(self.array()?))
    }
    pub(crate) fn u64(&mut self) -> Result<u64, DecodeError> {
        Ok(u64::from_le_bytes(self.array()?))
    }
    pub(crate) fn bytes(&mut self) -> Result<&'a [u8], DecodeError> {
        let len = self.u32()? as usize;
        self.raw(len)
    }
    pub(crate) fn string(&mut self) -> Result<String, DecodeError> {
        let bytes = self.bytes()?;
        String::from_utf8(bytes.to_vec()).map_err(|_| DecodeError::InvalidUtf8)
    }
    pub(crate) fn opt_string(&mut self) -> Result<Option<String>, DecodeError> {
        if self.bool()? {
            self.string().map(Some)
        } else {
            Ok(None)
        }
    }
    pub(crate) fn stage(&mut self) -> Result<ShaderStage, DecodeError> {
        let value = self.u8()?;
        ShaderStage::from_index(value).ok_or(DecodeError::InvalidValue {
            what: "shader stage",
            value: value.into(),
        })
    }
    pub(crate) fn finish(&self) -> Result<(), DecodeError> {
        if self.data.is_empty() {
            Ok(())
        } else {
            Err(DecodeError::TrailingBytes(self.data.len()))
        }
    }
}
