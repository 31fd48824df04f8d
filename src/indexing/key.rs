/**********************************************
  > File Name		: key.rs
  > Author		    : lunar
  > Email			: lunar_ubuntu@qq.com
  > Created Time	: Sat 22 May 2021 04:37:09 PM CST
  > Location        : Shanghai
  > Copyright@ https://github.com/xiaoqixian
 **********************************************/

/*
 * Keys of an index.
 *
 * Inside pages every key takes exactly attr_length bytes:
 * INT and FLOAT are little-endian 4 bytes values, STRING is the
 * string bytes right-padded with zeros. Comparison of two stored
 * keys decodes the numeric ones and compares strings bytewise
 * over the whole width, so the padding sorts before any byte.
 */

use std::cmp::Ordering;
use std::fmt;

use super::AttrType;
use crate::errors::IndexingError;
use crate::utils;

#[derive(Debug, Clone, PartialEq)]
pub enum Key {
    Int(i32),
    Float(f32),
    Str(Vec<u8>),
}

impl Key {
    pub fn string(s: &str) -> Self {
        Key::Str(s.as_bytes().to_vec())
    }

    pub fn attr_type(&self) -> AttrType {
        match self {
            Key::Int(_) => AttrType::INT,
            Key::Float(_) => AttrType::FLOAT,
            Key::Str(_) => AttrType::STRING,
        }
    }

    /*
     * Build a key from the raw bytes of an attribute, the way the
     * record layer hands attribute values over. An empty slice is
     * a null value.
     */
    pub fn from_attr(attr_type: AttrType, bytes: &[u8]) -> Result<Self, IndexingError> {
        if bytes.is_empty() {
            return Err(IndexingError::NullInput);
        }
        match attr_type {
            AttrType::INT | AttrType::FLOAT if bytes.len() != 4 => Err(IndexingError::InvalidKeyLength(bytes.len())),
            AttrType::INT => Ok(Key::Int(utils::read_i32(bytes, 0))),
            AttrType::FLOAT => Ok(Key::Float(utils::read_f32(bytes, 0))),
            AttrType::STRING => Ok(Key::Str(trim_padding(bytes).to_vec())),
        }
    }

    /*
     * Typed comparison. Keys of different types are never stored in
     * the same index, they are ordered by type so the order stays total.
     */
    pub fn compare(&self, other: &Key) -> Ordering {
        match (self, other) {
            (Key::Int(a), Key::Int(b)) => a.cmp(b),
            (Key::Float(a), Key::Float(b)) => compare_f32(*a, *b),
            (Key::Str(a), Key::Str(b)) => trim_padding(a).cmp(trim_padding(b)),
            _ => self.attr_type().to_i32().cmp(&other.attr_type().to_i32()),
        }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Int(v) => write!(f, "{}", v),
            Key::Float(v) => write!(f, "{}", v),
            Key::Str(v) => write!(f, "{:?}", String::from_utf8_lossy(v)),
        }
    }
}

fn trim_padding(bytes: &[u8]) -> &[u8] {
    let end = bytes.iter().rposition(|b| *b != 0).map(|p| p + 1).unwrap_or(0);
    &bytes[..end]
}

fn compare_f32(a: f32, b: f32) -> Ordering {
    match a.partial_cmp(&b) {
        Some(ord) => ord,
        None => a.total_cmp(&b), //NaN
    }
}

/*
 * Fixed width (de)serialization and comparison of the keys of one
 * index. The codec is built from the index header.
 */
#[derive(Debug, Clone, Copy)]
pub struct KeyCodec {
    attr_type: AttrType,
    attr_length: usize,
}

impl KeyCodec {
    pub fn new(attr_type: AttrType, attr_length: usize) -> Result<Self, IndexingError> {
        if !attr_type.check_length(attr_length) {
            return Err(IndexingError::InvalidKeyLength(attr_length));
        }
        Ok(KeyCodec { attr_type, attr_length })
    }

    pub fn attr_type(&self) -> AttrType {
        self.attr_type
    }

    pub fn attr_length(&self) -> usize {
        self.attr_length
    }

    pub fn encode(&self, key: &Key) -> Result<Vec<u8>, IndexingError> {
        let mut buf = vec![0u8; self.attr_length];
        match (self.attr_type, key) {
            (AttrType::INT, Key::Int(v)) => utils::write_i32(&mut buf, 0, *v),
            (AttrType::FLOAT, Key::Float(v)) => buf.copy_from_slice(&v.to_le_bytes()),
            (AttrType::STRING, Key::Str(v)) => {
                let v = trim_padding(v);
                if v.len() > self.attr_length {
                    return Err(IndexingError::InvalidKeyLength(v.len()));
                }
                buf[..v.len()].copy_from_slice(v);
            },
            _ => return Err(IndexingError::KeyTypeMismatch),
        }
        Ok(buf)
    }

    pub fn decode(&self, bytes: &[u8]) -> Key {
        let bytes = &bytes[..self.attr_length];
        match self.attr_type {
            AttrType::INT => Key::Int(utils::read_i32(bytes, 0)),
            AttrType::FLOAT => Key::Float(utils::read_f32(bytes, 0)),
            AttrType::STRING => Key::Str(trim_padding(bytes).to_vec()),
        }
    }

    //compare two encoded keys.
    pub fn compare(&self, a: &[u8], b: &[u8]) -> Ordering {
        match self.attr_type {
            AttrType::INT => utils::read_i32(a, 0).cmp(&utils::read_i32(b, 0)),
            AttrType::FLOAT => compare_f32(utils::read_f32(a, 0), utils::read_f32(b, 0)),
            AttrType::STRING => a[..self.attr_length].cmp(&b[..self.attr_length]),
        }
    }
}
