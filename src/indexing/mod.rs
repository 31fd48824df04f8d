/**********************************************
  > File Name		: mod.rs
  > Author		    : lunar
  > Email			: lunar_ubuntu@qq.com
  > Created Time	: Mon 29 Mar 2021 10:46:17 AM CST
  > Location        : Shanghai
  > Copyright@ https://github.com/xiaoqixian
 **********************************************/

/*
 * The indexing component provides classes and methods for managing
 * persistent indexes over unordered data reocrds stored in paged files.
 * The indexes ultimately will be used to speed up processing of relational
 * selections, joins and condition-based update and delete operations.
 *
 * The indexes are stored in paged files, just like records data themselves.
 * So we will use page_management module as a client to manage paged indexes.
 *
 * B+ tree the data structure is selected for implementing indexes,
 * one tree per indexed attribute, mapping attribute values to RIDs.
 */

pub mod index_handle;
pub mod index_manager;
pub mod index_scan;
pub mod key;
pub mod node;

#[cfg(test)]
mod tests;

use crate::errors::IndexingError;

pub const MAX_STRING_LEN: usize = 255;
pub const MAX_NAME_LEN: usize = 24;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum AttrType {
    INT,
    FLOAT,
    STRING,
}

impl AttrType {
    pub fn to_i32(self) -> i32 {
        match self {
            AttrType::INT => 0,
            AttrType::FLOAT => 1,
            AttrType::STRING => 2,
        }
    }

    pub fn from_i32(val: i32) -> Result<Self, IndexingError> {
        match val {
            0 => Ok(AttrType::INT),
            1 => Ok(AttrType::FLOAT),
            2 => Ok(AttrType::STRING),
            _ => Err(IndexingError::InvalidAttr),
        }
    }

    //INT and FLOAT are 4 bytes, STRING is anything in 1..=255.
    pub fn check_length(self, attr_length: usize) -> bool {
        match self {
            AttrType::INT | AttrType::FLOAT => attr_length == 4,
            AttrType::STRING => attr_length >= 1 && attr_length <= MAX_STRING_LEN,
        }
    }
}

/*
 * Comparison operators of a scan. NE is not served by the tree
 * order, a NE scan walks every leaf and skips the equal keys.
 */
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum CompOp {
    NoOp,
    EQ,
    NE,
    LT,
    LE,
    GT,
    GE,
}
