/**********************************************
  > File Name		: errors.rs
  > Author		    : lunar
  > Email			: lunar_ubuntu@qq.com
  > Created Time	: Tue 02 Mar 2021 11:05:17 AM CST
  > Location        : Shanghai
  > Copyright@ https://github.com/xiaoqixian
 **********************************************/

/*
 * Define some erros enum for global usage.
 *
 * Each component owns one enum. Errors of a lower component are
 * wrapped by the upper one unchanged, so the caller can always tell
 * an I/O failure of the page file from a misuse of the index.
 */

use thiserror::Error;

use crate::page_management::page_file::PageNum;

#[derive(Error, Debug)]
pub enum PageFileError {
    #[error("unix I/O error: {0}")]
    Unix(#[from] std::io::Error), //error in Unix system call or library routine.
    #[error("file already exists: {0}")]
    FileExist(String),
    #[error("file not found: {0}")]
    FileNotFound(String),
    #[error("file is closed")]
    FileClosed,
    #[error("invalid file name: {0:?}")]
    InvalidName(String),
    #[error("invalid page number {0}")]
    InvalidPage(PageNum), //out of range, or already disposed.
    #[error("page {0} is not in the buffer")]
    PageNotInBuf(PageNum), //the page to manipulate is not in buffer.
    #[error("page {0} is already unpinned")]
    PageUnpinned(PageNum), //returns when we expect the page to be pinned, but find opposite.
    #[error("page {0} is still pinned")]
    PagePinned(PageNum), //opposite to the PageUnpinned.
    #[error("incomplete read of page {0}")]
    IncompleteRead(PageNum),
    #[error("incomplete write of page {0}")]
    IncompleteWrite(PageNum),
}

#[derive(Error, Debug)]
pub enum IndexingError {
    #[error("index file is not open")]
    NotOpen,
    #[error("null key input")]
    NullInput,
    #[error("invalid attribute type or comparison operator")]
    InvalidAttr,
    #[error("invalid key length {0}")]
    InvalidKeyLength(usize),
    #[error("key type does not match the index attribute type")]
    KeyTypeMismatch,
    #[error("invalid relation name {0:?}")]
    InvalidName(String),
    #[error("invalid index number {0}")]
    InvalidIndexNo(i32),
    #[error("invalid rid ({0}, {1})")]
    InvalidRid(i32, i32),
    #[error("invalid combination of comparison operator and value")]
    InvalidScanCombo,
    #[error("index entry not found")]
    EntryNotFound,
    #[error("scan is already open")]
    ScanAlreadyOpen,
    #[error("scan has been closed")]
    ScanClosed,
    #[error("scan is not open")]
    ScanNotOpen,
    #[error("end of scan")]
    EndOfScan,
    #[error("corrupted index header")]
    CorruptedHeader,
    #[error(transparent)]
    PageFile(#[from] PageFileError),
}
