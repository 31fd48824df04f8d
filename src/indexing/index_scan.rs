/**********************************************
  > File Name		: index_scan.rs
  > Author		    : lunar
  > Email			: lunar_ubuntu@qq.com
  > Created Time	: Mon 24 May 2021 02:18:33 PM CST
  > Location        : Shanghai
  > Copyright@ https://github.com/xiaoqixian
 **********************************************/

/*
 * IndexScan iterates over the entries of an index whose keys satisfy
 * a comparison against a value, in key order.
 *
 * The scan starts at the leftmost leaf for NoOp, LT, LE and NE, and at
 * the leaf found by descending on the value otherwise. It walks slot by
 * slot through a leaf, then through the bucket chain of the leaf, then
 * goes on with the right sibling leaf.
 *
 * Nothing stays pinned between two calls of get_next_entry, and the
 * handle is passed in every call, so entries can be deleted through the
 * handle while the scan is open. Deletion never moves an entry, so the
 * scan resumes right after the slot it returned last. The slot is
 * checked against the last returned entry, if it holds another entry
 * the page is searched for it. A bucket page disposed in between is
 * detected when pinning it fails, the scan goes on with the first page
 * of the chain it has not visited yet.
 */

use std::cmp::Ordering;

use log::debug;

use super::index_handle::{Descent, IndexHandle};
use super::key::Key;
use super::CompOp;
use crate::errors::{IndexingError, PageFileError};
use crate::page_management::page_file::{PageNum, NO_PAGE};
use crate::record_management::RID;

#[derive(Debug, Copy, Clone, PartialEq)]
enum ScanState {
    Fresh,
    Open,
    Closed,
}

#[derive(Debug, Copy, Clone, PartialEq)]
enum Verdict {
    Match,
    Skip,
    Stop, //no key after this one can match.
}

#[derive(Debug, Clone)]
struct Cursor {
    leaf: PageNum,
    page: PageNum,
    slot: usize, //next slot to look at in page.
    in_bucket: bool,
    last: Option<(usize, Vec<u8>, RID)>,
    visited: Vec<PageNum>, //bucket pages of the current chain.
}

#[derive(Debug)]
pub struct IndexScan {
    state: ScanState,
    comp_op: CompOp,
    value: Option<Vec<u8>>,
    cursor: Option<Cursor>,
    finished: bool,
}

impl IndexScan {
    pub fn new() -> Self {
        IndexScan {
            state: ScanState::Fresh,
            comp_op: CompOp::NoOp,
            value: None,
            cursor: None,
            finished: false,
        }
    }

    pub fn is_open(&self) -> bool {
        self.state == ScanState::Open
    }

    /*
     * NoOp goes without a value, every other operator needs one.
     */
    pub fn open_scan(&mut self, handle: &IndexHandle, comp_op: CompOp, value: Option<&Key>) -> Result<(), IndexingError> {
        match self.state {
            ScanState::Open => return Err(IndexingError::ScanAlreadyOpen),
            ScanState::Closed => return Err(IndexingError::ScanClosed),
            ScanState::Fresh => {},
        }
        handle.check_open()?;
        if (comp_op == CompOp::NoOp) != value.is_none() {
            return Err(IndexingError::InvalidScanCombo);
        }
        let value = match value {
            Some(v) => Some(handle.codec().encode(v)?),
            None => None,
        };

        let descent = match comp_op {
            CompOp::EQ | CompOp::GE => Descent::Lower,
            CompOp::GT => Descent::Upper,
            _ => Descent::Leftmost,
        };
        self.cursor = if handle.get_root_page() == NO_PAGE {
            None
        } else {
            let (_, leaf) = handle.descend(value.as_deref(), descent)?;
            Some(Cursor {
                leaf,
                page: leaf,
                slot: 0,
                in_bucket: false,
                last: None,
                visited: Vec::new(),
            })
        };
        self.comp_op = comp_op;
        self.value = value;
        self.finished = self.cursor.is_none();
        self.state = ScanState::Open;
        debug!("Opened {:?} scan on {}", comp_op, handle.file_name());
        Ok(())
    }

    fn check(&self, handle: &IndexHandle, key: &[u8]) -> Verdict {
        let ord = match &self.value {
            Some(v) => handle.codec().compare(key, v),
            None => return Verdict::Match,
        };
        match (self.comp_op, ord) {
            (CompOp::NoOp, _) => Verdict::Match,
            (CompOp::EQ, Ordering::Less) => Verdict::Skip,
            (CompOp::EQ, Ordering::Equal) => Verdict::Match,
            (CompOp::EQ, Ordering::Greater) => Verdict::Stop,
            (CompOp::NE, Ordering::Equal) => Verdict::Skip,
            (CompOp::NE, _) => Verdict::Match,
            (CompOp::LT, Ordering::Less) => Verdict::Match,
            (CompOp::LT, _) => Verdict::Stop,
            (CompOp::LE, Ordering::Greater) => Verdict::Stop,
            (CompOp::LE, _) => Verdict::Match,
            (CompOp::GT, Ordering::Greater) => Verdict::Match,
            (CompOp::GT, _) => Verdict::Skip,
            (CompOp::GE, Ordering::Less) => Verdict::Skip,
            (CompOp::GE, _) => Verdict::Match,
        }
    }

    pub fn get_next_entry(&mut self, handle: &IndexHandle) -> Result<(Key, RID), IndexingError> {
        if self.state != ScanState::Open {
            return Err(IndexingError::ScanNotOpen);
        }
        handle.check_open()?;
        if self.finished {
            return Err(IndexingError::EndOfScan);
        }
        let mut cursor = match self.cursor.take() {
            Some(c) => c,
            None => return Err(IndexingError::EndOfScan),
        };
        let result = self.advance(handle, &mut cursor);
        match &result {
            Ok(_) => self.cursor = Some(cursor),
            Err(IndexingError::EndOfScan) => self.finished = true,
            Err(_) => self.cursor = Some(cursor),
        }
        result
    }

    fn advance(&self, handle: &IndexHandle, cursor: &mut Cursor) -> Result<(Key, RID), IndexingError> {
        let layout = *handle.layout();
        loop {
            if cursor.page == NO_PAGE {
                return Err(IndexingError::EndOfScan);
            }
            let ph = match handle.get_page(cursor.page) {
                Ok(ph) => ph,
                Err(IndexingError::PageFile(PageFileError::InvalidPage(_))) if cursor.in_bucket => {
                    debug!("Bucket {} gone, scan resumes in the chain of leaf {}", cursor.page, cursor.leaf);
                    self.resume_chain(handle, cursor)?;
                    continue;
                },
                Err(e) => return Err(e),
            };
            let data = ph.data();

            if let Some((slot, key, rid)) = cursor.last.take() {
                let same = layout.is_live(&data, slot)
                    && layout.slot_rid(&data, slot) == rid
                    && handle.codec().compare(layout.slot_key(&data, slot), &key) == Ordering::Equal;
                if !same {
                    let moved = layout.live_slots(&data).into_iter().find(|&s| {
                        layout.slot_rid(&data, s) == rid
                            && handle.codec().compare(layout.slot_key(&data, s), &key) == Ordering::Equal
                    });
                    if let Some(s) = moved {
                        cursor.slot = s + 1;
                    }
                }
            }

            while let Some(slot) = layout.next_live(&data, cursor.slot) {
                cursor.slot = slot + 1;
                let key = layout.slot_key(&data, slot);
                match self.check(handle, key) {
                    Verdict::Match => {
                        let rid = layout.slot_rid(&data, slot);
                        cursor.last = Some((slot, key.to_vec(), rid));
                        return Ok((handle.codec().decode(key), rid));
                    },
                    Verdict::Skip => {},
                    Verdict::Stop => return Err(IndexingError::EndOfScan),
                }
            }

            let next_bucket = layout.next_bucket(&data);
            let right_leaf = layout.right_leaf(&data);
            drop(data);
            drop(ph);

            cursor.slot = 0;
            if next_bucket != NO_PAGE {
                if !cursor.in_bucket {
                    cursor.visited.clear();
                }
                cursor.in_bucket = true;
                cursor.visited.push(next_bucket);
                cursor.page = next_bucket;
            } else if cursor.in_bucket {
                self.leave_chain(handle, cursor)?;
            } else {
                cursor.leaf = right_leaf;
                cursor.page = right_leaf;
            }
        }
    }

    //go on with the right sibling of the leaf owning the chain.
    fn leave_chain(&self, handle: &IndexHandle, cursor: &mut Cursor) -> Result<(), IndexingError> {
        let ph = handle.get_page(cursor.leaf)?;
        let right = handle.layout().right_leaf(&ph.data());
        cursor.leaf = right;
        cursor.page = right;
        cursor.slot = 0;
        cursor.in_bucket = false;
        cursor.visited.clear();
        Ok(())
    }

    fn resume_chain(&self, handle: &IndexHandle, cursor: &mut Cursor) -> Result<(), IndexingError> {
        cursor.last = None;
        let mut page_num = {
            let ph = handle.get_page(cursor.leaf)?;
            let next = handle.layout().next_bucket(&ph.data());
            next
        };
        while page_num != NO_PAGE {
            if !cursor.visited.contains(&page_num) {
                cursor.visited.push(page_num);
                cursor.page = page_num;
                cursor.slot = 0;
                return Ok(());
            }
            let ph = handle.get_page(page_num)?;
            let next = handle.layout().next_bucket(&ph.data());
            page_num = next;
        }
        self.leave_chain(handle, cursor)
    }

    pub fn close_scan(&mut self) -> Result<(), IndexingError> {
        if self.state != ScanState::Open {
            return Err(IndexingError::ScanNotOpen);
        }
        self.state = ScanState::Closed;
        self.cursor = None;
        self.value = None;
        Ok(())
    }
}

impl Default for IndexScan {
    fn default() -> Self {
        Self::new()
    }
}

/*
 * Drain an open scan into a vector.
 */
pub fn collect_scan(scan: &mut IndexScan, handle: &IndexHandle) -> Result<Vec<(Key, RID)>, IndexingError> {
    let mut entries = Vec::new();
    loop {
        match scan.get_next_entry(handle) {
            Ok(entry) => entries.push(entry),
            Err(IndexingError::EndOfScan) => return Ok(entries),
            Err(e) => return Err(e),
        }
    }
}
