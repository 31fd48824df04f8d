/**********************************************
  > File Name		: index_handle.rs
  > Author		    : lunar
  > Email			: lunar_ubuntu@qq.com
  > Created Time	: Tue Apr  6 10:24:27 2021
  > Location        : Shanghai
  > Copyright@ https://github.com/xiaoqixian
 **********************************************/

/*
 * The IndexHandle is the B+ tree of one index file.
 *
 * Entry Insertion:
 *    1. descend from the root to a leaf, at every internal node take
 *       the child right after the last separator not greater than the
 *       key, so equal keys always go right. The internal pages passed
 *       are kept in a path stack with the child index taken.
 *    2. If the leaf has a free slot, the entry is put in its sorted
 *       position. Entries on the way to the nearest free slot are
 *       shifted by one slot.
 *    3. If the leaf is full and all its entries equal the key, the
 *       entry goes to the bucket chain of the leaf. A new bucket page
 *       is linked to the tail when all buckets are full.
 *    4. Otherwise the leaf splits. Entries are cut in half, the cut is
 *       moved to the nearest boundary between different keys. The
 *       first key of the new right leaf is the separator.
 *    5. The separator and the new page are inserted into the parent
 *       right after the child pointer of the split node. A full internal
 *       node splits at its median key, the median moves up. A root
 *       split makes a new root and the tree grows by one level.
 *
 * Buckets:
 *    A leaf that owns a bucket chain holds nothing but the key of the
 *    chain. When a different key arrives at such a leaf, the leaf splits
 *    by key and the chain stays with its own key. Every bucket page
 *    holds at least one live entry, an emptied bucket is disposed and
 *    unlinked from the chain.
 *
 * Entry Deletion:
 *    Only one entry, identified by both the key and the RID, is deleted
 *    at a time. The search starts from the leftmost leaf that may hold
 *    the key and walks right through the leaf chain. Deletion only
 *    clears the bit of the slot, there is no merge of underfull nodes.
 *
 * At most one page is pinned during the descent. The pages are
 * pinned through PageHandles, so every return path unpins them.
 */

use std::cmp::Ordering;

use log::{debug, error, info, warn};

use super::key::{Key, KeyCodec};
use super::node::{IndexFileHeader, NodeLayout, INDEX_HEADER_PAGE};
use super::AttrType;
use crate::errors::IndexingError;
use crate::page_management::page_file::{PageFileHandle, PageFileManager, PageHandle, PageNum, NO_PAGE};
use crate::record_management::RID;

//how a descent chooses the child of an internal node.
#[derive(Debug, Copy, Clone, PartialEq)]
pub(super) enum Descent {
    Upper,    //first separator greater than the key.
    Lower,    //first separator not less than the key.
    Leftmost, //always child 0.
}

type Entry = (Vec<u8>, RID);

#[derive(Debug)]
pub struct IndexHandle {
    pfh: PageFileHandle,
    header: IndexFileHeader,
    header_changed: bool,
    codec: KeyCodec,
    layout: NodeLayout,
    open_flag: bool,
}

impl IndexHandle {
    pub(super) fn new(pfh: PageFileHandle, header: IndexFileHeader) -> Result<Self, IndexingError> {
        let codec = KeyCodec::new(header.attr_type, header.attr_length)?;
        Ok(IndexHandle {
            pfh,
            layout: header.layout(),
            header,
            header_changed: false,
            codec,
            open_flag: true,
        })
    }

    pub fn is_open(&self) -> bool {
        self.open_flag
    }

    pub fn file_name(&self) -> &str {
        self.pfh.file_name()
    }

    pub fn get_root_page(&self) -> PageNum {
        self.header.root_page
    }

    pub fn get_height(&self) -> i32 {
        self.header.height
    }

    pub fn get_attr_type(&self) -> AttrType {
        self.header.attr_type
    }

    pub fn get_attr_length(&self) -> usize {
        self.header.attr_length
    }

    pub fn get_max_keys(&self) -> usize {
        self.header.max_keys
    }

    pub fn get_max_entries(&self) -> usize {
        self.header.max_entries
    }

    pub(super) fn codec(&self) -> &KeyCodec {
        &self.codec
    }

    pub(super) fn layout(&self) -> &NodeLayout {
        &self.layout
    }

    pub(super) fn check_open(&self) -> Result<(), IndexingError> {
        if self.open_flag {
            Ok(())
        } else {
            Err(IndexingError::NotOpen)
        }
    }

    pub(super) fn get_page(&self, page_num: PageNum) -> Result<PageHandle, IndexingError> {
        Ok(self.pfh.get_page(page_num)?)
    }

    fn check_rid(rid: &RID) -> Result<(), IndexingError> {
        if rid.is_valid() {
            Ok(())
        } else {
            Err(IndexingError::InvalidRid(rid.get_page_num(), rid.get_slot_num()))
        }
    }

    /*
     * Descend to a leaf. Returns the internal pages passed with the
     * child index taken in each, root first, and the leaf page.
     * The tree must have a root.
     */
    pub(super) fn descend(&self, key: Option<&[u8]>, descent: Descent) -> Result<(Vec<(PageNum, usize)>, PageNum), IndexingError> {
        let mut path = Vec::with_capacity(self.header.height as usize);
        let mut page_num = self.header.root_page;
        for _ in 1..self.header.height {
            let ph = self.get_page(page_num)?;
            let data = ph.data();
            let index = match key {
                Some(key) if descent != Descent::Leftmost => self.search_child(&data, key, descent),
                _ => 0,
            };
            path.push((page_num, index));
            page_num = self.layout.child(&data, index);
        }
        Ok((path, page_num))
    }

    fn search_child(&self, data: &[u8], key: &[u8], descent: Descent) -> usize {
        let (mut low, mut high) = (0, self.layout.num_keys(data));
        while low < high {
            let mid = (low + high) / 2;
            let ord = self.codec.compare(self.layout.key(data, mid), key);
            let go_right = match descent {
                Descent::Upper => ord != Ordering::Greater,
                _ => ord == Ordering::Less,
            };
            if go_right {
                low = mid + 1;
            } else {
                high = mid;
            }
        }
        low
    }

    /*
     * The key of the bucket chain of a leaf. The leaf may have lost
     * all its own entries, the head bucket never is empty.
     */
    fn chain_key(&self, leaf_data: &[u8]) -> Result<Option<Vec<u8>>, IndexingError> {
        let head = self.layout.next_bucket(leaf_data);
        if head == NO_PAGE {
            return Ok(None);
        }
        if let Some(slot) = self.layout.next_live(leaf_data, 0) {
            return Ok(Some(self.layout.slot_key(leaf_data, slot).to_vec()));
        }
        let ph = self.get_page(head)?;
        let data = ph.data();
        match self.layout.next_live(&data, 0) {
            Some(slot) => Ok(Some(self.layout.slot_key(&data, slot).to_vec())),
            None => Err(IndexingError::CorruptedHeader),
        }
    }

    /* Insertion */

    pub fn insert_entry(&mut self, key: &Key, rid: RID) -> Result<(), IndexingError> {
        self.check_open()?;
        Self::check_rid(&rid)?;
        let key = self.codec.encode(key)?;

        if self.header.root_page == NO_PAGE {
            let ph = self.pfh.allocate_page()?;
            self.layout.init_leaf(&mut ph.data_mut(), NO_PAGE, NO_PAGE, NO_PAGE);
            self.header.root_page = ph.get_page_num();
            self.header.height = 1;
            self.header_changed = true;
            info!("New root leaf {} for {}", self.header.root_page, self.file_name());
        }

        let (path, leaf) = self.descend(Some(&key), Descent::Upper)?;
        if let Some((sep, new_page)) = self.insert_into_leaf(leaf, &key, &rid)? {
            self.insert_into_parents(path, leaf, sep, new_page)?;
        }
        debug!("Inserted {} {} into {}", self.codec.decode(&key), rid, self.file_name());
        Ok(())
    }

    /*
     * Returns the separator and the new leaf if the leaf splits.
     */
    fn insert_into_leaf(&mut self, leaf: PageNum, key: &[u8], rid: &RID) -> Result<Option<(Vec<u8>, PageNum)>, IndexingError> {
        let ph = self.get_page(leaf)?;
        let chain_key = self.chain_key(&ph.data())?;

        if let Some(chain_key) = chain_key {
            return match self.codec.compare(key, &chain_key) {
                Ordering::Equal => {
                    let free = self.layout.free_slot(&ph.data());
                    match free {
                        Some(slot) => self.layout.put_slot(&mut ph.data_mut(), slot, key, rid),
                        None => {
                            drop(ph);
                            self.insert_into_chain(leaf, key, rid)?;
                        },
                    }
                    Ok(None)
                },
                Ordering::Greater => {
                    //the chain stays, the new key gets a leaf of its own.
                    let new_leaf = self.new_right_leaf(&ph)?;
                    self.layout.put_slot(&mut new_leaf.data_mut(), 0, key, rid);
                    Ok(Some((key.to_vec(), new_leaf.get_page_num())))
                },
                Ordering::Less => {
                    //the chain moves to the new leaf with all entries of its key.
                    let new_leaf = self.new_right_leaf(&ph)?;
                    {
                        let src = ph.data();
                        let mut dst = new_leaf.data_mut();
                        let (parent, left, right) = (self.layout.parent(&dst), self.layout.left_leaf(&dst), self.layout.right_leaf(&dst));
                        dst.copy_from_slice(&src);
                        self.layout.set_parent(&mut dst, parent);
                        self.layout.set_left_leaf(&mut dst, left);
                        self.layout.set_right_leaf(&mut dst, right);
                    }
                    let mut data = ph.data_mut();
                    self.layout.clear_entries(&mut data);
                    self.layout.set_next_bucket(&mut data, NO_PAGE);
                    self.layout.put_slot(&mut data, 0, key, rid);
                    Ok(Some((chain_key, new_leaf.get_page_num())))
                },
            };
        }

        if !self.layout.is_full(&ph.data()) {
            let inserted = self.insert_sorted(&mut ph.data_mut(), key, rid);
            debug_assert!(inserted, "leaf {} has no free slot", leaf);
            return Ok(None);
        }

        let entries = self.sorted_entries(&ph.data());
        if entries.iter().all(|(k, _)| self.codec.compare(k, key) == Ordering::Equal) {
            let bucket = self.pfh.allocate_page()?;
            let mut data = bucket.data_mut();
            self.layout.init_bucket(&mut data);
            self.layout.put_slot(&mut data, 0, key, rid);
            self.layout.set_next_bucket(&mut ph.data_mut(), bucket.get_page_num());
            debug!("Leaf {} opened bucket {}", leaf, bucket.get_page_num());
            return Ok(None);
        }

        self.split_leaf(&ph, entries, key, rid).map(Some)
    }

    /*
     * Put an entry in a leaf that has a free slot, keeping live slots
     * sorted. Returns false if there is no free slot.
     */
    fn insert_sorted(&self, data: &mut [u8], key: &[u8], rid: &RID) -> bool {
        let layout = &self.layout;
        let live = layout.live_slots(data);
        let target = live.iter()
            .find(|&&s| self.codec.compare(layout.slot_key(data, s), key) == Ordering::Greater)
            .copied()
            .unwrap_or(layout.max_entries);

        let mut hole = match (target..layout.max_entries).find(|&s| !layout.is_live(data, s)) {
            Some(free) => {
                let mut hole = free;
                for &s in live.iter().rev().filter(|&&s| s >= target && s < free) {
                    layout.move_slot(data, s, hole);
                    hole = s;
                }
                hole
            },
            None => match (0..target).rev().find(|&s| !layout.is_live(data, s)) {
                Some(free) => free,
                None => return false,
            },
        };
        if hole < target {
            let start = hole;
            for &s in live.iter().filter(|&&s| s > start && s < target) {
                layout.move_slot(data, s, hole);
                hole = s;
            }
        }
        layout.put_slot(data, hole, key, rid);
        true
    }

    fn sorted_entries(&self, data: &[u8]) -> Vec<Entry> {
        self.layout.live_slots(data).into_iter()
            .map(|s| (self.layout.slot_key(data, s).to_vec(), self.layout.slot_rid(data, s)))
            .collect()
    }

    fn insert_into_chain(&mut self, leaf: PageNum, key: &[u8], rid: &RID) -> Result<(), IndexingError> {
        let mut last = leaf;
        let mut page_num = {
            let ph = self.get_page(leaf)?;
            let next = self.layout.next_bucket(&ph.data());
            next
        };
        while page_num != NO_PAGE {
            let ph = self.get_page(page_num)?;
            let free = self.layout.free_slot(&ph.data());
            if let Some(slot) = free {
                self.layout.put_slot(&mut ph.data_mut(), slot, key, rid);
                return Ok(());
            }
            last = page_num;
            page_num = self.layout.next_bucket(&ph.data());
        }

        let bucket = self.pfh.allocate_page()?;
        {
            let mut data = bucket.data_mut();
            self.layout.init_bucket(&mut data);
            self.layout.put_slot(&mut data, 0, key, rid);
        }
        let tail = self.get_page(last)?;
        self.layout.set_next_bucket(&mut tail.data_mut(), bucket.get_page_num());
        debug!("Bucket {} linked after page {}", bucket.get_page_num(), last);
        Ok(())
    }

    /*
     * Allocate an empty leaf and link it right after the given one,
     * under the same parent.
     */
    fn new_right_leaf(&mut self, ph: &PageHandle) -> Result<PageHandle, IndexingError> {
        let (parent, right) = {
            let data = ph.data();
            (self.layout.parent(&data), self.layout.right_leaf(&data))
        };
        let new_leaf = self.pfh.allocate_page()?;
        let new_page = new_leaf.get_page_num();
        self.layout.init_leaf(&mut new_leaf.data_mut(), parent, ph.get_page_num(), right);
        self.layout.set_right_leaf(&mut ph.data_mut(), new_page);
        if right != NO_PAGE {
            let right_ph = self.get_page(right)?;
            self.layout.set_left_leaf(&mut right_ph.data_mut(), new_page);
        }
        debug!("Leaf {} split into {}", ph.get_page_num(), new_page);
        Ok(new_leaf)
    }

    fn split_leaf(&mut self, ph: &PageHandle, mut entries: Vec<Entry>, key: &[u8], rid: &RID) -> Result<(Vec<u8>, PageNum), IndexingError> {
        let pos = entries.iter()
            .position(|(k, _)| self.codec.compare(k, key) == Ordering::Greater)
            .unwrap_or(entries.len());
        entries.insert(pos, (key.to_vec(), *rid));

        let total = entries.len();
        let is_cut = |i: usize| self.codec.compare(&entries[i - 1].0, &entries[i].0) != Ordering::Equal;
        let half = total / 2;
        let cut = (0..total)
            .flat_map(|d| vec![half + d, half.wrapping_sub(d)])
            .find(|&i| i >= 1 && i < total && is_cut(i))
            .unwrap_or(half);

        let new_leaf = self.new_right_leaf(ph)?;
        {
            let mut data = ph.data_mut();
            self.layout.clear_entries(&mut data);
            for (slot, (k, r)) in entries[..cut].iter().enumerate() {
                self.layout.put_slot(&mut data, slot, k, r);
            }
        }
        {
            let mut data = new_leaf.data_mut();
            for (slot, (k, r)) in entries[cut..].iter().enumerate() {
                self.layout.put_slot(&mut data, slot, k, r);
            }
        }
        Ok((entries[cut].0.clone(), new_leaf.get_page_num()))
    }

    /*
     * Insert (sep, right) into the parents of the split node left,
     * splitting up the path as long as the parent is full.
     */
    fn insert_into_parents(&mut self, mut path: Vec<(PageNum, usize)>, mut left: PageNum, mut sep: Vec<u8>, mut right: PageNum) -> Result<(), IndexingError> {
        let mut children_are_leaves = true;
        loop {
            let (page_num, index) = match path.pop() {
                Some(v) => v,
                None => return self.split_root(left, &sep, right, children_are_leaves),
            };
            let ph = self.get_page(page_num)?;
            let num_keys = self.layout.num_keys(&ph.data());

            if num_keys < self.layout.max_keys {
                let mut data = ph.data_mut();
                for i in (index..num_keys).rev() {
                    let k = self.layout.key(&data, i).to_vec();
                    self.layout.set_key(&mut data, i + 1, &k);
                    let child = self.layout.child(&data, i + 1);
                    self.layout.set_child(&mut data, i + 2, child);
                }
                self.layout.set_key(&mut data, index, &sep);
                self.layout.set_child(&mut data, index + 1, right);
                self.layout.set_num_keys(&mut data, num_keys + 1);
                return Ok(());
            }

            let (mut keys, mut children) = {
                let data = ph.data();
                let keys: Vec<Vec<u8>> = (0..num_keys).map(|i| self.layout.key(&data, i).to_vec()).collect();
                (keys, self.layout.children(&data))
            };
            keys.insert(index, sep);
            children.insert(index + 1, right);

            let mid = keys.len() / 2;
            let new_node = self.pfh.allocate_page()?;
            {
                let mut data = new_node.data_mut();
                self.layout.init_internal(&mut data, children[mid + 1]);
                for (i, k) in keys[mid + 1..].iter().enumerate() {
                    self.layout.set_key(&mut data, i, k);
                    self.layout.set_child(&mut data, i + 1, children[mid + 2 + i]);
                }
                self.layout.set_num_keys(&mut data, keys.len() - mid - 1);
            }
            {
                let mut data = ph.data_mut();
                for (i, k) in keys[..mid].iter().enumerate() {
                    self.layout.set_key(&mut data, i, k);
                    self.layout.set_child(&mut data, i + 1, children[i + 1]);
                }
                self.layout.set_num_keys(&mut data, mid);
            }
            drop(ph);
            if children_are_leaves {
                self.set_parents(&children[mid + 1..], new_node.get_page_num())?;
            }
            debug!("Internal node {} split into {}", page_num, new_node.get_page_num());

            left = page_num;
            right = new_node.get_page_num();
            sep = keys.swap_remove(mid);
            children_are_leaves = false;
        }
    }

    fn split_root(&mut self, left: PageNum, sep: &[u8], right: PageNum, children_are_leaves: bool) -> Result<(), IndexingError> {
        let root = self.pfh.allocate_page()?;
        let root_page = root.get_page_num();
        {
            let mut data = root.data_mut();
            self.layout.init_internal(&mut data, left);
            self.layout.set_key(&mut data, 0, sep);
            self.layout.set_child(&mut data, 1, right);
            self.layout.set_num_keys(&mut data, 1);
        }
        drop(root);
        if children_are_leaves {
            self.set_parents(&[left, right], root_page)?;
        }
        self.header.root_page = root_page;
        self.header.height += 1;
        self.header_changed = true;
        info!("Root of {} split, new root {} at height {}", self.file_name(), root_page, self.header.height);
        Ok(())
    }

    fn set_parents(&self, leaves: &[PageNum], parent: PageNum) -> Result<(), IndexingError> {
        for &leaf in leaves {
            let ph = self.get_page(leaf)?;
            self.layout.set_parent(&mut ph.data_mut(), parent);
        }
        Ok(())
    }

    /* Deletion */

    pub fn delete_entry(&mut self, key: &Key, rid: RID) -> Result<(), IndexingError> {
        self.check_open()?;
        Self::check_rid(&rid)?;
        let key = self.codec.encode(key)?;
        if self.header.root_page == NO_PAGE {
            return Err(IndexingError::EntryNotFound);
        }

        let (_, mut leaf) = self.descend(Some(&key), Descent::Lower)?;
        loop {
            let ph = self.get_page(leaf)?;
            let found = {
                let data = ph.data();
                self.layout.live_slots(&data).into_iter().find(|&s| {
                    self.layout.slot_rid(&data, s) == rid
                        && self.codec.compare(self.layout.slot_key(&data, s), &key) == Ordering::Equal
                })
            };
            if let Some(slot) = found {
                self.layout.clear_slot(&mut ph.data_mut(), slot);
                debug!("Deleted {} {} from leaf {}", self.codec.decode(&key), rid, leaf);
                return Ok(());
            }

            let (chain_key, passed, right) = {
                let data = ph.data();
                let passed = self.layout.live_slots(&data).into_iter()
                    .any(|s| self.codec.compare(self.layout.slot_key(&data, s), &key) == Ordering::Greater);
                (self.chain_key(&data)?, passed, self.layout.right_leaf(&data))
            };
            drop(ph);
            if let Some(chain_key) = chain_key {
                match self.codec.compare(&chain_key, &key) {
                    Ordering::Equal => {
                        if self.delete_from_chain(leaf, &key, &rid)? {
                            return Ok(());
                        }
                    },
                    Ordering::Greater => return Err(IndexingError::EntryNotFound),
                    Ordering::Less => {},
                }
            }
            if passed || right == NO_PAGE {
                return Err(IndexingError::EntryNotFound);
            }
            leaf = right;
        }
    }

    fn delete_from_chain(&mut self, leaf: PageNum, key: &[u8], rid: &RID) -> Result<bool, IndexingError> {
        let mut prev = leaf;
        let mut page_num = {
            let ph = self.get_page(leaf)?;
            let next = self.layout.next_bucket(&ph.data());
            next
        };
        while page_num != NO_PAGE {
            let ph = self.get_page(page_num)?;
            let (found, next) = {
                let data = ph.data();
                let found = self.layout.live_slots(&data).into_iter().find(|&s| {
                    self.layout.slot_rid(&data, s) == *rid
                        && self.codec.compare(self.layout.slot_key(&data, s), key) == Ordering::Equal
                });
                (found, self.layout.next_bucket(&data))
            };
            if let Some(slot) = found {
                let emptied = {
                    let mut data = ph.data_mut();
                    self.layout.clear_slot(&mut data, slot);
                    self.layout.num_entries(&data) == 0
                };
                drop(ph);
                if emptied {
                    let prev_ph = self.get_page(prev)?;
                    self.layout.set_next_bucket(&mut prev_ph.data_mut(), next);
                    drop(prev_ph);
                    self.pfh.dispose_page(page_num)?;
                    debug!("Bucket {} emptied and disposed", page_num);
                }
                debug!("Deleted {} {} from bucket {}", self.codec.decode(key), rid, page_num);
                return Ok(true);
            }
            prev = page_num;
            page_num = next;
        }
        Ok(false)
    }

    /* Persistence */

    fn write_header(&mut self) -> Result<(), IndexingError> {
        if self.header_changed {
            let ph = self.get_page(INDEX_HEADER_PAGE)?;
            self.header.write(&mut ph.data_mut());
            self.header_changed = false;
        }
        Ok(())
    }

    /*
     * Rewrite the header page if root or height changed, then
     * force all pages of the index file.
     */
    pub fn force_pages(&mut self) -> Result<(), IndexingError> {
        self.check_open()?;
        self.write_header()?;
        self.pfh.force_pages(None)?;
        Ok(())
    }

    pub(super) fn close(&mut self, pfm: &PageFileManager) -> Result<(), IndexingError> {
        self.check_open()?;
        self.write_header()?;
        pfm.close_file(&mut self.pfh)?;
        self.open_flag = false;
        Ok(())
    }
}

impl Drop for IndexHandle {
    fn drop(&mut self) {
        if self.open_flag {
            warn!("index {} dropped without being closed", self.file_name());
            if let Err(e) = self.write_header() {
                error!("writing the header of {} failed: {}", self.file_name(), e);
            }
        }
    }
}
