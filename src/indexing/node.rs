/**********************************************
  > File Name		: node.rs
  > Author		    : lunar
  > Email			: lunar_ubuntu@qq.com
  > Created Time	: Sun 23 May 2021 09:12:50 AM CST
  > Location        : Shanghai
  > Copyright@ https://github.com/xiaoqixian
 **********************************************/

/*
 * Page layouts of an index file.
 *
 * Page 0 is the index file header:
 *     root_page | height | attr_type | attr_length |
 *     max_keys | max_entries | internal_header_size | leaf_header_size
 * all of them int32.
 *
 * Internal node:
 *     num_keys | child0 | key0 | child1 | key1 | child2 ...
 * child i holds keys not greater than key i, child i+1 holds keys
 * not less than key i.
 *
 * Leaf node:
 *     num_entries | next_bucket | parent | left_leaf | right_leaf |
 *     bitmap | slots
 * every slot is key | rid page num | rid slot num. Live slots are
 * sorted by key ascending, a slot is live iff its bit is set.
 *
 * Bucket:
 *     same layout as a leaf so bitmap and slots sit at the same
 *     offsets, parent and siblings are NO_PAGE. Buckets of a leaf
 *     form a singly linked list through next_bucket.
 */

use crate::errors::IndexingError;
use crate::page_management::page_file::{PageNum, NO_PAGE, PAGE_SIZE};
use crate::record_management::RID;
use crate::utils;

use super::AttrType;

pub const INDEX_HEADER_PAGE: PageNum = 0;

pub const INTERNAL_HEADER_SIZE: usize = 4;
pub const LEAF_HEADER_SIZE: usize = 20;
const CHILD_SIZE: usize = 4;
const RID_SIZE: usize = 8;

const NUM_ENTRIES_OFFSET: usize = 0;
const NEXT_BUCKET_OFFSET: usize = 4;
const PARENT_OFFSET: usize = 8;
const LEFT_LEAF_OFFSET: usize = 12;
const RIGHT_LEAF_OFFSET: usize = 16;

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct IndexFileHeader {
    pub root_page: PageNum,
    pub height: i32, //number of levels, 1 when the root is a leaf, 0 when there is no root.
    pub attr_type: AttrType,
    pub attr_length: usize,
    pub max_keys: usize,    //keys per internal node.
    pub max_entries: usize, //entries per leaf or bucket.
    pub internal_header_size: usize,
    pub leaf_header_size: usize,
}

impl IndexFileHeader {
    pub fn new(attr_type: AttrType, attr_length: usize) -> Self {
        IndexFileHeader {
            root_page: NO_PAGE,
            height: 0,
            attr_type,
            attr_length,
            max_keys: Self::calc_max_keys(attr_length),
            max_entries: Self::calc_max_entries(attr_length),
            internal_header_size: INTERNAL_HEADER_SIZE,
            leaf_header_size: LEAF_HEADER_SIZE,
        }
    }

    //one child pointer more than keys.
    pub fn calc_max_keys(attr_length: usize) -> usize {
        (PAGE_SIZE - INTERNAL_HEADER_SIZE - CHILD_SIZE) / (attr_length + CHILD_SIZE)
    }

    //every entry costs a slot and a bit in the bitmap.
    pub fn calc_max_entries(attr_length: usize) -> usize {
        let slot_size = attr_length + RID_SIZE;
        let mut n = 8 * (PAGE_SIZE - LEAF_HEADER_SIZE) / (8 * slot_size + 1);
        while LEAF_HEADER_SIZE + utils::calc_bitmap_size(n) + n * slot_size > PAGE_SIZE {
            n -= 1;
        }
        n
    }

    pub fn write(&self, data: &mut [u8]) {
        utils::write_i32(data, 0, self.root_page);
        utils::write_i32(data, 4, self.height);
        utils::write_i32(data, 8, self.attr_type.to_i32());
        utils::write_i32(data, 12, self.attr_length as i32);
        utils::write_i32(data, 16, self.max_keys as i32);
        utils::write_i32(data, 20, self.max_entries as i32);
        utils::write_i32(data, 24, self.internal_header_size as i32);
        utils::write_i32(data, 28, self.leaf_header_size as i32);
    }

    pub fn read(data: &[u8]) -> Result<Self, IndexingError> {
        let attr_type = AttrType::from_i32(utils::read_i32(data, 8)).map_err(|_| IndexingError::CorruptedHeader)?;
        let attr_length = utils::read_i32(data, 12);
        if attr_length < 0 || !attr_type.check_length(attr_length as usize) {
            return Err(IndexingError::CorruptedHeader);
        }
        let expected = Self::new(attr_type, attr_length as usize);
        let header = IndexFileHeader {
            root_page: utils::read_i32(data, 0),
            height: utils::read_i32(data, 4),
            attr_type,
            attr_length: attr_length as usize,
            max_keys: utils::read_i32(data, 16) as usize,
            max_entries: utils::read_i32(data, 20) as usize,
            internal_header_size: utils::read_i32(data, 24) as usize,
            leaf_header_size: utils::read_i32(data, 28) as usize,
        };
        if header.max_keys != expected.max_keys
            || header.max_entries != expected.max_entries
            || header.internal_header_size != INTERNAL_HEADER_SIZE
            || header.leaf_header_size != LEAF_HEADER_SIZE
            || header.height < 0
        {
            return Err(IndexingError::CorruptedHeader);
        }
        Ok(header)
    }

    pub fn layout(&self) -> NodeLayout {
        NodeLayout {
            attr_length: self.attr_length,
            max_keys: self.max_keys,
            max_entries: self.max_entries,
            bitmap_size: utils::calc_bitmap_size(self.max_entries),
        }
    }
}

/*
 * Field access of internal, leaf and bucket pages. The layout only
 * depends on the key width, so one NodeLayout serves every page of
 * an index.
 */
#[derive(Debug, Copy, Clone)]
pub struct NodeLayout {
    pub attr_length: usize,
    pub max_keys: usize,
    pub max_entries: usize,
    bitmap_size: usize,
}

impl NodeLayout {
    /* internal nodes */

    pub fn init_internal(&self, data: &mut [u8], child0: PageNum) {
        self.set_num_keys(data, 0);
        self.set_child(data, 0, child0);
    }

    pub fn num_keys(&self, data: &[u8]) -> usize {
        utils::read_i32(data, 0) as usize
    }

    pub fn set_num_keys(&self, data: &mut [u8], num: usize) {
        utils::write_i32(data, 0, num as i32);
    }

    fn child_offset(&self, index: usize) -> usize {
        INTERNAL_HEADER_SIZE + index * (self.attr_length + CHILD_SIZE)
    }

    fn key_offset(&self, index: usize) -> usize {
        self.child_offset(index) + CHILD_SIZE
    }

    pub fn child(&self, data: &[u8], index: usize) -> PageNum {
        utils::read_i32(data, self.child_offset(index))
    }

    pub fn set_child(&self, data: &mut [u8], index: usize, child: PageNum) {
        utils::write_i32(data, self.child_offset(index), child);
    }

    pub fn key<'a>(&self, data: &'a [u8], index: usize) -> &'a [u8] {
        let offset = self.key_offset(index);
        &data[offset..offset + self.attr_length]
    }

    pub fn set_key(&self, data: &mut [u8], index: usize, key: &[u8]) {
        let offset = self.key_offset(index);
        data[offset..offset + self.attr_length].copy_from_slice(&key[..self.attr_length]);
    }

    pub fn children(&self, data: &[u8]) -> Vec<PageNum> {
        (0..=self.num_keys(data)).map(|i| self.child(data, i)).collect()
    }

    /* leaves and buckets */

    pub fn init_leaf(&self, data: &mut [u8], parent: PageNum, left: PageNum, right: PageNum) {
        self.set_num_entries(data, 0);
        self.set_next_bucket(data, NO_PAGE);
        self.set_parent(data, parent);
        self.set_left_leaf(data, left);
        self.set_right_leaf(data, right);
        for b in self.bitmap_mut(data).iter_mut() {
            *b = 0;
        }
    }

    pub fn init_bucket(&self, data: &mut [u8]) {
        self.init_leaf(data, NO_PAGE, NO_PAGE, NO_PAGE);
    }

    pub fn num_entries(&self, data: &[u8]) -> usize {
        utils::read_i32(data, NUM_ENTRIES_OFFSET) as usize
    }

    pub fn set_num_entries(&self, data: &mut [u8], num: usize) {
        utils::write_i32(data, NUM_ENTRIES_OFFSET, num as i32);
    }

    pub fn next_bucket(&self, data: &[u8]) -> PageNum {
        utils::read_i32(data, NEXT_BUCKET_OFFSET)
    }

    pub fn set_next_bucket(&self, data: &mut [u8], page: PageNum) {
        utils::write_i32(data, NEXT_BUCKET_OFFSET, page);
    }

    pub fn parent(&self, data: &[u8]) -> PageNum {
        utils::read_i32(data, PARENT_OFFSET)
    }

    pub fn set_parent(&self, data: &mut [u8], page: PageNum) {
        utils::write_i32(data, PARENT_OFFSET, page);
    }

    pub fn left_leaf(&self, data: &[u8]) -> PageNum {
        utils::read_i32(data, LEFT_LEAF_OFFSET)
    }

    pub fn set_left_leaf(&self, data: &mut [u8], page: PageNum) {
        utils::write_i32(data, LEFT_LEAF_OFFSET, page);
    }

    pub fn right_leaf(&self, data: &[u8]) -> PageNum {
        utils::read_i32(data, RIGHT_LEAF_OFFSET)
    }

    pub fn set_right_leaf(&self, data: &mut [u8], page: PageNum) {
        utils::write_i32(data, RIGHT_LEAF_OFFSET, page);
    }

    fn bitmap<'a>(&self, data: &'a [u8]) -> &'a [u8] {
        &data[LEAF_HEADER_SIZE..LEAF_HEADER_SIZE + self.bitmap_size]
    }

    fn bitmap_mut<'a>(&self, data: &'a mut [u8]) -> &'a mut [u8] {
        &mut data[LEAF_HEADER_SIZE..LEAF_HEADER_SIZE + self.bitmap_size]
    }

    fn slot_offset(&self, slot: usize) -> usize {
        LEAF_HEADER_SIZE + self.bitmap_size + slot * (self.attr_length + RID_SIZE)
    }

    pub fn is_live(&self, data: &[u8], slot: usize) -> bool {
        utils::get_bit(self.bitmap(data), slot)
    }

    fn set_live(&self, data: &mut [u8], slot: usize, live: bool) {
        utils::set_bit(self.bitmap_mut(data), slot, live);
    }

    pub fn slot_key<'a>(&self, data: &'a [u8], slot: usize) -> &'a [u8] {
        let offset = self.slot_offset(slot);
        &data[offset..offset + self.attr_length]
    }

    pub fn slot_rid(&self, data: &[u8], slot: usize) -> RID {
        let offset = self.slot_offset(slot) + self.attr_length;
        RID::new(utils::read_i32(data, offset), utils::read_i32(data, offset + 4))
    }

    pub fn free_slot(&self, data: &[u8]) -> Option<usize> {
        utils::first_free_bit(self.bitmap(data), self.max_entries)
    }

    pub fn is_full(&self, data: &[u8]) -> bool {
        self.num_entries(data) >= self.max_entries
    }

    //first live slot at or after from.
    pub fn next_live(&self, data: &[u8], from: usize) -> Option<usize> {
        (from..self.max_entries).find(|&slot| self.is_live(data, slot))
    }

    pub fn live_slots(&self, data: &[u8]) -> Vec<usize> {
        (0..self.max_entries).filter(|&slot| self.is_live(data, slot)).collect()
    }

    //fill a free slot, the entry count follows the bitmap.
    pub fn put_slot(&self, data: &mut [u8], slot: usize, key: &[u8], rid: &RID) {
        let offset = self.slot_offset(slot);
        data[offset..offset + self.attr_length].copy_from_slice(&key[..self.attr_length]);
        utils::write_i32(data, offset + self.attr_length, rid.get_page_num());
        utils::write_i32(data, offset + self.attr_length + 4, rid.get_slot_num());
        if !self.is_live(data, slot) {
            self.set_live(data, slot, true);
            let num = self.num_entries(data);
            self.set_num_entries(data, num + 1);
        }
    }

    pub fn clear_slot(&self, data: &mut [u8], slot: usize) {
        if self.is_live(data, slot) {
            self.set_live(data, slot, false);
            let num = self.num_entries(data);
            self.set_num_entries(data, num - 1);
        }
    }

    //move a live entry to a free slot of the same page.
    pub fn move_slot(&self, data: &mut [u8], from: usize, to: usize) {
        let size = self.attr_length + RID_SIZE;
        let src = self.slot_offset(from);
        let dst = self.slot_offset(to);
        data.copy_within(src..src + size, dst);
        self.set_live(data, from, false);
        self.set_live(data, to, true);
    }

    //drop every entry but keep the links.
    pub fn clear_entries(&self, data: &mut [u8]) {
        self.set_num_entries(data, 0);
        for b in self.bitmap_mut(data).iter_mut() {
            *b = 0;
        }
    }
}
