/**********************************************
  > File Name		: buffer_manager.rs
  > Author		    : lunar
  > Email			: lunar_ubuntu@qq.com
  > Created Time	: Mon 01 Mar 2021 07:52:27 PM CST
  > Location        : Shanghai
  > Copyright@ https://github.com/xiaoqixian
 **********************************************/

use std::cell::RefCell;
use std::collections::HashMap;
use std::fs::File;
use std::io::ErrorKind;
use std::os::unix::fs::FileExt;
use std::rc::Rc;

use log::{debug, info, warn};

use super::page_file::{PageNum, PAGE_FILE_HEADER_SIZE, PAGE_HEADER_SIZE, PAGE_SIZE};
use crate::errors::PageFileError;

/*
 * Memory and References.
 *
 * Buffer Pages Storage:
 * Every frame owns its bytes behind an Rc<RefCell<..>>. A PageHandle
 * clones the Rc of the frame it pins, so several pages can be held
 * at the same time (a leaf and its new sibling during a split) while
 * the buffer manager itself is only borrowed for the short moment of
 * a pin or an unpin.
 *
 * A frame is only reused when its pin count is 0, and by then no
 * PageHandle refers to its bytes any more.
 */

pub type FileId = u32;
pub type PageData = Rc<RefCell<Box<[u8]>>>;
type PageKey = (FileId, PageNum);

//bytes of one page slot in the file: page header + page data.
pub const FRAME_SIZE: usize = PAGE_HEADER_SIZE + PAGE_SIZE;

/*
 * Data structure to represent a page.
 * Notice that the data structure for a page in main memory
 * is different from it in a file.
 */
#[derive(Debug)]
struct BufferPage {
    data: PageData,
    next: i32,
    prev: i32,
    dirty: bool,
    pin_count: u32,
    key: Option<PageKey>, //None while the frame is in the free list.
    fp: Option<Rc<File>>,
}

impl BufferPage {
    fn new() -> Self {
        BufferPage {
            data: Rc::new(RefCell::new(vec![0; FRAME_SIZE].into_boxed_slice())),
            next: -1,
            prev: -1,
            dirty: false,
            pin_count: 0,
            key: None,
            fp: None,
        }
    }
}

/*
 * Accessing data on a page of a file requires first reading
 * the page into a buffer pool in main memory. While a page
 * is in memory and its data is available for manipulation,
 * the page is said to be "pinned". After the manipulation
 * is done, the page is "unpinned". Unpinning a page does
 * not necessarily cause the page to be remove from the buffer.
 * An unpinned page is kept in memory as long as its space in
 * the buffer pool is not needed.
 *
 * Unpinned pages are linked in a LRU list, first is the most
 * recently used one and last is the victim when we run out of
 * free frames. If every frame is pinned the table doubles.
 */
#[derive(Debug)]
pub struct BufferManager {
    buffer_table: Vec<BufferPage>,
    num_pages: usize, //number of frames holding a page, free frames not included.
    first: i32,       //most recently used unpinned frame.
    last: i32,        //least recently used unpinned frame.
    /* index of the first free frame.
     * all free frames are linked by the next
     * field in their data structure.*/
    free: i32,
    page_table: HashMap<PageKey, usize>, //we need this table to get a page quickly.
}

pub fn page_offset(page_num: PageNum) -> u64 {
    (PAGE_FILE_HEADER_SIZE + (page_num as usize) * FRAME_SIZE) as u64
}

impl BufferManager {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let mut buffer_table = Vec::with_capacity(capacity);
        for i in 0..capacity {
            let mut page = BufferPage::new();
            page.next = if i + 1 < capacity { (i + 1) as i32 } else { -1 };
            buffer_table.push(page);
        }
        debug!("buffer initial length = {}", capacity);
        BufferManager {
            buffer_table,
            num_pages: 0,
            first: -1,
            last: -1,
            free: 0,
            page_table: HashMap::new(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.buffer_table.len()
    }

    pub fn num_pages(&self) -> usize {
        self.num_pages
    }

    pub fn is_pinned(&self, file_id: FileId, page_num: PageNum) -> bool {
        match self.page_table.get(&(file_id, page_num)) {
            Some(&index) => self.buffer_table[index].pin_count > 0,
            None => false,
        }
    }

    pub fn pin_count(&self, file_id: FileId, page_num: PageNum) -> u32 {
        match self.page_table.get(&(file_id, page_num)) {
            Some(&index) => self.buffer_table[index].pin_count,
            None => 0,
        }
    }

    /*
     * Get a page and pin it, reading it from the file if it's not
     * in the buffer yet.
     */
    pub fn get_page(&mut self, file_id: FileId, page_num: PageNum, fp: &Rc<File>) -> Result<PageData, PageFileError> {
        if let Some(&index) = self.page_table.get(&(file_id, page_num)) {
            debug!("Getting page {} of file {} from buffer", page_num, file_id);
            self.pin(index);
            return Ok(self.buffer_table[index].data.clone());
        }

        debug!("Reading page {} of file {} from file", page_num, file_id);
        let index = self.alloc_frame()?;
        {
            let page = &mut self.buffer_table[index];
            page.key = Some((file_id, page_num));
            page.fp = Some(fp.clone());
        }
        if let Err(e) = self.read_page(index) {
            self.release_frame(index);
            return Err(e);
        }
        self.install(index, file_id, page_num);
        Ok(self.buffer_table[index].data.clone())
    }

    /*
     * Pin a page that is brand new in the file. Nothing is read,
     * the frame is zeroed and marked dirty so that the page reaches
     * the file on the next write back.
     */
    pub fn alloc_page(&mut self, file_id: FileId, page_num: PageNum, fp: &Rc<File>) -> Result<PageData, PageFileError> {
        let index = match self.page_table.get(&(file_id, page_num)) {
            Some(&index) => {
                self.pin(index);
                index
            },
            None => {
                let index = self.alloc_frame()?;
                {
                    let page = &mut self.buffer_table[index];
                    page.key = Some((file_id, page_num));
                    page.fp = Some(fp.clone());
                }
                self.install(index, file_id, page_num);
                index
            }
        };
        let page = &mut self.buffer_table[index];
        page.data.borrow_mut().iter_mut().for_each(|b| *b = 0);
        page.dirty = true;
        Ok(page.data.clone())
    }

    pub fn mark_dirty(&mut self, file_id: FileId, page_num: PageNum) -> Result<(), PageFileError> {
        let index = match self.page_table.get(&(file_id, page_num)) {
            None => return Err(PageFileError::PageNotInBuf(page_num)),
            Some(&v) => v,
        };
        let page = &mut self.buffer_table[index];
        if page.pin_count == 0 {
            return Err(PageFileError::PageUnpinned(page_num));
        }
        page.dirty = true;
        Ok(())
    }

    /*
     * Unpin a page.
     * If the pin count of a page decreases to 0, the page will be
     * linked to the head of the unused list.
     */
    pub fn unpin(&mut self, file_id: FileId, page_num: PageNum) -> Result<(), PageFileError> {
        let index = match self.page_table.get(&(file_id, page_num)) {
            None => {
                warn!("No page {} of file {} in the buffer", page_num, file_id);
                return Err(PageFileError::PageNotInBuf(page_num));
            },
            Some(&v) => v,
        };
        let page = &mut self.buffer_table[index];
        if page.pin_count == 0 {
            warn!("Page {} of file {} is already unpinned", page_num, file_id);
            return Err(PageFileError::PageUnpinned(page_num));
        }
        page.pin_count -= 1;
        if page.pin_count == 0 {
            self.link(index);
        }
        Ok(())
    }

    /*
     * Write the dirty pages of a file (or only one page of it) back
     * to the file. Pages stay in the buffer.
     */
    pub fn force_pages(&mut self, file_id: FileId, page_num: Option<PageNum>) -> Result<(), PageFileError> {
        for index in self.frames_of(file_id) {
            let page = &self.buffer_table[index];
            if let (Some(num), Some((_, p))) = (page_num, page.key) {
                if num != p {
                    continue;
                }
            }
            if page.dirty {
                self.write_page(index)?;
                self.buffer_table[index].dirty = false;
            }
        }
        Ok(())
    }

    /*
     * Release all pages that belong to a same file at the same
     * time, writing dirty ones back. Pinned pages are skipped and
     * reported after the others have been released.
     */
    pub fn flush_pages(&mut self, file_id: FileId) -> Result<(), PageFileError> {
        let mut pinned: Option<PageNum> = None;
        for index in self.frames_of(file_id) {
            let (pin_count, dirty, page_num) = {
                let page = &self.buffer_table[index];
                (page.pin_count, page.dirty, page.key.map(|k| k.1).unwrap_or(-1))
            };
            if pin_count > 0 {
                warn!("Page {} of file {} is pinned while flushing", page_num, file_id);
                pinned = Some(page_num);
                continue;
            }
            if dirty {
                self.write_page(index)?;
                self.buffer_table[index].dirty = false;
            }
            self.unlink(index);
            self.release_frame(index);
        }
        match pinned {
            Some(p) => Err(PageFileError::PagePinned(p)),
            None => Ok(()),
        }
    }

    fn frames_of(&self, file_id: FileId) -> Vec<usize> {
        let mut frames: Vec<usize> = self
            .page_table
            .iter()
            .filter(|((f, _), _)| *f == file_id)
            .map(|(_, &index)| index)
            .collect();
        frames.sort_unstable();
        frames
    }

    fn pin(&mut self, index: usize) {
        if self.buffer_table[index].pin_count == 0 {
            //remove the page from the unused list.
            self.unlink(index);
        }
        self.buffer_table[index].pin_count += 1;
    }

    fn install(&mut self, index: usize, file_id: FileId, page_num: PageNum) {
        self.page_table.insert((file_id, page_num), index);
        self.num_pages += 1;
        let page = &mut self.buffer_table[index];
        page.pin_count = 1;
        page.dirty = false;
        page.next = -1;
        page.prev = -1;
    }

    /*
     * Find a frame for a new page: a free one first, then the least
     * recently used unpinned one, and when every frame is pinned we
     * have to resize the buffer.
     */
    fn alloc_frame(&mut self) -> Result<usize, PageFileError> {
        if self.free == -1 {
            if self.last != -1 {
                let victim = self.last as usize;
                debug!("No free frames, evicting frame {}", victim);
                if self.buffer_table[victim].dirty {
                    self.write_page(victim)?;
                    self.buffer_table[victim].dirty = false;
                }
                self.unlink(victim);
                self.release_frame(victim);
            } else {
                self.resize_buffer();
            }
        }
        let index = self.free as usize;
        self.free = self.buffer_table[index].next;
        let page = &mut self.buffer_table[index];
        page.next = -1;
        page.prev = -1;
        Ok(index)
    }

    //give a frame back to the free list. The frame must be out of the LRU list.
    fn release_frame(&mut self, index: usize) {
        let free = self.free;
        let page = &mut self.buffer_table[index];
        if let Some(key) = page.key.take() {
            if self.page_table.remove(&key).is_some() {
                self.num_pages -= 1;
            }
        }
        page.dirty = false;
        page.pin_count = 0;
        page.fp = None;
        page.prev = -1;
        page.next = free;
        self.free = index as i32;
    }

    fn resize_buffer(&mut self) {
        let cap = self.buffer_table.len();
        let new_cap = cap << 1;
        for i in cap..new_cap {
            let mut page = BufferPage::new();
            page.next = if i + 1 < new_cap { (i + 1) as i32 } else { self.free };
            self.buffer_table.push(page);
        }
        self.free = cap as i32;
        info!("Buffer pool new capacity: {}", new_cap);
    }

    /*
     * Unlink a frame from the unused list.
     */
    fn unlink(&mut self, index: usize) {
        let (prev, next) = {
            let page = &self.buffer_table[index];
            (page.prev, page.next)
        };
        if prev == -1 {
            if self.first == index as i32 {
                self.first = next;
            }
        } else {
            self.buffer_table[prev as usize].next = next;
        }
        if next == -1 {
            if self.last == index as i32 {
                self.last = prev;
            }
        } else {
            self.buffer_table[next as usize].prev = prev;
        }
        let page = &mut self.buffer_table[index];
        page.prev = -1;
        page.next = -1;
    }

    fn link(&mut self, index: usize) {
        let first = self.first;
        {
            let page = &mut self.buffer_table[index];
            page.next = first;
            page.prev = -1;
        }
        if first != -1 {
            self.buffer_table[first as usize].prev = index as i32;
        }
        self.first = index as i32;
        if self.last == -1 {
            self.last = index as i32;
        }
    }

    /*
     * read page header and data.
     */
    fn read_page(&self, index: usize) -> Result<(), PageFileError> {
        let page = &self.buffer_table[index];
        let (fp, page_num) = match (&page.fp, page.key) {
            (Some(fp), Some((_, p))) => (fp, p),
            _ => return Err(PageFileError::PageNotInBuf(-1)),
        };
        let mut data = page.data.borrow_mut();
        match fp.read_exact_at(&mut data[..], page_offset(page_num)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => Err(PageFileError::IncompleteRead(page_num)),
            Err(e) => Err(PageFileError::Unix(e)),
        }
    }

    /*
     * Write a page back to its file.
     * Every frame keeps the file it was read from, so pages of
     * several files can share the same pool.
     */
    fn write_page(&self, index: usize) -> Result<(), PageFileError> {
        let page = &self.buffer_table[index];
        let (fp, page_num) = match (&page.fp, page.key) {
            (Some(fp), Some((_, p))) => (fp, p),
            _ => return Err(PageFileError::PageNotInBuf(-1)),
        };
        debug!("Writing page {} back", page_num);
        let data = page.data.borrow();
        match fp.write_all_at(&data[..], page_offset(page_num)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::WriteZero => Err(PageFileError::IncompleteWrite(page_num)),
            Err(e) => Err(PageFileError::Unix(e)),
        }
    }
}

impl Drop for BufferManager {
    fn drop(&mut self) {
        for index in 0..self.buffer_table.len() {
            if self.buffer_table[index].dirty {
                if let Err(e) = self.write_page(index) {
                    warn!("Dirty frame {} lost while dropping the buffer: {}", index, e);
                }
            }
        }
    }
}
