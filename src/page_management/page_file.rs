/**********************************************
  > File Name		: page_file.rs
  > Author		    : lunar
  > Email			: lunar_ubuntu@qq.com
  > Created Time	: Mon 01 Mar 2021 07:31:48 PM CST
  > Location        : Shanghai
  > Copyright@ https://github.com/xiaoqixian
 **********************************************/

/*
 * Introduction:
 *
 * The page_file component provides facilities for higer-level
 * components to perform file I/O in terms of pages.
 *
 * Methods are provided to create, destroy, open and close paged
 * files, to read a specific page of a given file, to add and
 * dispose pages of a given file, and to force pages to disk.
 *
 * Accessing data on a page of a file requires first reading the page
 * into the buffer pool in main memory, then manipulating its data there.
 * A page read this way is pinned until the PageHandle returned for it
 * is dropped, the drop is what unpins the page. So a page can't be
 * left pinned by an early return.
 *
 * File layout:
 *     | file header (40 bytes) | page 0 | page 1 | ...
 * and every page:
 *     | page header (4 bytes) | data (PAGE_SIZE bytes) |
 * The page header is PAGE_USED for a page in use, otherwise it is
 * the number of the next disposed page, so all disposed pages form
 * a free list headed by first_free in the file header.
 */

use std::cell::{Cell, Ref, RefCell, RefMut};
use std::fs::{File, OpenOptions};
use std::io::ErrorKind;
use std::os::unix::fs::FileExt;
use std::path::PathBuf;
use std::rc::Rc;

use log::{debug, error, info, warn};

use super::buffer_manager::{BufferManager, FileId, PageData};
use crate::config::PageFileConfig;
use crate::errors::PageFileError;
use crate::utils;

pub type PageNum = i32;

pub const PAGE_FILE_HEADER_SIZE: usize = 40;
pub const PAGE_HEADER_SIZE: usize = 4;
pub const PAGE_SIZE: usize = 4096;

pub const NO_PAGE: PageNum = -1; //end of a page list.
pub const PAGE_USED: PageNum = -2;

#[derive(Debug, Clone, Copy)]
pub struct PageFileHeader {
    num_pages: i32,        //number of pages, disposed ones included.
    first_free: PageNum,   //the number of the first disposed page.
}

impl PageFileHeader {
    pub fn new() -> Self {
        PageFileHeader {
            num_pages: 0,
            first_free: NO_PAGE,
        }
    }

    fn to_bytes(&self) -> [u8; PAGE_FILE_HEADER_SIZE] {
        let mut buf = [0u8; PAGE_FILE_HEADER_SIZE];
        utils::write_i32(&mut buf, 0, self.num_pages);
        utils::write_i32(&mut buf, 4, self.first_free);
        buf
    }

    fn from_bytes(buf: &[u8]) -> Self {
        PageFileHeader {
            num_pages: utils::read_i32(buf, 0),
            first_free: utils::read_i32(buf, 4),
        }
    }
}

impl Default for PageFileHeader {
    fn default() -> Self {
        Self::new()
    }
}

/*
 * A pinned page. The page gets unpinned when the handle is dropped.
 */
pub struct PageHandle {
    page_num: PageNum,
    file_id: FileId,
    data: PageData,
    buffer: Rc<RefCell<BufferManager>>,
}

impl PageHandle {
    pub fn get_page_num(&self) -> PageNum {
        self.page_num
    }

    pub fn data(&self) -> Ref<'_, [u8]> {
        Ref::map(self.data.borrow(), |d| &d[PAGE_HEADER_SIZE..])
    }

    //borrowing the data mutably marks the page dirty.
    pub fn data_mut(&self) -> RefMut<'_, [u8]> {
        self.mark_dirty();
        RefMut::map(self.data.borrow_mut(), |d| &mut d[PAGE_HEADER_SIZE..])
    }

    pub fn mark_dirty(&self) {
        if let Err(e) = self.buffer.borrow_mut().mark_dirty(self.file_id, self.page_num) {
            error!("mark_dirty on a pinned page failed: {}", e);
        }
    }

    fn page_header(&self) -> PageNum {
        utils::read_i32(&self.data.borrow(), 0)
    }

    fn set_page_header(&self, val: PageNum) {
        self.mark_dirty();
        utils::write_i32(&mut self.data.borrow_mut(), 0, val);
    }
}

impl Drop for PageHandle {
    fn drop(&mut self) {
        if let Err(e) = self.buffer.borrow_mut().unpin(self.file_id, self.page_num) {
            error!("unpin page {} failed: {}", self.page_num, e);
        }
    }
}

impl std::fmt::Debug for PageHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PageHandle")
            .field("page_num", &self.page_num)
            .field("file_id", &self.file_id)
            .finish()
    }
}

/*
 * The PageFileHandle provides access to the pages of an open file.
 */
#[derive(Debug)]
pub struct PageFileHandle {
    file_name: String,
    file_id: FileId,
    fp: Rc<File>,
    header: PageFileHeader,
    header_changed: bool,
    open_flag: bool,
    buffer: Rc<RefCell<BufferManager>>,
}

impl PageFileHandle {
    pub fn is_open(&self) -> bool {
        self.open_flag
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn num_pages(&self) -> i32 {
        self.header.num_pages
    }

    pub fn first_free(&self) -> PageNum {
        self.header.first_free
    }

    fn check_open(&self) -> Result<(), PageFileError> {
        if self.open_flag {
            Ok(())
        } else {
            Err(PageFileError::FileClosed)
        }
    }

    fn check_page_num(&self, page_num: PageNum) -> Result<(), PageFileError> {
        if page_num < 0 || page_num >= self.header.num_pages {
            return Err(PageFileError::InvalidPage(page_num));
        }
        Ok(())
    }

    fn wrap(&self, page_num: PageNum, data: PageData) -> PageHandle {
        PageHandle {
            page_num,
            file_id: self.file_id,
            data,
            buffer: self.buffer.clone(),
        }
    }

    /*
     * Get a page in use and pin it.
     */
    pub fn get_page(&self, page_num: PageNum) -> Result<PageHandle, PageFileError> {
        self.check_open()?;
        self.check_page_num(page_num)?;
        let data = self.buffer.borrow_mut().get_page(self.file_id, page_num, &self.fp)?;
        let ph = self.wrap(page_num, data);
        if ph.page_header() != PAGE_USED {
            //ph is dropped here and the page unpinned.
            return Err(PageFileError::InvalidPage(page_num));
        }
        Ok(ph)
    }

    /*
     * allocate a page in the file.
     * A disposed page is reused before the file grows.
     * The page data returned is zeroed.
     */
    pub fn allocate_page(&mut self) -> Result<PageHandle, PageFileError> {
        self.check_open()?;
        let ph = if self.header.first_free != NO_PAGE {
            let page_num = self.header.first_free;
            let data = self.buffer.borrow_mut().get_page(self.file_id, page_num, &self.fp)?;
            let ph = self.wrap(page_num, data);
            self.header.first_free = ph.page_header();
            ph.data_mut().iter_mut().for_each(|b| *b = 0);
            ph
        } else {
            let page_num = self.header.num_pages;
            let data = self.buffer.borrow_mut().alloc_page(self.file_id, page_num, &self.fp)?;
            self.header.num_pages += 1;
            self.wrap(page_num, data)
        };
        ph.set_page_header(PAGE_USED);
        self.header_changed = true;
        debug!("Allocated page {} in {}", ph.get_page_num(), self.file_name);
        Ok(ph)
    }

    /*
     * Give a page back to the free list of the file.
     * The page must not be pinned by anyone.
     */
    pub fn dispose_page(&mut self, page_num: PageNum) -> Result<(), PageFileError> {
        self.check_open()?;
        self.check_page_num(page_num)?;
        if self.buffer.borrow().is_pinned(self.file_id, page_num) {
            return Err(PageFileError::PagePinned(page_num));
        }
        let ph = self.get_page(page_num)?;
        ph.set_page_header(self.header.first_free);
        self.header.first_free = page_num;
        self.header_changed = true;
        debug!("Disposed page {} in {}", page_num, self.file_name);
        Ok(())
    }

    pub fn mark_dirty(&self, page_num: PageNum) -> Result<(), PageFileError> {
        self.check_open()?;
        self.buffer.borrow_mut().mark_dirty(self.file_id, page_num)
    }

    //unpinning is dropping the handle, this only makes it explicit.
    pub fn unpin_page(&self, ph: PageHandle) {
        drop(ph);
    }

    pub fn is_pinned(&self, page_num: PageNum) -> bool {
        self.buffer.borrow().is_pinned(self.file_id, page_num)
    }

    fn write_header(&mut self) -> Result<(), PageFileError> {
        if self.header_changed {
            self.fp.write_all_at(&self.header.to_bytes(), 0)?;
            self.header_changed = false;
        }
        Ok(())
    }

    /*
     * Force dirty pages (all of them, or just one) to the disk.
     * Pages stay in the buffer.
     */
    pub fn force_pages(&mut self, page_num: Option<PageNum>) -> Result<(), PageFileError> {
        self.check_open()?;
        self.write_header()?;
        self.buffer.borrow_mut().force_pages(self.file_id, page_num)?;
        self.fp.sync_all()?;
        Ok(())
    }

    /*
     * Write dirty pages back and release all pages of this file
     * from the buffer.
     */
    pub fn flush_pages(&mut self) -> Result<(), PageFileError> {
        self.check_open()?;
        self.write_header()?;
        self.buffer.borrow_mut().flush_pages(self.file_id)
    }
}

impl Drop for PageFileHandle {
    fn drop(&mut self) {
        if self.open_flag {
            warn!("{} dropped without being closed", self.file_name);
            if let Err(e) = self.flush_pages() {
                error!("flushing {} failed: {}", self.file_name, e);
            }
        }
    }
}

/*
 * The PageFileManager handles the creation, deletion, opening,
 * and closing of paged files. All files opened by one manager
 * (and its clones) share the same buffer pool.
 */
#[derive(Debug, Clone)]
pub struct PageFileManager {
    config: PageFileConfig,
    buffer: Rc<RefCell<BufferManager>>,
    next_file_id: Rc<Cell<FileId>>,
}

impl PageFileManager {
    pub fn new(config: PageFileConfig) -> Self {
        let buffer = BufferManager::new(config.buffer_pages);
        PageFileManager {
            config,
            buffer: Rc::new(RefCell::new(buffer)),
            next_file_id: Rc::new(Cell::new(1)),
        }
    }

    pub fn config(&self) -> &PageFileConfig {
        &self.config
    }

    pub fn buffer(&self) -> Rc<RefCell<BufferManager>> {
        self.buffer.clone()
    }

    fn file_path(&self, file_name: &str) -> Result<PathBuf, PageFileError> {
        if file_name.is_empty() || file_name.contains('/') || file_name.contains('\0') {
            return Err(PageFileError::InvalidName(file_name.to_string()));
        }
        Ok(self.config.base_dir.join(file_name))
    }

    pub fn create_file(&self, file_name: &str) -> Result<(), PageFileError> {
        let path = self.file_path(file_name)?;
        let fp = match OpenOptions::new().read(true).write(true).create_new(true).open(&path) {
            Ok(v) => v,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                return Err(PageFileError::FileExist(file_name.to_string()));
            },
            Err(e) => return Err(PageFileError::Unix(e)),
        };
        fp.write_all_at(&PageFileHeader::new().to_bytes(), 0)?;
        info!("Created paged file {}", path.display());
        Ok(())
    }

    pub fn destroy_file(&self, file_name: &str) -> Result<(), PageFileError> {
        let path = self.file_path(file_name)?;
        match std::fs::remove_file(&path) {
            Ok(()) => {
                info!("Destroyed paged file {}", path.display());
                Ok(())
            },
            Err(e) if e.kind() == ErrorKind::NotFound => Err(PageFileError::FileNotFound(file_name.to_string())),
            Err(e) => Err(PageFileError::Unix(e)),
        }
    }

    pub fn open_file(&self, file_name: &str) -> Result<PageFileHandle, PageFileError> {
        let path = self.file_path(file_name)?;
        let fp = match OpenOptions::new().read(true).write(true).open(&path) {
            Ok(v) => v,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(PageFileError::FileNotFound(file_name.to_string()));
            },
            Err(e) => return Err(PageFileError::Unix(e)),
        };
        let mut buf = [0u8; PAGE_FILE_HEADER_SIZE];
        match fp.read_exact_at(&mut buf, 0) {
            Ok(()) => {},
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => return Err(PageFileError::IncompleteRead(NO_PAGE)),
            Err(e) => return Err(PageFileError::Unix(e)),
        }

        let file_id = self.next_file_id.get();
        self.next_file_id.set(file_id + 1);
        debug!("Opened {} as file {}", file_name, file_id);

        Ok(PageFileHandle {
            file_name: file_name.to_string(),
            file_id,
            fp: Rc::new(fp),
            header: PageFileHeader::from_bytes(&buf),
            header_changed: false,
            open_flag: true,
            buffer: self.buffer.clone(),
        })
    }

    /*
     * Closing a file writes back all its dirty pages and releases
     * them from the buffer. Every page of the file must be unpinned.
     */
    pub fn close_file(&self, pfh: &mut PageFileHandle) -> Result<(), PageFileError> {
        pfh.flush_pages()?;
        pfh.open_flag = false;
        debug!("Closed {}", pfh.file_name);
        Ok(())
    }
}
