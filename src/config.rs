/**********************************************
  > File Name		: config.rs
  > Author		    : lunar
  > Email			: lunar_ubuntu@qq.com
  > Created Time	: Mon 17 May 2021 02:11:38 PM CST
  > Location        : Shanghai
  > Copyright@ https://github.com/xiaoqixian
 **********************************************/

use std::path::PathBuf;

/*
 * Where paged files live and how many frames the buffer pool
 * starts with. The pool still doubles itself when every frame
 * is pinned, so buffer_pages is only the initial capacity.
 */
#[derive(Debug, Clone)]
pub struct PageFileConfig {
    pub base_dir: PathBuf,
    pub buffer_pages: usize,
}

impl PageFileConfig {
    pub fn new<P: Into<PathBuf>>(base_dir: P) -> Self {
        Self {
            base_dir: base_dir.into(),
            ..Self::default()
        }
    }

    pub fn with_buffer_pages(mut self, buffer_pages: usize) -> Self {
        self.buffer_pages = buffer_pages.max(1);
        self
    }
}

impl Default for PageFileConfig {
    fn default() -> Self {
        Self {
            base_dir: PathBuf::from("."),
            buffer_pages: 128,
        }
    }
}
