/**********************************************
  > File Name		: mod.rs
  > Author		    : lunar
  > Email			: lunar_ubuntu@qq.com
  > Created Time     : Wed Mar 10 07:25:33 PM CST 2021
  > Location        : Shanghai
  > Copyright@ https://github.com/xiaoqixian
 **********************************************/

/*
 * The Record Management component stores tuples in paged files.
 * The indexing component never looks into records, it only keeps
 * their identifiers, so the RID is all of it that lives here.
 */

use std::fmt;

use crate::page_management::page_file::PageNum;

//location of a record: the page of the heap file and the slot inside it.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RID {
    page_num: PageNum,
    slot_num: i32,
}

impl RID {
    pub fn new(page_num: PageNum, slot_num: i32) -> Self {
        RID { page_num, slot_num }
    }

    pub fn get_page_num(&self) -> PageNum {
        self.page_num
    }

    pub fn get_slot_num(&self) -> i32 {
        self.slot_num
    }

    pub fn is_valid(&self) -> bool {
        self.page_num >= 0 && self.slot_num >= 0
    }
}

impl fmt::Display for RID {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.page_num, self.slot_num)
    }
}
