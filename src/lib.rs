/**********************************************
  > File Name		: lib.rs
  > Author		    : lunar
  > Email			: lunar_ubuntu@qq.com
  > Created Time	: Tue 02 Mar 2021 10:28:11 PM CST
  > Location        : Shanghai
  > Copyright@ https://github.com/xiaoqixian
 **********************************************/

/*
 * Arcturus, a RedBase style database storage engine.
 *
 * page_management: paged files over a shared LRU buffer pool.
 * record_management: record identifiers.
 * indexing: B+ tree secondary indexes mapping attribute values to RIDs.
 */

pub mod config;
pub mod errors;
pub mod indexing;
pub mod page_management;
pub mod record_management;
pub mod utils;
