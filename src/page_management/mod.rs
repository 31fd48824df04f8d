/**********************************************
  > File Name		: mod.rs
  > Author		    : lunar
  > Email			: lunar_ubuntu@qq.com
  > Created Time	: Tue 02 Mar 2021 10:31:37 PM CST
  > Location        : Shanghai
  > Copyright@ https://github.com/xiaoqixian
 **********************************************/

/*
 * The page management component: paged files and the buffer pool
 * shared by every file opened through the same PageFileManager.
 * Higher components (record management, indexing) only see pages
 * through PageFileHandle and PageHandle.
 */

pub mod buffer_manager;
pub mod page_file;
