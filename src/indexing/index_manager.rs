/**********************************************
  > File Name		: index_manager.rs
  > Author		    : lunar
  > Email			: lunar_ubuntu@qq.com
  > Created Time	: Tue Apr  6 10:24:27 2021
  > Location        : Shanghai
  > Copyright@ https://github.com/xiaoqixian
 **********************************************/

/*
 * The IndexManager creates, destroys, opens and closes index files.
 *
 * An index is identified by the relation name and the index number,
 * the file of an index is named "<relation>.<index number>".
 *
 * Index creation:
 *    1. check the name, the index number and the attribute.
 *    2. create the paged file.
 *    3. page 0 is the index file header, page 1 the empty root leaf.
 *    4. close the file, so the header and the root are on disk.
 *
 * Every file is opened through the PageFileManager of the index
 * manager, so all open indexes share one buffer pool.
 */

use log::info;

use super::index_handle::IndexHandle;
use super::key::KeyCodec;
use super::node::{IndexFileHeader, INDEX_HEADER_PAGE};
use super::{AttrType, MAX_NAME_LEN};
use crate::errors::IndexingError;
use crate::page_management::page_file::{PageFileManager, NO_PAGE};

#[derive(Debug, Clone)]
pub struct IndexManager {
    pfm: PageFileManager,
}

impl IndexManager {
    pub fn new(pfm: PageFileManager) -> Self {
        IndexManager { pfm }
    }

    pub fn page_file_manager(&self) -> &PageFileManager {
        &self.pfm
    }

    pub fn get_index_file_name(rel_name: &str, index_no: i32) -> String {
        format!("{}.{}", rel_name, index_no)
    }

    fn check_name(rel_name: &str, index_no: i32) -> Result<String, IndexingError> {
        if rel_name.is_empty() || rel_name.len() > MAX_NAME_LEN || rel_name.contains('/') || rel_name.contains('\0') {
            return Err(IndexingError::InvalidName(rel_name.to_string()));
        }
        if index_no <= 0 {
            return Err(IndexingError::InvalidIndexNo(index_no));
        }
        Ok(Self::get_index_file_name(rel_name, index_no))
    }

    pub fn create_index(&self, rel_name: &str, index_no: i32, attr_type: AttrType, attr_length: usize) -> Result<(), IndexingError> {
        let file_name = Self::check_name(rel_name, index_no)?;
        KeyCodec::new(attr_type, attr_length)?;

        self.pfm.create_file(&file_name)?;
        let mut pfh = self.pfm.open_file(&file_name)?;

        let mut header = IndexFileHeader::new(attr_type, attr_length);
        let header_page = pfh.allocate_page()?;
        let root = pfh.allocate_page()?;
        debug_assert_eq!(header_page.get_page_num(), INDEX_HEADER_PAGE);
        header.layout().init_leaf(&mut root.data_mut(), NO_PAGE, NO_PAGE, NO_PAGE);
        header.root_page = root.get_page_num();
        header.height = 1;
        header.write(&mut header_page.data_mut());
        drop(root);
        drop(header_page);

        self.pfm.close_file(&mut pfh)?;
        info!("Created index {} on {:?}({}), {} keys per node, {} entries per leaf",
            file_name, attr_type, attr_length, header.max_keys, header.max_entries);
        Ok(())
    }

    pub fn destroy_index(&self, rel_name: &str, index_no: i32) -> Result<(), IndexingError> {
        let file_name = Self::check_name(rel_name, index_no)?;
        self.pfm.destroy_file(&file_name)?;
        info!("Destroyed index {}", file_name);
        Ok(())
    }

    pub fn open_index(&self, rel_name: &str, index_no: i32) -> Result<IndexHandle, IndexingError> {
        let file_name = Self::check_name(rel_name, index_no)?;
        let mut pfh = self.pfm.open_file(&file_name)?;
        let header = {
            let read = pfh.get_page(INDEX_HEADER_PAGE).map_err(IndexingError::from)
                .and_then(|ph| {
                    let header = IndexFileHeader::read(&ph.data());
                    header
                });
            match read {
                Ok(v) => v,
                Err(e) => {
                    self.pfm.close_file(&mut pfh)?;
                    return Err(e);
                },
            }
        };
        info!("Opened index {}, root {}, height {}", file_name, header.root_page, header.height);
        IndexHandle::new(pfh, header)
    }

    /*
     * Write the header back if it changed, flush all pages of the
     * index and close the file. The handle can't be used any more.
     */
    pub fn close_index(&self, ih: &mut IndexHandle) -> Result<(), IndexingError> {
        ih.close(&self.pfm)?;
        info!("Closed index {}", ih.file_name());
        Ok(())
    }
}
