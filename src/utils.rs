/**********************************************
  > File Name		: utils.rs
  > Author		    : lunar
  > Email			: lunar_ubuntu@qq.com
  > Created Time	: Thu 11 Mar 2021 03:54:41 PM CST
  > Location        : Shanghai
  > Copyright@ https://github.com/xiaoqixian
 **********************************************/

/*
 * Utils functions for global usage.
 *
 * Every on-disk structure is a run of little-endian int32 fields
 * followed by a bitmap and a slot array. Instead of casting raw
 * page pointers into structs, all headers are read and written
 * field by field through these helpers.
 */

pub fn read_i32(data: &[u8], offset: usize) -> i32 {
    let mut bytes = [0u8; 4];
    bytes.copy_from_slice(&data[offset..offset + 4]);
    i32::from_le_bytes(bytes)
}

pub fn write_i32(data: &mut [u8], offset: usize, val: i32) {
    data[offset..offset + 4].copy_from_slice(&val.to_le_bytes());
}

pub fn read_f32(data: &[u8], offset: usize) -> f32 {
    let mut bytes = [0u8; 4];
    bytes.copy_from_slice(&data[offset..offset + 4]);
    f32::from_le_bytes(bytes)
}

//number of bytes needed by a bitmap of size bits.
pub fn calc_bitmap_size(size: usize) -> usize {
    let mut bitmap_size: usize = size / 8;
    if bitmap_size * 8 < size {
        bitmap_size += 1;
    }
    bitmap_size
}

pub fn get_bit(bitmap: &[u8], index: usize) -> bool {
    bitmap[index / 8] & (1u8 << (7 - index % 8)) != 0
}

pub fn set_bit(bitmap: &mut [u8], index: usize, set: bool) {
    let mask = 1u8 << (7 - index % 8);
    if set {
        bitmap[index / 8] |= mask;
    } else {
        bitmap[index / 8] &= !mask;
    }
}

//first unset bit among the first len bits.
pub fn first_free_bit(bitmap: &[u8], len: usize) -> Option<usize> {
    for (i, byte) in bitmap.iter().enumerate() {
        if *byte == 0xff {
            continue;
        }
        for j in 0..8 {
            let index = i * 8 + j;
            if index >= len {
                return None;
            }
            if *byte & (1u8 << (7 - j)) == 0 {
                return Some(index);
            }
        }
    }
    None
}
