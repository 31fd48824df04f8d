/**********************************************
  > File Name		: indexing/tests.rs
  > Author		    : lunar
  > Email			: lunar_ubuntu@qq.com
  > Created Time	: Sat 08 May 2021 10:03:42 AM CST
  > Location        : Shanghai
  > Copyright@ https://github.com/xiaoqixian
 **********************************************/

use std::cmp::Ordering;
use std::collections::BTreeMap;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::index_handle::{Descent, IndexHandle};
use super::index_manager::IndexManager;
use super::index_scan::{collect_scan, IndexScan};
use super::key::Key;
use super::node::{IndexFileHeader, INDEX_HEADER_PAGE};
use super::{AttrType, CompOp};
use crate::config::PageFileConfig;
use crate::errors::{IndexingError, PageFileError};
use crate::page_management::page_file::{PageFileManager, PageNum, NO_PAGE};
use crate::record_management::RID;

fn init(dir: &tempfile::TempDir) -> IndexManager {
    let _ = env_logger::builder().is_test(true).try_init();
    IndexManager::new(PageFileManager::new(PageFileConfig::new(dir.path())))
}

fn rid(i: i32) -> RID {
    RID::new(i / 100 + 1, i % 100)
}

fn scan(ih: &IndexHandle, op: CompOp, value: Option<Key>) -> Vec<(Key, RID)> {
    let mut scan = IndexScan::new();
    scan.open_scan(ih, op, value.as_ref()).unwrap();
    let entries = collect_scan(&mut scan, ih).unwrap();
    scan.close_scan().unwrap();
    entries
}

fn int_keys(entries: &[(Key, RID)]) -> Vec<i32> {
    entries.iter().map(|(k, _)| match k {
        Key::Int(v) => *v,
        other => panic!("not an int key: {}", other),
    }).collect()
}

fn padded(i: usize) -> Key {
    Key::string(&format!("{:08}", i))
}

/*
 * Walk the whole tree: separators bound the keys of their subtrees,
 * every leaf sits at the same level and knows its parent, and the leaf
 * chain visits the leaves in the same order as the walk.
 */
fn check_tree(ih: &IndexHandle) {
    let layout = *ih.layout();
    let mut leaves = Vec::new();
    walk(ih, ih.get_root_page(), NO_PAGE, None, None, 1, &mut leaves);

    let (_, first) = ih.descend(None, Descent::Leftmost).unwrap();
    let mut chain = Vec::new();
    let (mut page, mut prev) = (first, NO_PAGE);
    while page != NO_PAGE {
        let ph = ih.get_page(page).unwrap();
        assert_eq!(layout.left_leaf(&ph.data()), prev, "left link of leaf {}", page);
        chain.push(page);
        prev = page;
        page = layout.right_leaf(&ph.data());
    }
    assert_eq!(chain, leaves);
}

fn walk(ih: &IndexHandle, page: PageNum, parent: PageNum, low: Option<Vec<u8>>, high: Option<Vec<u8>>, level: i32, leaves: &mut Vec<PageNum>) {
    let layout = *ih.layout();
    let codec = *ih.codec();
    let ph = ih.get_page(page).unwrap();
    let data = ph.data();

    if level == ih.get_height() {
        assert_eq!(layout.parent(&data), parent, "parent of leaf {}", page);
        let keys: Vec<&[u8]> = layout.live_slots(&data).into_iter().map(|s| layout.slot_key(&data, s)).collect();
        for pair in keys.windows(2) {
            assert_ne!(codec.compare(pair[0], pair[1]), Ordering::Greater, "leaf {} out of order", page);
        }
        for k in keys {
            if let Some(low) = &low {
                assert_ne!(codec.compare(k, low), Ordering::Less, "leaf {} below its separator", page);
            }
            if let Some(high) = &high {
                assert_ne!(codec.compare(k, high), Ordering::Greater, "leaf {} above its separator", page);
            }
        }
        leaves.push(page);
        return;
    }

    let num_keys = layout.num_keys(&data);
    assert!(num_keys >= 1);
    let keys: Vec<Vec<u8>> = (0..num_keys).map(|i| layout.key(&data, i).to_vec()).collect();
    for pair in keys.windows(2) {
        assert_ne!(codec.compare(&pair[0], &pair[1]), Ordering::Greater);
    }
    let children = layout.children(&data);
    drop(data);
    drop(ph);
    for (i, &child) in children.iter().enumerate() {
        let lo = if i == 0 { low.clone() } else { Some(keys[i - 1].clone()) };
        let hi = if i == num_keys { high.clone() } else { Some(keys[i].clone()) };
        walk(ih, child, page, lo, hi, level + 1, leaves);
    }
}

#[test]
fn index_lifecycle_test() {
    let dir = tempfile::tempdir().unwrap();
    let im = init(&dir);
    assert_eq!(IndexManager::get_index_file_name("emp", 3), "emp.3");

    im.create_index("emp", 1, AttrType::STRING, 20).unwrap();
    let mut ih = im.open_index("emp", 1).unwrap();
    assert!(ih.is_open());
    assert_eq!(ih.get_root_page(), 1);
    assert_eq!(ih.get_height(), 1);
    assert_eq!(ih.get_attr_type(), AttrType::STRING);
    assert_eq!(ih.get_attr_length(), 20);
    assert_eq!(ih.get_max_entries(), IndexFileHeader::calc_max_entries(20));
    assert_eq!(ih.get_max_keys(), IndexFileHeader::calc_max_keys(20));
    assert!(scan(&ih, CompOp::NoOp, None).is_empty());
    im.close_index(&mut ih).unwrap();
    assert!(!ih.is_open());

    assert!(matches!(im.create_index("emp", 1, AttrType::STRING, 20),
        Err(IndexingError::PageFile(PageFileError::FileExist(_)))));
    im.destroy_index("emp", 1).unwrap();
    assert!(matches!(im.open_index("emp", 1), Err(IndexingError::PageFile(PageFileError::FileNotFound(_)))));
    assert!(matches!(im.destroy_index("emp", 1), Err(IndexingError::PageFile(PageFileError::FileNotFound(_)))));
}

#[test]
fn create_index_validates_arguments() {
    let dir = tempfile::tempdir().unwrap();
    let im = init(&dir);
    assert!(matches!(im.create_index("", 1, AttrType::INT, 4), Err(IndexingError::InvalidName(_))));
    let long_name = "r".repeat(25);
    assert!(matches!(im.create_index(&long_name, 1, AttrType::INT, 4), Err(IndexingError::InvalidName(_))));
    assert!(im.create_index(&"r".repeat(24), 1, AttrType::INT, 4).is_ok());
    assert!(matches!(im.create_index("rel", -1, AttrType::INT, 4), Err(IndexingError::InvalidIndexNo(-1))));
    assert!(matches!(im.create_index("rel", 0, AttrType::INT, 4), Err(IndexingError::InvalidIndexNo(0))));
    assert!(matches!(im.open_index("rel", 0), Err(IndexingError::InvalidIndexNo(0))));
    assert!(matches!(im.destroy_index("rel", 0), Err(IndexingError::InvalidIndexNo(0))));
    assert!(matches!(im.create_index("rel", 1, AttrType::INT, 8), Err(IndexingError::InvalidKeyLength(8))));
    assert!(matches!(im.create_index("rel", 1, AttrType::FLOAT, 2), Err(IndexingError::InvalidKeyLength(2))));
    assert!(matches!(im.create_index("rel", 1, AttrType::STRING, 256), Err(IndexingError::InvalidKeyLength(256))));
    assert!(im.create_index("rel", 1, AttrType::STRING, 255).is_ok());
}

#[test]
fn string_scenario_test() {
    let dir = tempfile::tempdir().unwrap();
    let im = init(&dir);
    im.create_index("people", 1, AttrType::STRING, 20).unwrap();
    let mut ih = im.open_index("people", 1).unwrap();

    ih.insert_entry(&Key::string("alice"), RID::new(1, 0)).unwrap();
    ih.insert_entry(&Key::string("bob"), RID::new(1, 1)).unwrap();
    ih.insert_entry(&Key::string("alice"), RID::new(2, 0)).unwrap();

    let mut alices: Vec<RID> = scan(&ih, CompOp::EQ, Some(Key::string("alice"))).into_iter().map(|(k, r)| {
        assert_eq!(k, Key::string("alice"));
        r
    }).collect();
    alices.sort();
    assert_eq!(alices, vec![RID::new(1, 0), RID::new(2, 0)]);

    let greater = scan(&ih, CompOp::GT, Some(Key::string("alice")));
    assert_eq!(greater, vec![(Key::string("bob"), RID::new(1, 1))]);

    let not_bob = scan(&ih, CompOp::NE, Some(Key::string("bob")));
    assert_eq!(not_bob.len(), 2);
    assert!(not_bob.iter().all(|(k, _)| *k == Key::string("alice")));

    assert!(matches!(ih.insert_entry(&Key::string("a name longer than 20"), RID::new(3, 0)),
        Err(IndexingError::InvalidKeyLength(21))));
    assert!(matches!(ih.insert_entry(&Key::Int(3), RID::new(3, 0)), Err(IndexingError::KeyTypeMismatch)));
    im.close_index(&mut ih).unwrap();
}

#[test]
fn int_scan_operators_test() {
    let dir = tempfile::tempdir().unwrap();
    let im = init(&dir);
    im.create_index("nums", 1, AttrType::INT, 4).unwrap();
    let mut ih = im.open_index("nums", 1).unwrap();
    for (i, &v) in [5, 3, 8, 1, 9, 2, 7].iter().enumerate() {
        ih.insert_entry(&Key::Int(v), rid(i as i32)).unwrap();
    }

    assert_eq!(int_keys(&scan(&ih, CompOp::NoOp, None)), vec![1, 2, 3, 5, 7, 8, 9]);
    assert_eq!(int_keys(&scan(&ih, CompOp::LT, Some(Key::Int(5)))), vec![1, 2, 3]);
    assert_eq!(int_keys(&scan(&ih, CompOp::LE, Some(Key::Int(5)))), vec![1, 2, 3, 5]);
    assert_eq!(int_keys(&scan(&ih, CompOp::GT, Some(Key::Int(5)))), vec![7, 8, 9]);
    assert_eq!(int_keys(&scan(&ih, CompOp::GE, Some(Key::Int(5)))), vec![5, 7, 8, 9]);
    assert_eq!(int_keys(&scan(&ih, CompOp::NE, Some(Key::Int(5)))), vec![1, 2, 3, 7, 8, 9]);
    assert_eq!(int_keys(&scan(&ih, CompOp::EQ, Some(Key::Int(5)))), vec![5]);
    assert!(scan(&ih, CompOp::EQ, Some(Key::Int(4))).is_empty());
    assert!(scan(&ih, CompOp::LT, Some(Key::Int(1))).is_empty());
    assert!(scan(&ih, CompOp::GT, Some(Key::Int(9))).is_empty());
    im.close_index(&mut ih).unwrap();
}

#[test]
fn float_keys_test() {
    let dir = tempfile::tempdir().unwrap();
    let im = init(&dir);
    im.create_index("prices", 2, AttrType::FLOAT, 4).unwrap();
    let mut ih = im.open_index("prices", 2).unwrap();
    for (i, &v) in [2.5f32, -1.0, 0.0, 100.25, -30.5].iter().enumerate() {
        ih.insert_entry(&Key::Float(v), rid(i as i32)).unwrap();
    }
    let keys: Vec<Key> = scan(&ih, CompOp::GE, Some(Key::Float(-1.0))).into_iter().map(|(k, _)| k).collect();
    assert_eq!(keys, vec![Key::Float(-1.0), Key::Float(0.0), Key::Float(2.5), Key::Float(100.25)]);
    im.close_index(&mut ih).unwrap();
}

#[test]
fn scan_state_errors_test() {
    let dir = tempfile::tempdir().unwrap();
    let im = init(&dir);
    im.create_index("t", 1, AttrType::INT, 4).unwrap();
    let mut ih = im.open_index("t", 1).unwrap();
    ih.insert_entry(&Key::Int(1), rid(0)).unwrap();

    let mut scan = IndexScan::new();
    assert!(matches!(scan.get_next_entry(&ih), Err(IndexingError::ScanNotOpen)));
    assert!(matches!(scan.close_scan(), Err(IndexingError::ScanNotOpen)));
    assert!(matches!(scan.open_scan(&ih, CompOp::NoOp, Some(&Key::Int(1))), Err(IndexingError::InvalidScanCombo)));
    assert!(matches!(scan.open_scan(&ih, CompOp::EQ, None), Err(IndexingError::InvalidScanCombo)));
    assert!(matches!(scan.open_scan(&ih, CompOp::EQ, Some(&Key::Float(1.0))), Err(IndexingError::KeyTypeMismatch)));

    scan.open_scan(&ih, CompOp::EQ, Some(&Key::Int(1))).unwrap();
    assert!(scan.is_open());
    assert!(matches!(scan.open_scan(&ih, CompOp::NoOp, None), Err(IndexingError::ScanAlreadyOpen)));
    assert_eq!(scan.get_next_entry(&ih).unwrap(), (Key::Int(1), rid(0)));
    assert!(matches!(scan.get_next_entry(&ih), Err(IndexingError::EndOfScan)));
    assert!(matches!(scan.get_next_entry(&ih), Err(IndexingError::EndOfScan)));
    scan.close_scan().unwrap();

    assert!(matches!(scan.get_next_entry(&ih), Err(IndexingError::ScanNotOpen)));
    assert!(matches!(scan.close_scan(), Err(IndexingError::ScanNotOpen)));
    assert!(matches!(scan.open_scan(&ih, CompOp::NoOp, None), Err(IndexingError::ScanClosed)));
    im.close_index(&mut ih).unwrap();
}

#[test]
fn closed_handle_test() {
    let dir = tempfile::tempdir().unwrap();
    let im = init(&dir);
    im.create_index("t", 1, AttrType::INT, 4).unwrap();
    let mut ih = im.open_index("t", 1).unwrap();
    ih.insert_entry(&Key::Int(1), rid(0)).unwrap();

    assert!(matches!(ih.insert_entry(&Key::Int(2), RID::new(-1, 0)), Err(IndexingError::InvalidRid(-1, 0))));
    assert!(matches!(ih.delete_entry(&Key::Int(1), RID::new(0, -3)), Err(IndexingError::InvalidRid(0, -3))));

    let mut scan = IndexScan::new();
    scan.open_scan(&ih, CompOp::NoOp, None).unwrap();
    im.close_index(&mut ih).unwrap();

    assert!(matches!(ih.insert_entry(&Key::Int(2), rid(1)), Err(IndexingError::NotOpen)));
    assert!(matches!(ih.delete_entry(&Key::Int(1), rid(0)), Err(IndexingError::NotOpen)));
    assert!(matches!(ih.force_pages(), Err(IndexingError::NotOpen)));
    assert!(matches!(im.close_index(&mut ih), Err(IndexingError::NotOpen)));
    assert!(matches!(scan.get_next_entry(&ih), Err(IndexingError::NotOpen)));
    assert!(matches!(IndexScan::new().open_scan(&ih, CompOp::NoOp, None), Err(IndexingError::NotOpen)));
}

#[test]
fn delete_entry_test() {
    let dir = tempfile::tempdir().unwrap();
    let im = init(&dir);
    im.create_index("t", 1, AttrType::INT, 4).unwrap();
    let mut ih = im.open_index("t", 1).unwrap();
    for i in 0..30 {
        ih.insert_entry(&Key::Int(i % 10), rid(i)).unwrap();
    }

    ih.delete_entry(&Key::Int(4), rid(14)).unwrap();
    let fours: Vec<RID> = scan(&ih, CompOp::EQ, Some(Key::Int(4))).into_iter().map(|(_, r)| r).collect();
    assert_eq!(fours.len(), 2);
    assert!(fours.contains(&rid(4)) && fours.contains(&rid(24)));
    assert!(!fours.contains(&rid(14)));

    assert!(matches!(ih.delete_entry(&Key::Int(4), rid(14)), Err(IndexingError::EntryNotFound)));
    assert!(matches!(ih.delete_entry(&Key::Int(4), rid(15)), Err(IndexingError::EntryNotFound)));
    assert!(matches!(ih.delete_entry(&Key::Int(42), rid(0)), Err(IndexingError::EntryNotFound)));

    //deleted slots are reused.
    ih.insert_entry(&Key::Int(4), rid(99)).unwrap();
    assert_eq!(scan(&ih, CompOp::EQ, Some(Key::Int(4))).len(), 3);
    assert_eq!(scan(&ih, CompOp::NoOp, None).len(), 30);
    im.close_index(&mut ih).unwrap();
}

/*
 * A full leaf minus one low slot: the new entry sorts far to the right
 * of the free slot, so the entries in between shift left by one.
 */
#[test]
fn insert_into_free_slot_before_position_test() {
    let dir = tempfile::tempdir().unwrap();
    let im = init(&dir);
    im.create_index("t", 1, AttrType::INT, 4).unwrap();
    let mut ih = im.open_index("t", 1).unwrap();
    let max_entries = ih.get_max_entries() as i32;
    for i in 0..max_entries {
        ih.insert_entry(&Key::Int(i), rid(i)).unwrap();
    }
    assert_eq!(ih.get_height(), 1);

    ih.delete_entry(&Key::Int(2), rid(2)).unwrap();
    ih.insert_entry(&Key::Int(100), rid(max_entries)).unwrap();
    assert_eq!(ih.get_height(), 1);
    check_tree(&ih);

    let entries = scan(&ih, CompOp::NoOp, None);
    let mut expected: Vec<i32> = (0..max_entries).filter(|&i| i != 2).collect();
    expected.insert(99, 100);
    assert_eq!(int_keys(&entries), expected);
    assert_eq!(entries[99], (Key::Int(100), rid(100)));
    assert_eq!(entries[100], (Key::Int(100), rid(max_entries)));
    assert_eq!(entries[101], (Key::Int(101), rid(101)));
    im.close_index(&mut ih).unwrap();
}

#[test]
fn duplicates_overflow_into_buckets_test() {
    let dir = tempfile::tempdir().unwrap();
    let im = init(&dir);
    im.create_index("dups", 1, AttrType::INT, 4).unwrap();
    let mut ih = im.open_index("dups", 1).unwrap();
    let n = 3 * ih.get_max_entries() as i32 + 17;

    for i in 0..n {
        ih.insert_entry(&Key::Int(7), rid(i)).unwrap();
        if i % 50 == 0 {
            ih.insert_entry(&Key::Int(i / 50), rid(100_000 + i)).unwrap();
            ih.insert_entry(&Key::Int(1000 + i), rid(200_000 + i)).unwrap();
        }
    }
    check_tree(&ih);

    let mut sevens: Vec<RID> = scan(&ih, CompOp::EQ, Some(Key::Int(7))).into_iter().map(|(_, r)| r).collect();
    let others = (0..n).filter(|i| i % 50 == 0 && i / 50 == 7).count();
    assert_eq!(sevens.len(), n as usize + others);
    sevens.sort();
    sevens.dedup();
    assert_eq!(sevens.len(), n as usize + others);

    let all = int_keys(&scan(&ih, CompOp::NoOp, None));
    assert!(all.windows(2).all(|w| w[0] <= w[1]));
    assert_eq!(all.len(), n as usize + 2 * (0..n).filter(|i| i % 50 == 0).count());
    assert_eq!(int_keys(&scan(&ih, CompOp::LE, Some(Key::Int(7)))).len(),
        all.iter().filter(|&&k| k <= 7).count());
    assert!(int_keys(&scan(&ih, CompOp::NE, Some(Key::Int(7)))).iter().all(|&k| k != 7));

    //empty the buckets again, from the last rid to the first.
    for i in (0..n).rev() {
        ih.delete_entry(&Key::Int(7), rid(i)).unwrap();
    }
    assert_eq!(scan(&ih, CompOp::EQ, Some(Key::Int(7))).len(), others);
    check_tree(&ih);
    im.close_index(&mut ih).unwrap();
}

#[test]
fn leaf_with_bucket_splits_by_key_test() {
    let dir = tempfile::tempdir().unwrap();
    let im = init(&dir);
    im.create_index("t", 1, AttrType::INT, 4).unwrap();
    let mut ih = im.open_index("t", 1).unwrap();
    let n = ih.get_max_entries() as i32 + 40;
    for i in 0..n {
        ih.insert_entry(&Key::Int(10), rid(i)).unwrap();
    }
    assert_eq!(ih.get_height(), 1);

    ih.insert_entry(&Key::Int(20), rid(5000)).unwrap();
    ih.insert_entry(&Key::Int(5), rid(5001)).unwrap();
    ih.insert_entry(&Key::Int(10), rid(5002)).unwrap();
    ih.insert_entry(&Key::Int(6), rid(5003)).unwrap();
    assert_eq!(ih.get_height(), 2);
    check_tree(&ih);

    let keys = int_keys(&scan(&ih, CompOp::NoOp, None));
    assert_eq!(keys.len(), n as usize + 4);
    assert_eq!(&keys[..2], &[5, 6]);
    assert_eq!(keys[keys.len() - 1], 20);
    assert_eq!(scan(&ih, CompOp::EQ, Some(Key::Int(10))).len(), n as usize + 1);
    assert_eq!(int_keys(&scan(&ih, CompOp::GT, Some(Key::Int(10)))), vec![20]);
    assert_eq!(int_keys(&scan(&ih, CompOp::LT, Some(Key::Int(10)))), vec![5, 6]);
    im.close_index(&mut ih).unwrap();
}

/*
 * With 255 bytes keys a leaf and an internal node only hold 15 keys,
 * so a few thousand keys build a tree of three levels.
 */
#[test]
fn split_test() {
    let dir = tempfile::tempdir().unwrap();
    let im = init(&dir);
    im.create_index("wide", 1, AttrType::STRING, 255).unwrap();
    let mut ih = im.open_index("wide", 1).unwrap();
    let max_entries = ih.get_max_entries();
    assert_eq!(max_entries, 15);
    assert_eq!(ih.get_max_keys(), 15);

    let total = max_entries * (ih.get_max_keys() + 1) + 1;
    for i in 0..total {
        ih.insert_entry(&padded(i), rid(i as i32)).unwrap();
    }
    assert!(ih.get_height() >= 2);
    check_tree(&ih);

    let keys: Vec<Key> = scan(&ih, CompOp::NoOp, None).into_iter().map(|(k, _)| k).collect();
    assert_eq!(keys, (0..total).map(padded).collect::<Vec<_>>());

    //reverse order insertion of more keys splits the left edge.
    for i in (total..4 * total).rev() {
        ih.insert_entry(&padded(i), rid(i as i32)).unwrap();
    }
    assert!(ih.get_height() >= 3);
    check_tree(&ih);
    assert_eq!(scan(&ih, CompOp::GE, Some(padded(total))).len(), 3 * total);
    assert_eq!(scan(&ih, CompOp::EQ, Some(padded(2 * total))), vec![(padded(2 * total), rid(2 * total as i32))]);
    im.close_index(&mut ih).unwrap();
}

/*
 * 4 bytes keys: a leaf holds 336 entries and an internal node 511 keys,
 * one more key than a full two level tree holds.
 */
#[test]
fn split_int_keys_test() {
    let dir = tempfile::tempdir().unwrap();
    let im = init(&dir);
    im.create_index("ints", 1, AttrType::INT, 4).unwrap();
    let mut ih = im.open_index("ints", 1).unwrap();
    assert_eq!(ih.get_max_entries(), 336);
    assert_eq!(ih.get_max_keys(), 511);

    let total = (ih.get_max_entries() * (ih.get_max_keys() + 1) + 1) as i32;
    for i in 0..total {
        ih.insert_entry(&Key::Int(i), rid(i)).unwrap();
    }
    assert!(ih.get_height() >= 2);
    check_tree(&ih);

    let keys = int_keys(&scan(&ih, CompOp::NoOp, None));
    assert_eq!(keys.len(), total as usize);
    assert!(keys.iter().enumerate().all(|(i, &k)| k == i as i32));
    assert_eq!(scan(&ih, CompOp::EQ, Some(Key::Int(total - 1))), vec![(Key::Int(total - 1), rid(total - 1))]);
    assert_eq!(scan(&ih, CompOp::GT, Some(Key::Int(total - 337))).len(), 336);
    im.close_index(&mut ih).unwrap();
}

#[test]
fn reopen_test() {
    let dir = tempfile::tempdir().unwrap();
    let im = init(&dir);
    im.create_index("wide", 1, AttrType::STRING, 255).unwrap();
    let mut ih = im.open_index("wide", 1).unwrap();
    for i in (0..600).rev() {
        ih.insert_entry(&padded(i % 300), rid(i as i32)).unwrap();
    }
    ih.force_pages().unwrap();
    let (root, height) = (ih.get_root_page(), ih.get_height());
    assert!(height >= 2);
    im.close_index(&mut ih).unwrap();

    let mut ih = im.open_index("wide", 1).unwrap();
    assert_eq!(ih.get_root_page(), root);
    assert_eq!(ih.get_height(), height);
    check_tree(&ih);
    assert_eq!(scan(&ih, CompOp::NoOp, None).len(), 600);
    assert_eq!(scan(&ih, CompOp::EQ, Some(padded(123))).len(), 2);
    im.close_index(&mut ih).unwrap();
}

/*
 * A handle dropped without close_index still writes its header back,
 * so the root made by a root split is found on reopen.
 */
#[test]
fn dropped_handle_keeps_new_root_test() {
    let dir = tempfile::tempdir().unwrap();
    let im = init(&dir);
    im.create_index("wide", 1, AttrType::STRING, 255).unwrap();
    let ih = {
        let mut ih = im.open_index("wide", 1).unwrap();
        for i in 0..300 {
            ih.insert_entry(&padded(i), rid(i as i32)).unwrap();
        }
        ih
    };
    let (root, height) = (ih.get_root_page(), ih.get_height());
    assert_ne!(root, 1);
    assert!(height >= 2);
    drop(ih);

    let mut ih = im.open_index("wide", 1).unwrap();
    assert_eq!(ih.get_root_page(), root);
    assert_eq!(ih.get_height(), height);
    check_tree(&ih);
    let keys: Vec<Key> = scan(&ih, CompOp::NoOp, None).into_iter().map(|(k, _)| k).collect();
    assert_eq!(keys, (0..300).map(padded).collect::<Vec<_>>());
    im.close_index(&mut ih).unwrap();
}

#[test]
fn undefined_root_is_created_on_insert() {
    let dir = tempfile::tempdir().unwrap();
    let im = init(&dir);
    im.create_index("t", 1, AttrType::INT, 4).unwrap();
    {
        let pfm = im.page_file_manager();
        let mut pfh = pfm.open_file("t.1").unwrap();
        let ph = pfh.get_page(INDEX_HEADER_PAGE).unwrap();
        let mut header = IndexFileHeader::read(&ph.data()).unwrap();
        header.root_page = NO_PAGE;
        header.height = 0;
        header.write(&mut ph.data_mut());
        drop(ph);
        pfm.close_file(&mut pfh).unwrap();
    }

    let mut ih = im.open_index("t", 1).unwrap();
    assert_eq!(ih.get_height(), 0);
    assert!(scan(&ih, CompOp::NoOp, None).is_empty());
    assert!(matches!(ih.delete_entry(&Key::Int(1), rid(0)), Err(IndexingError::EntryNotFound)));
    ih.insert_entry(&Key::Int(1), rid(0)).unwrap();
    assert_eq!(ih.get_height(), 1);
    assert_ne!(ih.get_root_page(), NO_PAGE);
    im.close_index(&mut ih).unwrap();

    let mut ih = im.open_index("t", 1).unwrap();
    assert_eq!(ih.get_height(), 1);
    assert_eq!(int_keys(&scan(&ih, CompOp::NoOp, None)), vec![1]);
    im.close_index(&mut ih).unwrap();
}

#[test]
fn corrupted_header_test() {
    let dir = tempfile::tempdir().unwrap();
    let im = init(&dir);
    im.create_index("t", 1, AttrType::INT, 4).unwrap();
    {
        let pfm = im.page_file_manager();
        let mut pfh = pfm.open_file("t.1").unwrap();
        let ph = pfh.get_page(INDEX_HEADER_PAGE).unwrap();
        ph.data_mut()[8] = 7; //attribute type
        drop(ph);
        pfm.close_file(&mut pfh).unwrap();
    }
    assert!(matches!(im.open_index("t", 1), Err(IndexingError::CorruptedHeader)));
}

/*
 * Delete every entry right after the scan returned it. Buckets get
 * emptied and disposed under the scan.
 */
#[test]
fn delete_while_scanning_test() {
    let dir = tempfile::tempdir().unwrap();
    let im = init(&dir);
    im.create_index("t", 1, AttrType::INT, 4).unwrap();
    let mut ih = im.open_index("t", 1).unwrap();
    let n = 2 * ih.get_max_entries() as i32 + 100;
    for i in 0..n {
        ih.insert_entry(&Key::Int(3), rid(i)).unwrap();
    }
    for i in 0..50 {
        ih.insert_entry(&Key::Int(i), rid(n + i)).unwrap();
    }

    let mut scan = IndexScan::new();
    scan.open_scan(&ih, CompOp::EQ, Some(&Key::Int(3))).unwrap();
    let mut seen = Vec::new();
    loop {
        match scan.get_next_entry(&ih) {
            Ok((key, r)) => {
                assert_eq!(key, Key::Int(3));
                ih.delete_entry(&key, r).unwrap();
                seen.push(r);
            },
            Err(IndexingError::EndOfScan) => break,
            Err(e) => panic!("scan failed: {}", e),
        }
    }
    scan.close_scan().unwrap();
    seen.sort();
    seen.dedup();
    assert_eq!(seen.len(), n as usize + 1);
    assert!(self::scan(&ih, CompOp::EQ, Some(Key::Int(3))).is_empty());

    //every other entry of a full scan.
    let mut scan = IndexScan::new();
    scan.open_scan(&ih, CompOp::NoOp, None).unwrap();
    let mut count = 0;
    while let Ok((key, r)) = scan.get_next_entry(&ih) {
        if count % 2 == 0 {
            ih.delete_entry(&key, r).unwrap();
        }
        count += 1;
    }
    scan.close_scan().unwrap();
    assert_eq!(count, 49);
    assert_eq!(self::scan(&ih, CompOp::NoOp, None).len(), 24);
    check_tree(&ih);
    im.close_index(&mut ih).unwrap();
}

fn random_workload(seed: u64, key_range: i32, operations: usize) {
    let dir = tempfile::tempdir().unwrap();
    let im = init(&dir);
    im.create_index("rand", 1, AttrType::INT, 4).unwrap();
    let mut ih = im.open_index("rand", 1).unwrap();
    let mut rng = StdRng::seed_from_u64(seed);
    let mut model: BTreeMap<i32, Vec<RID>> = BTreeMap::new();
    let mut next_rid = 0;

    for _ in 0..operations {
        let live: usize = model.values().map(|v| v.len()).sum();
        if live > 0 && rng.gen_ratio(1, 3) {
            let key = *model.keys().nth(rng.gen_range(0..model.len())).unwrap();
            let rids = model.get_mut(&key).unwrap();
            let r = rids.swap_remove(rng.gen_range(0..rids.len()));
            if rids.is_empty() {
                model.remove(&key);
            }
            ih.delete_entry(&Key::Int(key), r).unwrap();
        } else {
            let key = rng.gen_range(0..key_range);
            let r = rid(next_rid);
            next_rid += 1;
            ih.insert_entry(&Key::Int(key), r).unwrap();
            model.entry(key).or_insert_with(Vec::new).push(r);
        }
    }
    check_tree(&ih);

    let entries = scan(&ih, CompOp::NoOp, None);
    let keys = int_keys(&entries);
    let expected: Vec<i32> = model.iter().flat_map(|(k, v)| std::iter::repeat(*k).take(v.len())).collect();
    assert_eq!(keys, expected);

    for probe in 0..key_range.min(20) {
        let mut found: Vec<RID> = scan(&ih, CompOp::EQ, Some(Key::Int(probe))).into_iter().map(|(_, r)| r).collect();
        found.sort();
        let mut want = model.get(&probe).cloned().unwrap_or_default();
        want.sort();
        assert_eq!(found, want, "entries of key {}", probe);
    }
    let pivot = key_range / 2;
    assert_eq!(scan(&ih, CompOp::GT, Some(Key::Int(pivot))).len(), expected.iter().filter(|&&k| k > pivot).count());
    assert_eq!(scan(&ih, CompOp::LT, Some(Key::Int(pivot))).len(), expected.iter().filter(|&&k| k < pivot).count());
    im.close_index(&mut ih).unwrap();
}

#[test]
fn random_workload_test() {
    random_workload(0x5eed, 400, 6000);
}

#[test]
fn random_duplicates_workload_test() {
    random_workload(42, 4, 4000);
}
