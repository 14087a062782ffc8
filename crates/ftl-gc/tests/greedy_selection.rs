//! Greedy victim selection.

mod common;

use common::StaticFtl;
use ftl_gc::config::FtlGeometry;
use ftl_gc::gc::policy::Greedy;
use ftl_gc::gc::VictimIndex;
use ftl_gc::{Selection, SelectionError, VictimPolicy};

fn fixture(invalid: &[usize]) -> (VictimIndex, StaticFtl) {
    let geometry = FtlGeometry::new(1, invalid.len(), 8, 8);
    let mut index = VictimIndex::new(&geometry);
    let mut ftl = StaticFtl::new(geometry);
    for (block, &count) in invalid.iter().enumerate() {
        ftl.meta_mut(0, block).invalid_slices = count;
        index.insert(0, block, count).unwrap();
    }
    (index, ftl)
}

#[test]
fn test_highest_bucket_first_then_fifo() {
    let (mut index, ftl) = fixture(&[3, 7, 7, 1]);
    let mut greedy = Greedy;

    let order: Vec<Selection> = (0..4)
        .map(|_| greedy.select_victim(0, &mut index, &ftl).unwrap())
        .collect();
    assert_eq!(
        order,
        vec![
            Selection { block: 1, score: 7 },
            Selection { block: 2, score: 7 },
            Selection { block: 0, score: 3 },
            Selection { block: 3, score: 1 },
        ]
    );
    assert!(index.is_empty(0));
    assert_eq!(
        greedy.select_victim(0, &mut index, &ftl),
        Err(SelectionError::NoCandidate { die: 0 })
    );
}

#[test]
fn test_blocks_without_invalid_slices_are_not_offered() {
    let (mut index, ftl) = fixture(&[0, 0]);
    assert_eq!(
        Greedy.select_victim(0, &mut index, &ftl),
        Err(SelectionError::NoCandidate { die: 0 })
    );
    assert_eq!(index.len(0), 2);
}

#[test]
fn test_bad_block_in_list_is_stepped_over() {
    let (mut index, mut ftl) = fixture(&[5, 2]);
    ftl.meta_mut(0, 0).bad = true;

    let selection = Greedy.select_victim(0, &mut index, &ftl).unwrap();
    assert_eq!(selection, Selection { block: 1, score: 2 });
    assert!(index.contains(0, 0));
}

#[test]
fn test_reinsertion_moves_block_behind_peers() {
    let (mut index, ftl) = fixture(&[4, 4, 4]);
    index.insert(0, 0, 4).unwrap();

    let first = Greedy.select_victim(0, &mut index, &ftl).unwrap();
    assert_eq!(first.block, 1);
}
