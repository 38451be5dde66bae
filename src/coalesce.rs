use log::debug;

use crate::{
  block::{Block, BlockHeader, Flags},
  buddy::BuddyAllocator,
  error::BlockError,
};

/// The sibling of a `size`-byte block at `block`. Offsets are relative to
/// the arena start, so a block is always aligned to its own size.
pub(crate) fn buddy_of(
  block: Block,
  size: usize,
) -> Block {
  Block::at(block.offset() ^ size)
}

impl BuddyAllocator<'_> {
  /// Merges the free block `left` with its right buddy into one block of
  /// twice the size.
  ///
  /// `left` must be the lower half of its pair, and the block that follows
  /// it must be free and of the same size. Otherwise nothing is written and
  /// [`BlockError::NotMergeable`] comes back. A handle that no longer starts
  /// a block of the chain is [`BlockError::UnknownBlock`].
  pub fn merge(
    &mut self,
    left: Block,
  ) -> Result<Block, BlockError> {
    let not_mergeable = BlockError::NotMergeable {
      offset: left.offset(),
    };

    let header = self.locate(left)?;

    if header.in_use() || buddy_of(left, header.size) < left {
      return Err(not_mergeable);
    }

    let Some(right) = self.arena().next_block(left)? else {
      return Err(not_mergeable);
    };

    let right_header = self.arena().header(right)?;

    if right_header.in_use() || right_header.size != header.size {
      return Err(not_mergeable);
    }

    let mut flags = header.flags;
    if right_header.is_last() {
      flags.insert(Flags::IS_LAST);
    }

    let merged = BlockHeader::new(header.size * 2, flags);
    self.arena_mut().write_header(left, merged);

    debug!(
      "merged buddies {:#x} and {:#x} into {} bytes",
      left.offset(),
      right.offset(),
      merged.size
    );

    Ok(left)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::block::BlockInfo;

  #[test]
  fn test_buddy_of() {
    assert_eq!(buddy_of(Block::at(0), 32), Block::at(32));
    assert_eq!(buddy_of(Block::at(32), 32), Block::at(0));
    assert_eq!(buddy_of(Block::at(64), 64), Block::at(0));
    assert_eq!(buddy_of(Block::at(192), 64), Block::at(128));
  }

  #[test]
  fn test_split_then_merge_restores_block() {
    let mut backing = vec![0u8; 512];
    let mut allocator = BuddyAllocator::new(&mut backing).unwrap();

    let before = allocator.arena().header(Block::FIRST).unwrap();
    let (left, right) = allocator.split(Block::FIRST).unwrap();

    assert!(allocator.arena().header(right).unwrap().is_last());
    assert!(!allocator.arena().header(left).unwrap().is_last());

    assert_eq!(allocator.merge(left), Ok(left));
    assert_eq!(allocator.arena().header(left).unwrap(), before);
    assert_eq!(allocator.arena().check(), Ok(()));
  }

  #[test]
  fn test_merge_inner_pair_keeps_last_elsewhere() {
    let mut backing = vec![0u8; 512];
    let mut allocator = BuddyAllocator::new(&mut backing).unwrap();

    let (left, _) = allocator.split(Block::FIRST).unwrap();
    let (inner, _) = allocator.split(left).unwrap();
    let before = allocator.arena().header(inner).unwrap();
    allocator.split(inner).unwrap();

    assert_eq!(allocator.merge(inner), Ok(inner));
    assert_eq!(allocator.arena().header(inner).unwrap(), before);

    let blocks: Vec<BlockInfo> = allocator
      .arena()
      .blocks()
      .collect::<Result<_, _>>()
      .unwrap();
    assert_eq!(blocks.iter().map(|b| b.size).collect::<Vec<_>>(), vec![128, 128, 256]);
    assert_eq!(blocks.iter().filter(|b| b.is_last).count(), 1);
  }

  #[test]
  fn test_merge_refuses_busy_neighbour() {
    let mut backing = vec![0u8; 256];
    let mut allocator = BuddyAllocator::new(&mut backing).unwrap();

    let (left, right) = allocator.split(Block::FIRST).unwrap();
    allocator.allocate(128 - crate::HEADER_SIZE).unwrap();

    // The allocation took the left half.
    assert_eq!(
      allocator.merge(left),
      Err(BlockError::NotMergeable { offset: 0 })
    );
    assert_eq!(
      allocator.merge(right),
      Err(BlockError::NotMergeable { offset: 128 })
    );
    assert_eq!(allocator.arena().header(right).unwrap().size, 128);
  }

  #[test]
  fn test_merge_refuses_busy_right_buddy() {
    let mut backing = vec![0u8; 256];
    let mut allocator = BuddyAllocator::new(&mut backing).unwrap();

    let left = allocator.allocate(128 - crate::HEADER_SIZE).unwrap();
    let right = allocator.allocate(128 - crate::HEADER_SIZE).unwrap();
    assert_eq!(right.offset(), 128);
    allocator.free(left).unwrap();

    let header_bytes = |allocator: &BuddyAllocator<'_>, block: Block| {
      let start = block.offset();
      allocator.arena().bytes()[start..start + crate::HEADER_SIZE].to_vec()
    };
    let left_before = header_bytes(&allocator, left);
    let right_before = header_bytes(&allocator, right);

    assert_eq!(
      allocator.merge(left),
      Err(BlockError::NotMergeable { offset: 0 })
    );
    assert_eq!(header_bytes(&allocator, left), left_before);
    assert_eq!(header_bytes(&allocator, right), right_before);
    assert!(!allocator.arena().header(left).unwrap().in_use());
    assert!(allocator.arena().header(right).unwrap().in_use());
  }

  #[test]
  fn test_merged_away_handle_is_rejected() {
    let mut backing = vec![0u8; 256];
    let mut allocator = BuddyAllocator::new(&mut backing).unwrap();

    let (left, right) = allocator.split(Block::FIRST).unwrap();
    allocator.merge(left).unwrap();

    // The old right header is still in the bytes, now inside a payload.
    let block = allocator.allocate(256 - crate::HEADER_SIZE).unwrap();
    assert_eq!(block, Block::FIRST);
    assert_eq!(allocator.arena().header(right).unwrap().size, 128);
    let payload = allocator.payload(block).unwrap().to_vec();

    assert_eq!(
      allocator.split(right),
      Err(BlockError::UnknownBlock { offset: 128 })
    );
    assert_eq!(
      allocator.merge(right),
      Err(BlockError::UnknownBlock { offset: 128 })
    );
    assert_eq!(allocator.payload(block).unwrap(), &payload[..]);
    assert_eq!(allocator.arena().check(), Ok(()));
  }

  #[test]
  fn test_merge_refuses_unequal_sizes() {
    let mut backing = vec![0u8; 256];
    let mut allocator = BuddyAllocator::new(&mut backing).unwrap();

    let (left, right) = allocator.split(Block::FIRST).unwrap();
    allocator.split(right).unwrap();

    assert_eq!(
      allocator.merge(left),
      Err(BlockError::NotMergeable { offset: 0 })
    );
    assert_eq!(allocator.arena().header(left).unwrap().size, 128);
  }

  #[test]
  fn test_merge_refuses_adjacent_non_buddies() {
    let mut backing = vec![0u8; 256];
    let mut allocator = BuddyAllocator::new(&mut backing).unwrap();

    // 64 | 64 | 64 | 64, where 64 and 128 are neighbours but not buddies.
    let (left, right) = allocator.split(Block::FIRST).unwrap();
    allocator.split(left).unwrap();
    allocator.split(right).unwrap();

    assert_eq!(
      allocator.merge(Block::at(64)),
      Err(BlockError::NotMergeable { offset: 64 })
    );
    assert_eq!(allocator.merge(Block::at(128)), Ok(Block::at(128)));
    assert_eq!(allocator.merge(Block::at(0)), Ok(Block::at(0)));
    assert_eq!(allocator.merge(Block::at(0)), Ok(Block::at(0)));
    assert_eq!(allocator.arena().header(Block::FIRST).unwrap().size, 256);
  }

  #[test]
  fn test_merge_last_block_has_no_successor() {
    let mut backing = vec![0u8; 64];
    let mut allocator = BuddyAllocator::new(&mut backing).unwrap();

    assert_eq!(
      allocator.merge(Block::FIRST),
      Err(BlockError::NotMergeable { offset: 0 })
    );
  }
}
