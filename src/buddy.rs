use log::debug;

use crate::{
  align::next_pow2,
  arena::{Arena, Usage},
  block::{Block, BlockHeader, Flags, HEADER_SIZE, MIN_BLOCK_SIZE},
  coalesce::buddy_of,
  error::{AllocError, BlockError, CorruptionError, InitError},
};

/// Power-of-two allocator over a single [`Arena`].
///
/// Requests are rounded up, header included, to a power of two. The chain
/// is scanned once per request: the first free block of exactly that size
/// wins, otherwise the smallest larger free block is halved until it fits.
/// Freed blocks merge back with their buddies.
pub struct BuddyAllocator<'a> {
  arena: Arena<'a>,
}

impl<'a> BuddyAllocator<'a> {
  /// Initializes an arena over `bytes` and allocates from it.
  pub fn new(bytes: &'a mut [u8]) -> Result<Self, InitError> {
    Ok(Self::with_arena(Arena::new(bytes)?))
  }

  pub fn with_arena(arena: Arena<'a>) -> Self {
    Self { arena }
  }

  pub fn arena(&self) -> &Arena<'a> {
    &self.arena
  }

  pub(crate) fn arena_mut(&mut self) -> &mut Arena<'a> {
    &mut self.arena
  }

  pub fn into_arena(self) -> Arena<'a> {
    self.arena
  }

  pub fn usage(&self) -> Result<Usage, CorruptionError> {
    self.arena.usage()
  }

  /// Hands out a block whose payload holds at least `bytes` bytes.
  pub fn allocate(
    &mut self,
    bytes: usize,
  ) -> Result<Block, AllocError> {
    let arena_size = self.arena.size();

    let target = bytes
      .checked_add(HEADER_SIZE)
      .and_then(next_pow2)
      .filter(|target| *target <= arena_size)
      .ok_or(AllocError::RequestTooLarge {
        requested: bytes,
        arena: arena_size,
      })?;

    let mut best_to_split: Option<(Block, usize)> = None;
    let mut cursor = Some(Block::FIRST);

    while let Some(block) = cursor {
      let header = self.arena.header(block)?;
      cursor = self.arena.next_block(block)?;

      if header.in_use() || header.size < target {
        continue;
      }

      if header.size == target {
        self.mark_in_use(block, header);
        debug!("allocated {} bytes at {:#x} (exact fit)", target, block.offset());
        return Ok(block);
      }

      // Strictly smaller only: the first candidate of a size keeps the spot.
      if best_to_split.is_none_or(|(_, size)| size > header.size) {
        best_to_split = Some((block, header.size));
      }
    }

    let Some((block, _)) = best_to_split else {
      debug!("out of memory for {} bytes ({} byte block)", bytes, target);
      return Err(AllocError::OutOfMemory {
        requested: bytes,
        target,
      });
    };

    let header = self.split_down(block, target)?;
    self.mark_in_use(block, header);
    debug!("allocated {} bytes at {:#x} (split)", target, block.offset());

    Ok(block)
  }

  /// Halves `block` until it is `target` bytes. The left half keeps the
  /// offset, every right half becomes a free block of its own.
  fn split_down(
    &mut self,
    block: Block,
    target: usize,
  ) -> Result<BlockHeader, CorruptionError> {
    let mut header = self.arena.header(block)?;

    while header.size > target {
      let half = header.size / 2;

      if half < target {
        return Err(CorruptionError::SplitUnderflow {
          offset: block.offset(),
          size: header.size,
          target,
        });
      }

      header = self.halve(block, header);
    }

    Ok(header)
  }

  /// Writes the two half-size headers for `block` and returns the left one.
  fn halve(
    &mut self,
    block: Block,
    mut header: BlockHeader,
  ) -> BlockHeader {
    let was_last = header.is_last();
    let half = header.size / 2;

    header.size = half;
    header.flags.remove(Flags::IS_LAST);

    let right_flags = if was_last {
      Flags::IS_LAST
    } else {
      Flags::empty()
    };

    self.arena.write_header(block, header);
    self
      .arena
      .write_header(Block::at(block.offset() + half), BlockHeader::new(half, right_flags));

    debug!("split block {:#x} into two {} byte buddies", block.offset(), half);

    header
  }

  /// Splits a free block into its two buddies.
  pub fn split(
    &mut self,
    block: Block,
  ) -> Result<(Block, Block), BlockError> {
    let header = self.locate(block)?;

    if header.in_use() {
      return Err(BlockError::InUse {
        offset: block.offset(),
      });
    }

    if header.size / 2 < MIN_BLOCK_SIZE {
      return Err(BlockError::TooSmall {
        offset: block.offset(),
        size: header.size,
      });
    }

    let left = self.halve(block, header);

    Ok((block, Block::at(block.offset() + left.size)))
  }

  /// Returns `block` to the pool and merges it upward with its buddies.
  pub fn free(
    &mut self,
    block: Block,
  ) -> Result<(), BlockError> {
    let mut header = self.locate(block)?;

    if !header.in_use() {
      return Err(BlockError::DoubleFree {
        offset: block.offset(),
      });
    }

    header.flags.remove(Flags::IN_USE);
    self.arena.write_header(block, header);
    debug!("freed block {:#x} ({} bytes)", block.offset(), header.size);

    let mut current = block;
    loop {
      let size = self.arena.header(current)?.size;
      if size == self.arena.size() {
        break;
      }

      let buddy = buddy_of(current, size);
      if self.arena.header(buddy)?.size != size {
        break;
      }

      match self.merge(current.min(buddy)) {
        Ok(merged) => current = merged,
        Err(BlockError::NotMergeable { .. }) => break,
        Err(err) => return Err(err),
      }
    }

    Ok(())
  }

  /// Payload of an in-use block.
  pub fn payload(
    &self,
    block: Block,
  ) -> Result<&[u8], BlockError> {
    let header = self.in_use_header(block)?;
    let start = block.offset() + HEADER_SIZE;

    Ok(&self.arena.bytes()[start..block.offset() + header.size])
  }

  pub fn payload_mut(
    &mut self,
    block: Block,
  ) -> Result<&mut [u8], BlockError> {
    let header = self.in_use_header(block)?;
    let start = block.offset() + HEADER_SIZE;

    Ok(&mut self.arena.bytes_mut()[start..block.offset() + header.size])
  }

  fn in_use_header(
    &self,
    block: Block,
  ) -> Result<BlockHeader, BlockError> {
    let header = self.locate(block)?;

    if !header.in_use() {
      return Err(BlockError::NotInUse {
        offset: block.offset(),
      });
    }

    Ok(header)
  }

  /// Walks the chain to make sure `block` names the start of a block.
  /// Handles to blocks that were merged away are rejected.
  pub(crate) fn locate(
    &self,
    block: Block,
  ) -> Result<BlockHeader, BlockError> {
    for info in self.arena.blocks() {
      let info = info?;

      if info.offset == block.offset() {
        return Ok(self.arena.header(block)?);
      }

      if info.offset > block.offset() {
        break;
      }
    }

    Err(BlockError::UnknownBlock {
      offset: block.offset(),
    })
  }

  fn mark_in_use(
    &mut self,
    block: Block,
    mut header: BlockHeader,
  ) {
    header.flags.insert(Flags::IN_USE);
    self.arena.write_header(block, header);
  }
}
