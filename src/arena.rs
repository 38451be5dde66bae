use std::fmt;

use log::{debug, trace, warn};

use crate::{
  block::{Block, BlockHeader, BlockInfo, Flags, HEADER_SIZE, MIN_BLOCK_SIZE},
  error::{CorruptionError, InitError},
};

/// A fixed-size byte range tiled by power-of-two blocks.
///
/// The arena does not own its memory: it borrows the backing bytes for its
/// whole lifetime and keeps every piece of bookkeeping inline, in the block
/// headers. Blocks are found only by walking the chain from offset 0, the
/// next block always starting where the current one ends.
pub struct Arena<'a> {
  bytes: &'a mut [u8],
}

impl<'a> Arena<'a> {
  /// Takes over `bytes` and writes a single free block spanning all of it.
  ///
  /// The length must be a power of two and at least [`MIN_BLOCK_SIZE`].
  pub fn new(bytes: &'a mut [u8]) -> Result<Self, InitError> {
    let len = bytes.len();

    if len < MIN_BLOCK_SIZE {
      return Err(InitError::TooSmall {
        len,
        min: MIN_BLOCK_SIZE,
      });
    }

    if !len.is_power_of_two() {
      return Err(InitError::NotPowerOfTwo { len });
    }

    let mut arena = Self { bytes };
    arena.write_header(Block::FIRST, BlockHeader::new(len, Flags::IS_LAST));

    debug!("initialized arena of {} bytes at {:p}", len, arena.bytes.as_ptr());

    Ok(arena)
  }

  /// Total bytes managed by the arena.
  pub fn size(&self) -> usize {
    self.bytes.len()
  }

  /// Reads and validates the header of `block`.
  pub fn header(
    &self,
    block: Block,
  ) -> Result<BlockHeader, CorruptionError> {
    let offset = block.offset();
    let arena = self.size();

    let header_end = match offset.checked_add(HEADER_SIZE) {
      Some(end) if end <= arena => end,
      _ => {
        return Err(corrupted(CorruptionError::PastArenaEnd {
          offset,
          size: HEADER_SIZE,
          arena,
        }));
      }
    };

    let header = BlockHeader::decode(&self.bytes[offset..header_end]);

    if !header.size.is_power_of_two() || header.size < MIN_BLOCK_SIZE {
      return Err(corrupted(CorruptionError::BadSize {
        offset,
        size: header.size,
      }));
    }

    if offset.checked_add(header.size).is_none_or(|end| end > arena) {
      return Err(corrupted(CorruptionError::PastArenaEnd {
        offset,
        size: header.size,
        arena,
      }));
    }

    Ok(header)
  }

  /// Overwrites the header of `block`. The caller keeps the chain tiled.
  pub(crate) fn write_header(
    &mut self,
    block: Block,
    header: BlockHeader,
  ) {
    let offset = block.offset();
    header.encode(&mut self.bytes[offset..offset + HEADER_SIZE]);
  }

  /// The block that starts where `block` ends, or `None` for the last block.
  pub fn next_block(
    &self,
    block: Block,
  ) -> Result<Option<Block>, CorruptionError> {
    let header = self.header(block)?;
    let end = block.offset() + header.size;
    let arena = self.size();

    if header.is_last() {
      if end != arena {
        return Err(corrupted(CorruptionError::MisplacedLast {
          offset: block.offset(),
          end,
          arena,
        }));
      }

      return Ok(None);
    }

    // The final block lost its IS_LAST bit: the next header would sit past
    // the end of the arena.
    if end >= arena {
      return Err(corrupted(CorruptionError::MissingLast { end, arena }));
    }

    trace!("block {:#x} ({} bytes) -> {:#x}", block.offset(), header.size, end);

    Ok(Some(Block::at(end)))
  }

  /// Walks the chain in address order.
  ///
  /// The walk stops after the first corruption it reports.
  pub fn blocks(&self) -> Blocks<'_, 'a> {
    Blocks {
      arena: self,
      cursor: Some(Block::FIRST),
    }
  }

  /// Verifies that the blocks tile the arena and exactly one of them, the
  /// final one, carries `IS_LAST`.
  pub fn check(&self) -> Result<(), CorruptionError> {
    self.blocks().try_for_each(|info| info.map(|_| ()))
  }

  /// Aggregated view of the chain.
  pub fn usage(&self) -> Result<Usage, CorruptionError> {
    let mut usage = Usage::default();

    for info in self.blocks() {
      let info = info?;
      usage.blocks += 1;

      if info.in_use {
        usage.in_use_bytes += info.size;
      } else {
        usage.free_bytes += info.size;
        usage.largest_free = usage.largest_free.max(info.size);
      }
    }

    Ok(usage)
  }

  pub(crate) fn bytes(&self) -> &[u8] {
    &*self.bytes
  }

  pub(crate) fn bytes_mut(&mut self) -> &mut [u8] {
    &mut *self.bytes
  }
}

fn corrupted(err: CorruptionError) -> CorruptionError {
  warn!("block chain corrupted: {}", err);
  err
}

/// Iterator over the chain, see [`Arena::blocks`].
pub struct Blocks<'r, 'a> {
  arena: &'r Arena<'a>,
  cursor: Option<Block>,
}

impl Iterator for Blocks<'_, '_> {
  type Item = Result<BlockInfo, CorruptionError>;

  fn next(&mut self) -> Option<Self::Item> {
    let block = self.cursor.take()?;

    let step = self
      .arena
      .header(block)
      .and_then(|header| Ok((header, self.arena.next_block(block)?)));

    match step {
      Ok((header, next)) => {
        self.cursor = next;
        Some(Ok(BlockInfo::new(block, header)))
      }
      Err(err) => Some(Err(err)),
    }
  }
}

/// Block and byte counts over the whole chain.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Usage {
  pub blocks: usize,
  pub in_use_bytes: usize,
  pub free_bytes: usize,
  pub largest_free: usize,
}

impl fmt::Display for Arena<'_> {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    for info in self.blocks() {
      match info {
        Ok(info) => writeln!(
          f,
          "Block: {:#x}\n\tBytes: {}\n\tIN USE: {}\n\tIS_LAST: {}",
          info.offset, info.size, info.in_use, info.is_last
        )?,
        Err(err) => writeln!(f, "CORRUPTED: {}", err)?,
      }
    }

    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn split_by_hand(
    arena: &mut Arena<'_>,
    sizes: &[usize],
  ) {
    let mut offset = 0;
    for (i, size) in sizes.iter().enumerate() {
      let flags = if i + 1 == sizes.len() {
        Flags::IS_LAST
      } else {
        Flags::empty()
      };
      arena.write_header(Block::at(offset), BlockHeader::new(*size, flags));
      offset += size;
    }
  }

  #[test]
  fn test_new_writes_single_last_block() {
    let mut backing = vec![0u8; 1024];
    let arena = Arena::new(&mut backing).unwrap();

    let blocks: Vec<_> = arena.blocks().collect::<Result<_, _>>().unwrap();

    assert_eq!(
      blocks,
      vec![BlockInfo {
        offset: 0,
        size: 1024,
        in_use: false,
        is_last: true,
      }]
    );
    assert_eq!(arena.next_block(Block::FIRST), Ok(None));
  }

  #[test]
  fn test_new_rejects_bad_lengths() {
    let mut small = vec![0u8; MIN_BLOCK_SIZE / 2];
    assert!(matches!(
      Arena::new(&mut small),
      Err(InitError::TooSmall { .. })
    ));

    let mut odd = vec![0u8; 1000];
    assert!(matches!(
      Arena::new(&mut odd),
      Err(InitError::NotPowerOfTwo { len: 1000 })
    ));
  }

  #[test]
  fn test_next_block_follows_sizes() {
    let mut backing = vec![0u8; 256];
    let mut arena = Arena::new(&mut backing).unwrap();
    split_by_hand(&mut arena, &[64, 64, 128]);

    assert_eq!(arena.next_block(Block::at(0)), Ok(Some(Block::at(64))));
    assert_eq!(arena.next_block(Block::at(64)), Ok(Some(Block::at(128))));
    assert_eq!(arena.next_block(Block::at(128)), Ok(None));
    assert_eq!(arena.check(), Ok(()));
  }

  #[test]
  fn test_missing_last_is_corruption() {
    let mut backing = vec![0u8; 256];
    let mut arena = Arena::new(&mut backing).unwrap();
    split_by_hand(&mut arena, &[128, 128]);
    arena.write_header(Block::at(128), BlockHeader::new(128, Flags::empty()));

    assert_eq!(
      arena.next_block(Block::at(128)),
      Err(CorruptionError::MissingLast {
        end: 256,
        arena: 256,
      })
    );
    assert!(arena.check().is_err());
  }

  #[test]
  fn test_early_last_is_corruption() {
    let mut backing = vec![0u8; 256];
    let mut arena = Arena::new(&mut backing).unwrap();
    split_by_hand(&mut arena, &[128, 128]);
    arena.write_header(Block::at(0), BlockHeader::new(128, Flags::IS_LAST));

    assert!(matches!(
      arena.check(),
      Err(CorruptionError::MisplacedLast { offset: 0, .. })
    ));
  }

  #[test]
  fn test_overwritten_header_is_corruption() {
    let mut backing = vec![0u8; 256];
    let mut arena = Arena::new(&mut backing).unwrap();
    split_by_hand(&mut arena, &[128, 128]);

    arena.write_header(Block::at(128), BlockHeader::new(24, Flags::IS_LAST));
    assert_eq!(
      arena.header(Block::at(128)),
      Err(CorruptionError::BadSize {
        offset: 128,
        size: 24,
      })
    );

    arena.write_header(Block::at(128), BlockHeader::new(512, Flags::IS_LAST));
    assert!(matches!(
      arena.header(Block::at(128)),
      Err(CorruptionError::PastArenaEnd { offset: 128, .. })
    ));

    assert!(matches!(
      arena.header(Block::at(250)),
      Err(CorruptionError::PastArenaEnd { offset: 250, .. })
    ));
  }

  #[test]
  fn test_usage() {
    let mut backing = vec![0u8; 256];
    let mut arena = Arena::new(&mut backing).unwrap();
    split_by_hand(&mut arena, &[32, 32, 64, 128]);
    arena.write_header(Block::at(32), BlockHeader::new(32, Flags::IN_USE));

    assert_eq!(
      arena.usage(),
      Ok(Usage {
        blocks: 4,
        in_use_bytes: 32,
        free_bytes: 224,
        largest_free: 128,
      })
    );
  }

  #[test]
  fn test_display_dump() {
    let mut backing = vec![0u8; 64];
    let mut arena = Arena::new(&mut backing).unwrap();
    split_by_hand(&mut arena, &[32, 32]);

    let dump = arena.to_string();

    assert_eq!(
      dump,
      "Block: 0x0\n\tBytes: 32\n\tIN USE: false\n\tIS_LAST: false\n\
       Block: 0x20\n\tBytes: 32\n\tIN USE: false\n\tIS_LAST: true\n"
    );
  }
}
