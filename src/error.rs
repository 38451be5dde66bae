use std::io;

use thiserror::Error;

/// The block chain no longer satisfies its invariants. Retrying cannot fix
/// this: a header was overwritten or a block was handed back twice.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CorruptionError {
  #[error("block at {offset:#x} with size {size} runs past the arena end ({arena} bytes)")]
  PastArenaEnd {
    offset: usize,
    size: usize,
    arena: usize,
  },

  #[error("block at {offset:#x} has invalid size {size}")]
  BadSize { offset: usize, size: usize },

  #[error("splitting block at {offset:#x} from {size} bytes went below target {target}")]
  SplitUnderflow {
    offset: usize,
    size: usize,
    target: usize,
  },

  #[error("block at {offset:#x} is marked last but ends at {end:#x}, arena is {arena} bytes")]
  MisplacedLast {
    offset: usize,
    end: usize,
    arena: usize,
  },

  #[error("chain ends at {end:#x} without a last block, arena is {arena} bytes")]
  MissingLast { end: usize, arena: usize },
}

/// Failures of [`BuddyAllocator::allocate`](crate::BuddyAllocator::allocate).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AllocError {
  #[error("request of {requested} bytes can never fit an arena of {arena} bytes")]
  RequestTooLarge { requested: usize, arena: usize },

  #[error("out of memory (requested: {requested} bytes, block size: {target})")]
  OutOfMemory { requested: usize, target: usize },

  #[error(transparent)]
  Corrupted(#[from] CorruptionError),
}

/// Failures of operations on a single block: split, merge, free and
/// payload access.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BlockError {
  #[error("block at {offset:#x} cannot be merged with its buddy")]
  NotMergeable { offset: usize },

  #[error("block at {offset:#x} is in use")]
  InUse { offset: usize },

  #[error("block at {offset:#x} was already freed")]
  DoubleFree { offset: usize },

  #[error("block at {offset:#x} is not in use")]
  NotInUse { offset: usize },

  #[error("no block starts at {offset:#x}")]
  UnknownBlock { offset: usize },

  #[error("block at {offset:#x} of {size} bytes is too small to split")]
  TooSmall { offset: usize, size: usize },

  #[error(transparent)]
  Corrupted(#[from] CorruptionError),
}

/// Failures while setting up an arena or its backing storage.
#[derive(Debug, Error)]
pub enum InitError {
  #[error("arena of {len} bytes is smaller than the minimum block ({min} bytes)")]
  TooSmall { len: usize, min: usize },

  #[error("arena length {len} is not a power of two")]
  NotPowerOfTwo { len: usize },

  #[error("failed to map backing memory")]
  Map(#[source] io::Error),
}

/// Failures while reading an [`ArenaConfig`](crate::ArenaConfig).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
  #[error("arena size is empty")]
  Empty,

  #[error("invalid arena size {value:?}")]
  Invalid { value: String },
}
