use std::{fmt, mem, ops};

use crate::align;

const SIZE_FIELD: usize = mem::size_of::<usize>();

/// Bytes every block spends on its inline header: the `size` word followed
/// by the flag byte, padded to the machine word.
pub const HEADER_SIZE: usize = align!(SIZE_FIELD + mem::size_of::<u8>());

/// Smallest block the arena can hold. Halving stops here.
pub const MIN_BLOCK_SIZE: usize = HEADER_SIZE.next_power_of_two();

/// Status bits stored in the header's flag byte.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Flags(u8);

impl Flags {
  /// The payload is owned by a caller.
  pub const IN_USE: Flags = Flags(0b0000_0001);
  /// Highest-address block of the arena. Traversal stops here.
  pub const IS_LAST: Flags = Flags(0b0000_0010);

  pub const fn empty() -> Self {
    Flags(0)
  }

  pub const fn bits(self) -> u8 {
    self.0
  }

  pub const fn contains(
    self,
    other: Flags,
  ) -> bool {
    self.0 & other.0 == other.0
  }

  pub fn insert(
    &mut self,
    other: Flags,
  ) {
    self.0 |= other.0;
  }

  pub fn remove(
    &mut self,
    other: Flags,
  ) {
    self.0 &= !other.0;
  }
}

impl ops::BitOr for Flags {
  type Output = Flags;

  fn bitor(
    self,
    rhs: Flags,
  ) -> Flags {
    Flags(self.0 | rhs.0)
  }
}

impl fmt::Debug for Flags {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    f.debug_struct("Flags")
      .field("in_use", &self.contains(Flags::IN_USE))
      .field("is_last", &self.contains(Flags::IS_LAST))
      .finish()
  }
}

/// The metadata written at the start of every block.
///
/// ```text
///   offset            offset + SIZE_FIELD
///   ┌─────────────────┬───────┬─────────┬──────────────────────────┐
///   │ size (usize)    │ flags │ padding │ payload                  │
///   └─────────────────┴───────┴─────────┴──────────────────────────┘
///   │◄──────────── HEADER_SIZE ────────►│◄─ size - HEADER_SIZE ───►│
/// ```
///
/// Headers are encoded byte by byte, so a block may start at any address.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlockHeader {
  /// Total bytes of the block, header included.
  pub size: usize,
  pub flags: Flags,
}

impl BlockHeader {
  pub fn new(
    size: usize,
    flags: Flags,
  ) -> Self {
    Self { size, flags }
  }

  pub fn in_use(&self) -> bool {
    self.flags.contains(Flags::IN_USE)
  }

  pub fn is_last(&self) -> bool {
    self.flags.contains(Flags::IS_LAST)
  }

  /// Bytes available to the caller once the block is handed out.
  pub fn payload_len(&self) -> usize {
    self.size.saturating_sub(HEADER_SIZE)
  }

  /// Reads a header from the first `HEADER_SIZE` bytes of `bytes`.
  pub(crate) fn decode(bytes: &[u8]) -> Self {
    let mut size = [0u8; SIZE_FIELD];
    size.copy_from_slice(&bytes[..SIZE_FIELD]);

    Self {
      size: usize::from_ne_bytes(size),
      flags: Flags(bytes[SIZE_FIELD]),
    }
  }

  /// Writes the header into the first `HEADER_SIZE` bytes of `bytes`.
  /// Padding bytes are left alone.
  pub(crate) fn encode(
    &self,
    bytes: &mut [u8],
  ) {
    bytes[..SIZE_FIELD].copy_from_slice(&self.size.to_ne_bytes());
    bytes[SIZE_FIELD] = self.flags.0;
  }
}

/// Handle to a block, identified by the offset of its header inside the
/// arena.
///
/// A handle stays meaningful until the block it names is merged into its
/// left buddy.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Block {
  offset: usize,
}

impl Block {
  /// The block at the start of the arena. It always exists.
  pub const FIRST: Block = Block { offset: 0 };

  pub(crate) const fn at(offset: usize) -> Self {
    Self { offset }
  }

  pub fn offset(&self) -> usize {
    self.offset
  }
}

/// Snapshot of one block, as produced by the chain dump.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlockInfo {
  pub offset: usize,
  pub size: usize,
  pub in_use: bool,
  pub is_last: bool,
}

impl BlockInfo {
  pub(crate) fn new(
    block: Block,
    header: BlockHeader,
  ) -> Self {
    Self {
      offset: block.offset,
      size: header.size,
      in_use: header.in_use(),
      is_last: header.is_last(),
    }
  }

  pub fn block(&self) -> Block {
    Block::at(self.offset)
  }

  /// One past the last byte of the block.
  pub fn end(&self) -> usize {
    self.offset + self.size
  }
}
