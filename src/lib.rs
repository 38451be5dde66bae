//! # rbuddy - A Power-of-Two Block Allocator
//!
//! This crate provides a **buddy-style allocator** over a single, fixed-size
//! byte arena. Every block carries its own header; there is no side table
//! and no free list.
//!
//! ## Overview
//!
//! The arena is tiled by blocks whose sizes are powers of two. A request is
//! rounded up, header included, to the next power of two, and a free block
//! of that size is found or carved out of a larger one by halving it:
//!
//! ```text
//!   Allocating 13 bytes (32 byte block) from a fresh 256 byte arena:
//!
//!   ┌──────────────────────────────────────────────────────────────────┐
//!   │                             256 (LAST)                           │
//!   └──────────────────────────────────────────────────────────────────┘
//!                                  │ halve
//!   ┌─────────────────────────────────┬────────────────────────────────┐
//!   │               128               │           128 (LAST)           │
//!   └─────────────────────────────────┴────────────────────────────────┘
//!                  │ halve, halve
//!   ┌────────┬────────┬───────────────┬────────────────────────────────┐
//!   │ 32 USE │   32   │      64       │           128 (LAST)           │
//!   └────────┴────────┴───────────────┴────────────────────────────────┘
//! ```
//!
//! Freeing runs the other way: a free block merges with its equal-size,
//! free buddy into the parent block, and so on upward.
//!
//! ## Crate Structure
//!
//! ```text
//!   rbuddy
//!   ├── align      - align! macro and next_pow2
//!   ├── block      - Inline block header, flags, block handles
//!   ├── arena      - Arena over borrowed bytes, traversal, chain dump
//!   ├── buddy      - BuddyAllocator: allocate, split, free
//!   ├── coalesce   - Buddy merging
//!   ├── region     - mmap-backed storage for an arena
//!   ├── config     - Arena size configuration
//!   └── error      - Error types
//! ```
//!
//! ## Quick Start
//!
//! ```rust
//! use rbuddy::BuddyAllocator;
//!
//! let mut backing = vec![0u8; 1024];
//! let mut allocator = BuddyAllocator::new(&mut backing).unwrap();
//!
//! let block = allocator.allocate(13).unwrap();
//! allocator.payload_mut(block).unwrap()[..5].copy_from_slice(b"hello");
//!
//! println!("{}", allocator.arena());
//!
//! allocator.free(block).unwrap();
//! ```
//!
//! ## How It Works
//!
//! Blocks form an implicit chain in address order. The next block starts
//! where the current one ends, and the block flagged `IS_LAST` ends the walk:
//!
//! ```text
//!   Block Layout:
//!   ┌───────────────────────┬────────────────────────────────┐
//!   │    Block Header       │         Payload                │
//!   │  ┌─────────────────┐  │                                │
//!   │  │ size: 2^k       │  │  ┌──────────────────────────┐  │
//!   │  │ flags: IN_USE,  │  │  │                          │  │
//!   │  │        IS_LAST  │  │  │ 2^k - HEADER_SIZE bytes  │  │
//!   │  └─────────────────┘  │  └──────────────────────────┘  │
//!   │     HEADER_SIZE       │                                │
//!   └───────────────────────┴────────────────────────────────┘
//!   ▲                                                        ▲
//!   offset                                     next block's offset
//! ```
//!
//! Every traversal step checks the header it reads. A size that is not a
//! power of two, a block running past the arena end, or a missing `IS_LAST`
//! is reported as a [`CorruptionError`], separately from running out of
//! memory.
//!
//! ## Limitations
//!
//! - **Single-threaded only**: no locking; wrap the allocator in a mutex to share it
//! - **Fixed arena**: one arena per allocator, never grown or shrunk
//! - **Linear search**: allocation walks the whole chain, O(number of blocks)
//! - **Header alignment only**: payloads are offset by `HEADER_SIZE` from a block start

pub mod align;
mod arena;
mod block;
mod buddy;
mod coalesce;
pub mod config;
mod error;
#[cfg(unix)]
mod region;

pub use align::next_pow2;
pub use arena::{Arena, Blocks, Usage};
pub use block::{Block, BlockHeader, BlockInfo, Flags, HEADER_SIZE, MIN_BLOCK_SIZE};
pub use buddy::BuddyAllocator;
pub use config::ArenaConfig;
pub use error::{AllocError, BlockError, ConfigError, CorruptionError, InitError};
#[cfg(unix)]
pub use region::MmapRegion;
