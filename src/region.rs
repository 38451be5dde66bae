use std::{io, ptr, slice};

use libc::{MAP_ANONYMOUS, MAP_FAILED, MAP_PRIVATE, PROT_READ, PROT_WRITE, c_void, mmap, munmap};
use log::{debug, warn};

use crate::{block::MIN_BLOCK_SIZE, config::ArenaConfig, error::InitError};

/// Anonymous private mapping used as arena backing storage.
///
/// The kernel hands the pages out zeroed. They go back on drop.
pub struct MmapRegion {
  base: ptr::NonNull<u8>,
  len: usize,
}

impl MmapRegion {
  pub fn new(len: usize) -> Result<Self, InitError> {
    if len == 0 {
      return Err(InitError::TooSmall {
        len,
        min: MIN_BLOCK_SIZE,
      });
    }

    let address = unsafe {
      mmap(
        ptr::null_mut(),
        len,
        PROT_READ | PROT_WRITE,
        MAP_PRIVATE | MAP_ANONYMOUS,
        -1,
        0,
      )
    };

    if address == MAP_FAILED {
      return Err(InitError::Map(io::Error::last_os_error()));
    }

    let base = ptr::NonNull::new(address.cast::<u8>())
      .ok_or_else(|| InitError::Map(io::Error::other("mmap returned a null mapping")))?;

    debug!("mapped {} bytes at {:p}", len, base);

    Ok(Self { base, len })
  }

  /// Maps a region sized for `config`, rejecting sizes no arena accepts.
  pub fn from_config(config: &ArenaConfig) -> Result<Self, InitError> {
    config.validate()?;
    Self::new(config.size)
  }

  pub fn size(&self) -> usize {
    self.len
  }

  pub fn as_mut_slice(&mut self) -> &mut [u8] {
    unsafe { slice::from_raw_parts_mut(self.base.as_ptr(), self.len) }
  }
}

impl Drop for MmapRegion {
  fn drop(&mut self) {
    let result = unsafe { munmap(self.base.as_ptr().cast::<c_void>(), self.len) };

    if result != 0 {
      warn!(
        "failed to unmap {} bytes at {:p}: {}",
        self.len,
        self.base,
        io::Error::last_os_error()
      );
    }
  }
}
