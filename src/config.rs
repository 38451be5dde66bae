use std::env;

use crate::{
  block::MIN_BLOCK_SIZE,
  error::{ConfigError, InitError},
};

/// Arena size used when nothing else is configured: 1 MiB.
pub const DEFAULT_ARENA_SIZE: usize = 1024 * 1024;

/// Environment variable read by [`ArenaConfig::from_env`].
pub const ENV_ARENA_SIZE: &str = "RBUDDY_ARENA_SIZE";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ArenaConfig {
  /// Total arena bytes, headers included.
  pub size: usize,
}

impl Default for ArenaConfig {
  fn default() -> Self {
    Self {
      size: DEFAULT_ARENA_SIZE,
    }
  }
}

impl ArenaConfig {
  /// Parses a byte count such as `4096`, `64K` or `1M`. Suffixes are
  /// binary and case-insensitive.
  pub fn parse(value: &str) -> Result<Self, ConfigError> {
    let value = value.trim();
    if value.is_empty() {
      return Err(ConfigError::Empty);
    }

    let invalid = || ConfigError::Invalid {
      value: value.to_string(),
    };

    let (digits, unit) = match value.as_bytes()[value.len() - 1] {
      b'k' | b'K' => (&value[..value.len() - 1], 1024),
      b'm' | b'M' => (&value[..value.len() - 1], 1024 * 1024),
      _ => (value, 1),
    };

    let size = digits
      .parse::<usize>()
      .ok()
      .and_then(|n| n.checked_mul(unit))
      .ok_or_else(invalid)?;

    Ok(Self { size })
  }

  /// Reads `RBUDDY_ARENA_SIZE`, falling back to the default when unset.
  pub fn from_env() -> Result<Self, ConfigError> {
    match env::var(ENV_ARENA_SIZE) {
      Ok(value) => Self::parse(&value),
      Err(env::VarError::NotPresent) => Ok(Self::default()),
      Err(env::VarError::NotUnicode(value)) => Err(ConfigError::Invalid {
        value: value.to_string_lossy().into_owned(),
      }),
    }
  }

  /// Checks that an arena of this size can be initialized.
  pub fn validate(&self) -> Result<(), InitError> {
    if self.size < MIN_BLOCK_SIZE {
      return Err(InitError::TooSmall {
        len: self.size,
        min: MIN_BLOCK_SIZE,
      });
    }

    if !self.size.is_power_of_two() {
      return Err(InitError::NotPowerOfTwo { len: self.size });
    }

    Ok(())
  }
}
