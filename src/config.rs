//! Tuning knobs for [`ExplicitAllocator`](crate::ExplicitAllocator).

use crate::{
  block::{ALIGNMENT, CHUNK_SIZE, MAX_HEAP, MIN_BLOCK_SIZE},
  error::ConfigError,
};

/// Nodes inspected past the first fit before settling.
pub const DEFAULT_FIT_WINDOW: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AllocatorConfig {
  /// Minimum number of bytes requested from the grower per extension.
  pub chunk_size: usize,
  /// How many free-list nodes after the first fit are examined for a
  /// tighter fit. Zero gives plain first fit.
  pub fit_window: usize,
  /// Check every pointer passed to `free` before touching the heap.
  pub verify_frees: bool,
}

impl Default for AllocatorConfig {
  fn default() -> Self {
    Self {
      chunk_size: CHUNK_SIZE,
      fit_window: DEFAULT_FIT_WINDOW,
      verify_frees: false,
    }
  }
}

impl AllocatorConfig {
  pub fn with_chunk_size(
    mut self,
    chunk_size: usize,
  ) -> Self {
    self.chunk_size = chunk_size;
    self
  }

  pub fn with_fit_window(
    mut self,
    fit_window: usize,
  ) -> Self {
    self.fit_window = fit_window;
    self
  }

  pub fn with_verify_frees(
    mut self,
    verify_frees: bool,
  ) -> Self {
    self.verify_frees = verify_frees;
    self
  }

  pub fn validate(&self) -> Result<(), ConfigError> {
    if self.chunk_size % ALIGNMENT != 0 {
      return Err(ConfigError::UnalignedChunk(self.chunk_size));
    }
    if self.chunk_size < MIN_BLOCK_SIZE {
      return Err(ConfigError::ChunkTooSmall {
        size: self.chunk_size,
        min: MIN_BLOCK_SIZE,
      });
    }
    if self.chunk_size > MAX_HEAP / 2 {
      return Err(ConfigError::ChunkTooLarge {
        size: self.chunk_size,
        max: MAX_HEAP / 2,
      });
    }
    Ok(())
  }
}
