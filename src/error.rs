//! Error types for the allocator, its configuration and the heap checker.

use thiserror::Error;

/// Failures of the allocator's fallible paths.
///
/// The malloc-style surface ([`allocate`](crate::ExplicitAllocator::allocate)
/// and friends) folds these into a null pointer and a log line.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocError {
  #[error("heap grower refused {requested} more bytes")]
  OutOfMemory { requested: usize },

  #[error("heap of {current} bytes cannot grow by {requested}: limit is {max} bytes")]
  HeapLimit {
    current: usize,
    requested: usize,
    max: usize,
  },

  #[error("heap grower returned {actual:#x}, expected contiguous growth at {expected:#x}")]
  NonContiguous { expected: usize, actual: usize },

  #[error("heap origin {0:#x} is not 8-byte aligned")]
  MisalignedOrigin(usize),

  #[error("allocator is already initialized")]
  AlreadyInitialized,

  #[error("zero-allocate of {count} x {size} bytes overflows")]
  SizeOverflow { count: usize, size: usize },

  #[error("pointer {0:#x} is not a payload inside this heap")]
  ForeignPointer(usize),

  #[error("block at {0:#x} is not allocated")]
  NotAllocated(usize),

  #[error("block at {0:#x} has mismatched boundary tags")]
  DamagedBlock(usize),

  #[error("invalid configuration: {0}")]
  Config(#[from] ConfigError),
}

/// Rejected [`AllocatorConfig`](crate::AllocatorConfig) values.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
  #[error("chunk size {0} is not a multiple of 8")]
  UnalignedChunk(usize),

  #[error("chunk size {size} is below the minimum block size {min}")]
  ChunkTooSmall { size: usize, min: usize },

  #[error("chunk size {size} exceeds the heap limit {max}")]
  ChunkTooLarge { size: usize, max: usize },
}

/// A structural violation found by the heap checker.
///
/// Addresses are absolute payload addresses, matching what callers see.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeapCorruption {
  #[error("heap is not initialized")]
  Uninitialized,

  #[error("bad prologue header {header:#x}")]
  BadPrologue { header: u32 },

  #[error("bad epilogue header {header:#x} at {address:#x}")]
  BadEpilogue { address: usize, header: u32 },

  #[error("{address:#x} is not doubleword aligned")]
  Misaligned { address: usize },

  #[error("block at {address:#x} runs past the end of the heap")]
  OutOfBounds { address: usize },

  #[error("block at {address:#x} is {size} bytes, below the minimum block size")]
  Undersized { address: usize, size: usize },

  #[error("header {header:#x} does not match footer {footer:#x} at {address:#x}")]
  TagMismatch {
    address: usize,
    header: u32,
    footer: u32,
  },

  #[error("free block {address:#x} not in free list")]
  NotInFreeList { address: usize },

  #[error("free list links {address:#x} to itself")]
  SelfLoop { address: usize },

  #[error("free list does not terminate after {steps} nodes, last node {address:#x}")]
  Cycle { address: usize, steps: usize },

  #[error("free list node {address:#x} is not a free block")]
  ListedBlockNotFree { address: usize },

  #[error("free list node {address:#x} has a predecessor link that does not point back")]
  BrokenLink { address: usize },

  #[error("free blocks at {address:#x} and its right neighbour were not coalesced")]
  Uncoalesced { address: usize },

  #[error("free list holds {listed} nodes but the heap has {found} free blocks")]
  CountMismatch { listed: usize, found: usize },
}
