//! Boundary-tag encoding.
//!
//! ```text
//!   Allocated block:                     Free block:
//!
//!   ┌────────┬───────────────┬────────┐  ┌────────┬──────┬──────┬───────┬────────┐
//!   │ header │    payload    │ footer │  │ header │ pred │ succ │  ...  │ footer │
//!   └────────┴───────────────┴────────┘  └────────┴──────┴──────┴───────┴────────┘
//!    4 bytes  ▲               4 bytes     4 bytes  ▲ 4 B    4 B           4 bytes
//!             └── bp (8-aligned)                   └── bp
//! ```
//!
//! Header and footer both hold `size | allocated`. The size counts the whole
//! block including both tags, so it is always a multiple of [`ALIGNMENT`] and
//! the low three bits are free for flags.

/// Header/footer word size.
pub const WSIZE: usize = 4;

/// Double word: tag overhead of one block, and the payload alignment.
pub const DSIZE: usize = 8;

/// Alignment of every payload address and block size.
pub const ALIGNMENT: usize = DSIZE;

/// Smallest block that can hold two tags plus the free-list links.
pub const MIN_BLOCK_SIZE: usize = 3 * DSIZE;

/// Default amount the heap grows by when no free block fits.
pub const CHUNK_SIZE: usize = 1 << 9;

/// Largest heap the 32-bit offsets can address.
pub const MAX_HEAP: usize = u32::MAX as usize;

const ALLOCATED: u32 = 0x1;
const SIZE_MASK: u32 = !0x7;

/// A packed header/footer word.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Tag(u32);

impl Tag {
  /// Marks the end of the heap.
  pub const EPILOGUE: Tag = Tag(ALLOCATED);

  pub fn new(
    size: usize,
    allocated: bool,
  ) -> Self {
    debug_assert!(size % ALIGNMENT == 0, "block size {size} is not aligned");
    debug_assert!(size <= MAX_HEAP);
    Self(size as u32 | if allocated { ALLOCATED } else { 0 })
  }

  pub fn from_raw(raw: u32) -> Self {
    Self(raw)
  }

  pub fn raw(self) -> u32 {
    self.0
  }

  pub fn size(self) -> usize {
    (self.0 & SIZE_MASK) as usize
  }

  pub fn is_allocated(self) -> bool {
    self.0 & ALLOCATED != 0
  }
}

impl core::fmt::Debug for Tag {
  fn fmt(
    &self,
    f: &mut core::fmt::Formatter<'_>,
  ) -> core::fmt::Result {
    write!(f, "[{}:{}]", self.size(), if self.is_allocated() { 'a' } else { 'f' })
  }
}

/// Stable handle of a block: the offset of its payload from the heap origin.
///
/// Free-list links are stored in the heap in this same encoding, so a handle
/// read out of a link and a handle computed from sizes compare directly.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub struct Block(pub u32);

impl Block {
  /// The prologue's payload. Never on the free list, so it doubles as the
  /// list anchor that terminates both directions.
  pub const PROLOGUE: Block = Block(DSIZE as u32);

  /// First block after the prologue.
  pub const FIRST: Block = Block(2 * DSIZE as u32);

  pub fn offset(self) -> usize {
    self.0 as usize
  }

  pub fn header(self) -> usize {
    self.offset() - WSIZE
  }

  /// Footer offset for a block of `size` bytes.
  pub fn footer(
    self,
    size: usize,
  ) -> usize {
    self.offset() + size - DSIZE
  }

  pub fn pred_field(self) -> usize {
    self.offset()
  }

  pub fn succ_field(self) -> usize {
    self.offset() + WSIZE
  }

  /// Block that starts `size` bytes further on.
  pub fn advance(
    self,
    size: usize,
  ) -> Block {
    Block((self.offset() + size) as u32)
  }

  /// Block that starts `size` bytes earlier.
  pub fn retreat(
    self,
    size: usize,
  ) -> Block {
    Block((self.offset() - size) as u32)
  }
}

/// Block size needed to serve a request of `size` payload bytes.
pub fn adjusted_size(size: usize) -> Option<usize> {
  let padded = size.checked_add(DSIZE + ALIGNMENT - 1)? & !(ALIGNMENT - 1);
  Some(padded.max(MIN_BLOCK_SIZE))
}
