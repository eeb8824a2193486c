//! The managed region and every read or write of in-heap metadata.
//!
//! Blocks are addressed by their offset from the heap origin ([`Block`]).
//! [`Heap::pointer`] and [`Heap::block_at`] are the only places offsets and
//! addresses are converted, and every word access is checked against the
//! current extent, so a corrupted size or link panics instead of reading
//! outside the region.

use std::ptr::NonNull;

use crate::{
  block::{ALIGNMENT, Block, DSIZE, MAX_HEAP, Tag, WSIZE},
  error::AllocError,
  grower::HeapGrower,
};

pub(crate) struct Heap<G> {
  grower: G,
  base: NonNull<u8>,
  len: usize,
}

impl<G: HeapGrower> Heap<G> {
  pub fn new(grower: G) -> Self {
    Self {
      grower,
      base: NonNull::dangling(),
      len: 0,
    }
  }

  /// Appends `increment` bytes and returns the offset where they start.
  pub fn grow(
    &mut self,
    increment: usize,
  ) -> Result<usize, AllocError> {
    if increment > MAX_HEAP - self.len {
      return Err(AllocError::HeapLimit {
        current: self.len,
        requested: increment,
        max: MAX_HEAP,
      });
    }

    let start = self
      .grower
      .grow(increment)
      .ok_or(AllocError::OutOfMemory { requested: increment })?;

    if self.len == 0 {
      let origin = start.as_ptr() as usize;
      if origin % ALIGNMENT != 0 {
        return Err(AllocError::MisalignedOrigin(origin));
      }
      self.base = start;
    } else {
      let expected = self.base.as_ptr() as usize + self.len;
      let actual = start.as_ptr() as usize;
      if actual != expected {
        return Err(AllocError::NonContiguous { expected, actual });
      }
    }

    let old_len = self.len;
    self.len += increment;
    Ok(old_len)
  }
}

impl<G> Heap<G> {
  pub fn len(&self) -> usize {
    self.len
  }

  pub fn grower(&self) -> &G {
    &self.grower
  }

  pub fn try_word(
    &self,
    offset: usize,
  ) -> Option<u32> {
    let end = offset.checked_add(WSIZE)?;
    if end > self.len {
      return None;
    }
    // SAFETY: offset..end lies inside the granted region.
    Some(unsafe { self.base.as_ptr().add(offset).cast::<u32>().read_unaligned() })
  }

  pub fn word(
    &self,
    offset: usize,
  ) -> u32 {
    match self.try_word(offset) {
      Some(word) => word,
      None => panic!("heap read at offset {offset:#x} past extent {:#x}", self.len),
    }
  }

  pub fn set_word(
    &mut self,
    offset: usize,
    value: u32,
  ) {
    assert!(
      offset.checked_add(WSIZE).is_some_and(|end| end <= self.len),
      "heap write at offset {offset:#x} past extent {:#x}",
      self.len
    );
    // SAFETY: bounds checked above.
    unsafe { self.base.as_ptr().add(offset).cast::<u32>().write_unaligned(value) }
  }

  pub fn header(
    &self,
    block: Block,
  ) -> Tag {
    Tag::from_raw(self.word(block.header()))
  }

  pub fn footer(
    &self,
    block: Block,
  ) -> Tag {
    Tag::from_raw(self.word(block.footer(self.header(block).size())))
  }

  pub fn set_header(
    &mut self,
    block: Block,
    tag: Tag,
  ) {
    self.set_word(block.header(), tag.raw());
  }

  /// Writes `tag` to both ends of a block of `tag.size()` bytes.
  pub fn set_tags(
    &mut self,
    block: Block,
    tag: Tag,
  ) {
    self.set_word(block.header(), tag.raw());
    self.set_word(block.footer(tag.size()), tag.raw());
  }

  /// Tag of the block to the left, read from its footer.
  pub fn prev_footer(
    &self,
    block: Block,
  ) -> Tag {
    Tag::from_raw(self.word(block.offset() - DSIZE))
  }

  pub fn next_block(
    &self,
    block: Block,
  ) -> Block {
    block.advance(self.header(block).size())
  }

  pub fn prev_block(
    &self,
    block: Block,
  ) -> Block {
    block.retreat(self.prev_footer(block).size())
  }

  pub fn pred(
    &self,
    block: Block,
  ) -> Block {
    Block(self.word(block.pred_field()))
  }

  pub fn succ(
    &self,
    block: Block,
  ) -> Block {
    Block(self.word(block.succ_field()))
  }

  pub fn set_pred(
    &mut self,
    block: Block,
    pred: Block,
  ) {
    self.set_word(block.pred_field(), pred.0);
  }

  pub fn set_succ(
    &mut self,
    block: Block,
    succ: Block,
  ) {
    self.set_word(block.succ_field(), succ.0);
  }

  /// Absolute address of a block's payload.
  pub fn address(
    &self,
    block: Block,
  ) -> usize {
    self.base.as_ptr() as usize + block.offset()
  }

  pub fn pointer(
    &self,
    block: Block,
  ) -> *mut u8 {
    debug_assert!(block.offset() < self.len);
    self.base.as_ptr().wrapping_add(block.offset())
  }

  /// Handle of the block whose payload starts at `ptr`, if `ptr` could be one.
  pub fn block_at(
    &self,
    ptr: *const u8,
  ) -> Option<Block> {
    let offset = (ptr as usize).checked_sub(self.base.as_ptr() as usize)?;

    if offset < Block::FIRST.offset() || offset >= self.len || offset % ALIGNMENT != 0 {
      return None;
    }

    Some(Block(offset as u32))
  }
}
