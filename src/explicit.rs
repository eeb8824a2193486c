use std::ptr;

use crate::{
  block::{Block, DSIZE, MIN_BLOCK_SIZE, Tag, WSIZE, adjusted_size},
  config::AllocatorConfig,
  error::AllocError,
  freelist::FreeList,
  grower::{HeapGrower, SbrkGrower},
  heap::Heap,
};

/// One block as seen from outside the heap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockInfo {
  /// Payload address.
  pub address: usize,
  /// Block size including both boundary tags.
  pub size: usize,
  pub allocated: bool,
}

/// Boundary-tag allocator with an explicit LIFO free list.
///
/// All state lives in this value: the heap region, the free-list head and
/// the tuning. It is not thread safe; the raw heap pointer inside keeps it
/// `!Send` and `!Sync`.
pub struct ExplicitAllocator<G: HeapGrower = SbrkGrower> {
  pub(crate) heap: Heap<G>,
  pub(crate) free_list: FreeList,
  config: AllocatorConfig,
  initialized: bool,
}

impl ExplicitAllocator<SbrkGrower> {
  pub fn new() -> Self {
    Self::with_grower(SbrkGrower::new())
  }
}

impl Default for ExplicitAllocator<SbrkGrower> {
  fn default() -> Self {
    Self::new()
  }
}

impl<G: HeapGrower> ExplicitAllocator<G> {
  pub fn with_grower(grower: G) -> Self {
    Self {
      heap: Heap::new(grower),
      free_list: FreeList::new(),
      config: AllocatorConfig::default(),
      initialized: false,
    }
  }

  pub fn with_config(
    grower: G,
    config: AllocatorConfig,
  ) -> Result<Self, AllocError> {
    config.validate()?;

    let mut allocator = Self::with_grower(grower);
    allocator.config = config;
    Ok(allocator)
  }

  pub fn config(&self) -> &AllocatorConfig {
    &self.config
  }

  pub fn grower(&self) -> &G {
    self.heap.grower()
  }

  pub fn is_initialized(&self) -> bool {
    self.initialized
  }

  /// Bytes obtained from the grower so far.
  pub fn heap_size(&self) -> usize {
    self.heap.len()
  }

  /// Lays down the prologue and epilogue and grows the heap by one chunk.
  ///
  /// ```text
  ///   offset:  0        4          8          12         16
  ///            ┌────────┬──────────┬──────────┬──────────┐
  ///            │ pad    │ [8:a]    │ [8:a]    │ [0:a]    │
  ///            └────────┴──────────┴──────────┴──────────┘
  ///                      prologue   ▲          epilogue
  ///                                 └── free-list anchor
  /// ```
  ///
  /// If the first chunk cannot be obtained the prologue and epilogue stay in
  /// place and later allocations try to grow again.
  pub fn init(&mut self) -> Result<(), AllocError> {
    if self.initialized {
      return Err(AllocError::AlreadyInitialized);
    }

    let start = self.heap.grow(4 * WSIZE)?;
    debug_assert_eq!(start, 0);

    self.heap.set_word(0, 0);
    self.heap.set_tags(Block::PROLOGUE, Tag::new(DSIZE, true));
    self.heap.set_header(Block::FIRST, Tag::EPILOGUE);
    self.free_list = FreeList::new();
    self.initialized = true;

    log::debug!(
      "initialized heap at {:#x}, extending by {} bytes",
      self.heap.address(Block::PROLOGUE),
      self.config.chunk_size
    );

    self.extend_heap(self.config.chunk_size)?;
    Ok(())
  }

  /// Allocates at least `size` bytes, 8-byte aligned.
  ///
  /// Returns null for `size == 0` or when the heap cannot grow.
  pub fn allocate(
    &mut self,
    size: usize,
  ) -> *mut u8 {
    if size == 0 {
      return ptr::null_mut();
    }

    match self.allocate_block(size) {
      Ok(block) => {
        let address = self.heap.pointer(block);
        log::trace!("allocate({size}) -> {address:?}");
        address
      }
      Err(err) => {
        log::warn!("allocate({size}) failed: {err}");
        ptr::null_mut()
      }
    }
  }

  fn allocate_block(
    &mut self,
    size: usize,
  ) -> Result<Block, AllocError> {
    if !self.initialized {
      self.init()?;
    }

    let asize = adjusted_size(size).ok_or(AllocError::OutOfMemory { requested: size })?;

    if let Some(block) = self.find_fit(asize) {
      self.place(block, asize);
      return Ok(block);
    }

    let block = self.extend_heap(asize.max(self.config.chunk_size))?;
    self.place(block, asize);
    Ok(block)
  }

  /// Releases a block returned by this allocator. Null is ignored.
  ///
  /// # Safety
  ///
  /// `address` must be null or a live pointer returned by `allocate`,
  /// `resize` or `zero_allocate` on this allocator, unless `verify_frees`
  /// is enabled, in which case rejected pointers are logged and ignored.
  pub unsafe fn free(
    &mut self,
    address: *mut u8,
  ) {
    if address.is_null() {
      return;
    }

    if self.config.verify_frees {
      if let Err(err) = unsafe { self.try_free(address) } {
        log::warn!("free({address:?}) rejected: {err}");
      }
      return;
    }

    match self.heap.block_at(address) {
      Some(block) => self.free_block(block),
      None => log::warn!("free({address:?}) ignored: not a payload of this heap"),
    }
  }

  /// Checks that `address` looks like a live allocation, then frees it.
  ///
  /// The check catches pointers outside the heap, misaligned pointers,
  /// double frees and blocks whose tags were overwritten. It cannot tell a
  /// live payload from a forged header inside another payload.
  ///
  /// # Safety
  ///
  /// `address` must not point into a live allocation's payload other than
  /// at its start.
  pub unsafe fn try_free(
    &mut self,
    address: *mut u8,
  ) -> Result<(), AllocError> {
    if address.is_null() {
      return Ok(());
    }

    let block = self.live_block(address)?;
    self.free_block(block);
    Ok(())
  }

  fn live_block(
    &self,
    address: *mut u8,
  ) -> Result<Block, AllocError> {
    let block = self
      .heap
      .block_at(address)
      .ok_or(AllocError::ForeignPointer(address as usize))?;

    let header = self.heap.header(block);
    if !header.is_allocated() {
      return Err(AllocError::NotAllocated(address as usize));
    }

    let size = header.size();
    let fits = block.offset() + size <= self.heap.len();
    if size < MIN_BLOCK_SIZE || !fits || self.heap.footer(block) != header {
      return Err(AllocError::DamagedBlock(address as usize));
    }

    Ok(block)
  }

  fn free_block(
    &mut self,
    block: Block,
  ) {
    let size = self.heap.header(block).size();
    log::trace!("free({:#x}) size={size}", self.heap.address(block));

    self.heap.set_tags(block, Tag::new(size, false));
    self.free_list.push_front(&mut self.heap, block);
    self.coalesce(block);
  }

  /// Moves an allocation to a block of `new_size` bytes.
  ///
  /// Null behaves as `allocate`, `new_size == 0` as `free`. On failure
  /// null is returned and the old block is left as it was.
  ///
  /// # Safety
  ///
  /// Same contract as [`free`](Self::free).
  pub unsafe fn resize(
    &mut self,
    address: *mut u8,
    new_size: usize,
  ) -> *mut u8 {
    if new_size == 0 {
      unsafe { self.free(address) };
      return ptr::null_mut();
    }

    if address.is_null() {
      return self.allocate(new_size);
    }

    let old = if self.config.verify_frees {
      match self.live_block(address) {
        Ok(block) => block,
        Err(err) => {
          log::warn!("resize({address:?}, {new_size}) rejected: {err}");
          return ptr::null_mut();
        }
      }
    } else {
      let Some(block) = self.heap.block_at(address) else {
        log::warn!("resize({address:?}, {new_size}) ignored: not a payload of this heap");
        return ptr::null_mut();
      };
      block
    };
    let old_payload = self.heap.header(old).size().saturating_sub(DSIZE);

    let new_address = self.allocate(new_size);
    if new_address.is_null() {
      return ptr::null_mut();
    }

    unsafe {
      ptr::copy_nonoverlapping(address, new_address, old_payload.min(new_size));
      self.free(address);
    }

    log::trace!("resize({address:?}, {new_size}) -> {new_address:?}");
    new_address
  }

  /// Allocates `count * size` zeroed bytes.
  ///
  /// An overflowing product fails instead of wrapping.
  pub fn zero_allocate(
    &mut self,
    count: usize,
    size: usize,
  ) -> *mut u8 {
    let Some(bytes) = count.checked_mul(size) else {
      log::warn!("{}", AllocError::SizeOverflow { count, size });
      return ptr::null_mut();
    };

    let address = self.allocate(bytes);
    if !address.is_null() {
      unsafe { ptr::write_bytes(address, 0, bytes) };
    }
    address
  }

  /// Payload bytes available behind `address`.
  ///
  /// # Safety
  ///
  /// `address` must be a live pointer returned by this allocator.
  pub unsafe fn usable_size(
    &self,
    address: *const u8,
  ) -> usize {
    match self.heap.block_at(address) {
      Some(block) => self.heap.header(block).size().saturating_sub(DSIZE),
      None => 0,
    }
  }

  /// Every block between the prologue and the epilogue, in address order.
  pub fn blocks(&self) -> impl Iterator<Item = BlockInfo> + '_ {
    let mut cursor = self.initialized.then_some(Block::FIRST);

    std::iter::from_fn(move || {
      let block = cursor?;
      let tag = self.heap.header(block);
      if tag.size() == 0 {
        cursor = None;
        return None;
      }
      cursor = Some(block.advance(tag.size()));
      Some(self.info(block))
    })
  }

  /// Free blocks in list order, most recently inserted first.
  pub fn free_blocks(&self) -> impl Iterator<Item = BlockInfo> + '_ {
    self.free_list.iter(&self.heap).map(|block| self.info(block))
  }

  pub(crate) fn info(
    &self,
    block: Block,
  ) -> BlockInfo {
    let tag = self.heap.header(block);
    BlockInfo {
      address: self.heap.address(block),
      size: tag.size(),
      allocated: tag.is_allocated(),
    }
  }

  /// Grows the heap by at least `bytes` and returns the resulting free
  /// block, already merged with a free block that ended the old heap.
  ///
  /// The old epilogue header becomes the new block's header and a fresh
  /// epilogue is written at the new end.
  fn extend_heap(
    &mut self,
    bytes: usize,
  ) -> Result<Block, AllocError> {
    let size = crate::align!(bytes);
    let old_len = self.heap.grow(size)?;
    let block = Block(old_len as u32);

    self.heap.set_tags(block, Tag::new(size, false));
    self.heap.set_header(block.advance(size), Tag::EPILOGUE);

    log::debug!(
      "extended heap by {size} bytes at {:#x}, heap is now {} bytes",
      self.heap.address(block),
      self.heap.len()
    );

    self.free_list.push_front(&mut self.heap, block);
    Ok(self.coalesce(block))
  }

  /// Approximate best fit.
  ///
  /// Takes the first block in list order that fits, then looks at up to
  /// `fit_window` further nodes and switches to any strictly tighter fit.
  fn find_fit(
    &self,
    asize: usize,
  ) -> Option<Block> {
    let mut best: Option<(Block, usize)> = None;
    let mut remaining = self.config.fit_window;

    for block in self.free_list.iter(&self.heap) {
      if best.is_some() {
        if remaining == 0 {
          break;
        }
        remaining -= 1;
      }

      let size = self.heap.header(block).size();
      if size < asize {
        continue;
      }

      match best {
        Some((_, best_size)) if best_size <= size => {}
        _ => best = Some((block, size)),
      }

      if size == asize {
        break;
      }
    }

    best.map(|(block, _)| block)
  }

  /// Carves `asize` bytes off the front of a free block.
  ///
  /// A remainder of at least one minimum block stays free and takes over
  /// the block's free-list slot; a smaller one is left inside the
  /// allocation.
  fn place(
    &mut self,
    block: Block,
    asize: usize,
  ) {
    let csize = self.heap.header(block).size();
    debug_assert!(csize >= asize);

    if csize - asize >= MIN_BLOCK_SIZE {
      self.heap.set_tags(block, Tag::new(asize, true));

      let remainder = block.advance(asize);
      self.heap.set_tags(remainder, Tag::new(csize - asize, false));
      self.free_list.replace(&mut self.heap, block, remainder);
    } else {
      self.heap.set_tags(block, Tag::new(csize, true));
      self.free_list.remove(&mut self.heap, block);
    }
  }

  /// Merges a just-inserted free block with free address neighbours.
  ///
  /// ```text
  ///   case 1   [ A ][ b ][ A ]   nothing to merge
  ///   case 2   [ A ][ b ][ F ]   b absorbs right
  ///   case 3   [ F ][ b ][ A ]   left absorbs b
  ///   case 4   [ F ][ b ][ F ]   left absorbs b and right
  /// ```
  ///
  /// The merged block keeps `block`'s slot in the free list; neighbours that
  /// disappear are spliced out first, wherever they sit in the list.
  fn coalesce(
    &mut self,
    block: Block,
  ) -> Block {
    let prev_tag = self.heap.prev_footer(block);
    let next = self.heap.next_block(block);
    let next_tag = self.heap.header(next);
    let mut size = self.heap.header(block).size();

    match (prev_tag.is_allocated(), next_tag.is_allocated()) {
      (true, true) => block,
      (true, false) => {
        self.free_list.remove(&mut self.heap, next);
        size += next_tag.size();
        self.heap.set_tags(block, Tag::new(size, false));
        block
      }
      (false, true) => {
        let prev = self.heap.prev_block(block);
        self.free_list.remove(&mut self.heap, prev);
        self.free_list.replace(&mut self.heap, block, prev);
        size += prev_tag.size();
        self.heap.set_tags(prev, Tag::new(size, false));
        prev
      }
      (false, false) => {
        let prev = self.heap.prev_block(block);
        self.free_list.remove(&mut self.heap, next);
        self.free_list.remove(&mut self.heap, prev);
        self.free_list.replace(&mut self.heap, block, prev);
        size += prev_tag.size() + next_tag.size();
        self.heap.set_tags(prev, Tag::new(size, false));
        prev
      }
    }
  }
}
