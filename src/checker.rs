//! Heap consistency checker.
//!
//! Walks the free list first, then every block from the prologue to the
//! epilogue, and stops at the first violation. Only meant for tests and
//! debugging: it is linear in the number of blocks and never runs on the
//! allocation path.

use std::collections::BTreeSet;

use crate::{
  ExplicitAllocator,
  block::{ALIGNMENT, Block, DSIZE, MIN_BLOCK_SIZE, Tag},
  error::HeapCorruption,
  freelist::FreeList,
  grower::HeapGrower,
};

/// Summary of a heap that passed [`check_heap`](ExplicitAllocator::check_heap).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HeapReport {
  pub heap_size: usize,
  /// Blocks between the sentinels.
  pub blocks: usize,
  pub allocated_blocks: usize,
  pub free_blocks: usize,
  pub free_bytes: usize,
}

impl<G: HeapGrower> ExplicitAllocator<G> {
  /// Checks every structural invariant of the heap.
  ///
  /// With `verbose`, each block is logged at `info` level as it is visited.
  pub fn check_heap(
    &self,
    verbose: bool,
  ) -> Result<HeapReport, HeapCorruption> {
    if !self.is_initialized() {
      return Err(HeapCorruption::Uninitialized);
    }

    let heap = &self.heap;

    if verbose {
      log::info!("Heap ({:#x}):", heap.address(Block::PROLOGUE));
    }

    let prologue = heap.word(Block::PROLOGUE.header());
    let tag = Tag::from_raw(prologue);
    if tag.size() != DSIZE
      || !tag.is_allocated()
      || heap.word(Block::PROLOGUE.footer(DSIZE)) != prologue
    {
      return Err(HeapCorruption::BadPrologue { header: prologue });
    }

    let listed = self.free_list_nodes()?;

    let mut report = HeapReport {
      heap_size: heap.len(),
      ..HeapReport::default()
    };
    let mut block = Block::FIRST;
    let mut prev_free: Option<usize> = None;

    loop {
      let address = heap.address(block);
      let header = heap
        .try_word(block.header())
        .ok_or(HeapCorruption::OutOfBounds { address })?;
      let tag = Tag::from_raw(header);

      if tag.size() == 0 {
        break;
      }

      if block.offset() + tag.size() > heap.len() {
        return Err(HeapCorruption::OutOfBounds { address });
      }

      let footer = heap.word(block.footer(tag.size()));
      if verbose {
        log::info!(
          "{address:#x}: header: {tag:?} footer: {:?}",
          Tag::from_raw(footer)
        );
      }

      if address % ALIGNMENT != 0 {
        return Err(HeapCorruption::Misaligned { address });
      }
      if header != footer {
        return Err(HeapCorruption::TagMismatch {
          address,
          header,
          footer,
        });
      }
      if tag.size() < MIN_BLOCK_SIZE {
        return Err(HeapCorruption::Undersized {
          address,
          size: tag.size(),
        });
      }

      if tag.is_allocated() {
        report.allocated_blocks += 1;
        prev_free = None;
      } else {
        if !listed.contains(&block) {
          return Err(HeapCorruption::NotInFreeList { address });
        }
        if let Some(left) = prev_free {
          return Err(HeapCorruption::Uncoalesced { address: left });
        }
        report.free_blocks += 1;
        report.free_bytes += tag.size();
        prev_free = Some(address);
      }

      report.blocks += 1;
      block = block.advance(tag.size());
    }

    let address = heap.address(block);
    let epilogue = heap.word(block.header());
    if verbose {
      log::info!("{address:#x}: EOL");
    }
    if !Tag::from_raw(epilogue).is_allocated() || block.offset() != heap.len() {
      return Err(HeapCorruption::BadEpilogue {
        address,
        header: epilogue,
      });
    }

    if listed.len() != report.free_blocks {
      return Err(HeapCorruption::CountMismatch {
        listed: listed.len(),
        found: report.free_blocks,
      });
    }

    Ok(report)
  }

  /// Like [`check_heap`](Self::check_heap), but reports the violation on
  /// stderr and aborts the process.
  pub fn validate(
    &self,
    verbose: bool,
  ) {
    if let Err(corruption) = self.check_heap(verbose) {
      log::error!("heap check failed: {corruption}");
      eprintln!("Error: {corruption}");
      std::process::abort();
    }
  }

  /// Follows the free list from its head, checking each node on the way.
  ///
  /// Revisiting a node means the list does not terminate.
  fn free_list_nodes(&self) -> Result<BTreeSet<Block>, HeapCorruption> {
    let heap = &self.heap;
    let mut nodes = BTreeSet::new();
    let mut expected_pred = FreeList::ANCHOR;
    let mut cursor = self.free_list.head();

    while cursor != FreeList::ANCHOR {
      let address = heap.address(cursor);

      if cursor.offset() % ALIGNMENT != 0 {
        return Err(HeapCorruption::Misaligned { address });
      }
      if cursor < Block::FIRST || cursor.offset() + DSIZE > heap.len() {
        return Err(HeapCorruption::OutOfBounds { address });
      }
      if !nodes.insert(cursor) {
        return Err(HeapCorruption::Cycle {
          address,
          steps: nodes.len(),
        });
      }
      if heap.header(cursor).is_allocated() {
        return Err(HeapCorruption::ListedBlockNotFree { address });
      }
      if heap.pred(cursor) != expected_pred {
        return Err(HeapCorruption::BrokenLink { address });
      }

      let succ = heap.succ(cursor);
      if succ == cursor {
        return Err(HeapCorruption::SelfLoop { address });
      }

      expected_pred = cursor;
      cursor = succ;
    }

    debug_assert_eq!(nodes.is_empty(), self.free_list.is_empty());
    Ok(nodes)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{block::WSIZE, grower::ArenaGrower};

  fn allocator() -> ExplicitAllocator<ArenaGrower> {
    let mut allocator = ExplicitAllocator::with_grower(ArenaGrower::with_capacity(1 << 16).unwrap());
    allocator.init().unwrap();
    allocator
  }

  fn block_of(
    allocator: &ExplicitAllocator<ArenaGrower>,
    address: *mut u8,
  ) -> Block {
    allocator.heap.block_at(address).unwrap()
  }

  #[test]
  fn test_report_counts_blocks() {
    let mut allocator = allocator();
    let a = allocator.allocate(16);
    let _b = allocator.allocate(100);
    let c = allocator.allocate(16);
    let _d = allocator.allocate(16);

    unsafe {
      allocator.free(a);
      allocator.free(c);
    }

    let report = allocator.check_heap(true).unwrap();
    assert_eq!(report.heap_size, 16 + 512);
    assert_eq!(report.blocks, 5);
    assert_eq!(report.allocated_blocks, 2);
    assert_eq!(report.free_blocks, 3);
    assert_eq!(report.free_bytes, 512 - 112 - 24);
  }

  #[test]
  fn test_validate_accepts_healthy_heap() {
    let mut allocator = allocator();
    let p = allocator.allocate(300);
    allocator.validate(true);
    unsafe { allocator.free(p) };
    allocator.validate(false);
  }

  #[test]
  fn test_detects_footer_mismatch() {
    let mut allocator = allocator();
    let p = allocator.allocate(40);
    let block = block_of(&allocator, p);

    allocator.heap.set_word(block.footer(48), Tag::new(56, true).raw());

    assert_eq!(
      allocator.check_heap(false),
      Err(HeapCorruption::TagMismatch {
        address: p as usize,
        header: Tag::new(48, true).raw(),
        footer: Tag::new(56, true).raw(),
      })
    );
  }

  #[test]
  fn test_detects_free_block_missing_from_list() {
    let mut allocator = allocator();
    let p = allocator.allocate(40);
    let _guard = allocator.allocate(8);
    let block = block_of(&allocator, p);

    allocator.heap.set_tags(block, Tag::new(48, false));

    assert_eq!(
      allocator.check_heap(false),
      Err(HeapCorruption::NotInFreeList { address: p as usize })
    );
  }

  #[test]
  fn test_detects_self_loop() {
    let mut allocator = allocator();
    let p = allocator.allocate(40);
    let _guard = allocator.allocate(8);
    unsafe { allocator.free(p) };
    let block = block_of(&allocator, p);

    allocator.heap.set_succ(block, block);

    assert_eq!(
      allocator.check_heap(false),
      Err(HeapCorruption::SelfLoop { address: p as usize })
    );
  }

  #[test]
  fn test_detects_cycle() {
    let mut allocator = allocator();
    let p = allocator.allocate(40);
    let _g1 = allocator.allocate(8);
    let q = allocator.allocate(40);
    let _g2 = allocator.allocate(8);
    unsafe {
      allocator.free(p);
      allocator.free(q);
    }
    // List is q -> p -> tail; point p back at q.
    let (p_block, q_block) = (block_of(&allocator, p), block_of(&allocator, q));
    allocator.heap.set_succ(p_block, q_block);

    assert!(matches!(
      allocator.check_heap(false),
      Err(HeapCorruption::Cycle { .. })
    ));
  }

  #[test]
  fn test_detects_broken_pred_link() {
    let mut allocator = allocator();
    let p = allocator.allocate(40);
    let _g1 = allocator.allocate(8);
    let q = allocator.allocate(40);
    let _g2 = allocator.allocate(8);
    unsafe {
      allocator.free(p);
      allocator.free(q);
    }
    let p_block = block_of(&allocator, p);
    allocator.heap.set_pred(p_block, FreeList::ANCHOR);

    assert_eq!(
      allocator.check_heap(false),
      Err(HeapCorruption::BrokenLink { address: p as usize })
    );
  }

  #[test]
  fn test_detects_allocated_block_on_list() {
    let mut allocator = allocator();
    let p = allocator.allocate(40);
    let _guard = allocator.allocate(8);
    unsafe { allocator.free(p) };
    let block = block_of(&allocator, p);

    allocator.heap.set_tags(block, Tag::new(48, true));

    assert_eq!(
      allocator.check_heap(false),
      Err(HeapCorruption::ListedBlockNotFree { address: p as usize })
    );
  }

  #[test]
  fn test_detects_uncoalesced_neighbours() {
    let mut allocator = allocator();
    let a = allocator.allocate(16);
    let b = allocator.allocate(16);
    let _guard = allocator.allocate(16);
    let (a_block, b_block) = (block_of(&allocator, a), block_of(&allocator, b));

    // Free both behind the coalescer's back.
    for block in [a_block, b_block] {
      allocator.heap.set_tags(block, Tag::new(24, false));
      allocator.free_list.push_front(&mut allocator.heap, block);
    }

    assert_eq!(
      allocator.check_heap(false),
      Err(HeapCorruption::Uncoalesced { address: a as usize })
    );
  }

  #[test]
  fn test_detects_bad_prologue() {
    let mut allocator = allocator();
    allocator.heap.set_word(Block::PROLOGUE.header(), Tag::new(16, true).raw());

    assert_eq!(
      allocator.check_heap(false),
      Err(HeapCorruption::BadPrologue {
        header: Tag::new(16, true).raw()
      })
    );
  }

  #[test]
  fn test_detects_bad_epilogue() {
    let mut allocator = allocator();
    let end = allocator.heap_size();
    allocator.heap.set_word(end - WSIZE, 0);

    assert!(matches!(
      allocator.check_heap(false),
      Err(HeapCorruption::BadEpilogue { header: 0, .. })
    ));
  }

  #[test]
  fn test_detects_block_past_heap_end() {
    let mut allocator = allocator();
    let p = allocator.allocate(16);
    let block = block_of(&allocator, p);

    allocator.heap.set_header(block, Tag::new(1 << 12, true));

    assert_eq!(
      allocator.check_heap(false),
      Err(HeapCorruption::OutOfBounds { address: p as usize })
    );
  }
}
