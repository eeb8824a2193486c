//! Explicit free list threaded through the free blocks.
//!
//! ```text
//!   head ──▶ ┌──────┐ succ ┌──────┐ succ ┌──────┐ succ
//!            │  F3  │─────▶│  F1  │─────▶│  F2  │─────▶ PROLOGUE
//!  PROLOGUE ◀│      │◀─────│      │◀─────│      │
//!       pred └──────┘ pred └──────┘ pred └──────┘
//! ```
//!
//! Order is recency of insertion, not address. The prologue block is never
//! free, so its handle terminates both directions.

use crate::{block::Block, heap::Heap};

pub(crate) struct FreeList {
  head: Block,
}

impl FreeList {
  pub const ANCHOR: Block = Block::PROLOGUE;

  pub const fn new() -> Self {
    Self { head: Self::ANCHOR }
  }

  pub fn head(&self) -> Block {
    self.head
  }

  pub fn is_empty(&self) -> bool {
    self.head == Self::ANCHOR
  }

  pub fn push_front<G>(
    &mut self,
    heap: &mut Heap<G>,
    block: Block,
  ) {
    heap.set_pred(block, Self::ANCHOR);
    heap.set_succ(block, self.head);
    if self.head != Self::ANCHOR {
      heap.set_pred(self.head, block);
    }
    self.head = block;
  }

  /// Splices `block` out by linking its neighbours to each other.
  ///
  /// Only `block`'s own links are read, so this is correct whether or not
  /// its list neighbours are also its address neighbours, including the
  /// block being merged into.
  pub fn remove<G>(
    &mut self,
    heap: &mut Heap<G>,
    block: Block,
  ) {
    let pred = heap.pred(block);
    let succ = heap.succ(block);

    if pred == Self::ANCHOR {
      self.head = succ;
    } else {
      heap.set_succ(pred, succ);
    }

    if succ != Self::ANCHOR {
      heap.set_pred(succ, pred);
    }
  }

  /// Puts `new` into the exact slot `old` occupies; `old` leaves the list.
  ///
  /// `new` must not itself be on the list.
  pub fn replace<G>(
    &mut self,
    heap: &mut Heap<G>,
    old: Block,
    new: Block,
  ) {
    let pred = heap.pred(old);
    let succ = heap.succ(old);
    debug_assert!(pred != new && succ != new, "{new:?} is already linked next to {old:?}");

    heap.set_pred(new, pred);
    heap.set_succ(new, succ);

    if pred == Self::ANCHOR {
      self.head = new;
    } else {
      heap.set_succ(pred, new);
    }

    if succ != Self::ANCHOR {
      heap.set_pred(succ, new);
    }
  }

  pub fn iter<'a, G>(
    &self,
    heap: &'a Heap<G>,
  ) -> Iter<'a, G> {
    Iter {
      heap,
      cursor: self.head,
    }
  }
}

/// Walks the list from the head. Trusts the links; the checker does its own
/// bounded walk.
pub(crate) struct Iter<'a, G> {
  heap: &'a Heap<G>,
  cursor: Block,
}

impl<G> Iterator for Iter<'_, G> {
  type Item = Block;

  fn next(&mut self) -> Option<Block> {
    if self.cursor == FreeList::ANCHOR {
      return None;
    }
    let block = self.cursor;
    self.cursor = self.heap.succ(block);
    Some(block)
  }
}
