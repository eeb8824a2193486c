//! Sources of heap memory.
//!
//! The allocator never maps memory itself; it asks a [`HeapGrower`] to push
//! the end of its region forward, the same way a program pushes its break
//! with `sbrk(2)`:
//!
//! ```text
//!   before grow(n):   ┌──────────── heap ────────────┐
//!                     │ prologue │ blocks │ epilogue │ ← break
//!                     └──────────────────────────────┘
//!
//!   after grow(n):    ┌──────────── heap ────────────┬──── n bytes ────┐
//!                     │ prologue │ blocks │ epilogue │                 │ ← break
//!                     └──────────────────────────────┴─────────────────┘
//!                                                    ▲
//!                                                    └── returned address
//! ```

use std::{
  alloc::{self, Layout},
  ptr::NonNull,
};

use libc::{c_void, intptr_t, sbrk};

use crate::{align, block::ALIGNMENT, error::AllocError};

/// Capacity used by [`ArenaGrower::default_capacity`].
pub const DEFAULT_ARENA_CAPACITY: usize = 20 * (1 << 20);

/// A contiguous region that can only grow at its end.
pub trait HeapGrower {
  /// Extends the region by `increment` bytes.
  ///
  /// Returns the first address of the new bytes, which must be the old end
  /// of the region, or `None` if the region cannot grow.
  fn grow(
    &mut self,
    increment: usize,
  ) -> Option<NonNull<u8>>;
}

/// Grows the process data segment with `sbrk(2)`.
///
/// Anything else in the process that moves the break (the system allocator
/// included) breaks contiguity; the allocator detects that and treats the
/// grant as a failure.
#[derive(Debug, Default)]
pub struct SbrkGrower {
  aligned: bool,
}

impl SbrkGrower {
  pub const fn new() -> Self {
    Self { aligned: false }
  }

  /// Current program break, `sbrk(0)`.
  pub fn program_break() -> *mut c_void {
    unsafe { sbrk(0) }
  }
}

impl HeapGrower for SbrkGrower {
  fn grow(
    &mut self,
    increment: usize,
  ) -> Option<NonNull<u8>> {
    if increment > intptr_t::MAX as usize {
      return None;
    }

    unsafe {
      if !self.aligned {
        let brk = sbrk(0) as usize;
        let padding = align!(brk) - brk;

        if padding != 0 && sbrk(padding as intptr_t) == usize::MAX as *mut c_void {
          return None;
        }
        self.aligned = true;
      }

      let address = sbrk(increment as intptr_t);

      if address == usize::MAX as *mut c_void {
        return None;
      }

      NonNull::new(address as *mut u8)
    }
  }
}

/// A fixed-capacity buffer with a private break.
///
/// The whole capacity is reserved up front from the global allocator and
/// handed out front to back, so every grant is contiguous with the last.
pub struct ArenaGrower {
  base: NonNull<u8>,
  capacity: usize,
  brk: usize,
}

impl ArenaGrower {
  pub fn with_capacity(capacity: usize) -> Result<Self, AllocError> {
    if capacity == 0 {
      return Ok(Self {
        base: NonNull::dangling(),
        capacity,
        brk: 0,
      });
    }

    let layout = Layout::from_size_align(capacity, ALIGNMENT)
      .map_err(|_| AllocError::OutOfMemory { requested: capacity })?;

    let base = unsafe { alloc::alloc_zeroed(layout) };
    let base = NonNull::new(base).ok_or(AllocError::OutOfMemory { requested: capacity })?;

    Ok(Self {
      base,
      capacity,
      brk: 0,
    })
  }

  pub fn default_capacity() -> Result<Self, AllocError> {
    Self::with_capacity(DEFAULT_ARENA_CAPACITY)
  }

  pub fn capacity(&self) -> usize {
    self.capacity
  }

  /// Bytes handed out so far.
  pub fn used(&self) -> usize {
    self.brk
  }
}

impl HeapGrower for ArenaGrower {
  fn grow(
    &mut self,
    increment: usize,
  ) -> Option<NonNull<u8>> {
    if self.capacity == 0 || increment > self.capacity - self.brk {
      return None;
    }

    // SAFETY: brk <= capacity, so the result stays inside (or one past) the buffer.
    let start = unsafe { self.base.add(self.brk) };
    self.brk += increment;
    Some(start)
  }
}

impl Drop for ArenaGrower {
  fn drop(&mut self) {
    if self.capacity == 0 {
      return;
    }
    // SAFETY: allocated in `with_capacity` with this exact layout.
    unsafe {
      alloc::dealloc(
        self.base.as_ptr(),
        Layout::from_size_align_unchecked(self.capacity, ALIGNMENT),
      );
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_arena_grants_are_contiguous() {
    let mut arena = ArenaGrower::with_capacity(64).unwrap();

    let first = arena.grow(16).unwrap();
    let second = arena.grow(24).unwrap();

    assert_eq!(first.as_ptr() as usize % ALIGNMENT, 0);
    assert_eq!(second.as_ptr() as usize, first.as_ptr() as usize + 16);
    assert_eq!(arena.used(), 40);
  }

  #[test]
  fn test_arena_refuses_past_capacity() {
    let mut arena = ArenaGrower::with_capacity(64).unwrap();

    assert!(arena.grow(48).is_some());
    assert!(arena.grow(24).is_none());
    assert_eq!(arena.used(), 48);
    assert!(arena.grow(16).is_some());
    assert!(arena.grow(1).is_none());
  }

  #[test]
  fn test_empty_arena_never_grows() {
    let mut arena = ArenaGrower::with_capacity(0).unwrap();
    assert!(arena.grow(0).is_none());
    assert!(arena.grow(8).is_none());
  }

  #[test]
  fn test_sbrk_grower_aligns_break() {
    let mut grower = SbrkGrower::new();
    let start = grower.grow(0).unwrap();

    assert_eq!(start.as_ptr() as usize % ALIGNMENT, 0);
    assert!(grower.aligned);
  }

  #[test]
  fn test_arena_memory_is_writable() {
    let mut arena = ArenaGrower::with_capacity(32).unwrap();
    let start = arena.grow(32).unwrap();

    unsafe {
      start.as_ptr().write_bytes(0xAB, 32);
      assert_eq!(*start.as_ptr().add(31), 0xAB);
    }
  }
}
