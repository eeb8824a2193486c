//! # tagalloc - A Boundary-Tag Memory Allocator
//!
//! This crate provides an **explicit free list** allocator: a malloc-style
//! `allocate` / `free` / `resize` / `zero_allocate` API over one private,
//! growable heap region.
//!
//! ## Overview
//!
//! Every block carries its size at both ends (a *boundary tag*), and every
//! free block carries two links threading it into a free list:
//!
//! ```text
//!   Heap Layout:
//!
//!   ┌─────┬──────────┬────────────┬────────────┬──────────────┬──────────┐
//!   │ pad │ prologue │ allocated  │    free    │  allocated   │ epilogue │
//!   │     │  [8:a]   │  [32:a]    │  [48:f]    │   [24:a]     │  [0:a]   │
//!   └─────┴──────────┴────────────┴────────────┴──────────────┴──────────┘
//!                                  ▲
//!                     free list ───┘ (pred/succ stored in the payload)
//! ```
//!
//! The prologue and epilogue are permanently allocated, so neighbour checks
//! never fall off either end of the heap.
//!
//! ## Crate Structure
//!
//! ```text
//!   tagalloc
//!   ├── align      - align! macro
//!   ├── block      - boundary tags and block handles (internal)
//!   ├── heap       - bounds-checked access to the region (internal)
//!   ├── grower     - HeapGrower trait, SbrkGrower, ArenaGrower
//!   ├── freelist   - LIFO doubly linked free list (internal)
//!   ├── explicit   - ExplicitAllocator: extend, fit, place, coalesce
//!   ├── checker    - heap consistency checker
//!   ├── config     - AllocatorConfig
//!   └── error      - AllocError, ConfigError, HeapCorruption
//! ```
//!
//! ## Quick Start
//!
//! ```rust
//! use tagalloc::{ArenaGrower, ExplicitAllocator};
//!
//! let mut allocator = ExplicitAllocator::with_grower(ArenaGrower::with_capacity(1 << 16)?);
//! allocator.init()?;
//!
//! let ptr = allocator.allocate(8) as *mut u64;
//! assert!(!ptr.is_null());
//!
//! unsafe {
//!     ptr.write(42);
//!     assert_eq!(ptr.read(), 42);
//!     allocator.free(ptr as *mut u8);
//! }
//!
//! assert!(allocator.check_heap(false).is_ok());
//! # Ok::<(), tagalloc::AllocError>(())
//! ```
//!
//! ## How It Works
//!
//! ```text
//!   allocate(n) ──▶ find_fit ──found──▶ place ──▶ payload
//!                      │                  ▲
//!                   no fit                │
//!                      ▼                  │
//!                 extend_heap ──▶ coalesce┘
//!
//!   free(p) ──▶ clear allocated bit ──▶ push on free list ──▶ coalesce
//! ```
//!
//! - **Fit**: first fit in list order, then a short look ahead
//!   ([`AllocatorConfig::fit_window`]) for a tighter block.
//! - **Place**: a remainder of at least [`MIN_BLOCK_SIZE`] is split off and
//!   inherits the original block's free-list slot.
//! - **Coalesce**: neighbours are found from the tags, not from the list, and
//!   merged immediately on every free.
//! - **Links**: stored as 32-bit offsets from the heap origin, which caps
//!   the heap at [`MAX_HEAP`] bytes.
//!
//! ## Limitations
//!
//! - **Single-threaded only**: no synchronization, not `Send` or `Sync`
//! - **Grow only**: memory is never returned to the grower
//! - **One free list**: no size classes
//!
//! ## Safety
//!
//! `free` and `resize` take raw pointers and are `unsafe`: passing anything
//! other than a live pointer from the same allocator is undefined behaviour
//! unless [`AllocatorConfig::verify_frees`] is set.

pub mod align;
mod block;
mod checker;
mod config;
mod error;
mod explicit;
mod freelist;
mod grower;
mod heap;

pub use block::{ALIGNMENT, CHUNK_SIZE, MAX_HEAP, MIN_BLOCK_SIZE};
pub use checker::HeapReport;
pub use config::{AllocatorConfig, DEFAULT_FIT_WINDOW};
pub use error::{AllocError, ConfigError, HeapCorruption};
pub use explicit::{BlockInfo, ExplicitAllocator};
pub use grower::{ArenaGrower, DEFAULT_ARENA_CAPACITY, HeapGrower, SbrkGrower};
