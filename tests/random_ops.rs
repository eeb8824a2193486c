//! Property-based tests for the allocator.
//!
//! Random sequences of allocate / free / resize / zero-allocate run against
//! an arena-backed allocator. Every live allocation is filled with its own
//! byte pattern; after each step the patterns must be intact and the heap
//! checker must pass.

use proptest::prelude::*;
use tagalloc::{AllocatorConfig, ArenaGrower, ExplicitAllocator};

const ARENA: usize = 4 << 20;

#[derive(Debug, Clone)]
enum Op {
  Allocate(usize),
  Free(usize),
  Resize(usize, usize),
  ZeroAllocate(usize, usize),
}

fn op() -> impl Strategy<Value = Op> {
  prop_oneof![
    4 => (0usize..2048).prop_map(Op::Allocate),
    3 => any::<usize>().prop_map(Op::Free),
    2 => (any::<usize>(), 0usize..4096).prop_map(|(index, size)| Op::Resize(index, size)),
    1 => (0usize..64, 0usize..64).prop_map(|(count, size)| Op::ZeroAllocate(count, size)),
  ]
}

struct Live {
  ptr: *mut u8,
  len: usize,
  fill: u8,
}

fn fill(live: &Live) {
  unsafe { live.ptr.write_bytes(live.fill, live.len) };
}

fn intact(
  live: &Live,
  len: usize,
) -> bool {
  (0..len).all(|i| unsafe { *live.ptr.add(i) } == live.fill)
}

fn run(
  ops: &[Op],
  config: AllocatorConfig,
) -> Result<(), TestCaseError> {
  let grower = ArenaGrower::with_capacity(ARENA).unwrap();
  let mut allocator = ExplicitAllocator::with_config(grower, config).unwrap();
  allocator.init().unwrap();

  let mut live: Vec<Live> = Vec::new();
  let mut next_fill: u8 = 1;

  for op in ops {
    match *op {
      Op::Allocate(size) => {
        let ptr = allocator.allocate(size);
        if size == 0 {
          prop_assert!(ptr.is_null());
          continue;
        }
        prop_assert!(!ptr.is_null());
        prop_assert_eq!(ptr as usize % 8, 0);

        let entry = Live {
          ptr,
          len: size,
          fill: next_fill,
        };
        fill(&entry);
        live.push(entry);
      }
      Op::Free(index) => {
        if live.is_empty() {
          unsafe { allocator.free(std::ptr::null_mut()) };
          continue;
        }
        let entry = live.swap_remove(index % live.len());
        prop_assert!(intact(&entry, entry.len));
        unsafe { allocator.free(entry.ptr) };
      }
      Op::Resize(index, size) => {
        if live.is_empty() {
          continue;
        }
        let index = index % live.len();
        prop_assert!(intact(&live[index], live[index].len));

        let ptr = unsafe { allocator.resize(live[index].ptr, size) };
        if size == 0 {
          prop_assert!(ptr.is_null());
          live.swap_remove(index);
          continue;
        }
        prop_assert!(!ptr.is_null());

        let kept = live[index].len.min(size);
        live[index].ptr = ptr;
        prop_assert!(intact(&live[index], kept));

        live[index].len = size;
        live[index].fill = next_fill;
        fill(&live[index]);
      }
      Op::ZeroAllocate(count, size) => {
        let ptr = allocator.zero_allocate(count, size);
        let len = count * size;
        if len == 0 {
          prop_assert!(ptr.is_null());
          continue;
        }
        prop_assert!(!ptr.is_null());

        let entry = Live {
          ptr,
          len,
          fill: 0,
        };
        prop_assert!(intact(&entry, len));
        live.push(entry);
      }
    }

    next_fill = next_fill.wrapping_add(1).max(1);

    if let Err(corruption) = allocator.check_heap(false) {
      return Err(TestCaseError::fail(format!("after {op:?}: {corruption}")));
    }
  }

  for entry in &live {
    prop_assert!(intact(entry, entry.len));
  }

  for entry in live.drain(..) {
    unsafe { allocator.free(entry.ptr) };
  }

  let report = allocator.check_heap(false).unwrap();
  prop_assert_eq!(report.allocated_blocks, 0);
  prop_assert_eq!(report.free_blocks, 1);
  prop_assert_eq!(report.free_bytes, allocator.heap_size() - 16);

  Ok(())
}

proptest! {
  #![proptest_config(ProptestConfig::with_cases(64))]

  /// Patterns survive and the heap stays consistent under default tuning.
  #[test]
  fn random_ops_keep_heap_consistent(ops in prop::collection::vec(op(), 1..200)) {
    run(&ops, AllocatorConfig::default())?;
  }

  /// Same with plain first fit.
  #[test]
  fn random_ops_with_first_fit(ops in prop::collection::vec(op(), 1..200)) {
    run(&ops, AllocatorConfig::default().with_fit_window(0))?;
  }

  /// Large chunks and free verification switched on.
  #[test]
  fn random_ops_with_verified_frees(ops in prop::collection::vec(op(), 1..120)) {
    run(
      &ops,
      AllocatorConfig::default()
        .with_chunk_size(4096)
        .with_verify_frees(true),
    )?;
  }
}
