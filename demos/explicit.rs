use std::io::Read;

use tagalloc::{ExplicitAllocator, SbrkGrower};

/// Waits until the user presses ENTER.
/// Useful when you want to inspect memory state with tools like `pmap`, `htop`,
/// `gdb`, or just visually track how allocations change the program break.
fn block_until_enter_pressed() {
  println!("\n>>> Press ENTER to continue...");
  let _ = std::io::stdin().bytes().next();
}

/// Prints the current program break using `sbrk(0)`.
fn print_program_break(label: &str) {
  println!(
    "[{}] PID = {}, program break (sbrk(0)) = {:?}",
    label,
    std::process::id(),
    SbrkGrower::program_break(),
  );
}

/// Prints every block of the heap in address order, then the free list.
fn print_heap(allocator: &ExplicitAllocator) {
  for block in allocator.blocks() {
    println!(
      "    {:#x}: [{}:{}]",
      block.address,
      block.size,
      if block.allocated { 'a' } else { 'f' }
    );
  }
  let free: Vec<String> = allocator
    .free_blocks()
    .map(|block| format!("{:#x}({})", block.address, block.size))
    .collect();
  println!("    free list: {}", free.join(" -> "));
}

fn print_alloc(
  allocator: &ExplicitAllocator,
  size: usize,
  address: *mut u8,
) {
  println!(
    "Allocated {} bytes, address = {:?}, heap size = {}",
    size,
    address,
    allocator.heap_size()
  );
}

fn main() {
  // The allocator owns a private heap carved out of the data segment with
  // sbrk(2). It starts with a prologue, an epilogue and one 512-byte chunk.
  let mut allocator = ExplicitAllocator::new();

  print_program_break("start");
  if let Err(err) = allocator.init() {
    eprintln!("init failed: {err}");
    return;
  }
  print_program_break("after init");
  print_heap(&allocator);
  block_until_enter_pressed();

  // --------------------------------------------------------------------
  // 1) Two small allocations land back to back at the front of the chunk.
  // --------------------------------------------------------------------
  let a = allocator.allocate(16);
  let b = allocator.allocate(16);
  println!("\n[1] Allocate two 16-byte blocks");
  print_alloc(&allocator, 16, a);
  print_alloc(&allocator, 16, b);
  print_heap(&allocator);

  if a.is_null() || b.is_null() {
    eprintln!("allocation failed; something else moved the program break");
    return;
  }

  unsafe {
    (a as *mut u64).write(0xDEADBEEF);
    println!("[1] Value written to a = 0x{:X}", (a as *mut u64).read());
  }
  block_until_enter_pressed();

  // --------------------------------------------------------------------
  // 2) Free `a` and allocate again: the freed block is at the head of the
  //    free list, so it is reused before the rest of the chunk.
  // --------------------------------------------------------------------
  unsafe { allocator.free(a) };
  let c = allocator.allocate(16);
  println!("\n[2] Free a, allocate 16 bytes again");
  println!(
    "[2] c == a? {}",
    if c == a {
      "Yes, it reused the freed block"
    } else {
      "No, it allocated somewhere else"
    }
  );
  print_heap(&allocator);
  block_until_enter_pressed();

  // --------------------------------------------------------------------
  // 3) A request larger than any free block extends the heap. The new
  //    space merges with the free tail of the old heap first.
  // --------------------------------------------------------------------
  print_program_break("before large alloc");
  let big = allocator.allocate(64 * 1024);
  println!("\n[3] Allocate large 64 KiB block");
  print_alloc(&allocator, 64 * 1024, big);
  print_program_break("after large alloc");
  block_until_enter_pressed();

  // --------------------------------------------------------------------
  // 4) Resize copies the payload into a fresh block.
  // --------------------------------------------------------------------
  let grown = unsafe { allocator.resize(c, 256) };
  println!("\n[4] Resize c from 16 to 256 bytes: {:?} -> {:?}", c, grown);
  block_until_enter_pressed();

  // --------------------------------------------------------------------
  // 5) Free everything: adjacent free blocks coalesce back together.
  // --------------------------------------------------------------------
  unsafe {
    allocator.free(b);
    allocator.free(grown);
    allocator.free(big);
  }
  println!("\n[5] Freed every block");
  print_heap(&allocator);

  match allocator.check_heap(true) {
    Ok(report) => println!("[5] Heap is consistent: {report:?}"),
    Err(corruption) => println!("[5] Heap is corrupt: {corruption}"),
  }

  // --------------------------------------------------------------------
  // 6) End of demo.
  //
  //    The heap never shrinks; the OS reclaims it when the process exits.
  // --------------------------------------------------------------------
  println!("\n[6] End of example. Process will exit and the OS will reclaim all memory.");
}
