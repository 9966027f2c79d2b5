use std::io::Read;

use libc::sbrk;
use rballoc::Heap;

/// Waits until the user presses ENTER.
/// Useful when you want to inspect memory state with tools like `pmap`, `htop`,
/// `gdb`, or just visually track how the program break moves.
fn block_until_enter_pressed() {
  println!("\n>>> Press ENTER to continue...");
  let _ = std::io::stdin().bytes().next();
}

/// Prints the current program break using `sbrk(0)`.
unsafe fn print_program_break(label: &str) {
  println!(
    "[{}] PID = {}, program break (sbrk(0)) = {:?}",
    label,
    std::process::id(),
    unsafe { sbrk(0) },
  );
}

fn main() {
  // Our best-fit allocator. It holds only the prologue's address; every
  // other piece of state -- the free-block tree, every block's size/color/
  // alloc bits -- lives inside the sbrk-backed heap region itself.
  let mut heap = Heap::init().expect("region provider should grant the initial heap");

  unsafe {
    print_program_break("start");
    heap.check(true).expect("fresh heap should be consistent");
    block_until_enter_pressed();

    // ------------------------------------------------------------------
    // 1) Allocate two small blocks back to back. Because both fit inside
    //    the initial chunk, no further sbrk call happens here.
    // ------------------------------------------------------------------
    println!("\n[1] Allocate 16 bytes, then another 16 bytes");
    let a = heap.allocate(16).expect("allocate should succeed");
    let b = heap.allocate(16).expect("allocate should succeed");
    println!("[1] a = {:p}, b = {:p} (b - a = {} bytes)", a, b, b.as_ptr() as usize - a.as_ptr() as usize);
    block_until_enter_pressed();

    // ------------------------------------------------------------------
    // 2) Free the middle of three blocks, then its neighbor, to show
    //    boundary-tag coalescing merge them into one free block.
    // ------------------------------------------------------------------
    println!("\n[2] Allocate a third block c, then free b and a to trigger coalescing");
    let c = heap.allocate(16).expect("allocate should succeed");
    heap.free(b);
    heap.free(a);
    heap.check(true).expect("heap should stay consistent after coalescing");
    block_until_enter_pressed();

    // ------------------------------------------------------------------
    // 3) Best-fit: create free blocks of several sizes and show that a
    //    request picks the smallest one that still fits.
    // ------------------------------------------------------------------
    println!("\n[3] Best-fit over free blocks of increasing size");
    let small = heap.allocate(56).expect("allocate should succeed");
    let medium = heap.allocate(88).expect("allocate should succeed");
    let large = heap.allocate(120).expect("allocate should succeed");
    heap.free(small);
    heap.free(medium);
    heap.free(large);
    let fit = heap.allocate(56).expect("allocate should succeed");
    println!("[3] request for 56 bytes reused the smallest adequate block: {:p} == {:p}", fit, small);
    heap.free(fit);
    heap.free(c);
    block_until_enter_pressed();

    // ------------------------------------------------------------------
    // 4) Exhaust the current chunk to force a heap extension.
    // ------------------------------------------------------------------
    println!("\n[4] Allocate past the current chunk to force growth");
    let break_before = sbrk(0);
    let big = heap.allocate(8192).expect("allocate should succeed");
    let break_after = sbrk(0);
    println!(
      "[4] big = {:p}; program break moved from {:?} to {:?}",
      big, break_before, break_after
    );
    heap.check(false).expect("heap should stay consistent after growth");
    heap.free(big);
    block_until_enter_pressed();

    // ------------------------------------------------------------------
    // 5) Reallocate growing into a fresh location and show the data moved.
    // ------------------------------------------------------------------
    println!("\n[5] Write a pattern, reallocate to grow, confirm the prefix survived");
    let p = heap.allocate(32).expect("allocate should succeed");
    for i in 0..32u8 {
      p.as_ptr().add(i as usize).write(i);
    }
    let q = heap.reallocate(Some(p), 1024).expect("reallocate should succeed");
    let preserved = (0..32u8).all(|i| q.as_ptr().add(i as usize).read() == i);
    println!("[5] q = {:p}, first 32 bytes preserved: {}", q, preserved);
    heap.free(q);

    print_program_break("end");
    heap.check(true).expect("heap should stay consistent at the end");
  }
}
