//! Boundary-tag coalescing (spec §4.4).
//!
//! Merges a just-freed block with whichever free neighbors it touches,
//! re-inserting the (possibly larger) result into the free-block tree. The
//! prologue and epilogue sentinels guarantee `prev_alloc`/`next_alloc` are
//! always well-defined, even for the first and last real blocks, so there's
//! no special-casing at the heap's edges.

use crate::layout::{self, Color};
use crate::tree;

/// Merges `bp` with any free neighbors and inserts the surviving block into
/// the tree. Returns the payload address of the (possibly merged) block.
///
/// # Safety
/// `bp` must be a just-freed block (allocated bit already cleared in its
/// header and footer) whose neighbors are valid blocks per the heap layout.
pub unsafe fn coalesce(base: *mut u8, bp: *mut u8) -> *mut u8 {
  unsafe {
    let prev = layout::prev_block(bp);
    let next = layout::next_block(bp);
    let prev_alloc = layout::is_allocated(prev);
    let next_alloc = layout::is_allocated(next);
    let mut size = layout::size(bp);

    match (prev_alloc, next_alloc) {
      (true, true) => {
        tree::insert(base, bp);
        bp
      }
      (true, false) => {
        tree::delete(base, next);
        size += layout::size(next);
        layout::set_header_footer(bp, size, Color::Red, false);
        tree::insert(base, bp);
        bp
      }
      (false, true) => {
        tree::delete(base, prev);
        size += layout::size(prev);
        layout::set_header_footer(prev, size, Color::Red, false);
        tree::insert(base, prev);
        prev
      }
      (false, false) => {
        tree::delete(base, next);
        tree::delete(base, prev);
        size += layout::size(prev) + layout::size(next);
        layout::set_header_footer(prev, size, Color::Red, false);
        tree::insert(base, prev);
        prev
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::layout::MIN_BLOCK;

  /// Lays out `prologue(alloc) | a | b | c | epilogue(alloc)` in a plain
  /// buffer so the four coalescing cases can be driven directly, without
  /// going through `Heap`.
  struct Layout3 {
    buf: Vec<u8>,
    base: *mut u8,
    a: *mut u8,
    b: *mut u8,
    c: *mut u8,
  }

  fn build(sizes: [usize; 3]) -> Layout3 {
    let total = MIN_BLOCK + sizes.iter().sum::<usize>() + layout::WORD;
    let mut buf = vec![0u8; total + 32];
    let region = unsafe { buf.as_mut_ptr().add(8) };

    let base = unsafe { region.add(layout::WORD) };
    unsafe { layout::set_header_footer(base, MIN_BLOCK, Color::Black, true) };

    let a = unsafe { base.add(MIN_BLOCK) };
    unsafe { layout::set_header_footer(a, sizes[0], Color::Red, true) };
    let b = unsafe { layout::next_block(a) };
    unsafe { layout::set_header_footer(b, sizes[1], Color::Red, true) };
    let c = unsafe { layout::next_block(b) };
    unsafe { layout::set_header_footer(c, sizes[2], Color::Red, true) };
    let epilogue_header = unsafe { layout::next_block(c) };
    unsafe { layout::header(epilogue_header).write(layout::pack(0, Color::Black, true)) };

    Layout3 { buf, base, a, b, c }
  }

  fn free(bp: *mut u8) {
    unsafe { layout::set_allocated(bp, false) };
  }

  #[test]
  fn alloc_alloc_neighbors_just_inserts() {
    let mut l = build([40, 40, 40]);
    let _ = &l.buf;
    free(l.b);
    let merged = unsafe { coalesce(l.base, l.b) };
    assert_eq!(merged, l.b);
    assert_eq!(unsafe { layout::size(merged) }, 40);
  }

  #[test]
  fn free_next_merges_forward() {
    let mut l = build([40, 40, 40]);
    let _ = &l.buf;
    free(l.c);
    unsafe { coalesce(l.base, l.c) };
    free(l.b);
    let merged = unsafe { coalesce(l.base, l.b) };
    assert_eq!(merged, l.b);
    assert_eq!(unsafe { layout::size(merged) }, 80);
  }

  #[test]
  fn free_prev_merges_backward() {
    let mut l = build([40, 40, 40]);
    let _ = &l.buf;
    free(l.a);
    unsafe { coalesce(l.base, l.a) };
    free(l.b);
    let merged = unsafe { coalesce(l.base, l.b) };
    assert_eq!(merged, l.a);
    assert_eq!(unsafe { layout::size(merged) }, 80);
  }

  #[test]
  fn both_neighbors_free_merges_all_three() {
    let mut l = build([40, 40, 40]);
    let _ = &l.buf;
    free(l.a);
    unsafe { coalesce(l.base, l.a) };
    free(l.c);
    unsafe { coalesce(l.base, l.c) };
    free(l.b);
    let merged = unsafe { coalesce(l.base, l.b) };
    assert_eq!(merged, l.a);
    assert_eq!(unsafe { layout::size(merged) }, 120);
  }
}
