//! The free-block index: an in-place red-black tree keyed by block size.
//!
//! This is the heart of the allocator (spec §2 puts it at roughly half the
//! core's line count). Every free block's payload holds three pointer-width
//! fields -- `parent`, `left`, `right` -- written directly into the block's
//! own bytes, so the tree carries no storage beyond the free blocks
//! themselves. The tree root lives in the same three-field slot inside the
//! prologue's payload: the prologue's `parent` field doubles as the root
//! pointer (spec §3.3/§4.3). Every function below therefore takes a `base`
//! pointer -- the prologue's payload address -- and treats it exactly like
//! any other node when reading or writing the root.
//!
//! Ported from the original `tree_insert`/`tree_delete`/`left_rotate`/
//! `right_rotate`/`transplant`/`minimum`/`insert_fixup`/`delete_fixup`
//! control flow; macro-based field access becomes the `node` accessors
//! below, and `NULL` pointers become `std::ptr::null_mut()`.

use crate::layout::{self, Color};
use std::ptr;

const PARENT_OFFSET: usize = 0;
const LEFT_OFFSET: usize = layout::DWORD;
const RIGHT_OFFSET: usize = 2 * layout::DWORD;

fn read_field(bp: *mut u8, offset: usize) -> *mut u8 {
  unsafe { (bp.add(offset) as *mut usize).read() as *mut u8 }
}

fn write_field(bp: *mut u8, offset: usize, value: *mut u8) {
  unsafe { (bp.add(offset) as *mut usize).write(value as usize) };
}

fn parent(bp: *mut u8) -> *mut u8 {
  read_field(bp, PARENT_OFFSET)
}
fn set_parent(bp: *mut u8, value: *mut u8) {
  write_field(bp, PARENT_OFFSET, value);
}
fn left(bp: *mut u8) -> *mut u8 {
  read_field(bp, LEFT_OFFSET)
}
fn set_left(bp: *mut u8, value: *mut u8) {
  write_field(bp, LEFT_OFFSET, value);
}
fn right(bp: *mut u8) -> *mut u8 {
  read_field(bp, RIGHT_OFFSET)
}
fn set_right(bp: *mut u8, value: *mut u8) {
  write_field(bp, RIGHT_OFFSET, value);
}

fn root(base: *mut u8) -> *mut u8 {
  parent(base)
}
fn set_root(base: *mut u8, value: *mut u8) {
  set_parent(base, value);
}

/// Sets the tree's root slot (the prologue's `parent` field) to null.
/// Called once by [`crate::heap::Heap::init`] when the prologue is first
/// written; every later root update goes through the private `set_root`
/// used internally by insert/delete/rotate.
pub fn init_root(base: *mut u8) {
  set_root(base, ptr::null_mut());
}

/// Red-black color of a node, treating a null pointer as black -- the usual
/// convention for the implicit leaves this tree never allocates.
fn is_red(bp: *mut u8) -> bool {
  !bp.is_null() && unsafe { layout::color(bp) } == Color::Red
}

fn set_color(bp: *mut u8, color: Color) {
  if !bp.is_null() {
    unsafe { layout::set_color(bp, color) };
  }
}

fn block_size(bp: *mut u8) -> usize {
  unsafe { layout::size(bp) }
}

/// Returns the smallest free block with size ≥ `asize`, removing it from
/// the tree, or `None` if no free block fits.
///
/// Walks from the root: sizes smaller than `asize` are never acceptable (go
/// right), an exact match is returned immediately (it cannot be beaten), and
/// anything larger is remembered as a candidate before continuing left in
/// search of something tighter.
pub fn search_best_fit(base: *mut u8, asize: usize) -> Option<*mut u8> {
  let mut x = root(base);
  let mut best: *mut u8 = ptr::null_mut();

  while !x.is_null() {
    let xsize = block_size(x);
    if xsize < asize {
      x = right(x);
    } else if xsize == asize {
      delete(base, x);
      return Some(x);
    } else {
      best = x;
      x = left(x);
    }
  }

  if !best.is_null() {
    delete(base, best);
    Some(best)
  } else {
    None
  }
}

/// Inserts a free block into the tree. `bp`'s size must already be set in
/// its header/footer; this function owns the block's color and left/right
/// fields from here on. Duplicate sizes are placed on the right subtree, so
/// `search_best_fit`'s exact-match case can return immediately without
/// disturbing insertion order.
pub fn insert(base: *mut u8, bp: *mut u8) {
  set_left(bp, ptr::null_mut());
  set_right(bp, ptr::null_mut());

  let mut y: *mut u8 = ptr::null_mut();
  let mut x = root(base);
  let bsize = block_size(bp);

  while !x.is_null() {
    y = x;
    x = if bsize < block_size(x) { left(x) } else { right(x) };
  }

  set_parent(bp, y);
  if y.is_null() {
    set_root(base, bp);
  } else if bsize < block_size(y) {
    set_left(y, bp);
  } else {
    set_right(y, bp);
  }

  set_color(bp, Color::Red);
  insert_fixup(base, bp);
}

fn insert_fixup(base: *mut u8, mut bp: *mut u8) {
  while !parent(bp).is_null() && is_red(parent(bp)) {
    let gp = parent(parent(bp));
    if parent(bp) == left(gp) {
      let uncle = right(gp);
      if is_red(uncle) {
        set_color(parent(bp), Color::Black);
        set_color(uncle, Color::Black);
        set_color(gp, Color::Red);
        bp = gp;
      } else {
        if bp == right(parent(bp)) {
          bp = parent(bp);
          left_rotate(base, bp);
        }
        set_color(parent(bp), Color::Black);
        set_color(parent(parent(bp)), Color::Red);
        right_rotate(base, parent(parent(bp)));
      }
    } else {
      let uncle = left(gp);
      if is_red(uncle) {
        set_color(parent(bp), Color::Black);
        set_color(uncle, Color::Black);
        set_color(gp, Color::Red);
        bp = gp;
      } else {
        if bp == left(parent(bp)) {
          bp = parent(bp);
          right_rotate(base, bp);
        }
        set_color(parent(bp), Color::Black);
        set_color(parent(parent(bp)), Color::Red);
        left_rotate(base, parent(parent(bp)));
      }
    }
  }
  set_color(root(base), Color::Black);
}

/// Removes `z` from the tree. Standard red-black transplant-based deletion;
/// see `delete_fixup` for why the parent of a potentially-null successor
/// must be threaded through explicitly.
pub fn delete(base: *mut u8, z: *mut u8) {
  let mut y = z;
  let mut y_was_red = is_red(y);
  let x;
  let par;

  if left(z).is_null() {
    x = right(z);
    par = parent(z);
    transplant(base, z, right(z));
  } else if right(z).is_null() {
    par = parent(z);
    x = left(z);
    transplant(base, z, left(z));
  } else {
    y = minimum(right(z));
    y_was_red = is_red(y);
    x = right(y);

    if parent(y) == z {
      if !x.is_null() {
        set_parent(x, y);
      }
      par = y;
    } else {
      transplant(base, y, right(y));
      par = parent(y);
      set_right(y, right(z));
      set_parent(right(y), y);
    }

    transplant(base, z, y);
    set_left(y, left(z));
    set_parent(left(y), y);
    set_color(y, unsafe { layout::color(z) });
  }

  if !y_was_red {
    delete_fixup(base, x, par);
  }
}

fn delete_fixup(base: *mut u8, mut x: *mut u8, mut par: *mut u8) {
  while x != root(base) && !is_red(x) {
    if x == left(par) {
      let mut w = right(par);
      if is_red(w) {
        set_color(w, Color::Black);
        set_color(par, Color::Red);
        left_rotate(base, par);
        w = right(par);
      }
      if !is_red(left(w)) && !is_red(right(w)) {
        set_color(w, Color::Red);
        x = par;
        par = parent(par);
      } else {
        if !is_red(right(w)) {
          set_color(left(w), Color::Black);
          set_color(w, Color::Red);
          right_rotate(base, w);
          w = right(par);
        }
        set_color(w, if is_red(par) { Color::Red } else { Color::Black });
        set_color(par, Color::Black);
        set_color(right(w), Color::Black);
        left_rotate(base, par);
        x = root(base);
      }
    } else {
      let mut w = left(par);
      if is_red(w) {
        set_color(w, Color::Black);
        set_color(par, Color::Red);
        right_rotate(base, par);
        w = left(par);
      }
      if !is_red(right(w)) && !is_red(left(w)) {
        set_color(w, Color::Red);
        x = par;
        par = parent(par);
      } else {
        if !is_red(left(w)) {
          set_color(right(w), Color::Black);
          set_color(w, Color::Red);
          left_rotate(base, w);
          w = left(par);
        }
        set_color(w, if is_red(par) { Color::Red } else { Color::Black });
        set_color(par, Color::Black);
        set_color(left(w), Color::Black);
        right_rotate(base, par);
        x = root(base);
      }
    }
  }
  if !x.is_null() {
    set_color(x, Color::Black);
  }
}

fn transplant(base: *mut u8, u: *mut u8, v: *mut u8) {
  let pu = parent(u);
  if pu.is_null() {
    set_root(base, v);
  } else if u == left(pu) {
    set_left(pu, v);
  } else {
    set_right(pu, v);
  }
  if !v.is_null() {
    set_parent(v, pu);
  }
}

fn minimum(mut bp: *mut u8) -> *mut u8 {
  while !left(bp).is_null() {
    bp = left(bp);
  }
  bp
}

fn left_rotate(base: *mut u8, bp: *mut u8) {
  let y = right(bp);
  set_right(bp, left(y));
  if !left(y).is_null() {
    set_parent(left(y), bp);
  }
  set_parent(y, parent(bp));
  if parent(bp).is_null() {
    set_root(base, y);
  } else if bp == left(parent(bp)) {
    set_left(parent(bp), y);
  } else {
    set_right(parent(bp), y);
  }
  set_left(y, bp);
  set_parent(bp, y);
}

fn right_rotate(base: *mut u8, bp: *mut u8) {
  let x = left(bp);
  set_left(bp, right(x));
  if !right(x).is_null() {
    set_parent(right(x), bp);
  }
  set_parent(x, parent(bp));
  if parent(bp).is_null() {
    set_root(base, x);
  } else if bp == right(parent(bp)) {
    set_right(parent(bp), x);
  } else {
    set_left(parent(bp), x);
  }
  set_right(x, bp);
  set_parent(bp, x);
}

/// Walks the whole tree validating BST-by-size ordering, no red node with a
/// red child, and equal black-height on every root-to-null path. Used only
/// by [`crate::check::check`]'s optional tree pass; production paths never
/// call this.
pub fn verify(base: *mut u8) -> Result<(), &'static str> {
  fn walk(bp: *mut u8, lo: usize, hi: usize, parent_red: bool) -> Result<usize, &'static str> {
    if bp.is_null() {
      return Ok(1);
    }
    let sz = block_size(bp);
    if sz < lo || sz > hi {
      return Err("red-black tree violates BST-by-size ordering");
    }
    let red = is_red(bp);
    if red && parent_red {
      return Err("red node has a red child");
    }
    let left_bh = walk(left(bp), lo, sz, red)?;
    let right_bh = walk(right(bp), sz, hi, red)?;
    if left_bh != right_bh {
      return Err("unequal black-height between subtrees");
    }
    Ok(left_bh + if red { 0 } else { 1 })
  }

  let r = root(base);
  if r.is_null() {
    return Ok(());
  }
  if is_red(r) {
    return Err("root is red");
  }
  walk(r, 0, usize::MAX, false)?;
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::layout::{set_header_footer, Color as LColor};

  /// A small backing arena so tree operations have real, writable "blocks"
  /// to chase pointers through. Each slot is large enough to hold a header,
  /// footer, and the parent/left/right trio.
  struct Arena {
    buf: Vec<u8>,
    base: *mut u8,
  }

  impl Arena {
    fn new(slots: usize) -> Self {
      let slot_size = 64;
      let mut buf = vec![0u8; slots * slot_size + 16];
      let base = unsafe { buf.as_mut_ptr().add(8) };
      Arena { buf, base }
    }

    fn slot(&mut self, index: usize, size: usize) -> *mut u8 {
      let slot_size = 64;
      unsafe { self.base.add(8 + index * slot_size + (slot_size - size)) }
    }
  }

  fn free_block(arena: &mut Arena, index: usize, size: usize) -> *mut u8 {
    let bp = arena.slot(index, size);
    unsafe { set_header_footer(bp, size, LColor::Red, false) };
    bp
  }

  #[test]
  fn insert_then_search_best_fit_returns_smallest_adequate() {
    let mut arena = Arena::new(8);
    let base = arena.base;
    unsafe { set_header_footer(base, 32, LColor::Black, true) };
    set_parent(base, ptr::null_mut());

    let b64 = free_block(&mut arena, 1, 64);
    let b96 = free_block(&mut arena, 2, 96);
    let b128 = free_block(&mut arena, 3, 128);

    insert(base, b64);
    insert(base, b96);
    insert(base, b128);

    let fit = search_best_fit(base, 56).expect("should find a fit");
    assert_eq!(fit, b64);

    assert!(verify(base).is_ok());
  }

  #[test]
  fn exact_size_match_returns_immediately() {
    let mut arena = Arena::new(8);
    let base = arena.base;
    unsafe { set_header_footer(base, 32, LColor::Black, true) };
    set_parent(base, ptr::null_mut());

    let b64 = free_block(&mut arena, 1, 64);
    let b96 = free_block(&mut arena, 2, 96);
    insert(base, b64);
    insert(base, b96);

    let fit = search_best_fit(base, 64).unwrap();
    assert_eq!(fit, b64);
  }

  #[test]
  fn delete_keeps_tree_valid_across_many_sizes() {
    let mut arena = Arena::new(16);
    let base = arena.base;
    unsafe { set_header_footer(base, 32, LColor::Black, true) };
    set_parent(base, ptr::null_mut());

    let sizes = [40, 48, 56, 64, 72, 80, 88, 96, 104, 112, 120];
    let mut nodes = Vec::new();
    for (i, &size) in sizes.iter().enumerate() {
      let bp = free_block(&mut arena, i + 1, size);
      insert(base, bp);
      nodes.push(bp);
      assert!(verify(base).is_ok());
    }

    for bp in nodes {
      delete(base, bp);
      assert!(verify(base).is_ok());
    }

    assert!(root(base).is_null());
  }

  #[test]
  fn search_returns_none_when_nothing_fits() {
    let mut arena = Arena::new(4);
    let base = arena.base;
    unsafe { set_header_footer(base, 32, LColor::Black, true) };
    set_parent(base, ptr::null_mut());

    let b32 = free_block(&mut arena, 1, 40);
    insert(base, b32);

    assert!(search_best_fit(base, 96).is_none());
  }
}
