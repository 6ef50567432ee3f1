use std::io::Read;

use rmem::{BiStack, FixedPool, VarPool};

/// Waits until the user presses ENTER.
/// Useful when you want to inspect memory state with tools like `pmap`,
/// `htop`, or `gdb` between steps.
fn block_until_enter_pressed() {
  println!("\n>>> Press ENTER to continue...");
  let _ = std::io::stdin().bytes().next();
}

fn demo_var_pool() {
  println!("\n=== VarPool: segregated free lists + bump arena ===");

  let mut pool = VarPool::new(4096).expect("allocate backing buffer");
  println!("[VarPool] capacity = {}, free_space = {}", pool.capacity(), pool.free_space());

  let a = pool.alloc(64).expect("alloc 64 bytes");
  let b = pool.alloc(128).expect("alloc 128 bytes");
  println!("[VarPool] a = {a:p}, b = {b:p}, free_space = {}", pool.free_space());

  pool.free(Some(a));
  let c = pool.alloc(64).expect("alloc 64 bytes again");
  println!(
    "[VarPool] freed a, then allocated c = {c:p} ({})",
    if c == a { "reused a, as expected" } else { "went elsewhere" }
  );

  let grown = pool.realloc(Some(b), 256).expect("grow b to 256 bytes");
  println!("[VarPool] grew b ({b:p}) to 256 bytes -> {grown:p}");

  pool.reset();
  println!("[VarPool] after reset: free_space = {} (back to full capacity)", pool.free_space());
}

fn demo_fixed_pool() {
  println!("\n=== FixedPool: intrusive LIFO free list over fixed cells ===");

  let mut pool = FixedPool::new(32, 4).expect("allocate backing buffer");
  println!("[FixedPool] cell_size = {}, cell_count = {}", pool.cell_size(), pool.cell_count());

  let mut cells = Vec::new();
  while let Some(cell) = pool.alloc() {
    cells.push(cell);
  }
  println!("[FixedPool] allocated {} cells, pool now exhausted (free_count = {})", cells.len(), pool.free_count());

  let recycled = cells.pop().unwrap();
  pool.free(Some(recycled));
  let reused = pool.alloc().expect("reuse the freed cell");
  println!(
    "[FixedPool] freed one cell then allocated again: {}",
    if reused == recycled { "got the same cell back (LIFO)" } else { "got a different cell" }
  );
}

fn demo_bistack() {
  println!("\n=== BiStack: double-ended bump allocator ===");

  let mut stack = BiStack::new(256).expect("allocate backing buffer");
  println!("[BiStack] capacity = {}, margins = {}", stack.capacity(), stack.margins());

  let front = stack.alloc_front(64).expect("alloc from the front");
  let back = stack.alloc_back(64).expect("alloc from the back");
  println!("[BiStack] front = {front:p}, back = {back:p}, margins = {}", stack.margins());

  stack.reset_front();
  println!("[BiStack] reset the front side only; margins = {}", stack.margins());
  let _ = stack.alloc_front(16).expect("front side usable again");
}

fn main() {
  env_logger::init();

  println!("Three allocator engines, one demo each. Set RUST_LOG=trace to see internals.");
  block_until_enter_pressed();

  demo_var_pool();
  block_until_enter_pressed();

  demo_fixed_pool();
  block_until_enter_pressed();

  demo_bistack();

  println!("\nEnd of demo.");
}
