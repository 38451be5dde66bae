use std::process;

use rbuddy::{ArenaConfig, BuddyAllocator, MmapRegion};

/// Prints how a freshly returned block sits in the arena.
fn print_block(
  allocator: &BuddyAllocator<'_>,
  label: &str,
  block: rbuddy::Block,
) {
  match allocator.arena().header(block) {
    Ok(header) => println!(
      "[{}] block at {:#x}: {} bytes ({} usable)",
      label,
      block.offset(),
      header.size,
      header.payload_len()
    ),
    Err(err) => println!("[{}] block at {:#x}: {}", label, block.offset(), err),
  }
}

fn main() {
  // Arena size: first argument, then RBUDDY_ARENA_SIZE, then 1 MiB.
  let config = match std::env::args().nth(1) {
    Some(arg) => ArenaConfig::parse(&arg),
    None => ArenaConfig::from_env(),
  };

  let config = config.unwrap_or_else(|err| {
    eprintln!("error: {}", err);
    process::exit(2);
  });

  let mut region = MmapRegion::from_config(&config).unwrap_or_else(|err| {
    eprintln!("error: {}", err);
    process::exit(1);
  });

  let mut allocator = BuddyAllocator::new(region.as_mut_slice()).unwrap_or_else(|err| {
    eprintln!("error: {}", err);
    process::exit(1);
  });

  println!("Arena of {} bytes", config.size);

  // --------------------------------------------------------------------
  // 1) Three small requests. The first one halves the arena down to the
  //    block size, the second takes its buddy, the third splits again.
  // --------------------------------------------------------------------
  let mut blocks = Vec::new();
  for i in 1..=3 {
    match allocator.allocate(13) {
      Ok(block) => {
        print_block(&allocator, &i.to_string(), block);
        blocks.push(block);
      }
      Err(err) => println!("[{}] allocation failed: {}", i, err),
    }
  }

  println!("\n{}", allocator.arena());

  // --------------------------------------------------------------------
  // 2) A request that can never fit.
  // --------------------------------------------------------------------
  if let Err(err) = allocator.allocate(config.size) {
    println!("[4] {}", err);
  }

  // --------------------------------------------------------------------
  // 3) Give everything back. The buddies merge into one block again.
  // --------------------------------------------------------------------
  for block in blocks {
    if let Err(err) = allocator.free(block) {
      println!("free failed: {}", err);
    }
  }

  println!("\n{}", allocator.arena());

  match allocator.usage() {
    Ok(usage) => println!("{:?}", usage),
    Err(err) => println!("chain corrupted: {}", err),
  }
}
