// Writes u64 counters into a variable-size ring buffer in /dev/shm.
// Run the reader in another terminal after starting this one:
//   cargo run --example shared_writer -- <messages> [name]
//   cargo run --example shared_reader -- <messages> [name]

use crossbeam_utils::Backoff;
use franz_flow::Core::create_shared_memory;
use franz_flow::{MsgTypeId, VsRingBuffer};
use std::env;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

const CAPACITY: usize = 64 * 1024;
const MSG_TYPE_ID: i32 = 1;

fn main() -> std::io::Result<()> {
    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        eprintln!("Usage: {} <messages> [name]", args[0]);
        std::process::exit(1);
    }
    let messages: u64 = args[1].parse().map_err(|e| {
        std::io::Error::new(std::io::ErrorKind::InvalidInput, format!("invalid message count: {e}"))
    })?;
    let name = args.get(2).map(String::as_str).unwrap_or("shared.ipc");

    let shm = create_shared_memory(VsRingBuffer::required_buffer_len(CAPACITY), name)?;
    let rb = VsRingBuffer::new(shm.region())?;
    let msg_type_id = MsgTypeId::new(MSG_TYPE_ID)?;
    println!("Writer: created /dev/shm/{name} ({} bytes of records)", rb.capacity());

    // Ctrl+C stops waiting for a reader that never shows up.
    let running = Arc::new(AtomicBool::new(true));
    let running_for_handler = Arc::clone(&running);
    ctrlc::set_handler(move || running_for_handler.store(false, Ordering::SeqCst))
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;

    let start = Instant::now();
    let backoff = Backoff::new();
    let mut spins = 0u64;
    for value in 1..=messages {
        loop {
            // SAFETY: this process is the only producer.
            if let Some(mut claim) = unsafe { rb.try_sp_claim(8) } {
                claim.content_mut().copy_from_slice(&value.to_le_bytes());
                claim.commit(msg_type_id);
                backoff.reset();
                break;
            }
            if !running.load(Ordering::Relaxed) {
                println!("Writer: interrupted after {} messages", value - 1);
                return Ok(());
            }
            spins += 1;
            backoff.snooze();
        }
    }

    // Wait until the reader drained everything.
    let last = rb.load_producer_position();
    while rb.load_consumer_position() < last && running.load(Ordering::Relaxed) {
        backoff.snooze();
    }
    let elapsed = start.elapsed();
    println!(
        "Writer: {messages} messages in {elapsed:.2?} ({:.0} msg/s, {spins} failed claims)",
        messages as f64 / elapsed.as_secs_f64()
    );
    Ok(())
}
