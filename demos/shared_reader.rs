// Reads the counters written by `shared_writer` and checks their order.

use crossbeam_utils::Backoff;
use franz_flow::Core::{attach_shared_memory, remove_shared_memory};
use franz_flow::VsRingBuffer;
use std::env;
use std::time::Instant;

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

    let shm = attach_shared_memory(name, VsRingBuffer::required_buffer_len(1))?;
    let rb = VsRingBuffer::new(shm.region())?;
    println!("Reader: attached to /dev/shm/{name} ({} bytes of records)", rb.capacity());

    let start = Instant::now();
    let backoff = Backoff::new();
    let mut expected = 1u64;
    let mut out_of_order = 0u64;
    while expected <= messages {
        // SAFETY: this process is the only consumer.
        let read = unsafe {
            rb.read(
                |_, content| {
                    let mut bytes = [0u8; 8];
                    bytes.copy_from_slice(&content[..8]);
                    if u64::from_le_bytes(bytes) != expected {
                        out_of_order += 1;
                    }
                    expected += 1;
                    true
                },
                usize::MAX,
            )
        };
        if read == 0 {
            backoff.snooze();
        } else {
            backoff.reset();
        }
    }
    let elapsed = start.elapsed();
    println!(
        "Reader: {messages} messages in {elapsed:.2?} ({:.0} msg/s, {out_of_order} out of order)",
        messages as f64 / elapsed.as_secs_f64()
    );

    drop(rb);
    drop(shm);
    remove_shared_memory(name)
}
