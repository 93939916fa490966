// In-process throughput of the cyclic stream with several producers.
//   cargo run --release --example stream_throughput -- [producers] [messages per producer]

use crossbeam_utils::Backoff;
use franz_flow::{AlignedBuffer, FsStream, StreamClaimError};
use std::env;
use std::thread;
use std::time::Instant;

const CYCLE_LENGTH: usize = 16 * 1024;
const CYCLES: u32 = 4;
const MESSAGE_SIZE: usize = 16;

fn arg(args: &[String], index: usize, default: u64) -> u64 {
    args.get(index).and_then(|s| s.parse().ok()).unwrap_or(default)
}

fn main() -> std::io::Result<()> {
    let args: Vec<String> = env::args().collect();
    let producers = arg(&args, 1, 2);
    let per_producer = arg(&args, 2, 1_000_000);

    let mut buffer = AlignedBuffer::new(FsStream::required_buffer_len(CYCLE_LENGTH, MESSAGE_SIZE, CYCLES)?)?;
    let stream = FsStream::new(buffer.region(), CYCLE_LENGTH, MESSAGE_SIZE, CYCLES)?;
    println!("Stream: {stream:?}");

    let start = Instant::now();
    let (rotations, backpressured) = thread::scope(|s| {
        let handles: Vec<_> = (0..producers)
            .map(|producer| {
                let stream = &stream;
                s.spawn(move || {
                    let backoff = Backoff::new();
                    let (mut rotations, mut backpressured) = (0u64, 0u64);
                    for seq in 0..per_producer {
                        loop {
                            match stream.try_claim() {
                                Ok(mut claim) => {
                                    let payload = claim.payload_mut();
                                    payload[..8].copy_from_slice(&producer.to_le_bytes());
                                    payload[8..16].copy_from_slice(&seq.to_le_bytes());
                                    claim.commit();
                                    backoff.reset();
                                    break;
                                }
                                Err(StreamClaimError::Rotated) => rotations += 1,
                                Err(StreamClaimError::Backpressured) => {
                                    backpressured += 1;
                                    backoff.snooze();
                                }
                                Err(StreamClaimError::Overrun { .. }) => backoff.spin(),
                            }
                        }
                    }
                    (rotations, backpressured)
                })
            })
            .collect();

        let total = producers * per_producer;
        let mut received = 0u64;
        let backoff = Backoff::new();
        while received < total {
            // SAFETY: the main thread is the only consumer.
            let read = unsafe { stream.read(|_| true, 4096) };
            received += read as u64;
            if read == 0 {
                backoff.snooze();
            }
        }

        handles
            .into_iter()
            .filter_map(|h| h.join().ok())
            .fold((0, 0), |(r, b), (hr, hb)| (r + hr, b + hb))
    });
    let elapsed = start.elapsed();
    let total = producers * per_producer;
    println!(
        "Stream: {total} messages from {producers} producers in {elapsed:.2?} ({:.0} msg/s)",
        total as f64 / elapsed.as_secs_f64()
    );
    println!("Stream: {rotations} rotations, {backpressured} back-pressured claims");
    Ok(())
}
