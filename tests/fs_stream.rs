use crossbeam_utils::Backoff;
use franz_flow::Core::layout::{TrailerKind, TrailerLayout, TRAILER_LENGTH};
use franz_flow::{AlignedBuffer, FsStream, InitError, Region, StreamClaimError};
use std::ptr::NonNull;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;

fn value_of(payload: &[u8]) -> u64 {
    u64::from_le_bytes(payload[..8].try_into().unwrap())
}

fn buffer_for(requested: usize, message_size: usize, cycles: u32) -> AlignedBuffer {
    AlignedBuffer::new(FsStream::required_buffer_len(requested, message_size, cycles).unwrap()).unwrap()
}

#[test]
fn sizing_rounds_cycles_and_length() {
    assert_eq!(
        FsStream::required_buffer_len(4, 8, 1),
        Err(InitError::TooFewCycles(1))
    );
    assert_eq!(
        FsStream::required_buffer_len(4, 8, 2),
        Ok(4 * 2 * 12 + TRAILER_LENGTH + 128)
    );
    assert_eq!(
        FsStream::required_buffer_len(3, 8, 3),
        Ok(4 * 4 * 12 + TRAILER_LENGTH + 128)
    );

    let mut buffer = buffer_for(100, 8, 3);
    let stream = FsStream::new(buffer.region(), 100, 8, 3).unwrap();
    assert_eq!(stream.cycle_length(), 128);
    assert_eq!(stream.cycles(), 4);
    assert_eq!(stream.capacity(), 512);
    assert_eq!(stream.max_gain(), 384);
    assert_eq!(stream.message_size(), 8);
    assert_eq!(stream.active_cycle_index(), 0);
}

#[test]
fn init_rejects_short_buffers() {
    let mut buffer = buffer_for(4, 8, 2);
    assert!(matches!(
        FsStream::new(buffer.region(), 8, 8, 2),
        Err(InitError::BufferTooSmall { .. })
    ));
    assert_eq!(
        FsStream::new(buffer.region(), 4, 8, 0).err(),
        Some(InitError::TooFewCycles(0))
    );
}

#[test]
fn back_pressure_then_rotation() {
    let mut buffer = buffer_for(4, 8, 2);
    let stream = FsStream::new(buffer.region(), 4, 8, 2).unwrap();

    for value in 0..4u64 {
        let mut claim = stream.try_claim().unwrap();
        assert_eq!(claim.position(), value);
        claim.payload_mut().copy_from_slice(&value.to_le_bytes());
        claim.commit();
    }
    // Producers may run at most one cycle ahead of the consumer.
    assert_eq!(stream.try_claim().err(), Some(StreamClaimError::Backpressured));
    assert_eq!(stream.size(), 4);

    let mut values = Vec::new();
    let read = unsafe {
        stream.read(
            |payload| {
                values.push(value_of(payload));
                true
            },
            16,
        )
    };
    assert_eq!(read, 4);
    assert_eq!(values, vec![0, 1, 2, 3]);

    assert_eq!(stream.try_claim().err(), Some(StreamClaimError::Rotated));
    assert_eq!(stream.active_cycle_index(), 1);
    let claim = stream.try_claim().unwrap();
    assert_eq!(claim.position(), 4);
    claim.commit();
    assert_eq!(stream.load_producer_position(), 5);
    assert_eq!(stream.size(), 1);
}

#[test]
fn producer_position_is_clamped_to_the_cycle_end() {
    let mut buffer = buffer_for(4, 8, 2);
    let stream = FsStream::new(buffer.region(), 4, 8, 2).unwrap();
    for _ in 0..4 {
        stream.try_claim().unwrap().commit();
    }
    assert_eq!(unsafe { stream.read(|_| true, 4) }, 4);
    assert_eq!(stream.load_producer_position(), 4);
    assert_eq!(stream.try_claim().err(), Some(StreamClaimError::Rotated));
    assert_eq!(stream.load_producer_position(), 4);
    assert_eq!(stream.size(), 0);
}

#[test]
fn one_traversal_rotates_once_per_cycle() {
    let mut buffer = buffer_for(8, 8, 4);
    let stream = FsStream::new(buffer.region(), 8, 8, 4).unwrap();

    let mut claimed = 0u64;
    let mut rotations = 0;
    loop {
        match stream.try_claim() {
            Ok(mut claim) => {
                assert_eq!(claim.position(), claimed);
                claim.payload_mut().copy_from_slice(&claimed.to_le_bytes());
                claim.commit();
                claimed += 1;
                let mut next = claimed - 1;
                unsafe {
                    stream.read(
                        |payload| {
                            assert_eq!(value_of(payload), next);
                            next += 1;
                            true
                        },
                        usize::MAX,
                    )
                };
            }
            Err(StreamClaimError::Rotated) => {
                rotations += 1;
                if stream.active_cycle_index() == 0 {
                    break;
                }
            }
            Err(other) => panic!("single producer must not see {other:?}"),
        }
    }
    assert_eq!(rotations, 4);
    assert_eq!(claimed, 32);
}

#[test]
fn uncommitted_slot_stops_the_read() {
    let mut buffer = buffer_for(8, 8, 2);
    let stream = FsStream::new(buffer.region(), 8, 8, 2).unwrap();

    stream.try_claim().unwrap().commit();
    let pending = stream.try_claim().unwrap();
    stream.try_claim().unwrap().commit();

    assert_eq!(unsafe { stream.read(|_| true, 8) }, 1);
    assert_eq!(stream.load_consumer_position(), 1);
    pending.commit();
    assert_eq!(unsafe { stream.read(|_| true, 8) }, 2);
    assert_eq!(unsafe { stream.read(|_| true, 8) }, 0);
}

#[test]
fn multi_producer_delivers_every_message_in_producer_order() {
    const PRODUCERS: u64 = 4;
    const PER_PRODUCER: u64 = 10_000;
    let mut buffer = buffer_for(1024, 16, 4);
    let stream = FsStream::new(buffer.region(), 1024, 16, 4).unwrap();

    thread::scope(|s| {
        for producer in 0..PRODUCERS {
            let stream = &stream;
            s.spawn(move || {
                let backoff = Backoff::new();
                for seq in 0..PER_PRODUCER {
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
                            Err(StreamClaimError::Rotated) => {}
                            Err(_) => backoff.snooze(),
                        }
                    }
                }
            });
        }

        let mut next_seq = [0u64; PRODUCERS as usize];
        let mut total = 0;
        let backoff = Backoff::new();
        while total < PRODUCERS * PER_PRODUCER {
            let read = unsafe {
                stream.read(
                    |payload| {
                        let producer = value_of(&payload[..8]) as usize;
                        let seq = value_of(&payload[8..16]);
                        assert_eq!(seq, next_seq[producer]);
                        next_seq[producer] += 1;
                        true
                    },
                    256,
                )
            };
            total += read as u64;
            assert!(stream.size() as u64 <= stream.capacity());
            if read == 0 {
                backoff.snooze();
            } else {
                backoff.reset();
            }
        }
        assert!(next_seq.iter().all(|n| *n == PER_PRODUCER));
    });
    assert_eq!(stream.size(), 0);
}

#[test]
fn back_pressure_holds_across_cycle_id_wrap() {
    let len = FsStream::required_buffer_len(1, 8, 2).unwrap();
    let kind = TrailerKind::Stream { cycles: 2 };
    let trailer = TrailerLayout::new(len - TrailerLayout::trailer_length(kind), kind);
    let mut words = vec![0u64; len / 8];
    let base = NonNull::new(words.as_mut_ptr() as *mut u8).unwrap();
    let word_at = |offset: usize| unsafe { &*(base.as_ptr().add(offset) as *const AtomicU64) };

    // Start in the last epoch a 32-bit cycle id can name.
    let last_id = u32::MAX as u64;
    word_at(trailer.consumer_position).store(last_id, Ordering::Relaxed);
    word_at(trailer.consumer_cache_position).store(last_id, Ordering::Relaxed);
    word_at(trailer.cycle_claim(0)).store(last_id << 32, Ordering::Relaxed);

    let region = unsafe { Region::from_raw_parts(base, len) };
    let stream = FsStream::new(region, 1, 8, 2).unwrap();
    assert_eq!(stream.max_gain(), 1);
    assert_eq!(stream.load_producer_position(), last_id);

    let claim = stream.try_claim().unwrap();
    assert_eq!(claim.position(), last_id);
    claim.commit();
    assert_eq!(unsafe { stream.read(|_| true, 1) }, 1);
    assert_eq!(stream.load_consumer_position(), 1 << 32);

    // The next cycle id wraps to 0.
    assert_eq!(stream.try_claim().err(), Some(StreamClaimError::Rotated));
    assert_eq!(stream.active_cycle_index(), 1);
    let claim = stream.try_claim().unwrap();
    assert_eq!(claim.position(), 1 << 32);
    for _ in 0..64 {
        assert_eq!(stream.try_claim().err(), Some(StreamClaimError::Backpressured));
    }
    assert_eq!(stream.load_producer_position(), (1 << 32) + 1);
    assert_eq!(stream.size(), 1);

    claim.commit();
    assert_eq!(unsafe { stream.read(|_| true, 1) }, 1);
    assert_eq!(stream.try_claim().err(), Some(StreamClaimError::Rotated));
    let claim = stream.try_claim().unwrap();
    assert_eq!(claim.position(), (1 << 32) + 1);
    claim.commit();
    assert_eq!(stream.size(), 1);
    drop(stream);

    // Reusing the same words for a fresh stream starts from zero again.
    let bytes = unsafe { std::slice::from_raw_parts_mut(base.as_ptr(), len) };
    let stream = FsStream::new(Region::zeroed(bytes), 1, 8, 2).unwrap();
    assert_eq!(stream.load_producer_position(), 0);
    assert_eq!(stream.load_consumer_position(), 0);
    assert_eq!(stream.active_cycle_index(), 0);
    assert_eq!(stream.try_claim().unwrap().position(), 0);
    drop(stream);
    drop(words);
}
