#[cfg(target_os = "linux")]
mod linux_tests {
    use franz_flow::Core::remove_shared_memory;
    use franz_flow::ChannelBuilder;
    use serial_test::serial;
    use std::io::ErrorKind;
    use std::thread;
    use std::time::Duration;

    #[test]
    #[serial]
    fn test_send_and_receive() -> std::io::Result<()> {
        let name = "franz_flow_test_channel";
        let producer = ChannelBuilder::new()
            .with_name(name)
            .with_capacity(4096)
            .build_producer()?;
        let mut consumer = unsafe { ChannelBuilder::new().with_name(name).with_capacity(4096).build_consumer()? };
        assert_eq!(producer.name(), name);
        assert_eq!(producer.max_message_size(), 4096 - 8);

        assert!(consumer.receive().is_none());
        producer.send(1, b"hello")?;
        producer.send(2, "world")?;
        assert_eq!(consumer.pending(), 32);

        assert_eq!(consumer.receive(), Some((1, b"hello".to_vec())));
        assert_eq!(consumer.receive(), Some((2, b"world".to_vec())));
        assert!(consumer.receive_timeout(Duration::from_millis(10)).is_none());

        drop(consumer);
        drop(producer);
        remove_shared_memory(name)
    }

    #[test]
    #[serial]
    fn test_send_rejects_bad_input_and_reports_full() -> std::io::Result<()> {
        let name = "franz_flow_test_channel_full";
        let producer = ChannelBuilder::new()
            .with_name(name)
            .with_capacity(64)
            .build_producer()?;

        assert_eq!(producer.send(0, b"x").unwrap_err().kind(), ErrorKind::InvalidInput);
        assert_eq!(producer.send(-1, b"x").unwrap_err().kind(), ErrorKind::InvalidInput);
        assert_eq!(
            producer.send(1, vec![0u8; 57]).unwrap_err().kind(),
            ErrorKind::InvalidInput
        );

        producer.send(1, vec![0u8; 56])?;
        assert_eq!(producer.send(1, b"").unwrap_err().kind(), ErrorKind::WouldBlock);
        assert_eq!(
            producer
                .send_timeout(1, b"", Duration::from_millis(20))
                .unwrap_err()
                .kind(),
            ErrorKind::TimedOut
        );

        let mut consumer = unsafe { ChannelBuilder::new().with_name(name).with_capacity(64).build_consumer()? };
        let mut lens = Vec::new();
        assert_eq!(consumer.receive_into(|_, payload| { lens.push(payload.len()); true }, 8), 1);
        assert_eq!(lens, vec![56]);
        producer.send_timeout(1, b"again", Duration::from_millis(20))?;

        drop(consumer);
        drop(producer);
        remove_shared_memory(name)
    }

    #[test]
    #[serial]
    fn test_receive_steps_over_wrap_padding() -> std::io::Result<()> {
        let name = "franz_flow_test_channel_wrap";
        let producer = ChannelBuilder::new()
            .with_name(name)
            .with_capacity(64)
            .build_producer()?;
        let mut consumer = unsafe { ChannelBuilder::new().with_name(name).with_capacity(64).build_consumer()? };

        producer.send(1, [1u8; 40])?;
        assert_eq!(consumer.receive(), Some((1, vec![1u8; 40])));
        // 24 bytes do not fit in the 16 left before the end: padding, then offset 0.
        producer.send(2, [2u8; 16])?;
        assert_eq!(consumer.receive(), Some((2, vec![2u8; 16])));
        assert!(consumer.receive().is_none());
        assert_eq!(consumer.pending(), 0);

        drop(consumer);
        drop(producer);
        remove_shared_memory(name)
    }

    #[test]
    #[serial]
    fn test_attached_producers_from_threads() -> std::io::Result<()> {
        const THREADS: u32 = 4;
        const PER_THREAD: u32 = 5_000;
        let name = "franz_flow_test_channel_mp";
        let first = ChannelBuilder::new()
            .with_name(name)
            .with_capacity(8192)
            .build_producer()?;
        let second = ChannelBuilder::new()
            .with_name(name)
            .with_capacity(8192)
            .attach_producer()?;
        let mut consumer = unsafe { ChannelBuilder::new().with_name(name).with_capacity(8192).build_consumer()? };

        thread::scope(|s| {
            for t in 0..THREADS {
                let producer = if t % 2 == 0 { &first } else { &second };
                s.spawn(move || {
                    for seq in 0..PER_THREAD {
                        producer
                            .send_timeout(t as i32 + 1, seq.to_le_bytes(), Duration::from_secs(10))
                            .unwrap();
                    }
                });
            }

            let mut next = [0u32; THREADS as usize];
            let mut total = 0;
            while total < THREADS * PER_THREAD {
                let (id, payload) = consumer.receive_timeout(Duration::from_secs(10)).unwrap();
                let t = (id - 1) as usize;
                assert_eq!(u32::from_le_bytes(payload.try_into().unwrap()), next[t]);
                next[t] += 1;
                total += 1;
            }
        });
        assert_eq!(consumer.pending(), 0);

        drop(consumer);
        drop(second);
        drop(first);
        remove_shared_memory(name)
    }
}
