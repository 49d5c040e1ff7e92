//! A two-thread smoke test for the ring buffer's release/acquire pairing
//! (property 2): the consumer must never observe bytes the producer hasn't
//! released yet. This isn't a substitute for a thread-sanitizing harness,
//! but it does exercise the actual cross-thread memory barrier rather than
//! a single-threaded stand-in.

use std::sync::Arc;
use std::thread;

use proxy_node::concurrent::ring_buffer::RingBuffer;

struct SharedStorage(std::cell::UnsafeCell<[u8; 4096]>);
unsafe impl Sync for SharedStorage {}

#[test]
fn producer_and_consumer_agree_on_every_byte() {
    const MESSAGES: u32 = 5_000;

    let ring = Arc::new(RingBuffer::new(4096));
    let storage = Arc::new(SharedStorage(std::cell::UnsafeCell::new([0u8; 4096])));

    let producer_ring = ring.clone();
    let producer_storage = storage.clone();
    let producer = thread::spawn(move || {
        for i in 0..MESSAGES {
            let bytes = i.to_ne_bytes();
            loop {
                let (write_index, fill) = producer_ring.get_write_index();
                if fill + 4 > 4096 {
                    thread::yield_now();
                    continue;
                }
                let storage = unsafe { &mut *producer_storage.0.get() };
                producer_ring.write_data(storage, producer_ring.mask(write_index), &bytes);
                producer_ring.write_update(write_index.wrapping_add(4));
                break;
            }
        }
    });

    let consumer_ring = ring.clone();
    let consumer_storage = storage.clone();
    let consumer = thread::spawn(move || {
        let mut expected: u32 = 0;
        while expected < MESSAGES {
            let (read_index, fill) = consumer_ring.get_read_index();
            if fill < 4 {
                thread::yield_now();
                continue;
            }
            let storage = unsafe { &*consumer_storage.0.get() };
            let mut out = [0u8; 4];
            consumer_ring.read_data(storage, consumer_ring.mask(read_index), &mut out);
            consumer_ring.read_update(read_index.wrapping_add(4));
            assert_eq!(u32::from_ne_bytes(out), expected, "consumer observed a stale or torn write");
            expected += 1;
        }
    });

    producer.join().unwrap();
    consumer.join().unwrap();
}
