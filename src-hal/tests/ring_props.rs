use proptest::prelude::*;
use sapphire_hal::clock::zero_timestamp;
use sapphire_hal::{DualCursorRing, SampleRing, SharedCursorRing};

fn samples(max_len: usize) -> impl Strategy<Value = Vec<f32>> {
    prop::collection::vec(-1.0f32..1.0, 0..=max_len)
}

proptest! {
    #[test]
    fn shared_ring_round_trips_up_to_capacity(
        data in samples(512),
        extra in 0usize..64,
        offset in 0usize..1024,
    ) {
        let capacity = data.len().max(1) + extra;
        let ring = SharedCursorRing::new(capacity);
        let mut skip = vec![0.0f32; offset];
        ring.read(&mut skip);
        let start = ring.cursor();
        prop_assert_eq!(start, offset % capacity);

        ring.write(&data);
        prop_assert_eq!(ring.cursor(), start);

        let mut out = vec![0.0f32; data.len()];
        ring.read(&mut out);
        prop_assert_eq!(&out, &data);
        prop_assert_eq!(ring.cursor(), (start + data.len()) % capacity);
    }

    #[test]
    fn shared_ring_slot_holds_last_write(
        capacity in 1usize..64,
        data in samples(256),
    ) {
        let ring = SharedCursorRing::new(capacity);
        ring.write(&data);

        let mut out = vec![0.0f32; capacity];
        ring.read(&mut out);
        for (slot, value) in out.iter().enumerate() {
            let last = data.iter().enumerate().rev().find(|(i, _)| i % capacity == slot);
            let expected = last.map_or(0.0, |(_, v)| *v);
            prop_assert_eq!(*value, expected);
        }
    }

    #[test]
    fn shared_ring_second_write_overwrites_first(
        first in samples(128),
        second in samples(128),
        extra in 0usize..64,
    ) {
        let capacity = first.len().max(second.len()).max(1) + extra;
        let ring = SharedCursorRing::new(capacity);
        ring.write(&first);
        ring.write(&second);

        // Both writes start at the unmoved cursor
        let len = first.len().max(second.len());
        let expected: Vec<f32> = (0..len)
            .map(|i| if i < second.len() { second[i] } else { first[i] })
            .collect();
        let mut out = vec![0.0f32; len];
        ring.read(&mut out);
        prop_assert_eq!(&out, &expected);
        prop_assert_eq!(ring.cursor(), len % capacity);
    }

    #[test]
    fn dual_ring_delivers_writes_in_order(
        first in samples(128),
        second in samples(128),
        extra in 0usize..64,
    ) {
        let capacity = (first.len() + second.len()).max(1) + extra;
        let ring = DualCursorRing::new(capacity);
        ring.write(&first);
        ring.write(&second);
        prop_assert_eq!(ring.available(), first.len() + second.len());

        let expected: Vec<f32> = first.iter().chain(&second).copied().collect();
        let mut out = vec![1.0f32; expected.len() + 3];
        ring.read(&mut out);
        prop_assert_eq!(&out[..expected.len()], &expected[..]);
        prop_assert!(out[expected.len()..].iter().all(|&s| s == 0.0));
        prop_assert_eq!(ring.available(), 0);
    }

    #[test]
    fn dual_ring_keeps_newest_after_overrun(
        capacity in 1usize..64,
        data in samples(256),
    ) {
        let ring = DualCursorRing::new(capacity);
        ring.write(&data);

        let kept = data.len().min(capacity);
        let mut out = vec![0.0f32; kept];
        ring.read(&mut out);
        prop_assert_eq!(&out[..], &data[data.len() - kept..]);
    }

    #[test]
    fn sample_time_never_decreases(
        anchor in 0u64..1 << 40,
        first in 0u64..1 << 40,
        gap in 0u64..1 << 40,
        ticks_per_frame in 1.0f64..1000.0,
    ) {
        let earlier = zero_timestamp(anchor + first, anchor, ticks_per_frame);
        let later = zero_timestamp(anchor + first + gap, anchor, ticks_per_frame);
        prop_assert!(later.sample_time >= earlier.sample_time);
        prop_assert_eq!(earlier.seed, later.seed);
    }
}
