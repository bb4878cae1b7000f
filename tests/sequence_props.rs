//! Property tests for sequence arithmetic and slot storage

use proptest::prelude::*;

use lan_audio_regulator::jitter::{SequenceWindow, SlotStore};

fn modulus() -> impl Strategy<Value = u32> {
    (1u32..=16).prop_map(|bits| 1 << bits)
}

proptest! {
    #[test]
    fn test_distance_matches_true_offset(m in modulus(), base in any::<u32>(), raw in any::<i32>()) {
        let window = SequenceWindow::new(m);
        let half = (m / 2) as i64;
        // offsets in (-half, half] are unambiguous
        let offset = (raw as i64).rem_euclid(2 * half) - half + 1;
        let a = base.wrapping_add(offset as u32);

        prop_assert_eq!(window.distance(a, base) as i64, offset);
        prop_assert_eq!(window.distance(base, a) as i64 == -offset, offset != half);
    }

    #[test]
    fn test_distance_invariant_under_shift(
        m in modulus(),
        a in any::<u32>(),
        b in any::<u32>(),
        shift in any::<u32>(),
    ) {
        let window = SequenceWindow::new(m);
        prop_assert_eq!(
            window.distance(a.wrapping_add(shift), b.wrapping_add(shift)),
            window.distance(a, b)
        );
    }

    #[test]
    fn test_advance_and_back_are_inverse(m in modulus(), seq in any::<u32>(), by in any::<u32>()) {
        let window = SequenceWindow::new(m);
        let seq = window.wrap(seq);
        prop_assert_eq!(window.back(window.advance(seq, by), by), seq);
    }

    #[test]
    fn test_slot_store_last_write_wins(
        seqs in proptest::collection::vec(0u32..512, 1..200),
    ) {
        let mut store = SlotStore::new(32, 4);
        for &seq in &seqs {
            store.store(seq, &seq.to_le_bytes());
        }

        // the last sequence number stored in each slot wins, everything
        // else that mapped there is gone
        for &seq in &seqs {
            let last_in_slot = seqs.iter().rev().find(|l| **l % 32 == seq % 32).copied();
            if last_in_slot == Some(seq) {
                prop_assert_eq!(store.fetch(seq), Some(&seq.to_le_bytes()[..]));
            } else {
                prop_assert!(!store.contains(seq));
            }
        }
        prop_assert!(store.occupied() <= store.capacity());
    }
}
