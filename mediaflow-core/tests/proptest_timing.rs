//! Property tests for time base arithmetic and reorder queues.

use mediaflow_core::{Packet, Rational, ReorderQueue, Timestamp};
use proptest::prelude::*;

fn time_base() -> impl Strategy<Value = Rational> {
    (1i64..=1001, 1i64..=192_000).prop_map(|(n, d)| Rational::new(n, d))
}

proptest! {
    #[test]
    fn rescale_error_is_under_half_a_tick(value in -1_000_000i64..1_000_000, from in time_base(), to in time_base()) {
        let out = from.rescale(value, to);
        let exact = value as f64 * from.to_f64() / to.to_f64();
        prop_assert!((out as f64 - exact).abs() <= 0.5 + exact.abs() * 1e-12 + 1e-6);
    }

    #[test]
    fn cross_base_order_matches_seconds(a in -100_000i64..100_000, b in -100_000i64..100_000, ta in time_base(), tb in time_base()) {
        let x = Timestamp::new(a, ta);
        let y = Timestamp::new(b, tb);
        let (sx, sy) = (x.to_seconds(), y.to_seconds());
        if (sx - sy).abs() > 1e-9 * (1.0 + sx.abs().max(sy.abs())) {
            prop_assert_eq!(x < y, sx < sy);
        }
    }

    #[test]
    fn reorder_queue_sorts_bounded_displacement(depth in 0usize..4, blocks in 1usize..20) {
        // Each block of depth+1 keys is reversed: no key moves more than
        // `depth` places from its sorted position.
        let mut keys = Vec::new();
        for b in 0..blocks {
            let base = (b * (depth + 1)) as i64;
            keys.extend((0..=depth as i64).rev().map(|k| base + k));
        }
        let mut queue = ReorderQueue::new(depth);
        let mut out = Vec::new();
        for k in &keys {
            out.extend(queue.push(Packet::new(vec![]).with_timestamps(None, Some(*k))));
        }
        out.extend(queue.drain());
        let got: Vec<i64> = out.iter().filter_map(|p| p.dts).collect();
        let mut want = keys.clone();
        want.sort_unstable();
        prop_assert_eq!(got, want);
    }
}
