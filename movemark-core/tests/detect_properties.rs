//! Property tests for move detection.
//!
//! Uses proptest to verify:
//! 1. Threshold: every emitted move meets `min_pct`
//! 2. Ranking: output is ordered by magnitude, then start date
//! 3. Truncation: `top_n` is a prefix of the uncapped ranking
//! 4. Partition: with no threshold, runs alternate direction, never overlap, and
//!    number one more than the direction reversals
//! 5. Consistency: pct_change and direction agree with the endpoint prices

use chrono::NaiveDate;
use movemark_core::data::PricePoint;
use movemark_core::moves::{detect_moves, DetectParams, Direction, Move};
use proptest::prelude::*;

// ── Strategies (proptest) ────────────────────────────────────────────

/// Integer-step walks so flat sessions and exact ties show up often.
fn arb_closes() -> impl Strategy<Value = Vec<f64>> {
    prop::collection::vec(-3i32..=3, 0..80).prop_map(|steps| {
        let mut price = 300.0;
        let mut closes = vec![price];
        for s in steps {
            price += s as f64;
            closes.push(price);
        }
        closes
    })
}

fn points(closes: &[f64]) -> Vec<PricePoint> {
    let base = NaiveDate::from_ymd_opt(2020, 1, 1).unwrap();
    closes
        .iter()
        .enumerate()
        .map(|(i, &c)| PricePoint::from_close(base + chrono::Duration::days(i as i64), c))
        .collect()
}

fn all_runs(closes: &[f64]) -> Vec<Move> {
    let mut moves = detect_moves(
        &points(closes),
        &DetectParams {
            min_pct: 0.0,
            top_n: None,
        },
    )
    .unwrap();
    moves.sort_by_key(|m| m.start_date);
    moves
}

proptest! {
    #[test]
    fn moves_meet_threshold(closes in arb_closes(), min_pct in 0.1..5.0_f64) {
        let moves = detect_moves(&points(&closes), &DetectParams { min_pct, top_n: None }).unwrap();
        for m in &moves {
            prop_assert!(m.pct_change.abs() >= min_pct);
        }
    }

    #[test]
    fn output_is_ranked(closes in arb_closes()) {
        let moves = detect_moves(&points(&closes), &DetectParams { min_pct: 0.0, top_n: None }).unwrap();
        for pair in moves.windows(2) {
            let (a, b) = (&pair[0], &pair[1]);
            prop_assert!(a.pct_change.abs() >= b.pct_change.abs());
            if a.pct_change.abs() == b.pct_change.abs() {
                prop_assert!(a.start_date < b.start_date);
            }
        }
    }

    #[test]
    fn top_n_is_prefix_of_full_ranking(closes in arb_closes(), n in 0usize..6) {
        let pts = points(&closes);
        let full = detect_moves(&pts, &DetectParams { min_pct: 1.0, top_n: None }).unwrap();
        let capped = detect_moves(&pts, &DetectParams { min_pct: 1.0, top_n: Some(n) }).unwrap();

        prop_assert_eq!(capped.len(), full.len().min(n));
        prop_assert_eq!(&capped[..], &full[..capped.len()]);
    }

    #[test]
    fn runs_alternate_and_do_not_overlap(closes in arb_closes()) {
        let runs = all_runs(&closes);
        for pair in runs.windows(2) {
            prop_assert_ne!(pair[0].direction, pair[1].direction);
            prop_assert!(pair[0].end_date <= pair[1].start_date);
        }
    }

    #[test]
    fn run_count_follows_direction_reversals(closes in arb_closes()) {
        let runs = all_runs(&closes);
        let signs: Vec<bool> = closes
            .windows(2)
            .filter(|w| w[0] != w[1])
            .map(|w| w[1] > w[0])
            .collect();
        let expected = if signs.is_empty() {
            0
        } else {
            1 + signs.windows(2).filter(|p| p[0] != p[1]).count()
        };
        prop_assert_eq!(runs.len(), expected);
    }

    #[test]
    fn negative_threshold_keeps_every_run(closes in arb_closes(), min_pct in -50.0..0.0_f64) {
        let pts = points(&closes);
        let mut loose = detect_moves(&pts, &DetectParams { min_pct, top_n: None }).unwrap();
        loose.sort_by_key(|m| m.start_date);
        prop_assert_eq!(loose, all_runs(&closes));
    }

    #[test]
    fn pct_and_direction_match_prices(closes in arb_closes()) {
        for m in all_runs(&closes) {
            let expected = (m.end_price - m.start_price) / m.start_price * 100.0;
            prop_assert!((m.pct_change - expected).abs() < 1e-9);
            prop_assert!(m.start_date < m.end_date);
            prop_assert!(m.sessions >= 1);
            match m.direction {
                Direction::Up => prop_assert!(m.pct_change > 0.0),
                Direction::Down => prop_assert!(m.pct_change < 0.0),
            }
        }
    }
}
