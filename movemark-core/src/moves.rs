//! Move detection: extract notable same-direction runs from a daily close series.
//!
//! A run is a maximal stretch of consecutive sessions whose closes keep moving
//! the same way. Flat sessions (close unchanged) are direction-neutral: they
//! neither extend nor break a run, so only a reversal closes it. The run still
//! open when the series ends is evaluated like any other.
//!
//! Each run is measured from the close before its first directional session
//! (the reference close) to the close of its last directional session. Its
//! `start_date` is the reference session, so `[100, 110, 121]` is one move
//! spanning all three dates.

use crate::data::{validate_points, DataError, PricePoint, PriceSeries};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Direction of a move.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Up,
    Down,
}

impl Direction {
    /// Direction from one close to the next; `None` for a flat session.
    pub fn between(prev_close: f64, close: f64) -> Option<Self> {
        match close.partial_cmp(&prev_close) {
            Some(Ordering::Greater) => Some(Self::Up),
            Some(Ordering::Less) => Some(Self::Down),
            _ => None,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Up => "up",
            Self::Down => "down",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of a move: its date range and direction.
///
/// Annotations are keyed by this, so a change in how a move is delimited never
/// resolves to an annotation written for a different move.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MoveKey {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub direction: Direction,
}

impl fmt::Display for MoveKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}|{}|{}", self.start_date, self.end_date, self.direction)
    }
}

/// A detected move.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Move {
    /// Session of the reference close.
    pub start_date: NaiveDate,
    /// Last directional session of the run.
    pub end_date: NaiveDate,
    pub direction: Direction,
    /// Signed cumulative change in percent.
    pub pct_change: f64,
    pub start_price: f64,
    pub end_price: f64,
    /// Sessions elapsed from `start_date` to `end_date`, flat ones included.
    pub sessions: usize,
}

impl Move {
    pub fn key(&self) -> MoveKey {
        MoveKey {
            start_date: self.start_date,
            end_date: self.end_date,
            direction: self.direction,
        }
    }

    pub fn magnitude(&self) -> f64 {
        self.pct_change.abs()
    }
}

/// Detection parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DetectParams {
    /// Minimum |pct_change| in percent. Zero or negative keeps every run.
    pub min_pct: f64,
    /// Keep at most this many moves after ranking.
    pub top_n: Option<usize>,
}

impl Default for DetectParams {
    fn default() -> Self {
        Self {
            min_pct: 5.0,
            top_n: Some(5),
        }
    }
}

/// Detect, rank, and cap moves in raw points.
///
/// # Errors
///
/// [`DataError::InvalidSeries`] if the points are unsorted, duplicated, or
/// carry non-finite prices. Nothing is scanned in that case.
pub fn detect_moves(points: &[PricePoint], params: &DetectParams) -> Result<Vec<Move>, DataError> {
    validate_points(points)?;
    Ok(select(scan_runs(points), params))
}

/// Detect moves in an already validated series. Cannot fail.
pub fn detect_in_series(series: &PriceSeries, params: &DetectParams) -> Vec<Move> {
    select(scan_runs(series.points()), params)
}

/// Sort by |pct_change| descending, earlier `start_date` first on exact ties.
pub fn rank_moves(moves: &mut [Move]) {
    moves.sort_by(|a, b| {
        b.magnitude()
            .total_cmp(&a.magnitude())
            .then_with(|| a.start_date.cmp(&b.start_date))
    });
}

fn select(runs: Vec<Move>, params: &DetectParams) -> Vec<Move> {
    let mut moves: Vec<Move> = runs
        .into_iter()
        .filter(|m| params.min_pct <= 0.0 || m.magnitude() >= params.min_pct)
        .collect();

    rank_moves(&mut moves);

    // The cap applies to the ranked list only; scanning never stops early.
    if let Some(n) = params.top_n {
        moves.truncate(n);
    }
    moves
}

#[derive(Debug)]
struct Run {
    direction: Direction,
    base_idx: usize,
    last_idx: usize,
}

impl Run {
    fn into_move(self, points: &[PricePoint]) -> Move {
        let base = &points[self.base_idx];
        let last = &points[self.last_idx];
        Move {
            start_date: base.date,
            end_date: last.date,
            direction: self.direction,
            pct_change: (last.close - base.close) / base.close * 100.0,
            start_price: base.close,
            end_price: last.close,
            sessions: self.last_idx - self.base_idx,
        }
    }
}

/// Every maximal directional run, in chronological order, unfiltered.
fn scan_runs(points: &[PricePoint]) -> Vec<Move> {
    let mut runs = Vec::new();
    let mut current: Option<Run> = None;

    for t in 1..points.len() {
        let Some(direction) = Direction::between(points[t - 1].close, points[t].close) else {
            continue;
        };

        if let Some(run) = current.as_mut() {
            if run.direction == direction {
                run.last_idx = t;
                continue;
            }
        }

        let next = Run {
            direction,
            base_idx: t - 1,
            last_idx: t,
        };
        if let Some(done) = current.replace(next) {
            runs.push(done.into_move(points));
        }
    }

    if let Some(done) = current {
        runs.push(done.into_move(points));
    }

    runs
}
