//! Market breadth and top-mover ranking.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Sentiment {
    Bullish,
    Bearish,
    Sideways,
}

impl fmt::Display for Sentiment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Sentiment::Bullish => write!(f, "BULLISH"),
            Sentiment::Bearish => write!(f, "BEARISH"),
            Sentiment::Sideways => write!(f, "SIDEWAYS"),
        }
    }
}

/// Advance/decline counts for one cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Breadth {
    pub advancing: usize,
    pub declining: usize,
    pub unchanged: usize,
    pub sentiment: Sentiment,
}

impl Breadth {
    /// Count moves; a strict majority decides the label, a tie is sideways.
    pub fn from_changes(changes: impl IntoIterator<Item = f64>) -> Self {
        let (mut advancing, mut declining, mut unchanged) = (0, 0, 0);
        for pct in changes {
            if pct > 0.0 {
                advancing += 1;
            } else if pct < 0.0 {
                declining += 1;
            } else {
                unchanged += 1;
            }
        }

        let sentiment = match advancing.cmp(&declining) {
            std::cmp::Ordering::Greater => Sentiment::Bullish,
            std::cmp::Ordering::Less => Sentiment::Bearish,
            std::cmp::Ordering::Equal => Sentiment::Sideways,
        };

        Self { advancing, declining, unchanged, sentiment }
    }
}

/// Top `n` by `pct` descending. Stable: equal moves keep input order.
pub fn top_gainers<T: Clone>(items: &[T], n: usize, pct: impl Fn(&T) -> f64) -> Vec<T> {
    let mut sorted = items.to_vec();
    sorted.sort_by(|a, b| pct(b).total_cmp(&pct(a)));
    sorted.truncate(n);
    sorted
}

/// Top `n` by `pct` ascending. Stable: equal moves keep input order.
pub fn top_losers<T: Clone>(items: &[T], n: usize, pct: impl Fn(&T) -> f64) -> Vec<T> {
    let mut sorted = items.to_vec();
    sorted.sort_by(|a, b| pct(a).total_cmp(&pct(b)));
    sorted.truncate(n);
    sorted
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bullish_majority() {
        let b = Breadth::from_changes([1.0, 0.5, -0.2]);
        assert_eq!(b.advancing, 2);
        assert_eq!(b.declining, 1);
        assert_eq!(b.sentiment, Sentiment::Bullish);
    }

    #[test]
    fn test_bearish_majority() {
        let b = Breadth::from_changes([-1.0, -0.5, 0.2, 0.0]);
        assert_eq!(b.sentiment, Sentiment::Bearish);
        assert_eq!(b.unchanged, 1);
    }

    #[test]
    fn test_tie_is_sideways() {
        let b = Breadth::from_changes([1.0, -1.0, 0.0]);
        assert_eq!(b.sentiment, Sentiment::Sideways);
        assert_eq!(Breadth::from_changes([]).sentiment, Sentiment::Sideways);
    }

    #[test]
    fn test_top_gainers_order_and_limit() {
        let rows = vec![("A", 1.0), ("B", 3.0), ("C", -2.0), ("D", 2.0)];
        let top: Vec<_> = top_gainers(&rows, 2, |r| r.1).iter().map(|r| r.0).collect();
        assert_eq!(top, vec!["B", "D"]);
    }

    #[test]
    fn test_top_losers_order() {
        let rows = vec![("A", 1.0), ("B", 3.0), ("C", -2.0), ("D", 2.0)];
        let top: Vec<_> = top_losers(&rows, 3, |r| r.1).iter().map(|r| r.0).collect();
        assert_eq!(top, vec!["C", "A", "D"]);
    }

    #[test]
    fn test_rank_ties_keep_watchlist_order() {
        let rows = vec![("A", 1.0), ("B", 1.0), ("C", 1.0)];
        let g: Vec<_> = top_gainers(&rows, 10, |r| r.1).iter().map(|r| r.0).collect();
        let l: Vec<_> = top_losers(&rows, 10, |r| r.1).iter().map(|r| r.0).collect();
        assert_eq!(g, vec!["A", "B", "C"]);
        assert_eq!(l, vec!["A", "B", "C"]);
    }
}
