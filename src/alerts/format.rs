//! Telegram-flavoured Markdown rendering of alerts.

use std::fmt::Write;

use crate::engine::scanner::{Mover, ScanSnapshot};
use crate::signals::sentiment::Sentiment;
use crate::types::{BreakoutAlert, Direction};

const SMART_MONEY_TAG: &str = " 🧠 SMART MONEY";

pub fn breakout_message(alert: &BreakoutAlert) -> String {
    let (icon, level_line) = match alert.direction {
        Direction::High => ("🚀", "📈 Prev High"),
        Direction::Low => ("🩸", "📉 Prev Low"),
    };
    format!(
        "{icon} *{}* BREAKS *{} {}*\n➡️ Price: ₹{:.2}\n{level_line}: ₹{:.2}",
        alert.symbol, alert.timeframe, alert.direction, alert.ltp, alert.level
    )
}

fn sentiment_banner(sentiment: Sentiment) -> &'static str {
    match sentiment {
        Sentiment::Bullish => "🟢 *BULLISH MARKET*",
        Sentiment::Bearish => "🔴 *BEARISH MARKET*",
        Sentiment::Sideways => "🟡 *SIDEWAYS MARKET*",
    }
}

fn push_ranked(out: &mut String, rows: &[Mover], dot: &str) {
    for (rank, m) in rows.iter().enumerate() {
        let tag = if m.smart_money { SMART_MONEY_TAG } else { "" };
        let _ = writeln!(
            out,
            "#{} {dot} *{}* | {:.2}% | ₹{:.2}{tag}",
            rank + 1,
            m.symbol,
            m.pct_change,
            m.ltp
        );
    }
}

/// Breadth block followed by the top `n` gainers and losers.
pub fn market_summary(snapshot: &ScanSnapshot, n: usize) -> String {
    let b = &snapshot.breadth;
    let mut out = String::new();

    let _ = write!(
        out,
        "📊 *MARKET SENTIMENT*\n🟢 Advancing: {}\n🔴 Declining: {}\n{}\n\n",
        b.advancing,
        b.declining,
        sentiment_banner(b.sentiment)
    );

    let _ = write!(out, "📊 *TOP {n} GAINERS*\n\n");
    push_ranked(&mut out, &snapshot.gainers[..snapshot.gainers.len().min(n)], "🟢");

    let _ = write!(out, "\n📉 *TOP {n} LOSERS*\n\n");
    push_ranked(&mut out, &snapshot.losers[..snapshot.losers.len().min(n)], "🔴");

    out
}
