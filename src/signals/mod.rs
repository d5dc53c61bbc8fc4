//! Signal derivation.
//!
//! Pure, I/O-free classifiers that turn candles and quotes into signals:
//! gap classification, range tiers, multi-timeframe breakouts (with their
//! break memory), smart-money expansion, breadth/ranking and the session
//! volume profile.

pub mod timeframe;
pub mod gap;
pub mod range;
pub mod breakout;
pub mod smart_money;
pub mod sentiment;
pub mod volume;

pub use breakout::{BreakMemory, BreakoutDetector, ResetPolicy};
pub use gap::{GapClassifier, GapKind, GapReading, PriorSession};
pub use range::{RangeBuckets, Side, Tier};
pub use sentiment::{Breadth, Sentiment};
pub use smart_money::{SmartMoneyConfig, SmartMoneyEvaluator, SmartMoneyVerdict};
pub use timeframe::TimeframeSpec;
pub use volume::{VolumeProfile, VolumeThresholds};
