//! Core engine: the quote → candles → signals → snapshot loop.

pub mod candles;
pub mod clock;
pub mod runner;
pub mod scanner;
