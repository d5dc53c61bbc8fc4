//! Integration tests: full scan cycles against an in-memory broker.

mod mock_source;
mod scan_cycle;
