//! Integration tests for the social recovery engine.
//!
//! The tests live in the `tests` directory, one binary per area.
