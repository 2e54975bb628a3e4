//! End-to-end smoke tests for the gateway live under `tests/`; this crate has no runtime code.
