#![allow(dead_code)]

pub use dfu_harness_test_utils::{FakeTool, dead_pid, init_tracing, with_timeout};
