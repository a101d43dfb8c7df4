//! Per-unit signal setup and teardown
//!
//! Each new unit gets its signal mask arranged before guest code runs, and
//! an exiting unit has its mask closed down before the irreversible host
//! termination call.

cfg_if::cfg_if! {
    if #[cfg(unix)] {
        mod unix;
        pub use unix::*;
    }
}
