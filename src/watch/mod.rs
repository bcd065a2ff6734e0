// src/watch/mod.rs

//! File watching used to detect daemon completion.
//!
//! The daemon gives no usable exit signal, so "done" is inferred from the
//! log file it writes: first wait for the file to appear, then wait for its
//! content to contain a termination marker.

pub mod completion;

pub use completion::{CompletionWatch, WatchPhase};
