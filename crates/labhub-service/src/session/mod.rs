//! Session creation, the phased countdown, and terminal bookkeeping.

pub mod hooks;
pub mod lifecycle;
pub mod sweeper;

mod finalizer;
