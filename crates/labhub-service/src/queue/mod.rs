//! Waiting queues and promotion.

pub mod coordinator;
pub mod promotion;
