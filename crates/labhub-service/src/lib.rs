//! # labhub-service
//!
//! The two coupled services at the heart of LabHub and the glue between
//! them:
//!
//! - [`SessionLifecycleManager`]: creates sessions and runs the phased
//!   countdown that streams status events to the session owner
//! - [`WaitingQueueCoordinator`]: FIFO waiting queues with live position
//!   updates and promotion signals over the pub/sub bus
//! - [`AdmissionService`]: admits a user immediately or after waiting
//! - [`PromotionListener`]: promotes the next waiter whenever a slot frees
//! - [`SessionSweeper`]: completes sessions abandoned past their end time

pub mod admission;
pub mod queue;
pub mod session;
pub mod signal;

pub use admission::{Admission, AdmissionService};
pub use queue::coordinator::{WaitOutcome, WaitingQueueCoordinator};
pub use queue::promotion::PromotionListener;
pub use session::hooks::SessionHooks;
pub use session::lifecycle::SessionLifecycleManager;
pub use session::sweeper::SessionSweeper;
