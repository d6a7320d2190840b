//! Background tasks for the queue service.
//!
//! # Tasks
//!
//! - `qr_rotation` - Rotates check-in tokens of ready students
//! - `no_show_sweeper` - Times out ready students who never checked in
//! - `generic_sweeper` - Shared interval loop used by both

pub mod generic_sweeper;
pub mod no_show_sweeper;
pub mod qr_rotation;

pub use no_show_sweeper::start_no_show_sweeper;
pub use qr_rotation::start_qr_rotation;
