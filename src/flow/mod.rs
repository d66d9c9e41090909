//! Notification delivery.
//!
//! - [`dispatch`]: Named-channel publish/subscribe bus with per-target removal

pub mod dispatch;

pub use dispatch::{EventDispatcher, Notification, NotificationData, TargetId};
