//! User-facing side of the ORBIT realtime client.
//!
//! [`RealtimeUpdates`] follows the signed-in session and owns its
//! connection; a [`Dispatcher`] turns each inbound message into at most one
//! [`Notification`] in the [`NotificationCenter`] and forwards document
//! updates to the application.

pub mod binding;
pub mod center;
pub mod dispatcher;

pub use binding::RealtimeUpdates;
pub use center::{DismissReason, Level, Notification, NotificationCenter, NotificationEvent};
pub use dispatcher::{Dispatcher, DocumentUpdateHandler};
