//! State management components
//!
//! Grid events, the invalidation each implies, and the dispatcher that
//! fans them out to subscribers.

pub mod dispatcher;
pub mod events;

pub use dispatcher::{GridSubscriber, StateDispatcher};
pub use events::{GridEvent, Invalidation, LayoutOp};
