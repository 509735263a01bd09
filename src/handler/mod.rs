//! Request handling subsystem.
//!
//! # Data Flow
//! ```text
//! engine dispatch
//!     → chain.rs (ordered interceptor traversal)
//!         → factory.rs bootstrap (admission + deadline)
//!         → middleware interceptors (config order)
//!         → factory.rs route handlers
//!     → response assembled on the RequestContext
//!
//! admission.rs owns the concurrency ceiling and wait queue the
//! bootstrap interceptor consults before anything else runs.
//! ```
//!
//! # Design Decisions
//! - One immutable chain per route, composed at open time
//! - Elements short-circuit by flagging the context, not by panicking
//! - The admission permit spans the whole chain run, so the ceiling
//!   counts requests, not handler stages

pub mod admission;
pub mod chain;
pub mod factory;

pub use admission::{Admission, AdmissionGate, AdmissionPermit};
pub use chain::{interceptor_fn, BoxFuture, HandlerChain, Interceptor, Next};
pub use factory::{handler_fn, HandlerFactory, HandlerFn};
