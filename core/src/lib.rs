//! FormGate domain crate.
//!
//! Operators define multi-step branching intake forms, bind them to
//! time-bound offerings with limited-stock add-ons, and collect public
//! submissions without overselling. This crate holds the domain model and the
//! intake pipeline:
//!
//! - [`form`] — the directed-graph step model and answer-driven traversal
//! - [`inventory`] — stock counter arithmetic and provisioning scans
//! - [`ratelimit`] — the process-local fixed-window rate limiter
//! - [`submission`] — submission records and payload validation
//! - [`store`] / [`audit`] — dyn-compatible seams the backends implement
//! - [`intake`] — the pipeline orchestrating a submission end to end
//!
//! No database or HTTP dependencies live here; `formgate-postgres` implements
//! the store traits and `formgate-server` exposes the HTTP surface.

pub mod audit;
pub mod clock;
pub mod form;
pub mod intake;
pub mod inventory;
pub mod ratelimit;
pub mod store;
pub mod submission;
pub mod types;

pub use clock::{Clock, SystemClock};
pub use intake::{FormView, IntakeError, IntakePipeline};
