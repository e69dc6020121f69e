//! The Status Aggregator: computes `Application.status` from
//! observed cluster state, by re-evaluating the `healthPolicy`/
//! `customStatus`/`status.details` blocks `oam-render` captured as
//! [`oam_render::StatusContext`]s against freshly read live resources.
//!
//! Deliberately decoupled from the render pipeline itself: this crate only
//! ever reads (`oam_dispatch::ResourceClient::read`/`list`), never applies.

pub mod aggregate;
pub mod error;
pub mod health;

pub use aggregate::aggregate;
pub use error::{Error, Result};
pub use health::{Evaluation, Health};
