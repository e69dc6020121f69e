//! The render+policy+dispatch surface the `apply-component`/`deploy`/
//! `deploy2env` step types need. Implemented by `oam-controller`, the only
//! crate holding `oam-render` and `oam-policy` alongside dispatch — kept as
//! a narrow trait here, mirroring [`oam_dispatch::ResourceClient`] and
//! [`crate::http::HttpClient`], so `oam-workflow` never depends on rendering
//! or policy evaluation directly.

use async_trait::async_trait;

#[async_trait]
pub trait ComponentApplier: Send + Sync {
    /// Renders and applies a single named component, optionally against an
    /// environment override from a `deploy2env`-style step. Returns the
    /// applied view, for the step to expose through `outputs`.
    async fn apply_component(&self, component: &str, env: Option<&str>) -> Result<serde_json::Value, String>;

    /// Renders and applies every component the Application resolves to,
    /// restricted to `components` when non-empty, honoring the
    /// Application's topology/env-binding policies.
    async fn deploy(&self, components: &[String], env: Option<&str>) -> Result<serde_json::Value, String>;
}
