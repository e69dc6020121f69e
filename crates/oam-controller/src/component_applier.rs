//! Bridges the Workflow Executor's `apply-component`/`deploy`/`deploy2env`
//! step types back into the render → policy → dispatch pipeline. The only
//! crate holding `oam-render`, `oam-policy`, and `oam-dispatch` alongside
//! `oam-workflow`, per `oam_workflow::component::ComponentApplier`'s own
//! reasoning for staying a narrow trait.

use std::sync::Arc;

use async_trait::async_trait;
use oam_dispatch::Dispatcher;
use oam_policy::{ClusterDirectory, PolicySet};
use oam_registry::DefinitionRegistry;
use oam_render::{RenderContext, RenderPlan, ReqwestProcessingClient};
use oam_types::{Component, PlacementDecision, ResourceTrackerSpec};
use oam_workflow::ComponentApplier;

/// One reconcile pass's worth of render context, bound once and reused for
/// every `apply-component`/`deploy`/`deploy2env` step the workflow runs
/// that tick.
pub struct ComponentApplierImpl {
    pub app_name: String,
    pub namespace: String,
    pub app_revision: String,
    pub app_revision_num: i64,
    pub generation: i64,
    pub registry: Arc<DefinitionRegistry>,
    pub policies: PolicySet,
    pub default_placements: Vec<PlacementDecision>,
    /// Effective components after the default `override` policy pass,
    /// independent of any env-binding override.
    pub components: Vec<Component>,
    pub dispatcher: Arc<Dispatcher>,
    pub processing_client: Arc<ReqwestProcessingClient>,
    pub cluster_directory: Arc<dyn ClusterDirectory + Send + Sync>,
}

impl ComponentApplierImpl {
    fn effective_for_env(&self, env: Option<&str>) -> Result<(Vec<Component>, Vec<PlacementDecision>), String> {
        let Some(env_name) = env else {
            return Ok((self.components.clone(), self.default_placements.clone()));
        };
        let env_config = self
            .policies
            .env(env_name)
            .ok_or_else(|| format!("unknown env-binding env {env_name:?}"))?;
        let components = env_config
            .effective_components(env_name, &self.components)
            .map_err(|err| err.to_string())?;
        let placements = env_config.placements(&self.namespace, self.cluster_directory.as_ref());
        Ok((components, placements))
    }

    async fn apply_named(&self, names: &[String], env: Option<&str>) -> Result<serde_json::Value, String> {
        let (components, placements) = self.effective_for_env(env)?;

        let resolved = oam_render::resolve(&components, &self.registry).await.map_err(|err| err.to_string())?;
        let ctx = RenderContext {
            application_name: &self.app_name,
            namespace: &self.namespace,
            app_revision: &self.app_revision,
            app_revision_num: self.app_revision_num,
            processing_client: self.processing_client.as_ref(),
        };
        let renders = oam_render::render_components(&resolved, &ctx).await.map_err(|err| err.to_string())?;
        let selected = if names.is_empty() {
            renders
        } else {
            renders.into_iter().filter(|render| names.contains(&render.name)).collect()
        };

        let plan = RenderPlan { components: selected, placements };
        let is_shared = |name: &str| self.policies.is_shared(name);
        // A scoped apply never garbage-collects: the previous tracker is
        // empty, so the dispatcher has nothing to diff against and orphans
        // nothing. Whole-Application GC is the main reconcile's job.
        let previous = ResourceTrackerSpec {
            application: self.app_name.clone(),
            entries: Vec::new(),
        };

        let tracker = self
            .dispatcher
            .apply_plan(&self.app_name, self.generation, &plan, &previous, &is_shared, 5)
            .await
            .map_err(|err| err.to_string())?;

        serde_json::to_value(tracker).map_err(|err| err.to_string())
    }
}

#[async_trait]
impl ComponentApplier for ComponentApplierImpl {
    async fn apply_component(&self, component: &str, env: Option<&str>) -> Result<serde_json::Value, String> {
        let names = [component.to_owned()];
        self.apply_named(&names, env).await
    }

    async fn deploy(&self, components: &[String], env: Option<&str>) -> Result<serde_json::Value, String> {
        self.apply_named(components, env).await
    }
}
