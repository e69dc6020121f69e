//! `RenderPlan`: the in-memory set of resources produced by rendering all
//! components and traits, not persisted as primary state — the Dispatcher
//! consumes it directly and records what it applied in the
//! `ResourceTracker`.

use indexmap::IndexMap;
use oam_expr::ast::RecordField;
use oam_types::{PlacementDecision, ResourceOwner};

/// Where a rendered resource came from: a component's primary workload, or
/// one of its traits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceOrigin {
    pub component: String,
    pub r#trait: Option<String>,
}

impl From<ResourceOrigin> for ResourceOwner {
    fn from(origin: ResourceOrigin) -> Self {
        ResourceOwner {
            component: origin.component,
            r#trait: origin.r#trait,
        }
    }
}

/// One rendered resource: a full Kubernetes-shaped manifest plus the
/// bookkeeping the Dispatcher and Tracker need.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedResource {
    pub origin: ResourceOrigin,
    /// Stable logical name distinguishing multiple resources from one
    /// trait/component (`output` itself, or an `outputs.<key>` name).
    pub logical_name: String,
    pub workload_type: Option<String>,
    pub manifest: serde_json::Value,
    /// True when this resource's `metadata.namespace` differs from the
    /// Application's own namespace: cross-namespace outputs are recorded
    /// specially in the tracker rather than assumed co-located.
    pub cross_namespace: bool,
}

/// The evaluated `healthPolicy`/`customStatus`/`status.details` blocks of one
/// Definition, bundled with the scope they were rendered against, so the
/// status aggregator can re-evaluate them read-only on every reconcile
/// without re-running the render pipeline.
#[derive(Debug, Clone, Default)]
pub struct StatusContext {
    pub health_policy: Option<Vec<RecordField>>,
    pub custom_status: Option<Vec<RecordField>>,
    pub status_details: Option<Vec<RecordField>>,
    pub scope: oam_expr::Scope,
}

impl StatusContext {
    /// Rebinds `context.output`/`context.outputs` to freshly observed cluster
    /// state before re-evaluating `healthPolicy`/`customStatus`/`details`.
    /// The scope captured at render time still holds the manifest as it was
    /// rendered, before the apply; healthiness checks need the live object.
    #[must_use]
    pub fn with_live_output(&self, live_output: oam_expr::Value, live_outputs: oam_expr::Value) -> oam_expr::Scope {
        let updated = match self.scope.get("context") {
            Some(oam_expr::Value::Record(fields)) => {
                let mut fields = fields.clone();
                fields.insert("output".to_owned(), live_output);
                fields.insert("outputs".to_owned(), live_outputs);
                oam_expr::Value::Record(fields)
            }
            _ => oam_expr::Value::Record(indexmap::IndexMap::new()),
        };
        self.scope.clone().bind("context", updated)
    }
}

/// Everything rendered for one component: its primary workload plus every
/// auxiliary resource contributed by itself and its traits.
#[derive(Debug, Clone, Default)]
pub struct ComponentRender {
    pub name: String,
    pub workload_type: String,
    pub workload: Option<RenderedResource>,
    pub auxiliary: Vec<RenderedResource>,
    pub component_status: Option<StatusContext>,
    pub trait_statuses: IndexMap<String, StatusContext>,
}

impl ComponentRender {
    pub fn all_resources(&self) -> impl Iterator<Item = &RenderedResource> {
        self.workload.iter().chain(self.auxiliary.iter())
    }
}

/// The full render plan for one reconcile pass: per-component renders,
/// replicated across every placement decision the Policy Engine produced.
#[derive(Debug, Clone, Default)]
pub struct RenderPlan {
    pub components: Vec<ComponentRender>,
    pub placements: Vec<PlacementDecision>,
}

impl RenderPlan {
    /// Every rendered resource, paired with every placement it should be
    /// applied to — the flattened view the Dispatcher iterates over.
    pub fn resources_by_placement(
        &self,
    ) -> impl Iterator<Item = (&PlacementDecision, &ComponentRender, &RenderedResource)> {
        self.placements.iter().flat_map(move |placement| {
            self.components
                .iter()
                .flat_map(move |component| component.all_resources().map(move |r| (placement, component, r)))
        })
    }
}
