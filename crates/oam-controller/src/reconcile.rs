//! The Application reconcile loop: resolves components against the
//! Definition Registry, evaluates policies, renders, dispatches (or drives
//! the workflow), aggregates status, and records revisions — one pass per
//! `kube::runtime::Controller` invocation. Deletion teardown runs through
//! the same `kube::runtime::finalizer` wrapper every reconcile does.

use std::sync::Arc;
use std::time::Duration;

use jiff::Timestamp;
use kube::api::{Api, ObjectMeta, Patch, PatchParams};
use kube::runtime::controller::Action;
use kube::runtime::finalizer::{Event, finalizer};
use kube::{Resource, ResourceExt};
use oam_core::kvp::{PUBLISH_VERSION_ANNOTATION, RESTART_WORKFLOW_ANNOTATION};
use oam_core::time::{self, RestartSchedule};
use oam_dispatch::ResourceClient;
use oam_policy::PolicySet;
use oam_render::{RenderContext, RenderPlan};
use oam_types::{Application, ApplicationPhase, ApplicationStatus, PlacementDecision, ResourceTracker, ResourceTrackerSpec, WorkflowState, WorkflowStep};
use oam_workflow::{ConfigStore, Handles, HttpClient, WorkflowExecutor};
use snafu::ResultExt;

use crate::component_applier::ComponentApplierImpl;
use crate::context::Context;
use crate::error::{self, AnnotationSnafu, DispatchSnafu, Error, KubeSnafu, OwnerReferenceSnafu, PolicySnafu, RenderSnafu, StatusSnafu, WorkflowSnafu};
use crate::revision;

const FINALIZER: &str = "oam.dev/application-controller";
const FIELD_MANAGER: &str = "oam-controller";

pub async fn reconcile(application: Arc<Application>, ctx: Arc<Context>) -> error::Result<Action> {
    let namespace = application.namespace().ok_or_else(|| Error::MissingNamespace {
        name: application.name_any(),
    })?;
    let apps: Api<Application> = Api::namespaced(ctx.client.clone(), &namespace);

    finalizer(&apps, FINALIZER, application, |event| async {
        match event {
            Event::Apply(application) => apply(application, &ctx).await,
            Event::Cleanup(application) => cleanup(application, &ctx).await,
        }
    })
    .await
    .map_err(|source| Error::Finalizer { source: Box::new(source) })
}

pub fn error_policy(_application: Arc<Application>, error: &Error, _ctx: Arc<Context>) -> Action {
    tracing::warn!(%error, "reconcile failed, requeuing with backoff");
    Action::requeue(Duration::from_secs(30))
}

async fn apply(application: Arc<Application>, ctx: &Context) -> error::Result<Action> {
    let namespace = application.namespace().ok_or_else(|| Error::MissingNamespace {
        name: application.name_any(),
    })?;
    let app_name = application.name_any();
    let now = Timestamp::now();

    let mut status = application.status.clone().unwrap_or_default();
    let restarted = decide_restart(&application, &mut status, now)?;

    let policies = PolicySet::parse(&application.spec.policies).context(PolicySnafu)?;
    let effective_components = policies
        .effective_components(&application.spec.components)
        .context(PolicySnafu)?;
    let default_placements = policies.placements(&namespace, ctx.cluster_directory.as_ref());

    let resolved = oam_render::resolve(&effective_components, &ctx.registry)
        .await
        .context(RenderSnafu)?;
    let resolved_defs = revision::resolved_definitions(&resolved);
    let content_hash = oam_types::ApplicationRevisionSpec::content_hash(&application.spec, &resolved_defs);

    // A new Revision is recorded whenever the spec (plus the Definitions it
    // resolved against) actually changed, and also whenever a restart was
    // just decided — a `publish-version` bump alone doesn't move the
    // content hash, since annotations live outside `ApplicationSpec`, but
    // it still means "treat this as a new deployment".
    if restarted || status.latest_revision_hash.as_deref() != Some(content_hash.as_str()) {
        let next_number = revision::parse_revision_number(status.latest_revision.as_deref()) + 1;
        let (name, hash) = revision::record_revision(
            &ctx.client,
            &application,
            &application.spec,
            resolved_defs,
            next_number,
        )
        .await?;
        status.latest_revision = Some(name);
        status.latest_revision_hash = Some(hash);
    }

    let app_revision_name = status.latest_revision.clone().unwrap_or_else(|| app_name.clone());
    let app_revision_num = revision::parse_revision_number(status.latest_revision.as_deref());

    let render_ctx = RenderContext {
        application_name: &app_name,
        namespace: &namespace,
        app_revision: &app_revision_name,
        app_revision_num,
        processing_client: ctx.processing_client.as_ref(),
    };
    let component_renders = oam_render::render_components(&resolved, &render_ctx)
        .await
        .context(RenderSnafu)?;
    let plan = RenderPlan {
        components: component_renders,
        placements: default_placements.clone(),
    };

    let steps: &[WorkflowStep] = application
        .spec
        .workflow
        .as_ref()
        .map(|workflow| workflow.steps.as_slice())
        .unwrap_or(&[]);

    // With no workflow steps, components deploy straight to their topology
    // placements and the Resource Tracker owns garbage collection. With
    // steps, the workflow itself decides what gets applied and when —
    // scoped applies never touch the shared tracker (see
    // `ComponentApplierImpl::apply_named`), so nothing here orphans
    // anything a workflow step hasn't gotten to yet.
    if steps.is_empty() {
        let previous_tracker = fetch_tracker(&ctx.client, &namespace, &app_name).await?;
        let is_shared = |name: &str| policies.is_shared(name);
        let tracker = ctx
            .dispatcher
            .apply_plan(&app_name, app_revision_num, &plan, &previous_tracker, &is_shared, ctx.opts.dispatch_parallelism)
            .await
            .context(DispatchSnafu)?;
        persist_tracker(&ctx.client, &application, &namespace, &app_name, tracker).await?;
        status.workflow = None;
    } else {
        let component_applier = Arc::new(ComponentApplierImpl {
            app_name: app_name.clone(),
            namespace: namespace.clone(),
            app_revision: app_revision_name.clone(),
            app_revision_num,
            generation: app_revision_num,
            registry: Arc::clone(&ctx.registry),
            policies: policies.clone(),
            default_placements: default_placements.clone(),
            components: effective_components.clone(),
            dispatcher: Arc::clone(&ctx.dispatcher),
            processing_client: Arc::clone(&ctx.processing_client),
            cluster_directory: Arc::clone(&ctx.cluster_directory),
        });
        let resources: Arc<dyn ResourceClient> = Arc::clone(&ctx.dispatcher);
        let http: Arc<dyn HttpClient> = Arc::clone(&ctx.http_client);
        let handles = Handles {
            resources: Arc::clone(&resources),
            http,
            components: component_applier,
            configs: ConfigStore::new(resources),
        };
        let default_placement = default_placements
            .first()
            .cloned()
            .unwrap_or_else(|| PlacementDecision::control_plane(&namespace));
        let executor = WorkflowExecutor::new(&handles, default_placement, ctx.opts.workflow_parallelism);

        let mut workflow_state = status.workflow.clone().unwrap_or_default();
        executor
            .tick(steps, &mut workflow_state, now)
            .await
            .context(WorkflowSnafu)?;
        status.workflow = Some(workflow_state);
    }

    let workflow_for_status = status.workflow.clone();
    let new_status = oam_status::aggregate(&plan, ctx.dispatcher.as_ref(), workflow_for_status.as_ref(), Some(&status), now)
        .await
        .context(StatusSnafu)?;

    patch_status(&ctx.client, &namespace, &app_name, &new_status).await?;
    revision::garbage_collect(&ctx.client, &namespace, &app_name, ctx.opts.revision_history_limit).await?;

    let action = if new_status.status == ApplicationPhase::Running {
        Action::requeue(Duration::from_secs(60))
    } else {
        Action::requeue(Duration::from_secs(10))
    };
    Ok(action)
}

async fn cleanup(application: Arc<Application>, ctx: &Context) -> error::Result<Action> {
    let namespace = application.namespace().ok_or_else(|| Error::MissingNamespace {
        name: application.name_any(),
    })?;
    let app_name = application.name_any();

    let tracker = fetch_tracker(&ctx.client, &namespace, &app_name).await?;
    let empty_plan = RenderPlan::default();
    // A component name never matters here: the plan is empty, so
    // `apply_plan` only ever diffs `tracker` against nothing and deletes —
    // except entries already marked `shared`, which it always leaves alone
    // regardless of this closure, since another Application may still
    // depend on them.
    let is_shared = |_: &str| false;
    ctx.dispatcher
        .apply_plan(&app_name, 0, &empty_plan, &tracker, &is_shared, ctx.opts.dispatch_parallelism)
        .await
        .context(DispatchSnafu)?;

    let trackers: Api<ResourceTracker> = Api::namespaced(ctx.client.clone(), &namespace);
    match trackers.delete(&app_name, &kube::api::DeleteParams::default()).await {
        Ok(_) => {}
        Err(kube::Error::Api(response)) if response.code == 404 => {}
        Err(source) => return Err(Error::Kube { source }),
    }

    Ok(Action::await_change())
}

/// Resolves the `publish-version`/`restart-workflow` tie-break: a changed
/// `publish-version` always wins. When a recurring or one-shot
/// `restart-workflow` schedule is independently due in the same tick, its
/// bookkeeping (`applied_restart_schedule`, `workflow.restart_reference`)
/// still advances as if it had fired on its own — so it does not also fire
/// moments later and restart the workflow a second time, and a recurring
/// schedule's next instant is computed from *this* restart rather than
/// compounding forward from wherever it was last anchored.
fn decide_restart(application: &Application, status: &mut ApplicationStatus, now: Timestamp) -> error::Result<bool> {
    let annotations = application.annotations();
    let new_publish_version = annotations.get(PUBLISH_VERSION_ANNOTATION).cloned();
    let publish_version_changed = new_publish_version != status.observed_publish_version;

    let raw_restart = annotations.get(RESTART_WORKFLOW_ANNOTATION);
    let restart_due = match raw_restart {
        Some(raw) => {
            let schedule = time::parse_restart_schedule(raw).context(AnnotationSnafu {
                application: application.name_any(),
                annotation: RESTART_WORKFLOW_ANNOTATION,
            })?;
            let reference = status
                .workflow
                .as_ref()
                .and_then(|workflow| workflow.restart_reference.as_ref())
                .map(time::from_k8s_time)
                .or_else(|| application.creation_timestamp().as_ref().map(time::from_k8s_time))
                .unwrap_or(now);

            let due = match schedule {
                RestartSchedule::At(instant) => now >= instant,
                RestartSchedule::After(duration) | RestartSchedule::Every(duration) => jiff::Span::try_from(duration)
                    .ok()
                    .and_then(|span| reference.checked_add(span).ok())
                    .is_some_and(|threshold| now >= threshold),
            };
            let one_shot = matches!(schedule, RestartSchedule::At(_) | RestartSchedule::After(_));
            let already_applied = one_shot && status.applied_restart_schedule.as_deref() == Some(raw.as_str());
            due && !already_applied
        }
        None => false,
    };

    let should_restart = publish_version_changed || restart_due;

    status.observed_publish_version = new_publish_version;
    if restart_due {
        if let Some(raw) = raw_restart {
            status.applied_restart_schedule = Some(raw.clone());
        }
    }

    if should_restart {
        status.workflow = Some(WorkflowState {
            restart_reference: Some(time::to_k8s_time(now)),
            ..Default::default()
        });
    }

    Ok(should_restart)
}

async fn fetch_tracker(client: &kube::Client, namespace: &str, app_name: &str) -> error::Result<ResourceTrackerSpec> {
    let api: Api<ResourceTracker> = Api::namespaced(client.clone(), namespace);
    match api.get_opt(app_name).await.context(KubeSnafu)? {
        Some(tracker) => Ok(tracker.spec),
        None => Ok(ResourceTrackerSpec {
            application: app_name.to_owned(),
            entries: Vec::new(),
        }),
    }
}

async fn persist_tracker(
    client: &kube::Client,
    application: &Application,
    namespace: &str,
    app_name: &str,
    spec: ResourceTrackerSpec,
) -> error::Result<()> {
    let owner = application.controller_owner_ref(&()).context(OwnerReferenceSnafu {
        name: app_name.to_owned(),
    })?;
    let tracker = ResourceTracker {
        metadata: ObjectMeta {
            name: Some(app_name.to_owned()),
            namespace: Some(namespace.to_owned()),
            owner_references: Some(vec![owner]),
            ..Default::default()
        },
        spec,
    };
    let api: Api<ResourceTracker> = Api::namespaced(client.clone(), namespace);
    api.patch(app_name, &PatchParams::apply(FIELD_MANAGER).force(), &Patch::Apply(&tracker))
        .await
        .context(KubeSnafu)?;
    Ok(())
}

async fn patch_status(client: &kube::Client, namespace: &str, app_name: &str, status: &ApplicationStatus) -> error::Result<()> {
    let apps: Api<Application> = Api::namespaced(client.clone(), namespace);
    let patch = serde_json::json!({ "status": status });
    apps.patch_status(app_name, &PatchParams::apply(FIELD_MANAGER), &Patch::Merge(patch))
        .await
        .context(KubeSnafu)?;
    Ok(())
}
