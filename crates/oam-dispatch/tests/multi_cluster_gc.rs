//! Multi-cluster garbage collection. An Application placed onto two
//! clusters tracks one `TrackedResource` entry per placement; re-rendering
//! with a component dropped from only one cluster's desired set must orphan
//! that cluster's copy while leaving the other cluster's copy (same name,
//! different placement) alone, and must exempt shared resources from
//! deletion regardless of which cluster they're orphaned on.
//!
//! `Dispatcher::apply_plan` itself needs a live `kube::Client` per cluster,
//! so this exercises the same orphan-then-filter-shared decision it makes
//! (`ResourceTrackerSpec::orphans` plus the `shared` skip) directly against
//! fixture tracker state, the pure-data seam the decision is actually made at.

use oam_types::{PlacementDecision, ResourceOwner, ResourceTrackerSpec, TrackedResource};

fn tracked(placement: &PlacementDecision, kind: &str, name: &str, component: &str, shared: bool) -> TrackedResource {
    TrackedResource {
        placement: placement.clone(),
        api_version: "v1".into(),
        kind: kind.into(),
        name: name.into(),
        uid: Some(format!("{}-{}-uid", placement.cluster, name)),
        owner: ResourceOwner {
            component: component.into(),
            r#trait: None,
        },
        generation_applied: 1,
        shared,
    }
}

/// Mirrors `Dispatcher::apply_plan`'s garbage-collection pass: orphans not
/// carrying the shared marker are the ones that actually get deleted.
fn deletable_orphans<'a>(previous: &'a ResourceTrackerSpec, desired: &[TrackedResource]) -> Vec<&'a TrackedResource> {
    previous.orphans(desired).into_iter().filter(|entry| !entry.shared).collect()
}

#[test]
fn orphan_on_one_cluster_does_not_affect_the_same_named_resource_on_another() {
    let east = PlacementDecision {
        cluster: "east".into(),
        namespace: "default".into(),
    };
    let west = PlacementDecision {
        cluster: "west".into(),
        namespace: "default".into(),
    };

    let previous = ResourceTrackerSpec {
        application: "website".into(),
        entries: vec![
            tracked(&east, "Deployment", "frontend", "frontend", false),
            tracked(&west, "Deployment", "frontend", "frontend", false),
        ],
    };

    // `frontend` was dropped from the east cluster's desired set (e.g. a
    // topology policy now excludes it there) but is still wanted on west.
    let desired = vec![tracked(&west, "Deployment", "frontend", "frontend", false)];

    let orphans = deletable_orphans(&previous, &desired);
    assert_eq!(orphans.len(), 1);
    assert_eq!(orphans[0].placement.cluster, "east");
    assert_eq!(orphans[0].name, "frontend");
}

#[test]
fn shared_resource_is_exempt_from_deletion_even_when_orphaned() {
    let east = PlacementDecision {
        cluster: "east".into(),
        namespace: "default".into(),
    };

    let previous = ResourceTrackerSpec {
        application: "website".into(),
        entries: vec![
            tracked(&east, "ConfigMap", "shared-ca-bundle", "frontend", true),
            tracked(&east, "Deployment", "frontend", "frontend", false),
        ],
    };

    // Neither resource is desired any more (the component itself was
    // removed), but the ConfigMap carries the shared marker.
    let orphans = deletable_orphans(&previous, &[]);

    assert_eq!(orphans.len(), 1, "the shared ConfigMap must not be among the resources actually deleted");
    assert_eq!(orphans[0].name, "frontend");
}

#[test]
fn no_orphans_when_every_cluster_still_wants_its_resource() {
    let east = PlacementDecision {
        cluster: "east".into(),
        namespace: "default".into(),
    };
    let west = PlacementDecision {
        cluster: "west".into(),
        namespace: "default".into(),
    };

    let previous = ResourceTrackerSpec {
        application: "website".into(),
        entries: vec![
            tracked(&east, "Deployment", "frontend", "frontend", false),
            tracked(&west, "Deployment", "frontend", "frontend", false),
        ],
    };
    let desired = previous.entries.clone();

    assert!(deletable_orphans(&previous, &desired).is_empty());
}
