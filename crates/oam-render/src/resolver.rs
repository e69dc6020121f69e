//! Parses an `ApplicationSpec` into an ordered, definition-resolved shape:
//! components sorted so every `dependsOn` predecessor renders before its
//! dependents, each paired with its resolved ComponentDefinition, and each
//! trait paired with its resolved TraitDefinition after compatibility and
//! conflict checks.

use std::collections::{HashMap, HashSet};

use indexmap::IndexMap;
use oam_registry::{DefinitionKind, DefinitionRegistry, StoredDefinition};
use oam_types::{Component, ComponentDefinitionSpec, ComponentTrait, TraitDefinitionSpec};

use crate::error::{Error, Result};

pub struct ResolvedTrait {
    pub component_trait: ComponentTrait,
    pub definition: TraitDefinitionSpec,
}

pub struct ResolvedComponent {
    pub component: Component,
    pub definition: ComponentDefinitionSpec,
    pub traits: Vec<ResolvedTrait>,
}

/// A parsed Application: components in dependency order, each resolved
/// against the Definition Registry.
pub struct ResolvedApplication {
    pub order: Vec<String>,
    pub components: IndexMap<String, ResolvedComponent>,
}

pub async fn resolve(
    components: &[Component],
    registry: &DefinitionRegistry,
) -> Result<ResolvedApplication> {
    let order = topological_order(components)?;

    let mut resolved = IndexMap::with_capacity(components.len());
    for component in components {
        let definition = fetch_component_definition(registry, component).await?;
        let workload_kind = workload_kind_of(&definition);

        let mut traits = Vec::with_capacity(component.traits.len());
        for component_trait in &component.traits {
            let trait_definition = fetch_trait_definition(registry, component, component_trait).await?;
            if !trait_definition.applies_to(&workload_kind) {
                return Err(Error::TraitNotApplicable {
                    component: component.name.clone(),
                    trait_type: component_trait.trait_type.clone(),
                    workload_kind,
                });
            }
            check_conflicts(component, component_trait, &trait_definition, &traits)?;
            traits.push(ResolvedTrait {
                component_trait: component_trait.clone(),
                definition: trait_definition,
            });
        }

        resolved.insert(
            component.name.clone(),
            ResolvedComponent {
                component: component.clone(),
                definition,
                traits,
            },
        );
    }

    Ok(ResolvedApplication {
        order,
        components: resolved,
    })
}

/// Kahn's algorithm over `dependsOn` edges: predecessors come out first.
/// A component left unvisited once the queue drains is part of a cycle.
fn topological_order(components: &[Component]) -> Result<Vec<String>> {
    let names: HashSet<&str> = components.iter().map(|c| c.name.as_str()).collect();

    for component in components {
        for dependency in &component.depends_on {
            if !names.contains(dependency.as_str()) {
                return Err(Error::UnknownDependency {
                    component: component.name.clone(),
                    depends_on: dependency.clone(),
                });
            }
        }
    }

    let mut in_degree: HashMap<&str, usize> = components.iter().map(|c| (c.name.as_str(), 0)).collect();
    let mut dependents: HashMap<&str, Vec<&str>> = HashMap::new();
    for component in components {
        for dependency in &component.depends_on {
            *in_degree.get_mut(component.name.as_str()).unwrap() += 1;
            dependents
                .entry(dependency.as_str())
                .or_default()
                .push(component.name.as_str());
        }
    }

    let mut queue: Vec<&str> = components
        .iter()
        .map(|c| c.name.as_str())
        .filter(|name| in_degree[name] == 0)
        .collect();
    queue.sort_unstable();

    let mut order = Vec::with_capacity(components.len());
    let mut cursor = 0;
    while cursor < queue.len() {
        let name = queue[cursor];
        cursor += 1;
        order.push(name.to_owned());

        let mut newly_ready = Vec::new();
        if let Some(children) = dependents.get(name) {
            for &child in children {
                let degree = in_degree.get_mut(child).unwrap();
                *degree -= 1;
                if *degree == 0 {
                    newly_ready.push(child);
                }
            }
        }
        newly_ready.sort_unstable();
        queue.extend(newly_ready);
    }

    if order.len() != components.len() {
        let stuck = components
            .iter()
            .map(|c| c.name.as_str())
            .find(|name| !order.contains(&(*name).to_owned()))
            .unwrap_or_default();
        return Err(Error::DependencyCycle {
            component: stuck.to_owned(),
        });
    }

    Ok(order)
}

async fn fetch_component_definition(
    registry: &DefinitionRegistry,
    component: &Component,
) -> Result<ComponentDefinitionSpec> {
    let stored = registry
        .get(DefinitionKind::Component, &component.component_type, None)
        .await
        .map_err(|_| Error::DefinitionMissing {
            component: component.name.clone(),
            type_name: component.component_type.clone(),
        })?;
    match stored.spec {
        oam_registry::DefinitionSpec::Component(spec) => Ok(spec),
        _ => unreachable!("registry indexes Component definitions separately from other kinds"),
    }
}

async fn fetch_trait_definition(
    registry: &DefinitionRegistry,
    component: &Component,
    component_trait: &ComponentTrait,
) -> Result<TraitDefinitionSpec> {
    let stored: StoredDefinition = registry
        .get(DefinitionKind::Trait, &component_trait.trait_type, None)
        .await
        .map_err(|_| Error::DefinitionMissing {
            component: component.name.clone(),
            type_name: component_trait.trait_type.clone(),
        })?;
    match stored.spec {
        oam_registry::DefinitionSpec::Trait(spec) => Ok(spec),
        _ => unreachable!("registry indexes Trait definitions separately from other kinds"),
    }
}

fn workload_kind_of(definition: &ComponentDefinitionSpec) -> String {
    definition
        .workload
        .definition
        .as_ref()
        .map(|gvk| gvk.kind.clone())
        .or_else(|| definition.workload.r#type.clone())
        .unwrap_or_default()
}

fn check_conflicts(
    component: &Component,
    incoming: &ComponentTrait,
    incoming_definition: &TraitDefinitionSpec,
    already_resolved: &[ResolvedTrait],
) -> Result<()> {
    for existing in already_resolved {
        let existing_conflicts = existing
            .definition
            .conflicts_with
            .iter()
            .any(|name| name == &incoming.trait_type);
        let incoming_conflicts = incoming_definition
            .conflicts_with
            .iter()
            .any(|name| name == &existing.component_trait.trait_type);
        if existing_conflicts || incoming_conflicts {
            return Err(Error::TraitConflict {
                component: component.name.clone(),
                first: existing.component_trait.trait_type.clone(),
                second: incoming.trait_type.clone(),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use oam_types::{Schematic, WorkloadGroupVersionKind, WorkloadTypeDescriptor};

    fn component(name: &str, depends_on: &[&str]) -> Component {
        Component {
            name: name.to_owned(),
            component_type: "webservice".to_owned(),
            properties: Default::default(),
            traits: Vec::new(),
            depends_on: depends_on.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn independent_components_sort_deterministically_by_name() {
        let components = vec![component("b", &[]), component("a", &[])];
        let order = topological_order(&components).unwrap();
        assert_eq!(order, vec!["a", "b"]);
    }

    #[test]
    fn dependents_sort_after_their_dependency() {
        let components = vec![component("web", &["db"]), component("db", &[])];
        let order = topological_order(&components).unwrap();
        assert_eq!(order, vec!["db", "web"]);
    }

    #[test]
    fn unknown_dependency_is_rejected() {
        let components = vec![component("web", &["missing"])];
        let err = topological_order(&components).unwrap_err();
        assert!(matches!(err, Error::UnknownDependency { .. }));
    }

    #[test]
    fn cycle_is_detected() {
        let components = vec![component("a", &["b"]), component("b", &["a"])];
        let err = topological_order(&components).unwrap_err();
        assert!(matches!(err, Error::DependencyCycle { .. }));
    }

    fn trait_def(applies_to: &[&str], conflicts_with: &[&str]) -> TraitDefinitionSpec {
        TraitDefinitionSpec {
            version: "1.0.0".into(),
            applies_to_workloads: applies_to.iter().map(|s| s.to_string()).collect(),
            conflicts_with: conflicts_with.iter().map(|s| s.to_string()).collect(),
            pod_disruptive: false,
            schematic: Schematic { template: "patch: {}".into() },
            status: None,
        }
    }

    #[test]
    fn conflicting_traits_on_the_same_component_are_rejected() {
        let web = component("web", &[]);
        let scaler = ComponentTrait {
            trait_type: "scaler".into(),
            properties: Default::default(),
        };
        let sidecar = ComponentTrait {
            trait_type: "sidecar".into(),
            properties: Default::default(),
        };
        let already = vec![ResolvedTrait {
            component_trait: scaler,
            definition: trait_def(&["*"], &["sidecar"]),
        }];
        let err = check_conflicts(&web, &sidecar, &trait_def(&["*"], &[]), &already).unwrap_err();
        assert!(matches!(err, Error::TraitConflict { .. }));
    }

    #[test]
    fn wildcard_component_definition_reports_empty_workload_kind_when_untyped() {
        let definition = ComponentDefinitionSpec {
            version: "1.0.0".into(),
            workload: WorkloadTypeDescriptor {
                definition: Some(WorkloadGroupVersionKind {
                    api_version: "apps/v1".into(),
                    kind: "Deployment".into(),
                }),
                r#type: None,
            },
            schematic: Schematic { template: String::new() },
            status: None,
        };
        assert_eq!(workload_kind_of(&definition), "Deployment");
    }
}
