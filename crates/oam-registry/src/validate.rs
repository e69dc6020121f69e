//! Definition validation rules: trait `appliesToWorkloads`, component
//! `workload` descriptor, and the `healthPolicy`/`customStatus`/
//! `status.details` shape constraints.

use crate::{DefinitionSpec, Result};
use crate::error::{MissingRequiredAttributeSnafu, SchemaParseSnafu};
use snafu::ResultExt;

/// Fields nested under `status.details` may be primitive, a reference, or a
/// call — but local helper fields (whose name starts with this prefix) may
/// hold anything, including structs and lists.
pub const LOCAL_PREFIX: char = '$';

pub fn validate(spec: &DefinitionSpec) -> Result<()> {
    oam_expr::parse_template(spec.template()).context(SchemaParseSnafu {
        name: spec.version().to_owned(),
    })?;

    match spec {
        DefinitionSpec::Component(component) => validate_component(component),
        DefinitionSpec::Trait(r#trait) => validate_trait(r#trait),
        DefinitionSpec::WorkflowStep(_) => Ok(()),
    }
}

fn validate_component(spec: &oam_types::ComponentDefinitionSpec) -> Result<()> {
    if spec.workload.definition.is_none() && spec.workload.r#type.is_none() {
        return Err(MissingRequiredAttributeSnafu {
            name: spec.version.clone(),
            attribute: "workload.definition or workload.type",
        }
        .build());
    }
    validate_status(spec.status.as_ref(), &spec.version)
}

fn validate_trait(spec: &oam_types::TraitDefinitionSpec) -> Result<()> {
    if spec.applies_to_workloads.is_empty() {
        return Err(MissingRequiredAttributeSnafu {
            name: spec.version.clone(),
            attribute: "appliesToWorkloads",
        }
        .build());
    }
    validate_status(spec.status.as_ref(), &spec.version)
}

fn validate_status(status: Option<&oam_types::DefinitionStatus>, name: &str) -> Result<()> {
    let Some(status) = status else {
        return Ok(());
    };

    if let Some(health_policy) = &status.health_policy {
        let fields = oam_expr::parse_template(health_policy).context(SchemaParseSnafu {
            name: name.to_owned(),
        })?;
        if !has_required_field(&fields, "isHealth") {
            return Err(MissingRequiredAttributeSnafu {
                name: name.to_owned(),
                attribute: "healthPolicy.isHealth",
            }
            .build());
        }
    }

    if let Some(custom_status) = &status.custom_status {
        let fields = oam_expr::parse_template(custom_status).context(SchemaParseSnafu {
            name: name.to_owned(),
        })?;
        if !has_required_field(&fields, "message") {
            return Err(MissingRequiredAttributeSnafu {
                name: name.to_owned(),
                attribute: "customStatus.message",
            }
            .build());
        }
    }

    if let Some(details) = &status.details {
        oam_expr::parse_template(details).context(SchemaParseSnafu {
            name: name.to_owned(),
        })?;
    }

    Ok(())
}

fn has_required_field(fields: &[oam_expr::ast::RecordField], name: &str) -> bool {
    fields.iter().any(|field| match field {
        oam_expr::ast::RecordField::Required { name: field_name, .. }
        | oam_expr::ast::RecordField::Optional { name: field_name, .. } => field_name == name,
        _ => false,
    })
}

/// True for a `status.details` local-helper field name: allowed to hold
/// non-primitive values since it never surfaces to callers.
pub fn is_local_field(name: &str) -> bool {
    name.starts_with(LOCAL_PREFIX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use oam_types::{ComponentDefinitionSpec, Schematic, WorkloadGroupVersionKind, WorkloadTypeDescriptor};

    fn component(template: &str) -> DefinitionSpec {
        DefinitionSpec::Component(ComponentDefinitionSpec {
            version: "1.0.0".into(),
            workload: WorkloadTypeDescriptor {
                definition: Some(WorkloadGroupVersionKind {
                    api_version: "apps/v1".into(),
                    kind: "Deployment".into(),
                }),
                r#type: None,
            },
            schematic: Schematic {
                template: template.to_owned(),
            },
            status: None,
        })
    }

    #[test]
    fn rejects_component_without_workload_descriptor() {
        let mut spec = component("output: {}");
        if let DefinitionSpec::Component(c) = &mut spec {
            c.workload.definition = None;
        }
        let err = validate(&spec).unwrap_err();
        assert!(matches!(err, crate::Error::MissingRequiredAttribute { .. }));
    }

    #[test]
    fn accepts_well_formed_component() {
        validate(&component("output: { kind: \"Deployment\" }")).unwrap();
    }

    #[test]
    fn local_prefixed_status_detail_fields_are_recognized() {
        assert!(is_local_field("$helper"));
        assert!(!is_local_field("readyReplicas"));
    }
}
