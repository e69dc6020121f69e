//! Splits a parsed template's top-level fields into the named blocks
//! evaluated independently (`parameter`, `context`, `output`,
//! `outputs`, `patch`, `processing`, `healthPolicy`, `customStatus`,
//! `status.details`), and binds a definition's `parameter` schema against
//! caller-supplied properties.

use indexmap::IndexMap;

use crate::ast::{Expr, RecordField};
use crate::eval::{EvalError, Scope, eval_record, unify_at};
use crate::value::Value;

/// The named top-level blocks a Definition template may declare. Every
/// field is optional since not every definition kind uses every block (a
/// WorkflowStep template has no `patch`, a Trait has no primary `output`
/// unless it also emits a workload, etc).
#[derive(Debug, Clone, Default)]
pub struct TemplateBlocks {
    pub parameter: Option<Vec<RecordField>>,
    pub context: Option<Vec<RecordField>>,
    pub output: Option<Vec<RecordField>>,
    pub outputs: IndexMap<String, Vec<RecordField>>,
    pub patch: Option<Vec<RecordField>>,
    pub processing: Option<Vec<RecordField>>,
    pub health_policy: Option<Vec<RecordField>>,
    pub custom_status: Option<Vec<RecordField>>,
    pub status_details: Option<Vec<RecordField>>,
}

impl TemplateBlocks {
    /// Groups the flat top-level field list produced by [`crate::parse_template`]
    /// by well-known name. Fields with an unrecognized name are ignored —
    /// templates may carry local helper definitions alongside the blocks we
    /// interpret.
    pub fn from_fields(fields: &[RecordField]) -> Self {
        let mut blocks = Self::default();
        for field in fields {
            let (name, value) = match field {
                RecordField::Required { name, value } | RecordField::Optional { name, value } => {
                    (name.as_str(), value)
                }
                _ => continue,
            };
            match name {
                "parameter" => blocks.parameter = Some(record_body(value)),
                "context" => blocks.context = Some(record_body(value)),
                "output" => blocks.output = Some(record_body(value)),
                "outputs" => {
                    for inner in record_body(value) {
                        if let RecordField::Required { name, value } | RecordField::Optional { name, value } = inner {
                            blocks.outputs.insert(name, record_body(&value));
                        }
                    }
                }
                "patch" => blocks.patch = Some(record_body(value)),
                "processing" => blocks.processing = Some(record_body(value)),
                "status" => {
                    for inner in record_body(value) {
                        if let RecordField::Required { name, value } | RecordField::Optional { name, value } = inner
                        {
                            match name.as_str() {
                                "healthPolicy" => blocks.health_policy = Some(record_body(&value)),
                                "customStatus" => blocks.custom_status = Some(record_body(&value)),
                                "details" => blocks.status_details = Some(record_body(&value)),
                                _ => {}
                            }
                        }
                    }
                }
                _ => {}
            }
        }
        blocks
    }
}

fn record_body(expr: &Expr) -> Vec<RecordField> {
    match expr {
        Expr::Record(fields) => fields.clone(),
        _ => Vec::new(),
    }
}

/// Evaluates a `parameter` schema's default expressions (against an empty
/// scope) and unifies the caller-supplied properties on top, user values
/// winning over declared defaults. This is rendering-algorithm step 1
/// the rendering algorithm's first step: "Bind `parameter` from the user's properties object;
/// defaults fill unspecified fields. Unification failure ⇒
/// `ParameterValidation`".
pub fn bind_parameter(schema: &[RecordField], user_properties: &Value) -> Result<Value, EvalError> {
    let defaults = eval_record(schema, &Scope::new(), "parameter")?;
    unify_at("parameter", user_properties, &defaults)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_template;

    #[test]
    fn splits_known_top_level_blocks() {
        let fields = parse_template(
            r#"
            parameter: { image: "nginx", replicas?: 1 }
            output: { kind: "Deployment" }
            outputs: { ingress: { kind: "Ingress" } }
            status: {
                healthPolicy: { isHealth: true }
                customStatus: { message: "ok" }
            }
            "#,
        )
        .unwrap();
        let blocks = TemplateBlocks::from_fields(&fields);
        assert!(blocks.parameter.is_some());
        assert!(blocks.output.is_some());
        assert!(blocks.outputs.contains_key("ingress"));
        assert!(blocks.health_policy.is_some());
        assert!(blocks.custom_status.is_some());
    }

    #[test]
    fn bind_parameter_fills_defaults_and_keeps_user_values() {
        let fields = parse_template(r#"parameter: { image: "nginx", replicas: 1 }"#).unwrap();
        let blocks = TemplateBlocks::from_fields(&fields);
        let user = Value::Record(IndexMap::from([(
            "image".to_owned(),
            Value::String("custom".into()),
        )]));
        let bound = bind_parameter(blocks.parameter.as_ref().unwrap(), &user).unwrap();
        let record = bound.as_record().unwrap();
        assert_eq!(record.get("image"), Some(&Value::String("custom".into())));
        assert_eq!(record.get("replicas"), Some(&Value::Int(1)));
    }

    #[test]
    fn bind_parameter_rejects_conflicting_concrete_values() {
        let fields = parse_template(r#"parameter: { replicas: 1 }"#).unwrap();
        let blocks = TemplateBlocks::from_fields(&fields);
        let user = Value::Record(IndexMap::from([("replicas".to_owned(), Value::Int(2))]));
        let err = bind_parameter(blocks.parameter.as_ref().unwrap(), &user).unwrap_err();
        assert!(matches!(err, EvalError::Unify { .. }));
    }
}
