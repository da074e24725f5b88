use serde_json::{json, Value};
use uuid::Uuid;

const REQUIRED_TOP_LEVEL_KEYS: &[&str] = &["$schema", "type", "properties", "required"];

pub fn validate_schemas() -> anyhow::Result<i32> {
    let run_id = Uuid::new_v4().to_string();
    let schemas = [
        ("schemas/article.schema.json", pipeline::schemas::article_schema()?),
        ("schemas/evidence.schema.json", pipeline::schemas::evidence_schema()?),
    ];

    for (name, schema) in &schemas {
        let missing: Vec<&str> = REQUIRED_TOP_LEVEL_KEYS
            .iter()
            .filter(|key| schema.get(**key).is_none())
            .copied()
            .collect();
        if !missing.is_empty() {
            anyhow::bail!("{name} missing required schema keys: {}", missing.join(", "));
        }
    }
    // Both schemas must also compile.
    pipeline::schemas::article_validator()?;
    pipeline::schemas::evidence_validator()?;

    let schema_files: Vec<Value> = schemas
        .iter()
        .map(|(name, _)| json!(name))
        .collect();
    ops::emit_event(
        "cli_validate_schemas_completed",
        Some(&run_id),
        json!({
            "command": "validate-schemas",
            "schema_files": schema_files,
        }),
    );
    Ok(0)
}
