//! Embedded JSON Schemas for export validation.

pub const ARTICLE_SCHEMA_JSON: &str = include_str!("../../../schemas/article.schema.json");
pub const EVIDENCE_SCHEMA_JSON: &str = include_str!("../../../schemas/evidence.schema.json");

pub fn article_schema() -> anyhow::Result<serde_json::Value> {
    Ok(serde_json::from_str(ARTICLE_SCHEMA_JSON)?)
}

pub fn evidence_schema() -> anyhow::Result<serde_json::Value> {
    Ok(serde_json::from_str(EVIDENCE_SCHEMA_JSON)?)
}

pub fn article_validator() -> anyhow::Result<jsonschema::Validator> {
    let schema = article_schema()?;
    jsonschema::validator_for(&schema)
        .map_err(|err| anyhow::anyhow!("invalid article schema: {err}"))
}

pub fn evidence_validator() -> anyhow::Result<jsonschema::Validator> {
    let schema = evidence_schema()?;
    jsonschema::validator_for(&schema)
        .map_err(|err| anyhow::anyhow!("invalid evidence schema: {err}"))
}
