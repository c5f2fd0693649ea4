use once_cell::sync::Lazy;
use serde_json::Value;

/// JSON Schema describing the telegraws configuration document (Draft 2020-12).
pub static CONFIG_SCHEMA_JSON: &str = include_str!("../../schemas/telegraws-config.schema.json");

/// Lazily parsed schema to make programmatic access ergonomic.
pub static CONFIG_SCHEMA_VALUE: Lazy<Value> = Lazy::new(|| {
    serde_json::from_str(CONFIG_SCHEMA_JSON)
        .expect("embedded telegraws config schema must be valid JSON")
});

/// Returns a borrowed reference to the parsed config schema as a `serde_json::Value`.
pub fn config_schema() -> &'static Value {
    &CONFIG_SCHEMA_VALUE
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const EXAMPLE: &str = include_str!("../../config.example.json");

    fn compiled() -> jsonschema::JSONSchema {
        jsonschema::JSONSchema::compile(config_schema()).expect("schema compiles")
    }

    #[test]
    fn schema_declares_draft_2020_12() {
        assert_eq!(
            config_schema()["$schema"],
            "https://json-schema.org/draft/2020-12/schema"
        );
    }

    #[test]
    fn example_config_conforms_to_schema() {
        let instance: Value = serde_json::from_str(EXAMPLE).expect("example JSON");
        assert!(compiled().is_valid(&instance));
    }

    #[test]
    fn schema_rejects_out_of_range_hour() {
        let mut instance: Value = serde_json::from_str(EXAMPLE).expect("example JSON");
        instance["global"]["monitoring"]["dailyReportHour"] = json!(30);
        assert!(!compiled().is_valid(&instance));
    }
}
