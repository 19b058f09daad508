//! dbt documentation (`schema.yml`) parsing.
//!
//! Only the parts the reviewers look at are modelled; everything else in
//! the document is ignored.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct SchemaFile {
    #[serde(default)]
    pub models: Vec<ModelDoc>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ModelDoc {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub columns: Vec<ColumnDoc>,
    /// Model-level tests (`tests:` or the older `data_tests:`).
    #[serde(default, alias = "data_tests", skip_serializing_if = "Vec::is_empty")]
    pub tests: Vec<serde_yaml::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<serde_yaml::Value>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ColumnDoc {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, alias = "data_tests", skip_serializing_if = "Vec::is_empty")]
    pub tests: Vec<serde_yaml::Value>,
}

impl SchemaFile {
    pub fn parse(content: &str) -> anyhow::Result<Self> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        let parsed: Option<Self> = serde_yaml::from_str(content)?;
        Ok(parsed.unwrap_or_default())
    }

    /// The entry documenting `name`. A file with a single model entry is
    /// accepted for a same-named sibling even if the entry name differs.
    pub fn model(&self, name: &str) -> Option<&ModelDoc> {
        self.models
            .iter()
            .find(|m| m.name == name)
            .or_else(|| match self.models.as_slice() {
                [only] => Some(only),
                _ => None,
            })
    }
}

impl ModelDoc {
    /// Render this entry as a standalone `models:` document.
    pub fn to_standalone_yaml(&self) -> anyhow::Result<String> {
        let doc = SchemaFile {
            models: vec![self.clone()],
        };
        Ok(serde_yaml::to_string(&doc)?)
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCHEMA: &str = r#"
version: 2
models:
  - name: orders
    description: One row per order.
    columns:
      - name: id
        description: Primary key.
        tests: [unique, not_null]
      - name: total
  - name: customers
    data_tests:
      - dbt_utils.expression_is_true:
          expression: "id > 0"
"#;

    #[test]
    fn parses_models_and_columns() {
        let schema = SchemaFile::parse(SCHEMA).unwrap();
        assert_eq!(schema.models.len(), 2);
        let orders = schema.model("orders").unwrap();
        assert_eq!(orders.column_names(), vec!["id", "total"]);
        assert_eq!(orders.columns[0].tests.len(), 2);
        assert!(orders.columns[1].description.is_none());
        assert_eq!(schema.model("customers").unwrap().tests.len(), 1);
    }

    #[test]
    fn missing_model_without_fallback() {
        let schema = SchemaFile::parse(SCHEMA).unwrap();
        assert!(schema.model("payments").is_none());
    }

    #[test]
    fn single_entry_fallback() {
        let schema = SchemaFile::parse("models:\n  - name: stg_orders\n").unwrap();
        assert_eq!(schema.model("orders").unwrap().name, "stg_orders");
    }

    #[test]
    fn empty_document_is_empty_schema() {
        assert!(SchemaFile::parse("").unwrap().models.is_empty());
        assert!(SchemaFile::parse("version: 2\n").unwrap().models.is_empty());
    }

    #[test]
    fn invalid_yaml_is_error() {
        assert!(SchemaFile::parse("models: [ { name: a ").is_err());
    }

    #[test]
    fn standalone_yaml_round_trips_entry() {
        let schema = SchemaFile::parse(SCHEMA).unwrap();
        let yaml = schema.model("orders").unwrap().to_standalone_yaml().unwrap();
        let reparsed = SchemaFile::parse(&yaml).unwrap();
        assert_eq!(reparsed.models.len(), 1);
        assert_eq!(reparsed.models[0].column_names(), vec!["id", "total"]);
    }
}
