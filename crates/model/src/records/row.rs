use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A single named field of an extracted record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldValue {
    pub name: String,
    pub value: Value,
}

impl FieldValue {
    pub fn new(name: impl Into<String>, value: Value) -> Self {
        FieldValue {
            name: name.into(),
            value,
        }
    }
}

/// One extracted record.
///
/// Field order is meaningful: it is the order produced by the source for the
/// first record of the run and is held fixed for every record that follows.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Record {
    pub fields: Vec<FieldValue>,
}

impl Record {
    pub fn new(fields: Vec<FieldValue>) -> Self {
        Record { fields }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields
            .iter()
            .find(|f| f.name.eq_ignore_ascii_case(name))
            .map(|f| &f.value)
    }

    pub fn field_names(&self) -> Vec<String> {
        self.fields.iter().map(|f| f.name.clone()).collect()
    }

    /// Reshapes the record to the given field set, injecting JSON nulls for
    /// columns the record does not carry. Fields outside `names` are dropped.
    pub fn align_to(&self, names: &[String]) -> Record {
        let fields = names
            .iter()
            .map(|name| {
                let value = self.get(name).cloned().unwrap_or(Value::Null);
                FieldValue::new(name.clone(), value)
            })
            .collect();
        Record { fields }
    }

    /// Canonical single-line JSON object encoding with field order preserved.
    /// JSON string escaping guarantees the line contains no raw newlines.
    pub fn to_json_line(&self) -> Result<String, serde_json::Error> {
        let mut out = String::from("{");
        for (idx, field) in self.fields.iter().enumerate() {
            if idx > 0 {
                out.push(',');
            }
            out.push_str(&serde_json::to_string(&field.name)?);
            out.push(':');
            out.push_str(&serde_json::to_string(&field.value)?);
        }
        out.push('}');
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record() -> Record {
        Record::new(vec![
            FieldValue::new("id", json!(7)),
            FieldValue::new("name", json!("ann\nline")),
        ])
    }

    #[test]
    fn json_line_preserves_field_order_and_escapes_newlines() {
        let line = record().to_json_line().unwrap();
        assert_eq!(line, r#"{"id":7,"name":"ann\nline"}"#);
        assert!(!line.contains('\n'));
    }

    #[test]
    fn align_injects_nulls_and_reorders() {
        let names = vec!["name".to_string(), "id".to_string(), "email".to_string()];
        let aligned = record().align_to(&names);

        assert_eq!(aligned.field_names(), names);
        assert_eq!(aligned.get("email"), Some(&Value::Null));
        assert_eq!(aligned.get("id"), Some(&json!(7)));
    }
}
