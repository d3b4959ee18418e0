use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use serde::{Deserialize, Deserializer};
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::domain::PTVError;

const BUNDLED_DATASET: &str = include_str!("../data/employees.json");

/// Skills arrive either as a JSON list or as one delimited string.
#[derive(Debug, Clone, PartialEq)]
pub enum Skills {
    List(Vec<String>),
    Text(String),
}

/// One employee as found in the dataset. The loader does not validate:
/// every field is optional and wrongly typed values are coerced.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EmployeeRecord {
    #[serde(deserialize_with = "lenient::integer")]
    pub id: Option<i64>,
    #[serde(deserialize_with = "lenient::text")]
    pub first_name: Option<String>,
    #[serde(deserialize_with = "lenient::text")]
    pub last_name: Option<String>,
    #[serde(deserialize_with = "lenient::text")]
    pub email: Option<String>,
    #[serde(deserialize_with = "lenient::text")]
    pub department: Option<String>,
    #[serde(deserialize_with = "lenient::text")]
    pub position: Option<String>,
    #[serde(deserialize_with = "lenient::number")]
    pub salary: Option<f64>,
    #[serde(deserialize_with = "lenient::text")]
    pub hire_date: Option<String>,
    #[serde(deserialize_with = "lenient::number")]
    pub age: Option<f64>,
    #[serde(deserialize_with = "lenient::text")]
    pub location: Option<String>,
    #[serde(deserialize_with = "lenient::number")]
    pub performance_rating: Option<f64>,
    #[serde(deserialize_with = "lenient::integer")]
    pub projects_completed: Option<i64>,
    #[serde(deserialize_with = "lenient::flag")]
    pub is_active: Option<bool>,
    #[serde(deserialize_with = "lenient::skills")]
    pub skills: Option<Skills>,
    #[serde(deserialize_with = "lenient::text")]
    pub manager: Option<String>,
}

/// Turn a parsed dataset into records. Anything that is not an array is an
/// empty dataset.
pub fn load_records(value: Value) -> Vec<EmployeeRecord> {
    let Value::Array(items) = value else {
        warn!("Dataset is not an array, showing an empty table");
        return Vec::new();
    };

    let records: Vec<EmployeeRecord> = items
        .into_iter()
        .enumerate()
        .map(|(idx, item)| {
            EmployeeRecord::deserialize(item).unwrap_or_else(|e| {
                warn!("Record {idx} is not an object ({e}), keeping it empty");
                EmployeeRecord::default()
            })
        })
        .collect();
    debug!("Loaded {} records", records.len());
    records
}

pub fn from_json_str(text: &str) -> Vec<EmployeeRecord> {
    match serde_json::from_str::<Value>(text) {
        Ok(value) => load_records(value),
        Err(e) => {
            error!("Dataset is not valid JSON: {e}");
            Vec::new()
        }
    }
}

pub fn bundled() -> Vec<EmployeeRecord> {
    from_json_str(BUNDLED_DATASET)
}

pub fn from_path(path: &Path) -> Result<Vec<EmployeeRecord>, PTVError> {
    let metadata = fs::metadata(path).map_err(|e| match e.kind() {
        ErrorKind::NotFound => PTVError::FileNotFound,
        ErrorKind::PermissionDenied => PTVError::PermissionDenied,
        _ => PTVError::IoError(e),
    })?;
    if !metadata.is_file() {
        return Err(PTVError::LoadingFailed(format!(
            "{} is not a file!",
            path.display()
        )));
    }
    let text = fs::read_to_string(path).map_err(|e| match e.kind() {
        ErrorKind::PermissionDenied => PTVError::PermissionDenied,
        _ => PTVError::IoError(e),
    })?;
    info!("Read {} bytes from {}", metadata.len(), path.display());
    Ok(from_json_str(&text))
}

/// Field deserializers that coerce instead of failing.
mod lenient {
    use super::*;

    fn number_of(value: &Value) -> Option<f64> {
        match value {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse::<f64>().ok().filter(|v| v.is_finite()),
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            _ => None,
        }
    }

    fn text_of(value: Value) -> Option<String> {
        match value {
            Value::Null => None,
            Value::String(s) => Some(s),
            other => Some(other.to_string()),
        }
    }

    pub fn number<'de, D: Deserializer<'de>>(d: D) -> Result<Option<f64>, D::Error> {
        Ok(number_of(&Value::deserialize(d)?))
    }

    pub fn integer<'de, D: Deserializer<'de>>(d: D) -> Result<Option<i64>, D::Error> {
        let value = Value::deserialize(d)?;
        Ok(match &value {
            Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f.trunc() as i64)),
            _ => number_of(&value).map(|f| f.trunc() as i64),
        })
    }

    pub fn text<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
        Ok(text_of(Value::deserialize(d)?))
    }

    pub fn flag<'de, D: Deserializer<'de>>(d: D) -> Result<Option<bool>, D::Error> {
        Ok(match Value::deserialize(d)? {
            Value::Null => None,
            Value::Bool(b) => Some(b),
            Value::Number(n) => Some(n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan())),
            Value::String(s) => Some(!s.is_empty()),
            Value::Array(_) | Value::Object(_) => Some(true),
        })
    }

    pub fn skills<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Skills>, D::Error> {
        Ok(match Value::deserialize(d)? {
            Value::Null => None,
            Value::Array(items) => Some(Skills::List(
                items.into_iter().map(|v| text_of(v).unwrap_or_default()).collect(),
            )),
            other => text_of(other).map(Skills::Text),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    #[test]
    fn non_array_input_yields_empty_dataset() {
        assert!(load_records(json!({"id": 1})).is_empty());
        assert!(load_records(json!("employees")).is_empty());
        assert!(load_records(json!(42)).is_empty());
        assert!(load_records(Value::Null).is_empty());
        assert!(from_json_str("{ not json").is_empty());
    }

    #[test]
    fn records_keep_order_and_coerce_fields() {
        let records = load_records(json!([
            {"id": 7, "firstName": "Ada", "salary": "91000", "isActive": 1,
             "skills": ["Rust", 3], "performanceRating": "4.5"},
            {"id": 8.9, "isActive": "", "skills": "Go, SQL", "age": true},
        ]));
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].id, Some(7));
        assert_eq!(records[0].first_name.as_deref(), Some("Ada"));
        assert_eq!(records[0].salary, Some(91000.0));
        assert_eq!(records[0].is_active, Some(true));
        assert_eq!(records[0].performance_rating, Some(4.5));
        assert_eq!(
            records[0].skills,
            Some(Skills::List(vec!["Rust".into(), "3".into()]))
        );
        assert_eq!(records[1].id, Some(8));
        assert_eq!(records[1].is_active, Some(false));
        assert_eq!(records[1].skills, Some(Skills::Text("Go, SQL".into())));
        assert_eq!(records[1].age, Some(1.0));
        assert_eq!(records[1].email, None);
    }

    #[test]
    fn malformed_elements_are_kept() {
        let records = load_records(json!([{"id": 1}, "oops", null, {"id": 2}]));
        assert_eq!(records.len(), 4);
        assert_eq!(records[1], EmployeeRecord::default());
        assert_eq!(records[3].id, Some(2));
    }

    #[test]
    fn bundled_dataset_has_unique_ids() {
        let records = bundled();
        assert_eq!(records.len(), 20);
        let mut ids: Vec<i64> = records.iter().filter_map(|r| r.id).collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), records.len());
    }

    #[test]
    fn from_path_reports_missing_files_and_directories() {
        let dir = tempdir().unwrap();
        assert!(matches!(
            from_path(&dir.path().join("nope.json")),
            Err(PTVError::FileNotFound)
        ));
        assert!(matches!(
            from_path(dir.path()),
            Err(PTVError::LoadingFailed(_))
        ));

        let file = dir.path().join("people.json");
        fs::write(&file, r#"[{"id": 1, "firstName": "Grace"}]"#).unwrap();
        let records = from_path(&file).unwrap();
        assert_eq!(records[0].first_name.as_deref(), Some("Grace"));

        fs::write(&file, r#"{"rows": []}"#).unwrap();
        assert!(from_path(&file).unwrap().is_empty());
    }
}
