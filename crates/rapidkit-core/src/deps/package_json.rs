//! npm `package.json` adapter

use super::{DependencyAdapter, DEV_GROUP};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Default)]
pub struct PackageJson {
    doc: Map<String, Value>,
}

fn section(group: Option<&str>) -> &'static str {
    if group == Some(DEV_GROUP) {
        "devDependencies"
    } else {
        "dependencies"
    }
}

impl DependencyAdapter for PackageJson {
    fn file_name(&self) -> &str {
        "package.json"
    }

    fn parse(&mut self, text: &str) -> Result<(), String> {
        if text.trim().is_empty() {
            self.doc = Map::new();
            return Ok(());
        }
        match serde_json::from_str::<Value>(text).map_err(|e| e.to_string())? {
            Value::Object(doc) => {
                self.doc = doc;
                Ok(())
            }
            _ => Err("top-level value is not an object".to_string()),
        }
    }

    fn pinned(&self, name: &str, group: Option<&str>) -> Option<String> {
        self.doc
            .get(section(group))
            .and_then(|deps| deps.get(name))
            .and_then(Value::as_str)
            .map(str::to_string)
    }

    fn upsert(&mut self, name: &str, version: &str, group: Option<&str>) {
        let entry = self
            .doc
            .entry(section(group))
            .or_insert_with(|| Value::Object(Map::new()));
        if !entry.is_object() {
            *entry = Value::Object(Map::new());
        }
        if let Value::Object(deps) = entry {
            deps.insert(name.to_string(), Value::from(version));
        }
    }

    fn write(&self) -> String {
        let mut text = serde_json::to_string_pretty(&self.doc).unwrap_or_else(|_| "{}".to_string());
        text.push('\n');
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upsert_keeps_key_order_and_sections() {
        let mut pkg = PackageJson::default();
        pkg.parse(r#"{"name": "app", "dependencies": {"@nestjs/core": "^10.0.0"}}"#)
            .unwrap();
        pkg.upsert("pino", "^9.0.0", None);
        pkg.upsert("@types/node", "^20.0.0", Some(DEV_GROUP));
        assert_eq!(pkg.pinned("pino", None).as_deref(), Some("^9.0.0"));
        assert_eq!(pkg.pinned("@types/node", Some(DEV_GROUP)).as_deref(), Some("^20.0.0"));

        let written: Value = serde_json::from_str(&pkg.write()).unwrap();
        let keys: Vec<&String> = written.as_object().unwrap().keys().collect();
        assert_eq!(keys, vec!["name", "dependencies", "devDependencies"]);
    }

    #[test]
    fn test_rejects_non_object() {
        assert!(PackageJson::default().parse("[1, 2]").is_err());
    }
}
