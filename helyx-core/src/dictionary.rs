use crate::error::{HelyxCoreError, Result};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::{Map, Value};

/// Keyword/value dictionary as produced by the case setup layer.
///
/// Entries keep their insertion order. Values are looked up with a target
/// type and converted through `serde`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dictionary {
    name: String,
    entries: Map<String, Value>,
}

impl Dictionary {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entries: Map::new(),
        }
    }

    pub fn from_value(name: impl Into<String>, value: Value) -> Result<Self> {
        let name = name.into();
        match value {
            Value::Object(entries) => Ok(Self { name, entries }),
            other => Err(HelyxCoreError::Dictionary(format!(
                "{} is not a dictionary: {}",
                name, other
            ))),
        }
    }

    pub fn from_json_str(name: impl Into<String>, text: &str) -> Result<Self> {
        let name = name.into();
        let value: Value = serde_json::from_str(text)
            .map_err(|e| HelyxCoreError::Dictionary(format!("cannot parse {}: {}", name, e)))?;
        Self::from_value(name, value)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn entries(&self) -> &Map<String, Value> {
        &self.entries
    }

    pub fn found(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn is_dict(&self, key: &str) -> bool {
        matches!(self.entries.get(key), Some(Value::Object(_)))
    }

    /// Keywords in insertion order.
    pub fn toc(&self) -> Vec<&str> {
        self.entries.keys().map(String::as_str).collect()
    }

    pub fn set<T: Serialize>(&mut self, key: impl Into<String>, value: T) -> Result<()> {
        let key = key.into();
        let value = serde_json::to_value(value).map_err(|e| {
            HelyxCoreError::Dictionary(format!("cannot store {} in {}: {}", key, self.name, e))
        })?;
        self.entries.insert(key, value);
        Ok(())
    }

    fn convert<T: DeserializeOwned>(&self, key: &str, value: &Value) -> Result<T> {
        serde_json::from_value(value.clone()).map_err(|e| {
            HelyxCoreError::Dictionary(format!(
                "keyword {} in dictionary {} has a bad value {}: {}",
                key, self.name, value, e
            ))
        })
    }

    pub fn lookup<T: DeserializeOwned>(&self, key: &str) -> Result<T> {
        match self.entries.get(key) {
            Some(value) => self.convert(key, value),
            None => Err(HelyxCoreError::Dictionary(format!(
                "keyword {} is undefined in dictionary {}",
                key, self.name
            ))),
        }
    }

    pub fn lookup_or_default<T: DeserializeOwned>(&self, key: &str, default: T) -> Result<T> {
        match self.entries.get(key) {
            Some(value) => self.convert(key, value),
            None => Ok(default),
        }
    }

    /// A switch accepts booleans and the words on/off, yes/no, true/false.
    pub fn lookup_switch_or_default(&self, key: &str, default: bool) -> Result<bool> {
        match self.entries.get(key) {
            None => Ok(default),
            Some(Value::Bool(b)) => Ok(*b),
            Some(Value::String(word)) => match word.as_str() {
                "on" | "yes" | "true" | "y" => Ok(true),
                "off" | "no" | "false" | "n" | "none" => Ok(false),
                _ => Err(HelyxCoreError::Dictionary(format!(
                    "keyword {} in dictionary {}: '{}' is not a switch",
                    key, self.name, word
                ))),
            },
            Some(other) => Err(HelyxCoreError::Dictionary(format!(
                "keyword {} in dictionary {}: {} is not a switch",
                key, self.name, other
            ))),
        }
    }

    pub fn sub_dict(&self, key: &str) -> Result<Dictionary> {
        match self.entries.get(key) {
            Some(Value::Object(entries)) => Ok(Dictionary {
                name: format!("{}/{}", self.name, key),
                entries: entries.clone(),
            }),
            Some(_) => Err(HelyxCoreError::Dictionary(format!(
                "keyword {} in dictionary {} is not a sub-dictionary",
                key, self.name
            ))),
            None => Err(HelyxCoreError::Dictionary(format!(
                "sub-dictionary {} is undefined in dictionary {}",
                key, self.name
            ))),
        }
    }

    /// The sub-dictionary `key` if present, otherwise this dictionary.
    pub fn optional_sub_dict(&self, key: &str) -> Dictionary {
        self.sub_dict(key).unwrap_or_else(|_| self.clone())
    }

    /// A single word or a list of words.
    pub fn words(&self, key: &str) -> Result<Vec<String>> {
        match self.entries.get(key) {
            Some(Value::String(word)) => Ok(vec![word.clone()]),
            Some(value) => self.convert(key, value),
            None => Err(HelyxCoreError::Dictionary(format!(
                "keyword {} is undefined in dictionary {}",
                key, self.name
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> Dictionary {
        Dictionary::from_value(
            "fvOptions",
            json!({
                "heater": {
                    "type": "semiImplicitSource",
                    "active": "yes",
                    "semiImplicitSourceCoeffs": { "volumeMode": "absolute" }
                },
                "fields": ["T", "h"],
                "field": "T",
                "tolerance": 1e-6
            }),
        )
        .unwrap()
    }

    #[test]
    fn test_lookup_and_defaults() {
        let dict = sample();
        assert_eq!(dict.lookup::<f64>("tolerance").unwrap(), 1e-6);
        assert_eq!(dict.lookup_or_default("maxIter", 1000usize).unwrap(), 1000);
        assert!(matches!(dict.lookup::<f64>("relTol"), Err(HelyxCoreError::Dictionary(_))));
        assert!(dict.lookup::<usize>("field").is_err());
        assert_eq!(dict.toc(), vec!["heater", "fields", "field", "tolerance"]);
    }

    #[test]
    fn test_sub_dicts_and_words() {
        let dict = sample();
        let heater = dict.sub_dict("heater").unwrap();
        assert_eq!(heater.name(), "fvOptions/heater");
        assert!(heater.lookup_switch_or_default("active", false).unwrap());
        let coeffs = heater.optional_sub_dict("semiImplicitSourceCoeffs");
        assert_eq!(coeffs.lookup::<String>("volumeMode").unwrap(), "absolute");
        assert_eq!(heater.optional_sub_dict("missingCoeffs"), heater);
        assert_eq!(dict.words("fields").unwrap(), vec!["T", "h"]);
        assert_eq!(dict.words("field").unwrap(), vec!["T"]);
        assert!(dict.sub_dict("tolerance").is_err());
    }
}
