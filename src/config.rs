//! # Configuration Data Binding
//!
//! This module defines the request and configuration objects of the two
//! flows and the logic for validating them.
//!
//! ## Key Components
//!
//! - **`TransformConfig`**: one named transform configuration, read from a
//!   folder's `cmsconfig-transform:<name>` option. Its `name` is assigned by
//!   the loader from the option key and is never read from the JSON body.
//!
//! - **`ImportOptions`**: an import request, carrying either a URL or an
//!   inline payload.
//!
//! - **`TransformParams`** / **`ImportParams`**: validated views of the two,
//!   produced by `validate()`. The orchestrators only ever work with these.
//!
//! Param maps are string-to-string. JSON booleans and numbers are accepted
//! and normalised to their string form, so `"overwrite": true` and
//! `"overwrite": "true"` are equivalent.

use crate::error::{Error, Result};
use crate::item::{ItemId, Properties};
use crate::repository::ConfigSource;
use log::{debug, error};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use url::Url;

/// Namespace of transform configuration options.
pub const TRANSFORM_CONFIG_NAMESPACE: &str = "cmsconfig-transform";

/// The only supported transform type.
pub const TRANSFORM_TYPE_XSL: &str = "xsl";

/// Transform configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TransformConfig {
    /// Name the configuration was registered under.
    #[serde(skip)]
    pub name: String,
    /// Whether change events trigger this transform.
    #[serde(default)]
    pub active: bool,
    #[serde(default)]
    pub options: Option<TransformConfigOptions>,
}

/// Options of a transform configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TransformConfigOptions {
    /// Transform type, must be `xsl`.
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, deserialize_with = "string_map")]
    pub params: BTreeMap<String, String>,
}

/// Validated transform parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransformParams {
    /// Built-in stylesheet name, or absolute repository path.
    pub stylesheet: String,
    pub output: Option<String>,
    pub overwrite: bool,
    pub comment: Option<String>,
    /// Do not write provenance properties.
    pub suppress_properties: bool,
    /// All params as configured.
    pub raw: BTreeMap<String, String>,
}

impl TransformConfig {
    /// Parse a configuration from its JSON form.
    pub fn from_json(name: &str, json: &str) -> Result<Self> {
        let mut config: TransformConfig = serde_json::from_str(json)?;
        config.name = name.to_string();
        Ok(config)
    }

    /// Check the configuration and extract its parameters.
    pub fn validate(&self) -> Result<TransformParams> {
        let options = self
            .options
            .as_ref()
            .ok_or_else(|| Error::config("Transform needs a valid TransformConfig object."))?;

        if options.kind != TRANSFORM_TYPE_XSL {
            return Err(Error::Config {
                message: format!(
                    "Transform can only handle xsl transforms but was given: {}",
                    options.kind
                ),
                hint: Some("set options.type to \"xsl\"".to_string()),
            });
        }

        let params = &options.params;
        let stylesheet = non_empty(params.get("stylesheet")).ok_or_else(|| {
            Error::config("Requires a valid stylesheet path or stylesheet name.")
        })?;

        Ok(TransformParams {
            stylesheet: stylesheet.to_string(),
            output: non_empty(params.get("output")).map(str::to_string),
            overwrite: parse_flag(params.get("overwrite")),
            comment: non_empty(params.get("comment")).map(str::to_string),
            suppress_properties: parse_flag(params.get("PropertiesSuppress")),
            raw: params.clone(),
        })
    }
}

/// Import request
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ImportOptions {
    /// http(s) URL to download. Redirects are followed.
    #[serde(default)]
    pub url: Option<String>,
    /// Inline payload, typically XML or JSON.
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default, deserialize_with = "string_map")]
    pub params: BTreeMap<String, String>,
    /// Properties set on the imported item.
    #[serde(default, deserialize_with = "string_map")]
    pub properties: BTreeMap<String, String>,
}

/// Where the import payload comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportSource {
    Url(Url),
    Content(Vec<u8>),
}

/// Validated import parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportParams {
    pub source: ImportSource,
    pub comment: Option<String>,
    /// File extension of the imported item, without dot.
    pub pathext: String,
    /// Explicit leaf name, without extension.
    pub pathnamebase: Option<String>,
    pub properties: Properties,
}

impl ImportOptions {
    /// Parse an import request from its JSON form.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Check the request and extract its parameters.
    pub fn validate(&self) -> Result<ImportParams> {
        let source = match (non_empty(self.url.as_ref()), self.content.as_ref()) {
            (Some(url), None) => {
                let url = Url::parse(url)?;
                if url.scheme() != "http" && url.scheme() != "https" {
                    return Err(Error::config(format!(
                        "Import URL must use http or https: {}",
                        url
                    )));
                }
                ImportSource::Url(url)
            }
            (None, Some(content)) => ImportSource::Content(content.as_bytes().to_vec()),
            _ => {
                return Err(Error::config(
                    "Import requires either a valid URL or content.",
                ));
            }
        };

        if parse_flag(self.params.get("overwrite")) {
            return Err(Error::Config {
                message: "Import does not support overwrite of existing items.".to_string(),
                hint: Some("remove the 'overwrite' param".to_string()),
            });
        }

        let pathext = non_empty(self.params.get("pathext"))
            .map(|ext| ext.trim_start_matches('.').to_string())
            .filter(|ext| !ext.is_empty())
            .ok_or_else(|| Error::config("Import requires parameter 'pathext'."))?;

        Ok(ImportParams {
            source,
            comment: non_empty(self.params.get("comment")).map(str::to_string),
            pathext,
            pathnamebase: non_empty(self.params.get("pathnamebase")).map(str::to_string),
            properties: self.properties.clone(),
        })
    }
}

/// Load the transform configurations effective for `item`.
///
/// Configuration is read from the item's parent folder at head. Options
/// outside the `cmsconfig-transform` namespace are ignored. Each
/// configuration is named after its option key, in option order.
pub fn load_transform_configs(
    source: &dyn ConfigSource,
    item: &ItemId,
) -> Result<Vec<TransformConfig>> {
    let parent = item
        .path()
        .parent()
        .unwrap_or_else(crate::item::ItemPath::root);
    debug!("Configuration context: {} - ({})", parent, item);
    let folder = item.repository().item_id(parent);

    let mut configs = Vec::new();
    for option in source.folder_config(&folder)? {
        if option.namespace() != TRANSFORM_CONFIG_NAMESPACE {
            continue;
        }
        match TransformConfig::from_json(option.key(), &option.value) {
            Ok(config) => configs.push(config),
            Err(e) => {
                error!("Could not deserialize config: {}", option.name);
                return Err(Error::Config {
                    message: format!("Could not deserialize config '{}': {}", option.name, e),
                    hint: None,
                });
            }
        }
    }
    debug!("Loaded {} transform config(s) for {}", configs.len(), item);
    Ok(configs)
}

/// Boolean param semantics: only a case-insensitive `true` is true.
pub fn parse_flag(value: Option<&String>) -> bool {
    value
        .map(|v| v.trim().eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

fn non_empty(value: Option<&String>) -> Option<&str> {
    value.map(|v| v.trim()).filter(|v| !v.is_empty())
}

/// Deserialize a map of scalars into strings.
fn string_map<'de, D>(deserializer: D) -> std::result::Result<BTreeMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error as _;
    let raw: Option<BTreeMap<String, serde_json::Value>> = Option::deserialize(deserializer)?;
    let mut map = BTreeMap::new();
    for (key, value) in raw.unwrap_or_default() {
        let value = match value {
            serde_json::Value::Null => continue,
            serde_json::Value::String(s) => s,
            serde_json::Value::Bool(b) => b.to_string(),
            serde_json::Value::Number(n) => n.to_string(),
            other => {
                return Err(D::Error::custom(format!(
                    "param '{}' must be a string, got {}",
                    key, other
                )));
            }
        };
        map.insert(key, value);
    }
    Ok(map)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::{ItemPath, Repository};
    use crate::repository::ConfigOption;
    use std::sync::{Arc, Mutex};

    const ACTIVE_CONFIG: &str = r#"{
        "active": true,
        "options": {
            "type": "xsl",
            "params": {
                "stylesheet": "/dita/xsl/import.xsl",
                "output": "/dita/import",
                "overwrite": true,
                "comment": "Import an external file."
            }
        }
    }"#;

    fn config_with(kind: &str, params: &[(&str, &str)]) -> TransformConfig {
        TransformConfig {
            name: "test".to_string(),
            active: true,
            options: Some(TransformConfigOptions {
                kind: kind.to_string(),
                params: params
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
            }),
        }
    }

    #[test]
    fn test_deserialize_config() {
        let config = TransformConfig::from_json("import", ACTIVE_CONFIG).unwrap();
        assert_eq!(config.name, "import");
        assert!(config.active);
        let options = config.options.as_ref().unwrap();
        assert_eq!(options.kind, "xsl");
        assert_eq!(options.params["stylesheet"], "/dita/xsl/import.xsl");
        assert_eq!(options.params["output"], "/dita/import");
        assert_eq!(options.params["overwrite"], "true");
        assert_eq!(options.params["comment"], "Import an external file.");
    }

    #[test]
    fn test_name_is_not_read_from_json() {
        let json = r#"{"name": "evil", "active": false, "options": {"type": "xsl"}}"#;
        let config = TransformConfig::from_json("registered", json).unwrap();
        assert_eq!(config.name, "registered");
    }

    #[test]
    fn test_serialize_config() {
        let config = config_with("xsl", &[("stylesheet", "/dita/xsl/import.xsl"), ("overwrite", "true")]);
        let json = serde_json::to_string(&config).unwrap();
        assert!(json.contains("\"active\":true"));
        assert!(json.contains("\"type\":\"xsl\""));
        assert!(json.contains("\"overwrite\":\"true\""));
        assert!(!json.contains("\"name\""));
    }

    #[test]
    fn test_validate_extracts_params() {
        let config = config_with(
            "xsl",
            &[
                ("stylesheet", "/xsl/single.xsl"),
                ("output", "/out"),
                ("overwrite", "TRUE"),
                ("comment", "Automatic transform!"),
                ("PropertiesSuppress", "false"),
            ],
        );
        let params = config.validate().unwrap();
        assert_eq!(params.stylesheet, "/xsl/single.xsl");
        assert_eq!(params.output.as_deref(), Some("/out"));
        assert!(params.overwrite);
        assert_eq!(params.comment.as_deref(), Some("Automatic transform!"));
        assert!(!params.suppress_properties);
    }

    #[test]
    fn test_validate_defaults() {
        let params = config_with("xsl", &[("stylesheet", "identity.xsl"), ("overwrite", "")])
            .validate()
            .unwrap();
        assert_eq!(params.output, None);
        assert!(!params.overwrite);
        assert_eq!(params.comment, None);
    }

    #[test]
    fn test_validate_rejects_wrong_type() {
        let err = config_with("xquery", &[("stylesheet", "a.xsl")])
            .validate()
            .unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
        assert!(err.to_string().contains("xquery"));
    }

    #[test]
    fn test_validate_requires_stylesheet_and_options() {
        let err = config_with("xsl", &[("stylesheet", "  ")]).validate().unwrap_err();
        assert!(err.to_string().contains("stylesheet"));
        let empty = TransformConfig::default();
        assert!(empty.validate().is_err());
    }

    #[test]
    fn test_import_options_content() {
        let options = ImportOptions::from_json(
            r#"{"content": "<doc/>", "params": {"pathext": "xml", "comment": "Imported"}, "properties": {"cms:status": "In_Work"}}"#,
        )
        .unwrap();
        let params = options.validate().unwrap();
        assert_eq!(params.source, ImportSource::Content(b"<doc/>".to_vec()));
        assert_eq!(params.pathext, "xml");
        assert_eq!(params.comment.as_deref(), Some("Imported"));
        assert_eq!(params.properties["cms:status"], "In_Work");
    }

    #[test]
    fn test_import_options_require_exactly_one_source() {
        let both = ImportOptions {
            url: Some("https://example.com/a.xml".to_string()),
            content: Some("<doc/>".to_string()),
            params: [("pathext".to_string(), "xml".to_string())].into(),
            ..Default::default()
        };
        assert!(both.validate().is_err());
        let neither = ImportOptions {
            params: [("pathext".to_string(), "xml".to_string())].into(),
            ..Default::default()
        };
        let err = neither.validate().unwrap_err();
        assert!(err.to_string().contains("either a valid URL or content"));
    }

    #[test]
    fn test_import_options_reject_overwrite_and_missing_pathext() {
        let overwrite = ImportOptions::from_json(
            r#"{"content": "<doc/>", "params": {"pathext": "xml", "overwrite": true}}"#,
        )
        .unwrap();
        assert!(overwrite.validate().unwrap_err().to_string().contains("overwrite"));

        let no_ext = ImportOptions::from_json(r#"{"content": "<doc/>"}"#).unwrap();
        assert!(no_ext.validate().unwrap_err().to_string().contains("pathext"));
    }

    #[test]
    fn test_import_options_url_scheme() {
        let ftp = ImportOptions::from_json(
            r#"{"url": "ftp://example.com/a.xml", "params": {"pathext": "xml"}}"#,
        )
        .unwrap();
        assert!(ftp.validate().is_err());
        let https = ImportOptions::from_json(
            r#"{"url": "https://example.com/a.xml", "params": {"pathext": ".xml"}}"#,
        )
        .unwrap();
        let params = https.validate().unwrap();
        assert!(matches!(params.source, ImportSource::Url(_)));
        assert_eq!(params.pathext, "xml");
    }

    #[test]
    fn test_string_map_rejects_nested_values() {
        let result = ImportOptions::from_json(r#"{"content": "x", "params": {"pathext": ["xml"]}}"#);
        assert!(result.is_err());
    }

    struct MockConfigSource {
        options: Vec<ConfigOption>,
        requested: Arc<Mutex<Vec<String>>>,
    }

    impl ConfigSource for MockConfigSource {
        fn folder_config(&self, folder: &ItemId) -> Result<Vec<ConfigOption>> {
            self.requested.lock().unwrap().push(folder.logical_id());
            Ok(self.options.clone())
        }
    }

    #[test]
    fn test_load_configs_filters_namespace() {
        let inactive = ACTIVE_CONFIG.replace("\"active\": true", "\"active\": false");
        let source = MockConfigSource {
            options: vec![
                ConfigOption::new("cmsconfig-transform:import", ACTIVE_CONFIG),
                ConfigOption::new("cmsconfig-transform:change", &inactive),
                ConfigOption::new("cmsconfig-publish:web", &inactive),
            ],
            requested: Arc::new(Mutex::new(Vec::new())),
        };
        let item = Repository::new("x-svn:///svn/demo1")
            .unwrap()
            .item_id(ItemPath::new("/test/path/some.xml").unwrap())
            .with_peg(crate::item::Revision(4));

        let configs = load_transform_configs(&source, &item).unwrap();
        assert_eq!(configs.len(), 2);
        assert_eq!(configs[0].name, "import");
        assert!(configs[0].active);
        assert_eq!(configs[1].name, "change");
        assert!(!configs[1].active);
        assert_eq!(
            *source.requested.lock().unwrap(),
            vec!["x-svn:///svn/demo1^/test/path"]
        );
    }

    #[test]
    fn test_load_configs_reports_malformed_option() {
        let source = MockConfigSource {
            options: vec![ConfigOption::new("cmsconfig-transform:broken", "{not json")],
            requested: Arc::new(Mutex::new(Vec::new())),
        };
        let item = Repository::new("x-svn:///svn/demo1")
            .unwrap()
            .item_id(ItemPath::new("/a.xml").unwrap());
        let err = load_transform_configs(&source, &item).unwrap_err();
        assert!(err.to_string().contains("cmsconfig-transform:broken"));
    }
}
