//! The normalized template model.

use std::path::PathBuf;
use std::time::Duration;

use indexmap::IndexMap;
use serde::{Serialize, Serializer};
use serde_json::{Map, Value};

/// Residual configuration: whatever an entity's object carried beyond the
/// schema-claimed keys. An empty map is the "omitted" state.
pub type ConfigMap = IndexMap<String, Value>;

/// A fully parsed and validated build template, constructed once by
/// [`crate::parse_stream`] / [`crate::parse_file`] and immutable thereafter.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Template {
    /// Absolute path of the root document; unset when the document came
    /// from a non-file source.
    pub path: Option<PathBuf>,
    pub description: String,
    /// Minimum orchestrator version the template asks for. Opaque here;
    /// gating is the orchestrator's job.
    pub min_version: String,
    pub variables: IndexMap<String, Variable>,
    /// Keyed by builder name; names are unique and each value's `name`
    /// field equals its key.
    pub builders: IndexMap<String, Builder>,
    pub provisioners: Vec<Provisioner>,
    /// Outer sequence: stages run in parallel. Inner: a chain within one
    /// stage.
    pub post_processors: Vec<Vec<PostProcessor>>,
    pub push: Option<Push>,
    /// The exact bytes of the root document as consumed, for downstream
    /// signing or diffing. Include resolution does not rewrite this.
    pub raw_contents: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Variable {
    pub default: String,
    /// True if and only if the variable's source value was the JSON null
    /// literal; `default` is then empty.
    pub required: bool,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Builder {
    /// Unique within the template; defaults to `type` when absent.
    pub name: String,
    pub r#type: String,
    pub config: ConfigMap,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Provisioner {
    pub r#type: String,
    pub pause_before: Option<Duration>,
    pub only: Vec<String>,
    pub except: Vec<String>,
    /// Per-builder configuration overlays, keyed by builder name.
    pub r#override: ConfigMap,
    pub config: ConfigMap,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct PostProcessor {
    pub r#type: String,
    pub keep_input_artifact: bool,
    pub only: Vec<String>,
    pub except: Vec<String>,
    pub config: ConfigMap,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Push {
    pub name: String,
    pub address: String,
    pub base_dir: String,
    pub token: String,
    pub include: Vec<String>,
    pub exclude: Vec<String>,
    pub vcs: bool,
}

/// `only`/`except` selector shared by provisioners and post-processors:
/// with a non-empty `only`, everything not listed is skipped; otherwise a
/// build is skipped when `except` lists it.
fn skip_build(only: &[String], except: &[String], build: &str) -> bool {
    if !only.is_empty() {
        return !only.iter().any(|name| name == build);
    }
    if !except.is_empty() {
        return except.iter().any(|name| name == build);
    }
    false
}

impl Provisioner {
    /// Whether this provisioner is skipped for the build named `build`.
    pub fn skip(&self, build: &str) -> bool {
        skip_build(&self.only, &self.except, build)
    }
}

impl PostProcessor {
    /// Whether this post-processor is skipped for the build named `build`.
    pub fn skip(&self, build: &str) -> bool {
        skip_build(&self.only, &self.except, build)
    }
}

impl Template {
    /// Re-serializes the normalized template into its canonical document
    /// shape: residual configs are flattened back beside the schema keys,
    /// required variables become `null`, and a post-processor with nothing
    /// but a type collapses to a bare string. `path` and `raw_contents` are
    /// not part of the document. Parsing the result again yields an
    /// equivalent template (modulo those two fields).
    pub fn to_value(&self) -> Value {
        let mut root = Map::new();

        if !self.description.is_empty() {
            root.insert("description".into(), self.description.clone().into());
        }
        if !self.min_version.is_empty() {
            root.insert("min_packer_version".into(), self.min_version.clone().into());
        }
        if !self.variables.is_empty() {
            let mut variables = Map::new();
            for (name, variable) in &self.variables {
                let value = if variable.required {
                    Value::Null
                } else {
                    Value::String(variable.default.clone())
                };
                variables.insert(name.clone(), value);
            }
            root.insert("variables".into(), Value::Object(variables));
        }
        if !self.builders.is_empty() {
            let builders = self.builders.values().map(Builder::to_value).collect();
            root.insert("builders".into(), Value::Array(builders));
        }
        if !self.provisioners.is_empty() {
            let provisioners = self
                .provisioners
                .iter()
                .map(Provisioner::to_value)
                .collect();
            root.insert("provisioners".into(), Value::Array(provisioners));
        }
        if !self.post_processors.is_empty() {
            let stages = self
                .post_processors
                .iter()
                .map(|stage| {
                    let mut items: Vec<Value> =
                        stage.iter().map(PostProcessor::to_value).collect();
                    if items.len() == 1 {
                        items.pop().unwrap()
                    } else {
                        Value::Array(items)
                    }
                })
                .collect();
            root.insert("post-processors".into(), Value::Array(stages));
        }
        if let Some(push) = &self.push {
            root.insert("push".into(), push.to_value());
        }

        Value::Object(root)
    }
}

impl Builder {
    fn to_value(&self) -> Value {
        let mut out = Map::new();
        if self.name != self.r#type {
            out.insert("name".into(), self.name.clone().into());
        }
        out.insert("type".into(), self.r#type.clone().into());
        for (key, value) in &self.config {
            out.insert(key.clone(), value.clone());
        }
        Value::Object(out)
    }
}

impl Provisioner {
    fn to_value(&self) -> Value {
        let mut out = Map::new();
        out.insert("type".into(), self.r#type.clone().into());
        if let Some(pause) = self.pause_before {
            out.insert(
                "pause_before".into(),
                humantime::format_duration(pause).to_string().into(),
            );
        }
        if !self.only.is_empty() {
            out.insert("only".into(), self.only.clone().into());
        }
        if !self.except.is_empty() {
            out.insert("except".into(), self.except.clone().into());
        }
        if !self.r#override.is_empty() {
            let overrides: Map<String, Value> = self
                .r#override
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect();
            out.insert("override".into(), Value::Object(overrides));
        }
        for (key, value) in &self.config {
            out.insert(key.clone(), value.clone());
        }
        Value::Object(out)
    }
}

impl PostProcessor {
    fn to_value(&self) -> Value {
        // A definition with nothing but a type round-trips as the bare
        // string form.
        if self.config.is_empty()
            && self.only.is_empty()
            && self.except.is_empty()
            && !self.keep_input_artifact
        {
            return Value::String(self.r#type.clone());
        }

        let mut out = Map::new();
        out.insert("type".into(), self.r#type.clone().into());
        if self.keep_input_artifact {
            out.insert("keep_input_artifact".into(), true.into());
        }
        if !self.only.is_empty() {
            out.insert("only".into(), self.only.clone().into());
        }
        if !self.except.is_empty() {
            out.insert("except".into(), self.except.clone().into());
        }
        for (key, value) in &self.config {
            out.insert(key.clone(), value.clone());
        }
        Value::Object(out)
    }
}

impl Push {
    fn to_value(&self) -> Value {
        let mut out = Map::new();
        if !self.name.is_empty() {
            out.insert("name".into(), self.name.clone().into());
        }
        if !self.address.is_empty() {
            out.insert("address".into(), self.address.clone().into());
        }
        if !self.base_dir.is_empty() {
            out.insert("base_dir".into(), self.base_dir.clone().into());
        }
        if !self.token.is_empty() {
            out.insert("token".into(), self.token.clone().into());
        }
        if !self.include.is_empty() {
            out.insert("include".into(), self.include.clone().into());
        }
        if !self.exclude.is_empty() {
            out.insert("exclude".into(), self.exclude.clone().into());
        }
        if self.vcs {
            out.insert("vcs".into(), true.into());
        }
        Value::Object(out)
    }
}

impl Serialize for Template {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_value().serialize(serializer)
    }
}
