//! The weakly-typed template shape and its normalization.
//!
//! Binding pulls the recognized top-level sections out of the
//! include-resolved tree without looking inside them; normalization then
//! walks each section, accumulating every violation it finds instead of
//! stopping at the first, so one parse reports as many problems as
//! possible.

use std::time::Duration;

use chumsky::span::SimpleSpan;
use tracing::debug;

use crate::edit_distance::find_best_match_for_name;
use crate::error::{SchemaError, SchemaErrors};
use crate::parser::{self, Json, Members};
use crate::spanned::{real_span, Spanned};
use crate::template::{
    Builder, ConfigMap, PostProcessor, Provisioner, Push, Template, Variable,
};
use crate::weak;

/// Top-level keys the binder claims; everything else is audited as unused.
const ROOT_KEYS: [&str; 7] = [
    "builders",
    "description",
    "min_packer_version",
    "post-processors",
    "provisioners",
    "push",
    "variables",
];

// Schema-claimed keys per entity; the residual config is everything else.
const BUILDER_KEYS: [&str; 2] = ["name", "type"];
const PROVISIONER_KEYS: [&str; 5] = ["except", "only", "override", "pause_before", "type"];
const POST_PROCESSOR_KEYS: [&str; 4] = ["except", "keep_input_artifact", "only", "type"];

/// The direct document shape of a template after include resolution,
/// before normalization into a [`Template`].
#[derive(Debug, Default)]
pub(crate) struct RawTemplate {
    pub min_version: String,
    pub description: String,
    pub variables: Vec<(Spanned<String>, Spanned<Json>)>,
    pub builders: Vec<Spanned<Members>>,
    pub push: Option<Spanned<Members>>,
    /// Still polymorphic: string, object, or sequence of either.
    pub post_processors: Vec<Spanned<Json>>,
    pub provisioners: Vec<Spanned<Members>>,
    /// Top-level keys no section claimed.
    pub unused: Vec<Spanned<String>>,
    pub raw_contents: Vec<u8>,
}

impl RawTemplate {
    /// Structurally decodes the include-resolved root object. Duplicate
    /// top-level keys resolve last-writer-wins. Top-level shape mismatches
    /// fail the bind, all reported together.
    pub fn bind(members: Members, raw_contents: Vec<u8>) -> Result<Self, SchemaErrors> {
        let mut raw = RawTemplate {
            raw_contents,
            ..Default::default()
        };
        let mut errs = SchemaErrors::new();

        for (key, value) in members {
            let key_name = key.val.clone();
            match key_name.as_str() {
                "min_packer_version" => match weak::to_string(&value.val) {
                    Ok(version) => raw.min_version = version,
                    Err(cause) => errs.push(
                        format!("min_packer_version: {cause}"),
                        real_span(value.span),
                    ),
                },
                "description" => match weak::to_string(&value.val) {
                    Ok(description) => raw.description = description,
                    Err(cause) => {
                        errs.push(format!("description: {cause}"), real_span(value.span))
                    }
                },
                "builders" => raw.builders = bind_object_list("builders", value, &mut errs),
                "provisioners" => {
                    raw.provisioners = bind_object_list("provisioners", value, &mut errs)
                }
                "post-processors" => match value.val {
                    Json::Array(items) => raw.post_processors = items,
                    other => errs.push(
                        format!("post-processors: expected an array, got {}", other.kind_desc()),
                        real_span(value.span),
                    ),
                },
                "variables" => match value.val {
                    Json::Object(entries) => raw.variables = entries,
                    other => errs.push(
                        format!("variables: expected an object, got {}", other.kind_desc()),
                        real_span(value.span),
                    ),
                },
                "push" => match value.val {
                    Json::Object(entries) => {
                        raw.push = Some(Spanned::new(value.span, entries))
                    }
                    other => errs.push(
                        format!("push: expected an object, got {}", other.kind_desc()),
                        real_span(value.span),
                    ),
                },
                _ => raw.unused.push(key),
            }
        }

        errs.into_result(raw)
    }

    /// Normalizes into the final [`Template`].
    pub fn into_template(self) -> Result<Template, SchemaErrors> {
        let mut errs = SchemaErrors::new();
        let mut template = Template {
            description: self.description,
            min_version: self.min_version,
            raw_contents: self.raw_contents,
            ..Default::default()
        };

        // Unused root keys. Underscore-prefixed keys are comments and pass
        // silently; the rest are reported, sorted and deduplicated.
        let mut unused: Vec<&Spanned<String>> = self
            .unused
            .iter()
            .filter(|key| !key.val.starts_with('_'))
            .collect();
        unused.sort_by(|a, b| a.val.cmp(&b.val));
        unused.dedup_by(|a, b| a.val == b.val);
        for key in unused {
            let help = find_best_match_for_name(&ROOT_KEYS, &key.val, Some(3))
                .map(|best| format!("did you mean '{best}'?"));
            errs.push_error(SchemaError {
                message: format!("Unknown root level key in template: '{}'", key.val),
                span: real_span(key.span),
                help,
            });
        }

        // Variables. Required means the source value was exactly null. A
        // plain scalar is the default value; the structured object form
        // carries it under a "default" key.
        for (name, value) in &self.variables {
            let required = matches!(value.val, Json::Null);
            let default = match &value.val {
                Json::Null => String::new(),
                Json::Object(entries) => match string_field(entries, "default") {
                    Ok(default) => default,
                    Err((cause, span)) => {
                        errs.push(format!("variable {}: {cause}", name.val), span);
                        continue;
                    }
                },
                other => match weak::to_string(other) {
                    Ok(default) => default,
                    Err(cause) => {
                        errs.push(
                            format!("variable {}: {cause}", name.val),
                            real_span(value.span),
                        );
                        continue;
                    }
                },
            };
            template
                .variables
                .insert(name.val.clone(), Variable { default, required });
        }

        // Builders.
        for (i, raw_builder) in self.builders.iter().enumerate() {
            let i = i + 1;
            let members = &raw_builder.val;

            let name = match string_field(members, "name") {
                Ok(name) => name,
                Err((cause, span)) => {
                    errs.push(format!("builder {i}: {cause}"), span);
                    continue;
                }
            };
            let r#type = match string_field(members, "type") {
                Ok(t) => t,
                Err((cause, span)) => {
                    errs.push(format!("builder {i}: {cause}"), span);
                    continue;
                }
            };

            if r#type.is_empty() {
                errs.push(
                    format!("builder {i}: missing 'type'"),
                    real_span(raw_builder.span),
                );
                continue;
            }

            // The name defaults to the type when absent.
            let name = if name.is_empty() { r#type.clone() } else { name };

            if template.builders.contains_key(&name) {
                errs.push(
                    format!("builder {i}: builder with name '{name}' already exists"),
                    real_span(raw_builder.span),
                );
                continue;
            }

            let config = residual_config(members, &BUILDER_KEYS);
            template
                .builders
                .insert(name.clone(), Builder { name, r#type, config });
        }

        // Post-processors: each stage is polymorphic and normalizes into a
        // chain of configuration objects first.
        for (i, raw_stage) in self.post_processors.iter().enumerate() {
            let i = i + 1;
            let configs = match parse_post_processor(i, raw_stage) {
                Ok(configs) => configs,
                Err(stage_errs) => {
                    errs.extend(stage_errs);
                    continue;
                }
            };

            let mut stage = Vec::with_capacity(configs.len());
            for (j, config_obj) in configs.iter().enumerate() {
                let j = j + 1;
                let members = &config_obj.val;

                let decoded = (|| -> Result<PostProcessor, (String, Option<SimpleSpan<usize>>)> {
                    Ok(PostProcessor {
                        r#type: string_field(members, "type")?,
                        keep_input_artifact: bool_field(members, "keep_input_artifact")?,
                        only: list_field(members, "only")?,
                        except: list_field(members, "except")?,
                        config: residual_config(members, &POST_PROCESSOR_KEYS),
                    })
                })();
                let post_processor = match decoded {
                    Ok(pp) => pp,
                    Err((cause, span)) => {
                        errs.push(format!("post-processor {i}.{j}: {cause}"), span);
                        continue;
                    }
                };

                if post_processor.r#type.is_empty() {
                    errs.push(
                        format!("post-processor {i}.{j}: type is required"),
                        real_span(config_obj.span),
                    );
                    continue;
                }

                stage.push(post_processor);
            }
            template.post_processors.push(stage);
        }

        // Provisioners.
        for (i, raw_provisioner) in self.provisioners.iter().enumerate() {
            let i = i + 1;
            let members = &raw_provisioner.val;

            let decoded = (|| -> Result<Provisioner, (String, Option<SimpleSpan<usize>>)> {
                Ok(Provisioner {
                    r#type: string_field(members, "type")?,
                    pause_before: duration_field(members, "pause_before")?,
                    only: list_field(members, "only")?,
                    except: list_field(members, "except")?,
                    r#override: map_field(members, "override")?,
                    config: residual_config(members, &PROVISIONER_KEYS),
                })
            })();
            let provisioner = match decoded {
                Ok(p) => p,
                Err((cause, span)) => {
                    errs.push(format!("provisioner {i}: {cause}"), span);
                    continue;
                }
            };

            if provisioner.r#type.is_empty() {
                errs.push(
                    format!("provisioner {i}: missing 'type'"),
                    real_span(raw_provisioner.span),
                );
                continue;
            }

            template.provisioners.push(provisioner);
        }

        // Push. An empty object is the same as no push section.
        if let Some(raw_push) = &self.push {
            if !raw_push.val.is_empty() {
                match decode_push(&raw_push.val) {
                    Ok(push) => template.push = Some(push),
                    Err((cause, span)) => errs.push(format!("push: {cause}"), span),
                }
            }
        }

        debug!(
            errors = errs.len(),
            builders = template.builders.len(),
            "template normalized"
        );
        errs.into_result(template)
    }
}

/// A section that must be an array of objects (builders, provisioners).
fn bind_object_list(
    section: &str,
    value: Spanned<Json>,
    errs: &mut SchemaErrors,
) -> Vec<Spanned<Members>> {
    match value.val {
        Json::Array(items) => {
            let mut out = Vec::with_capacity(items.len());
            for (i, item) in items.into_iter().enumerate() {
                match item.val {
                    Json::Object(members) => out.push(Spanned::new(item.span, members)),
                    other => errs.push(
                        format!(
                            "{section}: entry {}: expected an object, got {}",
                            i + 1,
                            other.kind_desc()
                        ),
                        real_span(item.span),
                    ),
                }
            }
            out
        }
        other => {
            errs.push(
                format!("{section}: expected an array, got {}", other.kind_desc()),
                real_span(value.span),
            );
            Vec::new()
        }
    }
}

/// One post-processor stage, normalized into a chain of configuration
/// objects. Three source shapes are accepted: a bare type string, a single
/// object, or a sequence mixing both. Deeper nesting is an error.
fn parse_post_processor(
    i: usize,
    raw: &Spanned<Json>,
) -> Result<Vec<Spanned<Members>>, SchemaErrors> {
    match &raw.val {
        Json::Str(r#type) => Ok(vec![synthetic_config(r#type)]),
        Json::Object(members) => Ok(vec![Spanned::new(raw.span, members.clone())]),
        Json::Array(items) => {
            let mut errs = SchemaErrors::new();
            let mut out = Vec::with_capacity(items.len());
            for (j, item) in items.iter().enumerate() {
                let j = j + 1;
                match &item.val {
                    Json::Str(r#type) => out.push(synthetic_config(r#type)),
                    Json::Object(members) => out.push(Spanned::new(item.span, members.clone())),
                    Json::Array(_) => errs.push(
                        format!(
                            "post-processor {i}.{j}: sequence not allowed to be nested in a sequence"
                        ),
                        real_span(item.span),
                    ),
                    _ => errs.push(
                        format!("post-processor {i}.{j}: unknown format"),
                        real_span(item.span),
                    ),
                }
            }
            errs.into_result(out)
        }
        _ => {
            let mut errs = SchemaErrors::new();
            errs.push(format!("post-processor {i}: bad format"), real_span(raw.span));
            Err(errs)
        }
    }
}

/// The object form of a bare `"type"` post-processor.
fn synthetic_config(r#type: &str) -> Spanned<Members> {
    Spanned::synthetic(vec![(
        Spanned::synthetic("type".to_string()),
        Spanned::synthetic(Json::Str(r#type.to_string())),
    )])
}

/// Everything except the schema-claimed keys, with spans dropped. The
/// include directive never survives into a config map.
fn residual_config(members: &Members, reserved: &[&str]) -> ConfigMap {
    let mut config = ConfigMap::new();
    for (key, value) in members {
        if reserved.contains(&key.val.as_str()) || key.val == crate::include::INCLUDE_KEY {
            continue;
        }
        config.insert(key.val.clone(), value.val.to_plain());
    }
    config
}

type FieldError = (String, Option<SimpleSpan<usize>>);

fn string_field(members: &Members, name: &str) -> Result<String, FieldError> {
    match parser::member(members, name) {
        Some(node) => weak::to_string(&node.val)
            .map_err(|cause| (format!("'{name}': {cause}"), real_span(node.span))),
        None => Ok(String::new()),
    }
}

fn bool_field(members: &Members, name: &str) -> Result<bool, FieldError> {
    match parser::member(members, name) {
        Some(node) => weak::to_bool(&node.val)
            .map_err(|cause| (format!("'{name}': {cause}"), real_span(node.span))),
        None => Ok(false),
    }
}

fn list_field(members: &Members, name: &str) -> Result<Vec<String>, FieldError> {
    match parser::member(members, name) {
        Some(node) => weak::to_string_vec(&node.val)
            .map_err(|cause| (format!("'{name}': {cause}"), real_span(node.span))),
        None => Ok(Vec::new()),
    }
}

fn duration_field(members: &Members, name: &str) -> Result<Option<Duration>, FieldError> {
    match parser::member(members, name) {
        Some(node) if !matches!(node.val, Json::Null) => weak::to_duration(&node.val)
            .map(Some)
            .map_err(|cause| (format!("'{name}': {cause}"), real_span(node.span))),
        _ => Ok(None),
    }
}

/// An object-valued field whose entries stay arbitrary JSON.
fn map_field(members: &Members, name: &str) -> Result<ConfigMap, FieldError> {
    match parser::member(members, name) {
        Some(node) => match &node.val {
            Json::Object(entries) => {
                let mut out = ConfigMap::new();
                for (key, value) in entries {
                    out.insert(key.val.clone(), value.val.to_plain());
                }
                Ok(out)
            }
            Json::Null => Ok(ConfigMap::new()),
            other => Err((
                format!("'{name}': expected an object, got {}", other.kind_desc()),
                real_span(node.span),
            )),
        },
        None => Ok(ConfigMap::new()),
    }
}

fn decode_push(members: &Members) -> Result<Push, FieldError> {
    Ok(Push {
        name: string_field(members, "name")?,
        address: string_field(members, "address")?,
        base_dir: string_field(members, "base_dir")?,
        token: string_field(members, "token")?,
        include: list_field(members, "include")?,
        exclude: list_field(members, "exclude")?,
        vcs: bool_field(members, "vcs")?,
    })
}
