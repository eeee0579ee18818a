//! Resolution of the `_include` directive.
//!
//! A template document may name further documents to merge into itself:
//!
//! ```json
//! { "_include": ["base.json", "ssh.json"], "builders": [ ... ] }
//! ```
//!
//! Each included document contributes its top-level keys under
//! first-writer-wins semantics: the host document's own keys (and keys
//! merged from earlier includes) always take precedence. The one exception
//! is `_include` itself, which accumulates so included documents can pull
//! in further files; those are resolved on the next pass.

use std::fs;
use std::path::Path;

use chumsky::Parser;
use tracing::debug;

use crate::error::SchemaErrors;
use crate::highlight::highlight_position;
use crate::parser::{self, Json, Members};
use crate::spanned::{dummy_span, real_span, Spanned};

pub const INCLUDE_KEY: &str = "_include";

/// Resolution passes before giving up. Includes can chain (an included file
/// may include another), and nothing detects cycles, so the pass count is
/// bounded instead.
pub const DEFAULT_MAX_PASSES: usize = 32;

/// Resolves every `_include` directive in `members` in place. On return
/// (even an erroneous one) the tree contains no `_include` key anywhere.
pub fn resolve(
    members: &mut Members,
    base: Option<&Path>,
    max_passes: usize,
) -> Result<(), SchemaErrors> {
    let mut errs = SchemaErrors::new();
    let mut pass = 0usize;

    while let Some(directive) = take_include(members) {
        pass += 1;
        if pass > max_passes {
            errs.push(
                format!("include depth limit ({max_passes}) exceeded, includes may form a cycle"),
                real_span(directive.span),
            );
            break;
        }
        debug!(pass, "resolving includes");

        let mut paths = Vec::new();
        collect_paths(&directive, &mut paths, &mut errs);

        // `_include` values introduced by the merged documents, queued for
        // the next pass.
        let mut pending: Vec<Spanned<Json>> = Vec::new();

        for path in &paths {
            match load_include(base, path) {
                Ok(included) => merge(members, included, &mut pending),
                Err(message) => errs.push(message, None),
            }
        }

        if !pending.is_empty() {
            members.push((
                Spanned::synthetic(INCLUDE_KEY.to_string()),
                Spanned::synthetic(Json::Array(pending)),
            ));
        }

        // Every include of one pass is attempted before failing, so a
        // single run reports all of them.
        if !errs.is_empty() {
            break;
        }
    }

    strip_nested_includes(members);
    errs.into_result(())
}

/// Removes every `_include` entry from the object, returning the value of
/// the last one (duplicate keys resolve last-writer-wins, like everywhere
/// else).
fn take_include(members: &mut Members) -> Option<Spanned<Json>> {
    let mut found = None;
    let mut i = 0;
    while i < members.len() {
        if members[i].0.val == INCLUDE_KEY {
            let (_, value) = members.remove(i);
            found = Some(value);
        } else {
            i += 1;
        }
    }
    found
}

/// A directive is one path or a sequence of paths; anything else is an
/// error naming the offending element.
fn collect_paths(directive: &Spanned<Json>, paths: &mut Vec<String>, errs: &mut SchemaErrors) {
    match &directive.val {
        Json::Str(path) => paths.push(path.clone()),
        Json::Array(items) => {
            for (i, item) in items.iter().enumerate() {
                match &item.val {
                    Json::Str(path) => paths.push(path.clone()),
                    other => errs.push(
                        format!(
                            "_include: element {}: expected a string, got {}",
                            i + 1,
                            other.kind_desc()
                        ),
                        real_span(item.span),
                    ),
                }
            }
        }
        other => errs.push(
            format!(
                "_include: expected a string or array of strings, got {}",
                other.kind_desc()
            ),
            real_span(directive.span),
        ),
    }
}

/// Reads and parses one included document, which must be a JSON object at
/// the top level. Relative paths resolve against the root document's
/// directory, also for includes found inside included files.
fn load_include(base: Option<&Path>, path: &str) -> Result<Members, String> {
    let resolved = match base {
        Some(base) if !Path::new(path).is_absolute() => base.join(path),
        _ => Path::new(path).to_path_buf(),
    };
    debug!(path = %resolved.display(), "loading include");

    let bytes = fs::read(&resolved).map_err(|e| format!("include '{path}': {e}"))?;
    let text =
        std::str::from_utf8(&bytes).map_err(|e| format!("include '{path}': {e}"))?;

    let (output, errors) = parser::document().parse(text).into_output_errors();
    if let Some(first) = errors.first() {
        let offset = first.span().start;
        let (line, column, highlight) = highlight_position(&bytes, offset + 1);
        return Err(format!(
            "include '{path}': Error parsing JSON: {first}\nAt line {line}, column {column} (offset {}):\n{highlight}",
            offset + 1
        ));
    }

    let root = output.ok_or_else(|| format!("include '{path}': empty document"))?;
    match root.val {
        Json::Object(members) => Ok(members),
        other => Err(format!(
            "include '{path}': root level value must be an object, got {}",
            other.kind_desc()
        )),
    }
}

/// Merges an included document into the host: first writer wins, except
/// `_include`, which accumulates into `pending`.
fn merge(host: &mut Members, included: Members, pending: &mut Vec<Spanned<Json>>) {
    for (key, mut value) in included {
        respan(&mut value);
        if key.val == INCLUDE_KEY {
            match value.val {
                Json::Array(items) => pending.extend(items),
                _ => pending.push(value),
            }
        } else if !parser::has_member(host, &key.val) {
            host.push((Spanned::synthetic(key.val), value));
        }
    }
}

/// Adopted nodes carry spans into the file they came from; those offsets
/// are meaningless against the root document, so they are invalidated.
fn respan(node: &mut Spanned<Json>) {
    node.span = dummy_span();
    match &mut node.val {
        Json::Array(items) => items.iter_mut().for_each(respan),
        Json::Object(members) => {
            for (key, value) in members {
                key.span = dummy_span();
                respan(value);
            }
        }
        _ => {}
    }
}

/// The directive is only recognized at the top level, but it must not leak
/// into residual config maps either, so nested occurrences are dropped.
fn strip_nested_includes(members: &mut Members) {
    for (_, value) in members.iter_mut() {
        strip_in_node(value);
    }
}

fn strip_in_node(node: &mut Spanned<Json>) {
    match &mut node.val {
        Json::Array(items) => items.iter_mut().for_each(strip_in_node),
        Json::Object(members) => {
            members.retain(|(key, _)| key.val != INCLUDE_KEY);
            for (_, value) in members.iter_mut() {
                strip_in_node(value);
            }
        }
        _ => {}
    }
}
