//! Loader for declarative machine-image build templates.
//!
//! A template is a JSON document configuring a multi-stage image build:
//! variables, builders, provisioners, post-processors, and a push target.
//! This crate turns such a document into a normalized [`Template`]:
//!
//! - the `_include` directive stitches multiple documents into one under
//!   first-writer-wins merge semantics;
//! - post-processor stages accept three shapes (bare type string, object,
//!   sequence of either) and normalize to chains of configuration objects;
//! - the exact bytes of the root document are preserved in
//!   [`Template::raw_contents`] for downstream signing or diffing;
//! - schema violations are accumulated and reported together, and syntax
//!   errors from [`parse_file`] come annotated with line, column, and a
//!   caret pointing at the offending byte.
//!
//! ```no_run
//! let template = baketpl::parse_file("webserver.json")?;
//! for (name, builder) in &template.builders {
//!     println!("{name}: {}", builder.r#type);
//! }
//! # Ok::<(), baketpl::ParseError>(())
//! ```

use std::io::Read;
use std::path::{Path, PathBuf};

use chumsky::Parser as _;
use tracing::debug;

mod edit_distance;
mod error;
mod highlight;
mod include;
mod parser;
mod raw;
mod spanned;
mod template;
mod weak;

pub use error::{ParseError, SchemaError, SchemaErrors, SyntaxError, SyntaxPosition};
pub use include::DEFAULT_MAX_PASSES;
pub use template::{
    Builder, ConfigMap, PostProcessor, Provisioner, Push, Template, Variable,
};

use parser::Json;
use spanned::real_span;

/// Parses a template document from a reader with default settings.
///
/// The reader is consumed to the end; the bytes read become
/// [`Template::raw_contents`] verbatim. Relative `_include` paths resolve
/// against the process working directory, and syntax errors carry only a
/// byte offset (no line/column rewrite, since the source has no path to
/// re-read).
pub fn parse_stream<R: Read>(reader: R) -> Result<Template, ParseError> {
    Loader::new().parse_stream(reader)
}

/// Opens and parses a template file with default settings. See
/// [`Loader::parse_file`].
pub fn parse_file(path: impl AsRef<Path>) -> Result<Template, ParseError> {
    Loader::new().parse_file(path)
}

/// Entry point with tunable include resolution.
#[derive(Debug, Clone)]
pub struct Loader {
    max_include_passes: usize,
}

impl Default for Loader {
    fn default() -> Self {
        Loader {
            max_include_passes: DEFAULT_MAX_PASSES,
        }
    }
}

impl Loader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Caps how many rounds of `_include` resolution run before the parse
    /// fails. Chained includes need one pass per link; the cap keeps
    /// include cycles from looping forever.
    pub fn max_include_passes(mut self, passes: usize) -> Self {
        self.max_include_passes = passes;
        self
    }

    /// Parses a template document from a reader. See [`parse_stream`].
    pub fn parse_stream<R: Read>(&self, mut reader: R) -> Result<Template, ParseError> {
        let mut raw = Vec::new();
        reader.read_to_end(&mut raw)?;
        self.parse_bytes(&raw, None)
    }

    /// Opens and parses a template file.
    ///
    /// The path `-` reads from standard input instead (buffered fully in
    /// memory, so diagnostics can still point into the source); the
    /// resulting template then has no `path`. Syntax errors are rewritten
    /// to include line, column, offset, and a caret block. On success the
    /// absolute form of `path` is stored on the template.
    pub fn parse_file(&self, path: impl AsRef<Path>) -> Result<Template, ParseError> {
        let path = path.as_ref();

        if path == Path::new("-") {
            let mut raw = Vec::new();
            std::io::stdin().lock().read_to_end(&mut raw)?;
            return self.parse_source(&raw, None, None);
        }

        let raw = std::fs::read(path)?;
        let base = path.parent().map(Path::to_path_buf);
        self.parse_source(&raw, base.as_deref(), Some(path))
    }

    /// Shared tail of the file-ish entry points: parse, rewrite syntax
    /// errors with position info, attach the canonical path.
    fn parse_source(
        &self,
        raw: &[u8],
        base: Option<&Path>,
        path: Option<&Path>,
    ) -> Result<Template, ParseError> {
        match self.parse_bytes(raw, base) {
            Ok(mut template) => {
                if let Some(path) = path {
                    template.path = Some(absolute(path)?);
                }
                Ok(template)
            }
            Err(ParseError::Syntax(err)) => {
                Err(ParseError::Syntax(err.with_position_in(raw)))
            }
            Err(other) => Err(other),
        }
    }

    /// The pipeline proper: bytes → tree → include-resolved tree → raw
    /// template → normalized template.
    fn parse_bytes(&self, raw: &[u8], base: Option<&Path>) -> Result<Template, ParseError> {
        debug!(bytes = raw.len(), "parsing template document");

        let text = std::str::from_utf8(raw)
            .map_err(|e| SyntaxError::new(e.to_string(), e.valid_up_to()))?;

        let (output, errors) = parser::document().parse(text).into_output_errors();
        if let Some(first) = errors.first() {
            return Err(SyntaxError::new(first.to_string(), first.span().start).into());
        }
        let root = output.expect("a parse without errors produces output");

        let mut members = match root.val {
            Json::Object(members) => members,
            other => {
                let mut errs = SchemaErrors::new();
                errs.push(
                    format!(
                        "template root level must be an object, got {}",
                        other.kind_desc()
                    ),
                    real_span(root.span),
                );
                return Err(errs.into());
            }
        };

        include::resolve(&mut members, base, self.max_include_passes)?;

        let raw_template = raw::RawTemplate::bind(members, raw.to_vec())?;
        let template = raw_template.into_template()?;
        debug!(
            builders = template.builders.len(),
            provisioners = template.provisioners.len(),
            post_processor_stages = template.post_processors.len(),
            "template parsed"
        );
        Ok(template)
    }
}

fn absolute(path: &Path) -> Result<PathBuf, std::io::Error> {
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(std::env::current_dir()?.join(path))
    }
}
