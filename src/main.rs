use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use ariadne::{Color, Label, Report, ReportKind, Source};
use baketpl::{Loader, ParseError};
use clap::Parser as ClapParser;
use confique::Config as _;
use tracing::*;

mod config;
mod logging;

#[derive(Debug, ClapParser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// The path to a build template JSON file, or `-` for standard input.
    input: PathBuf,

    /// Print the normalized template as JSON after a successful parse.
    #[arg(long)]
    dump: bool,
}

fn main() -> anyhow::Result<()> {
    logging::setup_logging();

    let cli = Args::parse();

    debug!(input = ?cli.input);

    let config = config::Config::builder()
        .env()
        .file("baketpl.toml")
        .load()
        .context("failed to load configuration")?;
    debug!(?config);

    let loader = Loader::new().max_include_passes(config.max_include_depth);
    let path = cli.input.display().to_string();

    // The source is read here as well so diagnostics can quote it; the
    // loader re-reads files itself to keep the byte capture authoritative.
    let (result, src) = if cli.input == Path::new("-") {
        let mut buf = Vec::new();
        std::io::stdin()
            .lock()
            .read_to_end(&mut buf)
            .context("failed to read standard input")?;
        let result = loader.parse_stream(&buf[..]);
        (result, String::from_utf8_lossy(&buf).into_owned())
    } else {
        let src = match std::fs::read_to_string(&cli.input) {
            Ok(src) => src,
            Err(e) => {
                error!(path = ?cli.input, "failed to read input");
                return Err(e).with_context(|| {
                    format!("failed to read file `{}`", cli.input.display())
                });
            }
        };
        (loader.parse_file(&cli.input), src)
    };

    match result {
        Ok(template) => {
            info!(
                variables = template.variables.len(),
                builders = template.builders.len(),
                provisioners = template.provisioners.len(),
                post_processor_stages = template.post_processors.len(),
                "template is valid"
            );
            if cli.dump {
                println!("{}", serde_json::to_string_pretty(&template)?);
            }
            Ok(())
        }
        Err(ParseError::Io(e)) => {
            Err(e).with_context(|| format!("failed to read `{}`", cli.input.display()))
        }
        Err(ParseError::Syntax(e)) => {
            let end = (e.offset + 1).min(src.len());
            let start = e.offset.min(end);
            Report::build(ReportKind::Error, &path, start)
                .with_message("template is not valid JSON")
                .with_label(
                    Label::new((&path, start..end))
                        .with_message(&e.message)
                        .with_color(Color::Red),
                )
                .finish()
                .print((&path, Source::from(&src)))?;
            bail!("failed to parse build template");
        }
        Err(ParseError::Schema(errors)) => {
            let count = errors.len();
            for error in &errors.errors {
                let offset = error.span.map(|span| span.start).unwrap_or(0);
                let mut report = Report::build(ReportKind::Error, &path, offset)
                    .with_message(&error.message);
                if let Some(span) = error.span {
                    report = report.with_label(
                        Label::new((&path, span.start..span.end)).with_color(Color::Red),
                    );
                }
                if let Some(help) = &error.help {
                    report.set_help(help);
                }
                report.finish().print((&path, Source::from(&src)))?;
            }
            bail!(
                "template contains {count} error{}",
                if count == 1 { "" } else { "s" }
            );
        }
    }
}
