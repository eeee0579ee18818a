use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use baketpl::{parse_file, parse_stream, Loader, ParseError, SchemaErrors, Template};
use indoc::indoc;
use serde_json::json;
use tempfile::tempdir;

fn fixture(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures")
        .join(name)
}

fn schema_errors(result: Result<Template, ParseError>) -> SchemaErrors {
    match result {
        Err(ParseError::Schema(errs)) => errs,
        Ok(_) => panic!("expected schema errors, parse succeeded"),
        Err(other) => panic!("expected schema errors, got: {other}"),
    }
}

fn write(dir: &Path, name: &str, content: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, content).unwrap();
    path
}

#[test]
fn builder_name_defaults_to_type() {
    let template = parse_file(fixture("parse-basic.json")).unwrap();

    assert_eq!(template.builders.len(), 1);
    let builder = &template.builders["something"];
    assert_eq!(builder.name, "something");
    assert_eq!(builder.r#type, "something");
    assert!(builder.config.is_empty());

    assert!(template.variables.is_empty());
    assert!(template.provisioners.is_empty());
    assert!(template.post_processors.is_empty());
    assert!(template.push.is_none());
    assert!(template.path.as_ref().unwrap().is_absolute());
}

#[test]
fn builder_without_type_is_rejected() {
    let errs = schema_errors(parse_file(fixture("parse-builder-no-type.json")));
    assert_eq!(errs.len(), 1);
    assert_eq!(errs.errors[0].message, "builder 1: missing 'type'");
}

#[test]
fn duplicate_builder_name_is_rejected() {
    let errs = schema_errors(parse_file(fixture("parse-builder-repeat.json")));
    assert_eq!(errs.len(), 1);
    assert_eq!(
        errs.errors[0].message,
        "builder 2: builder with name 'x' already exists"
    );
}

#[test]
fn builder_config_keeps_unclaimed_keys_only() {
    let template =
        parse_stream(&br#"{"builders":[{"name":"b","type":"t","arch":"arm64"}]}"#[..]).unwrap();
    let builder = &template.builders["b"];
    assert_eq!(builder.config.len(), 1);
    assert_eq!(builder.config["arch"], json!("arm64"));
}

#[test]
fn description_and_min_version() {
    let template = parse_file(fixture("parse-description.json")).unwrap();
    assert_eq!(template.description, "foo");

    let template = parse_file(fixture("parse-min-version.json")).unwrap();
    assert_eq!(template.min_version, "1.2");
}

#[test]
fn min_version_accepts_a_bare_number() {
    let template = parse_stream(&br#"{"min_packer_version": 1.2}"#[..]).unwrap();
    assert_eq!(template.min_version, "1.2");
}

#[test]
fn provisioner_basic() {
    let template = parse_file(fixture("parse-provisioner-basic.json")).unwrap();
    assert_eq!(template.provisioners.len(), 1);
    let provisioner = &template.provisioners[0];
    assert_eq!(provisioner.r#type, "something");
    assert!(provisioner.config.is_empty());
    assert!(provisioner.pause_before.is_none());
}

#[test]
fn provisioner_pause_before() {
    let template = parse_file(fixture("parse-provisioner-pause-before.json")).unwrap();
    assert_eq!(
        template.provisioners[0].pause_before,
        Some(Duration::from_secs(1))
    );
    // pause_before is schema-claimed, never residual config.
    assert!(template.provisioners[0].config.is_empty());
}

#[test]
fn provisioner_pause_before_accepts_nanosecond_numbers() {
    let template =
        parse_stream(&br#"{"provisioners":[{"type":"t","pause_before":1000000000}]}"#[..]).unwrap();
    assert_eq!(
        template.provisioners[0].pause_before,
        Some(Duration::from_secs(1))
    );
}

#[test]
fn provisioner_only_and_except() {
    let template = parse_file(fixture("parse-provisioner-only.json")).unwrap();
    assert_eq!(template.provisioners[0].only, vec!["foo".to_string()]);
    assert!(template.provisioners[0].except.is_empty());

    let template = parse_file(fixture("parse-provisioner-except.json")).unwrap();
    assert_eq!(template.provisioners[0].except, vec!["foo".to_string()]);
    assert!(template.provisioners[0].only.is_empty());
}

#[test]
fn provisioner_override() {
    let template = parse_file(fixture("parse-provisioner-override.json")).unwrap();
    let provisioner = &template.provisioners[0];
    assert_eq!(provisioner.r#override["foo"], json!({"bar": "baz"}));
    assert!(provisioner.config.is_empty());
}

#[test]
fn provisioner_without_type_is_rejected() {
    let errs = schema_errors(parse_file(fixture("parse-provisioner-no-type.json")));
    assert_eq!(errs.len(), 1);
    assert_eq!(errs.errors[0].message, "provisioner 1: missing 'type'");
}

#[test]
fn post_processor_object_form() {
    let template = parse_file(fixture("parse-pp-basic.json")).unwrap();
    assert_eq!(template.post_processors.len(), 1);
    let pp = &template.post_processors[0][0];
    assert_eq!(pp.r#type, "foo");
    assert_eq!(pp.config["foo"], json!("bar"));
}

#[test]
fn post_processor_keep_input_artifact_is_schema_claimed() {
    let template = parse_file(fixture("parse-pp-keep.json")).unwrap();
    let pp = &template.post_processors[0][0];
    assert!(pp.keep_input_artifact);
    assert!(pp.config.is_empty());
}

#[test]
fn post_processor_polymorphism() {
    let template = parse_file(fixture("parse-pp-mixed.json")).unwrap();

    assert_eq!(template.post_processors.len(), 3);
    assert_eq!(template.post_processors[0].len(), 1);
    assert_eq!(template.post_processors[0][0].r#type, "foo");
    assert_eq!(template.post_processors[1].len(), 1);
    assert_eq!(template.post_processors[1][0].r#type, "bar");
    assert_eq!(template.post_processors[2].len(), 2);
    assert_eq!(template.post_processors[2][0].r#type, "baz");
    assert_eq!(template.post_processors[2][1].r#type, "qux");
}

#[test]
fn post_processor_nested_sequence_is_rejected() {
    let errs = schema_errors(parse_file(fixture("parse-pp-nested.json")));
    assert_eq!(errs.len(), 1);
    assert_eq!(
        errs.errors[0].message,
        "post-processor 1.1: sequence not allowed to be nested in a sequence"
    );
}

#[test]
fn post_processor_scalar_is_rejected() {
    let errs = schema_errors(parse_file(fixture("parse-pp-bad.json")));
    assert_eq!(errs.len(), 1);
    assert_eq!(errs.errors[0].message, "post-processor 1: bad format");
}

#[test]
fn post_processor_without_type_is_rejected() {
    let errs = schema_errors(parse_file(fixture("parse-pp-no-type.json")));
    assert_eq!(errs.len(), 1);
    assert_eq!(errs.errors[0].message, "post-processor 1.1: type is required");
}

#[test]
fn variable_default() {
    let template = parse_file(fixture("parse-variable-default.json")).unwrap();
    let variable = &template.variables["foo"];
    assert_eq!(variable.default, "foo");
    assert!(!variable.required);
}

#[test]
fn variable_required_iff_null() {
    let template = parse_file(fixture("parse-variable-required.json")).unwrap();
    let variable = &template.variables["foo"];
    assert!(variable.required);
    assert_eq!(variable.default, "");
}

#[test]
fn variable_weakly_decodes_numbers() {
    let template = parse_stream(&br#"{"variables":{"count": 3}}"#[..]).unwrap();
    assert_eq!(template.variables["count"].default, "3");
}

#[test]
fn variable_structured_form_carries_a_default() {
    let template =
        parse_stream(&br#"{"variables":{"region":{"default":"us-east-1"}}}"#[..]).unwrap();
    let variable = &template.variables["region"];
    assert_eq!(variable.default, "us-east-1");
    assert!(!variable.required);
}

#[test]
fn push_is_decoded_when_present() {
    let template = parse_file(fixture("parse-push.json")).unwrap();
    let push = template.push.unwrap();
    assert_eq!(push.name, "foo");
    assert!(push.address.is_empty());
    assert!(!push.vcs);
}

#[test]
fn empty_push_object_is_absent() {
    let template = parse_stream(&br#"{"push":{}}"#[..]).unwrap();
    assert!(template.push.is_none());
}

#[test]
fn comment_keys_are_tolerated() {
    let template = parse_file(fixture("parse-comment.json")).unwrap();
    assert_eq!(template.builders.len(), 1);
}

#[test]
fn comment_only_document_is_an_empty_template() {
    let template = parse_stream(&br#"{"_comment": "x"}"#[..]).unwrap();
    assert!(template.builders.is_empty());
    assert!(template.variables.is_empty());
    assert!(template.provisioners.is_empty());
    assert!(template.post_processors.is_empty());
    assert!(template.push.is_none());
}

#[test]
fn unknown_root_key_is_rejected() {
    let errs = schema_errors(parse_file(fixture("parse-unknown-key.json")));
    assert_eq!(errs.len(), 1);
    assert_eq!(
        errs.errors[0].message,
        "Unknown root level key in template: 'unknown'"
    );
}

#[test]
fn unknown_key_close_to_a_real_one_gets_a_suggestion() {
    let errs = schema_errors(parse_stream(&br#"{"bulders": []}"#[..]));
    assert_eq!(errs.len(), 1);
    assert_eq!(
        errs.errors[0].help.as_deref(),
        Some("did you mean 'builders'?")
    );
}

#[test]
fn root_must_be_an_object() {
    let errs = schema_errors(parse_stream(&b"[1, 2]"[..]));
    assert_eq!(errs.len(), 1);
    assert_eq!(
        errs.errors[0].message,
        "template root level must be an object, got array"
    );
}

#[test]
fn duplicate_root_keys_resolve_last_writer_wins() {
    let template =
        parse_stream(&br#"{"description":"a","description":"b"}"#[..]).unwrap();
    assert_eq!(template.description, "b");
}

#[test]
fn raw_contents_is_byte_exact() {
    let bytes = fs::read(fixture("parse-contents.json")).unwrap();
    let template = parse_file(fixture("parse-contents.json")).unwrap();
    assert_eq!(template.raw_contents, bytes);

    let input = br#"{ "builders": [ {"type":"test"} ] }  "#;
    let template = parse_stream(&input[..]).unwrap();
    assert_eq!(template.raw_contents, input);
}

#[test]
fn stream_parses_have_no_path() {
    let template = parse_stream(&b"{}"[..]).unwrap();
    assert!(template.path.is_none());
}

#[test]
fn syntax_error_is_rewritten_with_position() {
    let err = match parse_file(fixture("error-syntax.json")) {
        Err(ParseError::Syntax(err)) => err,
        other => panic!("expected a syntax error, got: {other:?}"),
    };
    let text = err.to_string();
    assert!(text.starts_with("Error parsing JSON: "), "got: {text}");
    assert!(text.contains("At line 4, column 3 (offset 33):"), "got: {text}");
    assert!(text.contains("    4:  ]\n        ^\n"), "got: {text}");
}

#[test]
fn syntax_error_at_the_first_byte_is_one_based() {
    let err = match parse_file(fixture("error-beginning.json")) {
        Err(ParseError::Syntax(err)) => err,
        other => panic!("expected a syntax error, got: {other:?}"),
    };
    assert!(
        err.to_string().contains("At line 1, column 1 (offset 1):"),
        "got: {err}"
    );
}

#[test]
fn stream_syntax_errors_keep_the_raw_offset() {
    let err = match parse_stream(&b"{\"a\": }"[..]) {
        Err(ParseError::Syntax(err)) => err,
        other => panic!("expected a syntax error, got: {other:?}"),
    };
    assert_eq!(err.offset, 6);
    assert!(err.position.is_none());
}

#[test]
fn include_merges_missing_keys() {
    let dir = tempdir().unwrap();
    let main = write(
        dir.path(),
        "main.json",
        r#"{"_include": "inc.json", "builders": [{"type": "host"}]}"#,
    );
    write(
        dir.path(),
        "inc.json",
        r#"{"description": "from include", "provisioners": [{"type": "shell"}]}"#,
    );

    let template = parse_file(&main).unwrap();
    assert_eq!(template.description, "from include");
    assert_eq!(template.provisioners.len(), 1);
    assert!(template.builders.contains_key("host"));
}

#[test]
fn include_first_writer_wins() {
    let dir = tempdir().unwrap();
    let main = write(
        dir.path(),
        "main.json",
        r#"{"_include": "inc.json", "variables": {"builder_type": {"default": "builder-overriden"}}}"#,
    );
    write(
        dir.path(),
        "inc.json",
        r#"{"variables": {"builder_type": {"default": "builder-original"}}}"#,
    );

    let template = parse_file(&main).unwrap();
    assert_eq!(
        template.variables["builder_type"].default,
        "builder-overriden"
    );
}

#[test]
fn earlier_sibling_include_wins() {
    let dir = tempdir().unwrap();
    let main = write(
        dir.path(),
        "main.json",
        r#"{"_include": ["a.json", "b.json"]}"#,
    );
    write(dir.path(), "a.json", r#"{"description": "first"}"#);
    write(dir.path(), "b.json", r#"{"description": "second"}"#);

    let template = parse_file(&main).unwrap();
    assert_eq!(template.description, "first");
}

#[test]
fn includes_chain_across_documents() {
    let dir = tempdir().unwrap();
    let main = write(
        dir.path(),
        "main.json",
        r#"{"_include": "a.json", "description": "root"}"#,
    );
    write(
        dir.path(),
        "a.json",
        r#"{"_include": "b.json", "description": "a", "min_packer_version": "1.0"}"#,
    );
    write(dir.path(), "b.json", r#"{"builders": [{"type": "x"}]}"#);

    let template = parse_file(&main).unwrap();
    assert_eq!(template.description, "root");
    assert_eq!(template.min_version, "1.0");
    assert!(template.builders.contains_key("x"));
}

#[test]
fn including_an_empty_document_changes_nothing() {
    let dir = tempdir().unwrap();
    let with_include = write(
        dir.path(),
        "with.json",
        r#"{"_include": "empty.json", "builders": [{"type": "something"}]}"#,
    );
    let without = write(
        dir.path(),
        "without.json",
        r#"{"builders": [{"type": "something"}]}"#,
    );
    write(dir.path(), "empty.json", "{}");

    let a = parse_file(&with_include).unwrap();
    let b = parse_file(&without).unwrap();
    assert_eq!(a.builders, b.builders);
    assert_eq!(a.variables, b.variables);
    assert_eq!(a.provisioners, b.provisioners);
    assert_eq!(a.post_processors, b.post_processors);
    assert_eq!(a.push, b.push);
}

#[test]
fn missing_include_file_is_reported() {
    let dir = tempdir().unwrap();
    let main = write(dir.path(), "main.json", r#"{"_include": "nope.json"}"#);

    let errs = schema_errors(parse_file(&main));
    assert_eq!(errs.len(), 1);
    assert!(
        errs.errors[0].message.starts_with("include 'nope.json':"),
        "got: {}",
        errs.errors[0].message
    );
}

#[test]
fn include_directive_must_be_paths() {
    let errs = schema_errors(parse_stream(&br#"{"_include": 5}"#[..]));
    assert_eq!(errs.len(), 1);
    assert_eq!(
        errs.errors[0].message,
        "_include: expected a string or array of strings, got number"
    );

    let errs = schema_errors(parse_stream(&br#"{"_include": [true]}"#[..]));
    assert_eq!(errs.len(), 1);
    assert_eq!(
        errs.errors[0].message,
        "_include: element 1: expected a string, got bool"
    );
}

#[test]
fn included_document_must_be_an_object() {
    let dir = tempdir().unwrap();
    let main = write(dir.path(), "main.json", r#"{"_include": "inc.json"}"#);
    write(dir.path(), "inc.json", "[1, 2]");

    let errs = schema_errors(parse_file(&main));
    assert_eq!(errs.len(), 1);
    assert_eq!(
        errs.errors[0].message,
        "include 'inc.json': root level value must be an object, got array"
    );
}

#[test]
fn malformed_include_gets_its_own_position_diagnostic() {
    let dir = tempdir().unwrap();
    let main = write(dir.path(), "main.json", r#"{"_include": "inc.json"}"#);
    write(dir.path(), "inc.json", "{\"a\":\n*}");

    let errs = schema_errors(parse_file(&main));
    assert_eq!(errs.len(), 1);
    let message = &errs.errors[0].message;
    assert!(message.starts_with("include 'inc.json': Error parsing JSON:"), "got: {message}");
    assert!(message.contains("At line 2, column"), "got: {message}");
}

#[test]
fn include_cycles_hit_the_depth_cap() {
    let dir = tempdir().unwrap();
    let main = write(dir.path(), "main.json", r#"{"_include": "main.json"}"#);

    let errs = schema_errors(
        Loader::new()
            .max_include_passes(4)
            .parse_file(&main),
    );
    assert_eq!(errs.len(), 1);
    assert!(
        errs.errors[0]
            .message
            .contains("include depth limit (4) exceeded"),
        "got: {}",
        errs.errors[0].message
    );
}

#[test]
fn include_never_survives_into_configs() {
    let template = parse_stream(
        &br#"{"builders":[{"type":"t","_include":"sneaky.json"}]}"#[..],
    )
    .unwrap();
    assert!(template.builders["t"].config.is_empty());
}

#[test]
fn raw_contents_is_the_root_document_even_with_includes() {
    let dir = tempdir().unwrap();
    let content = r#"{"_include": "inc.json"}"#;
    let main = write(dir.path(), "main.json", content);
    write(dir.path(), "inc.json", r#"{"description": "d"}"#);

    let template = parse_file(&main).unwrap();
    assert_eq!(template.raw_contents, content.as_bytes());
}

#[test]
fn multiple_errors_are_reported_together() {
    let doc = indoc! {r#"
        {
          "unknown": 1,
          "builders": [{"name": "b"}],
          "provisioners": [{}]
        }
    "#};
    let errs = schema_errors(parse_stream(doc.as_bytes()));
    let messages: Vec<&str> = errs.errors.iter().map(|e| e.message.as_str()).collect();
    assert_eq!(
        messages,
        vec![
            "Unknown root level key in template: 'unknown'",
            "builder 1: missing 'type'",
            "provisioner 1: missing 'type'",
        ]
    );
}

#[test]
fn reserialized_template_reparses_equivalently() {
    let template = parse_file(fixture("parse-kitchen-sink.json")).unwrap();

    let text = serde_json::to_string_pretty(&template).unwrap();
    let mut reparsed = parse_stream(text.as_bytes()).unwrap();
    reparsed.raw_contents = template.raw_contents.clone();
    reparsed.path = template.path.clone();

    assert_eq!(reparsed, template);
}

#[test]
fn kitchen_sink_shapes() {
    let template = parse_file(fixture("parse-kitchen-sink.json")).unwrap();

    assert_eq!(template.description, "kitchen sink");
    assert_eq!(template.min_version, "0.8.0");
    assert!(template.variables["region"].required);
    assert_eq!(template.variables["owner"].default, "ops");
    assert_eq!(template.builders["primary"].r#type, "qemu");
    assert_eq!(template.builders["docker"].r#type, "docker");
    assert_eq!(
        template.provisioners[0].pause_before,
        Some(Duration::from_secs(10))
    );
    assert_eq!(template.post_processors.len(), 2);
    assert!(template.post_processors[1][0].keep_input_artifact);
    assert_eq!(template.push.as_ref().unwrap().name, "org/tpl");
    assert!(template.push.as_ref().unwrap().vcs);

    // Selector semantics on the loaded template.
    assert!(!template.provisioners[0].skip("primary"));
    assert!(template.provisioners[0].skip("docker"));
    assert!(template.post_processors[1][0].skip("docker"));
    assert!(!template.post_processors[1][0].skip("primary"));
}
