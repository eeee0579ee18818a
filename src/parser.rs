//! Span-preserving JSON decoder for template documents.

use chumsky::prelude::*;
use serde_json::Value;

use crate::spanned::Spanned;

/// Ordered object members. Duplicate keys are kept here and resolved at
/// lookup time, where the last writer wins (standard JSON decoder
/// semantics). Include merging relies on this representation too: merged
/// keys are only appended when no entry with that key exists yet.
pub type Members = Vec<(Spanned<String>, Spanned<Json>)>;

#[derive(Clone, Debug, PartialEq)]
pub enum Json {
    Null,
    Bool(bool),
    Num(f64),
    Str(String),
    Array(Vec<Spanned<Json>>),
    Object(Members),
}

impl Json {
    pub fn kind_desc(&self) -> &'static str {
        match self {
            Json::Null => "null",
            Json::Bool(_) => "bool",
            Json::Num(_) => "number",
            Json::Str(_) => "string",
            Json::Array(_) => "array",
            Json::Object(_) => "object",
        }
    }

    pub fn as_object(&self) -> Option<&Members> {
        match self {
            Json::Object(members) => Some(members),
            _ => None,
        }
    }

    /// Converts into a plain value, dropping spans. Duplicate object keys
    /// collapse to the last occurrence.
    pub fn to_plain(&self) -> Value {
        match self {
            Json::Null => Value::Null,
            Json::Bool(b) => Value::Bool(*b),
            Json::Num(n) => {
                if n.fract() == 0.0 && n.is_finite() && n.abs() < 9_007_199_254_740_992.0 {
                    Value::from(*n as i64)
                } else {
                    serde_json::Number::from_f64(*n)
                        .map(Value::Number)
                        .unwrap_or(Value::Null)
                }
            }
            Json::Str(s) => Value::String(s.clone()),
            Json::Array(items) => Value::Array(items.iter().map(|i| i.val.to_plain()).collect()),
            Json::Object(members) => {
                let mut map = serde_json::Map::new();
                for (k, v) in members {
                    map.insert(k.val.clone(), v.val.to_plain());
                }
                Value::Object(map)
            }
        }
    }
}

/// Last-writer-wins member lookup.
pub fn member<'m>(members: &'m Members, key: &str) -> Option<&'m Spanned<Json>> {
    members.iter().rev().find(|(k, _)| k.val == key).map(|(_, v)| v)
}

pub fn has_member(members: &Members, key: &str) -> bool {
    members.iter().any(|(k, _)| k.val == key)
}

/// Parses one complete JSON document.
pub fn document<'a>() -> impl Parser<'a, &'a str, Spanned<Json>, extra::Err<Rich<'a, char>>> {
    value().then_ignore(end())
}

fn value<'a>() -> impl Parser<'a, &'a str, Spanned<Json>, extra::Err<Rich<'a, char>>> {
    recursive(|value| {
        let digits = text::digits(10).to_slice();

        let frac = just('.').then(digits);

        let exp = just('e')
            .or(just('E'))
            .then(one_of("+-").or_not())
            .then(digits)
            .labelled("exponent");

        let number = just('-')
            .or_not()
            .then(text::int(10))
            .then(frac.or_not())
            .then(exp.or_not())
            .to_slice()
            .map(|s: &str| s.parse::<f64>().unwrap())
            .boxed()
            .labelled("number");

        let escape = just('\\')
            .ignore_then(choice((
                just('\\'),
                just('/'),
                just('"'),
                just('b').to('\x08'),
                just('f').to('\x0C'),
                just('n').to('\n'),
                just('r').to('\r'),
                just('t').to('\t'),
                just('u').ignore_then(text::digits(16).exactly(4).to_slice().validate(
                    |digits, e, emitter| {
                        char::from_u32(u32::from_str_radix(digits, 16).unwrap()).unwrap_or_else(
                            || {
                                emitter.emit(Rich::custom(e.span(), "invalid unicode escape"));
                                '\u{FFFD}' // unicode replacement character
                            },
                        )
                    },
                )),
            )))
            .boxed()
            .labelled("escape sequence");

        let string = none_of("\\\"")
            .or(escape)
            .repeated()
            .collect::<String>()
            .delimited_by(just('"'), just('"'))
            .map_with(|val, e| Spanned::new(e.span(), val))
            .boxed()
            .labelled("string");

        let array = value
            .clone()
            .separated_by(just(',').padded())
            .collect::<Vec<_>>()
            .padded()
            .delimited_by(just('['), just(']'))
            .boxed()
            .labelled("array");

        let member = string
            .clone()
            .then_ignore(just(':').padded())
            .then(value)
            .labelled("object member");
        let object = member
            .separated_by(just(',').padded())
            .collect::<Vec<_>>()
            .padded()
            .delimited_by(just('{'), just('}'))
            .boxed()
            .labelled("object");

        choice((
            just("null").to(Json::Null).labelled("null"),
            just("true").to(Json::Bool(true)).labelled("true"),
            just("false").to(Json::Bool(false)).labelled("false"),
            number.map(Json::Num),
            string.clone().map(|s| Json::Str(s.val)),
            array.map(Json::Array),
            object.map(Json::Object),
        ))
        .map_with(|val, e| Spanned::new(e.span(), val))
        .padded()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(src: &str) -> Spanned<Json> {
        let (out, errors) = document().parse(src).into_output_errors();
        assert!(errors.is_empty(), "unexpected parse errors: {errors:?}");
        out.unwrap()
    }

    #[test]
    fn parses_scalars() {
        assert_eq!(parse("null").val, Json::Null);
        assert_eq!(parse(" true ").val, Json::Bool(true));
        assert_eq!(parse("-1.5e2").val, Json::Num(-150.0));
        assert_eq!(parse(r#""hi""#).val, Json::Str("hi".to_string()));
    }

    #[test]
    fn decodes_string_escapes() {
        assert_eq!(
            parse(r#""a\nbA\"""#).val,
            Json::Str("a\nbA\"".to_string())
        );
    }

    #[test]
    fn object_keys_keep_spans() {
        let doc = parse(r#"{"builders": []}"#);
        let Json::Object(members) = doc.val else {
            panic!("expected an object");
        };
        let (key, value) = &members[0];
        assert_eq!(key.val, "builders");
        assert_eq!(key.span.start, 1);
        assert_eq!(value.val, Json::Array(Vec::new()));
    }

    #[test]
    fn duplicate_keys_resolve_to_last_writer() {
        let doc = parse(r#"{"a": 1, "a": 2}"#);
        let members = doc.val.as_object().unwrap().clone();
        assert_eq!(members.len(), 2);
        assert_eq!(member(&members, "a").unwrap().val, Json::Num(2.0));
    }

    #[test]
    fn syntax_error_carries_offset() {
        let (_, errors) = document().parse(r#"{"a": }"#).into_output_errors();
        assert_eq!(errors.first().unwrap().span().start, 6);
    }

    #[test]
    fn trailing_garbage_is_an_error() {
        let (_, errors) = document().parse("{} x").into_output_errors();
        assert!(!errors.is_empty());
    }

    #[test]
    fn to_plain_collapses_duplicates_and_spans() {
        let doc = parse(r#"{"a": 1, "a": [true, "x"], "b": 2.5}"#);
        assert_eq!(
            doc.val.to_plain(),
            serde_json::json!({"a": [true, "x"], "b": 2.5})
        );
    }
}
