//! A `nom`-based recursive-descent parser for the template-expression
//! language, in the same parser-combinator style as the `nom`-based DSL
//! parser in the example pack's data-designer repo (`ws` wrapper,
//! `alt`/`map`/`delimited` combinators, `recognize` for numeric literals).

use nom::{
    IResult, Parser,
    branch::alt,
    bytes::complete::{escaped_transform, tag, take_while, take_while1},
    character::complete::{alpha1, alphanumeric1, char, digit1, multispace0, none_of, one_of},
    combinator::{cut, map, map_res, opt, recognize, value},
    multi::{many0, separated_list0},
    sequence::{delimited, pair, preceded, terminated},
};

use crate::ast::{BinOp, Expr, InterpPart, Literal, RecordField, UnOp};

#[derive(Debug, snafu::Snafu, PartialEq, Eq)]
#[snafu(display("failed to parse template at byte offset {offset}: {message}"))]
pub struct ParseError {
    pub offset: usize,
    pub message: String,
}

type PResult<'a, O> = IResult<&'a str, O>;

fn ws<'a, O>(inner: impl Parser<&'a str, Output = O, Error = nom::error::Error<&'a str>>) -> impl Parser<&'a str, Output = O, Error = nom::error::Error<&'a str>> {
    delimited(multispace0, inner, multispace0)
}

fn identifier(input: &str) -> PResult<'_, String> {
    map(
        recognize(pair(
            alt((alpha1, tag("_"))),
            many0(alt((alphanumeric1, tag("_")))),
        )),
        String::from,
    )
    .parse(input)
}

/// A package-qualified name: `strings.Join`, `json.Marshal`, `op.#Apply`.
fn qualified_name(input: &str) -> PResult<'_, String> {
    map(
        recognize(pair(identifier, many0(pair(char('.'), identifier)))),
        String::from,
    )
    .parse(input)
}

fn integer(input: &str) -> PResult<'_, Literal> {
    map_res(
        recognize(pair(opt(char('-')), digit1)),
        |s: &str| s.parse::<i64>().map(Literal::Int),
    )
    .parse(input)
}

fn float(input: &str) -> PResult<'_, Literal> {
    map_res(
        recognize((opt(char('-')), digit1, char('.'), digit1)),
        |s: &str| s.parse::<f64>().map(Literal::Float),
    )
    .parse(input)
}

fn boolean(input: &str) -> PResult<'_, Literal> {
    alt((
        value(Literal::Bool(true), tag("true")),
        value(Literal::Bool(false), tag("false")),
    ))
    .parse(input)
}

fn null(input: &str) -> PResult<'_, Literal> {
    value(Literal::Null, tag("null")).parse(input)
}

fn string_body(input: &str) -> PResult<'_, String> {
    alt((
        map(
            escaped_transform(
                none_of("\"\\"),
                '\\',
                alt((
                    value("\"", tag("\"")),
                    value("\\", tag("\\")),
                    value("\n", tag("n")),
                    value("\t", tag("t")),
                )),
            ),
            |s: String| s,
        ),
        value(String::new(), nom::combinator::peek(char('"'))),
    ))
    .parse(input)
}

/// A plain (non-interpolated) string literal.
fn string_literal(input: &str) -> PResult<'_, Literal> {
    map(delimited(char('"'), string_body, char('"')), Literal::String).parse(input)
}

/// A string literal that may contain `\(expr)` interpolation segments.
/// Falls back to a single `Text` part when there is no interpolation.
fn interpolated_string(input: &str) -> PResult<'_, Expr> {
    let (input, _) = char('"').parse(input)?;
    let mut parts = Vec::new();
    let mut rest = input;
    let mut buf = String::new();
    loop {
        if let Some(after_quote) = rest.strip_prefix('"') {
            if !buf.is_empty() || parts.is_empty() {
                parts.push(InterpPart::Text(std::mem::take(&mut buf)));
            }
            rest = after_quote;
            break;
        }
        if let Some(after) = rest.strip_prefix("\\(") {
            if !buf.is_empty() {
                parts.push(InterpPart::Text(std::mem::take(&mut buf)));
            }
            let (after_expr, expr) = cut(terminated(expr, char(')'))).parse(after)?;
            parts.push(InterpPart::Expr(expr));
            rest = after_expr;
            continue;
        }
        if let Some(after) = rest.strip_prefix("\\\"") {
            buf.push('"');
            rest = after;
            continue;
        }
        if let Some(after) = rest.strip_prefix("\\n") {
            buf.push('\n');
            rest = after;
            continue;
        }
        let mut chars = rest.chars();
        match chars.next() {
            Some(c) => {
                buf.push(c);
                rest = chars.as_str();
            }
            None => {
                return Err(nom::Err::Failure(nom::error::Error::new(
                    rest,
                    nom::error::ErrorKind::Eof,
                )));
            }
        }
    }
    if parts.len() == 1 {
        if let InterpPart::Text(text) = &parts[0] {
            return Ok((rest, Expr::Literal(Literal::String(text.clone()))));
        }
    }
    Ok((rest, Expr::Interpolation(parts)))
}

fn literal_expr(input: &str) -> PResult<'_, Expr> {
    alt((
        map(null, Expr::Literal),
        map(boolean, Expr::Literal),
        map(float, Expr::Literal),
        map(integer, Expr::Literal),
    ))
    .parse(input)
}

fn list_expr(input: &str) -> PResult<'_, Expr> {
    map(
        delimited(
            ws(char('[')),
            separated_list0(ws(char(',')), expr),
            preceded(opt(ws(char(','))), char(']')),
        ),
        Expr::List,
    )
    .parse(input)
}

fn record_field(input: &str) -> PResult<'_, RecordField> {
    alt((conditional_field, comprehension_field, embed_field, named_field)).parse(input)
}

fn named_field(input: &str) -> PResult<'_, RecordField> {
    let (input, name) = ws(alt((identifier, map(string_literal, |l| match l {
        Literal::String(s) => s,
        _ => unreachable!(),
    })))).parse(input)?;
    let (input, optional) = opt(char('?')).parse(input)?;
    let (input, _) = ws(char(':')).parse(input)?;
    let (input, value) = expr(input)?;
    Ok((
        input,
        if optional.is_some() {
            RecordField::Optional { name, value }
        } else {
            RecordField::Required { name, value }
        },
    ))
}

fn conditional_field(input: &str) -> PResult<'_, RecordField> {
    let (input, _) = ws(tag("if")).parse(input)?;
    let (input, cond) = expr(input)?;
    let (input, fields) = record_body(input)?;
    Ok((input, RecordField::Conditional { cond, fields }))
}

fn comprehension_field(input: &str) -> PResult<'_, RecordField> {
    let (input, _) = ws(tag("for")).parse(input)?;
    let (input, first) = ws(identifier).parse(input)?;
    let (input, second) = opt(preceded(ws(char(',')), identifier)).parse(input)?;
    let (input, _) = ws(tag("in")).parse(input)?;
    let (input, source) = expr(input)?;
    let (input, fields) = record_body(input)?;
    let (key, value) = match second {
        Some(v) => (Some(first), v),
        None => (None, first),
    };
    Ok((
        input,
        RecordField::Comprehension {
            key,
            value,
            source,
            fields,
        },
    ))
}

fn embed_field(input: &str) -> PResult<'_, RecordField> {
    map(terminated(postfix_expr, ws(tag("..."))), RecordField::Embed).parse(input)
}

fn record_body(input: &str) -> PResult<'_, Vec<RecordField>> {
    delimited(
        ws(char('{')),
        terminated(
            separated_list0(field_separator, record_field),
            opt(field_separator),
        ),
        ws(char('}')),
    )
    .parse(input)
}

fn field_separator(input: &str) -> PResult<'_, ()> {
    value((), ws(alt((tag(","), tag("\n"))))).parse(input)
}

fn record_expr(input: &str) -> PResult<'_, Expr> {
    map(record_body, Expr::Record).parse(input)
}

fn paren_expr(input: &str) -> PResult<'_, Expr> {
    delimited(ws(char('(')), expr, ws(char(')'))).parse(input)
}

fn primary_expr(input: &str) -> PResult<'_, Expr> {
    ws(alt((
        paren_expr,
        record_expr,
        list_expr,
        interpolated_string,
        literal_expr,
        map(qualified_name, Expr::Ident),
    )))
    .parse(input)
}

enum Tail {
    Selector(String),
    Index(Expr),
    Slice(Option<Expr>, Option<Expr>),
    Call(Vec<Expr>),
}

fn tail(input: &str) -> PResult<'_, Tail> {
    alt((
        map(preceded(char('.'), identifier), Tail::Selector),
        map(
            delimited(
                char('['),
                pair(opt(expr), opt(preceded(char(':'), opt(expr)))),
                char(']'),
            ),
            |(start, rest)| match rest {
                Some(end) => Tail::Slice(start, end),
                None => match start {
                    Some(index) => Tail::Index(index),
                    None => Tail::Slice(None, None),
                },
            },
        ),
        map(
            delimited(char('('), separated_list0(ws(char(',')), expr), char(')')),
            Tail::Call,
        ),
    ))
    .parse(input)
}

fn postfix_expr(input: &str) -> PResult<'_, Expr> {
    let (input, base) = primary_expr(input)?;
    let (input, tails) = many0(tail).parse(input)?;
    let result = tails.into_iter().fold(base, |acc, t| match t {
        Tail::Selector(name) => Expr::Selector(Box::new(acc), name),
        Tail::Index(idx) => Expr::Index(Box::new(acc), Box::new(idx)),
        Tail::Slice(start, end) => Expr::Slice(
            Box::new(acc),
            start.map(Box::new),
            end.map(Box::new),
        ),
        Tail::Call(args) => Expr::Call(Box::new(acc), args),
    });
    Ok((input, result))
}

fn unary_expr(input: &str) -> PResult<'_, Expr> {
    alt((
        map(preceded(ws(char('!')), unary_expr), |e| {
            Expr::Unary(UnOp::Not, Box::new(e))
        }),
        map(preceded(ws(char('-')), unary_expr), |e| {
            Expr::Unary(UnOp::Neg, Box::new(e))
        }),
        postfix_expr,
    ))
    .parse(input)
}

fn binary_level<'a>(
    next: impl Fn(&'a str) -> PResult<'a, Expr> + Copy,
    ops: &'a [(&'a str, BinOp)],
) -> impl Fn(&'a str) -> PResult<'a, Expr> {
    move |input: &'a str| {
        let (mut input, mut acc) = next(input)?;
        loop {
            let mut matched = None;
            for (token, op) in ops {
                if let Ok((rest, _)) = ws::<&str>(tag(*token)).parse(input) {
                    matched = Some((rest, *op));
                    break;
                }
            }
            match matched {
                Some((rest, op)) => {
                    let (rest, rhs) = next(rest)?;
                    acc = Expr::Binary(op, Box::new(acc), Box::new(rhs));
                    input = rest;
                }
                None => break,
            }
        }
        Ok((input, acc))
    }
}

fn multiplicative_expr(input: &str) -> PResult<'_, Expr> {
    binary_level(unary_expr, &[("*", BinOp::Mul), ("/", BinOp::Div)])(input)
}

fn additive_expr(input: &str) -> PResult<'_, Expr> {
    binary_level(multiplicative_expr, &[("+", BinOp::Add), ("-", BinOp::Sub)])(input)
}

fn equality_expr(input: &str) -> PResult<'_, Expr> {
    binary_level(
        additive_expr,
        &[
            ("==", BinOp::Eq),
            ("!=", BinOp::Ne),
            ("<=", BinOp::Le),
            (">=", BinOp::Ge),
            ("<", BinOp::Lt),
            (">", BinOp::Gt),
        ],
    )(input)
}

fn default_expr(input: &str) -> PResult<'_, Expr> {
    let (input, first) = equality_expr(input)?;
    let (input, fallback) = opt(preceded(ws(char('|')), equality_expr)).parse(input)?;
    Ok((
        input,
        match fallback {
            Some(fallback) => Expr::Default(Box::new(first), Box::new(fallback)),
            None => first,
        },
    ))
}

fn and_expr(input: &str) -> PResult<'_, Expr> {
    binary_level(default_expr, &[("&&", BinOp::And)])(input)
}

fn or_expr(input: &str) -> PResult<'_, Expr> {
    binary_level(and_expr, &[("||", BinOp::Or)])(input)
}

pub fn expr(input: &str) -> PResult<'_, Expr> {
    or_expr(input)
}

/// Parses a full template source as a top-level (braceless) record body —
/// a sequence of top-level fields such as `parameter: {...}`, `output:
/// {...}`, `outputs: {...}`.
pub fn parse_template(source: &str) -> Result<Vec<RecordField>, ParseError> {
    let trimmed = strip_comments(source);
    let result = terminated(
        terminated(
            separated_list0(field_separator, record_field),
            opt(field_separator),
        ),
        ws(nom::combinator::eof),
    )
    .parse(trimmed.as_str());

    match result {
        Ok((_, fields)) => Ok(fields),
        Err(err) => Err(ParseError {
            offset: match &err {
                nom::Err::Error(e) | nom::Err::Failure(e) => source.len() - e.input.len(),
                nom::Err::Incomplete(_) => source.len(),
            },
            message: err.to_string(),
        }),
    }
}

/// Strips `//` line comments; the language does not support block comments.
fn strip_comments(source: &str) -> String {
    source
        .lines()
        .map(strip_line_comment)
        .collect::<Vec<_>>()
        .join("\n")
}

fn strip_line_comment(line: &str) -> &str {
    let mut in_string = false;
    let bytes = line.as_bytes();
    let mut i = 0;
    while i + 1 < bytes.len() {
        match bytes[i] {
            b'"' => in_string = !in_string,
            b'/' if !in_string && bytes[i + 1] == b'/' => return &line[..i],
            _ => {}
        }
        i += 1;
    }
    line
}

#[allow(dead_code)]
fn take_spaces(input: &str) -> PResult<'_, &str> {
    take_while(|c: char| c.is_whitespace()).parse(input)
}

#[allow(dead_code)]
fn take_ident_chars(input: &str) -> PResult<'_, &str> {
    take_while1(|c: char| c.is_alphanumeric() || c == '_').parse(input)
}

#[allow(dead_code)]
fn hex_digit(input: &str) -> PResult<'_, char> {
    one_of("0123456789abcdefABCDEF").parse(input)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Literal;

    #[test]
    fn parses_simple_record() {
        let fields = parse_template(r#"parameter: { image: "nginx", port: 80 }"#).unwrap();
        assert_eq!(fields.len(), 1);
        assert!(matches!(&fields[0], RecordField::Required { name, .. } if name == "parameter"));
    }

    #[test]
    fn parses_optional_and_conditional_fields() {
        let fields = parse_template(
            r#"
            output: {
                replicas?: parameter.replicas
                if parameter.exposed {
                    expose: true
                }
            }
            "#,
        )
        .unwrap();
        let RecordField::Required { value, .. } = &fields[0] else {
            panic!("expected required field");
        };
        let Expr::Record(inner) = value else {
            panic!("expected record");
        };
        assert!(matches!(inner[0], RecordField::Optional { .. }));
        assert!(matches!(inner[1], RecordField::Conditional { .. }));
    }

    #[test]
    fn parses_comprehension() {
        let fields = parse_template(
            r#"
            output: {
                for k, v in parameter.env {
                    "\(k)": v
                }
            }
            "#,
        )
        .unwrap();
        let RecordField::Required { value, .. } = &fields[0] else {
            panic!("expected required field");
        };
        let Expr::Record(inner) = value else {
            panic!("expected record");
        };
        assert!(matches!(inner[0], RecordField::Comprehension { .. }));
    }

    #[test]
    fn parses_string_interpolation() {
        let (rest, parsed) = expr(r#""hello \(name)!""#).unwrap();
        assert!(rest.is_empty());
        assert!(matches!(parsed, Expr::Interpolation(_)));
    }

    #[test]
    fn parses_default_value_field() {
        let (rest, parsed) = expr("parameter.replicas | 1").unwrap();
        assert!(rest.is_empty());
        assert!(matches!(parsed, Expr::Default(_, _)));
    }

    #[test]
    fn parses_call_expression() {
        let (rest, parsed) = expr(r#"strings.Join(["a", "b"], ",")"#).unwrap();
        assert!(rest.is_empty());
        match parsed {
            Expr::Call(callee, args) => {
                assert_eq!(*callee, Expr::Ident("strings.Join".to_owned()));
                assert_eq!(args.len(), 2);
            }
            other => panic!("expected call, got {other:?}"),
        }
    }

    #[test]
    fn ignores_line_comments() {
        let fields = parse_template(
            "// a top-level comment\nparameter: { image: \"nginx\" } // trailing\n",
        )
        .unwrap();
        assert_eq!(fields.len(), 1);
    }

    #[test]
    fn literal_int_parses() {
        assert_eq!(integer("42").unwrap().1, Literal::Int(42));
        assert_eq!(integer("-7").unwrap().1, Literal::Int(-7));
    }
}
