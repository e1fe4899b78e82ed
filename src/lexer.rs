//! PDF tokenizer.
//!
//! Low-level tokenization of PDF byte streams. The parser layers object
//! structure on top of this token stream.
//!
//! Token vocabulary:
//! - Numbers: integers (42, -123, +17) and reals (3.14, -.002, 5.)
//! - Strings: literal ((Hello)) and hexadecimal (<48656C6C6F>)
//! - Names: /Type, /Pages, with #XX escapes decoded here
//! - Keywords: true, false, null, obj, endobj, stream, endstream, R
//! - Delimiters: `[`, `]`, `<<`, `>>`
//!
//! Whitespace (space, tab, CR, LF, NUL, FF) and comments (% to end of
//! line) are skipped between tokens.

use nom::{
    IResult,
    branch::alt,
    bytes::complete::{tag, take_till, take_while},
    character::complete::{char, digit0, digit1, one_of},
    combinator::{map, opt, recognize, value},
    multi::many0,
    sequence::{delimited, pair, preceded, tuple},
};

/// Token types recognized by the tokenizer.
#[derive(Debug, PartialEq, Clone)]
pub enum Token<'a> {
    /// Integer number
    Integer(i64),

    /// Real (floating-point) number
    Real(f64),

    /// Literal string bytes, escape sequences still encoded.
    /// The parser decodes escapes; the lexer only finds the balanced span.
    LiteralString(&'a [u8]),

    /// Hexadecimal string bytes between < and >, whitespace preserved
    HexString(&'a [u8]),

    /// Name with #XX escapes already decoded, leading / stripped
    Name(String),

    /// Boolean true keyword
    True,

    /// Boolean false keyword
    False,

    /// Null keyword
    Null,

    /// Array start delimiter [
    ArrayStart,

    /// Array end delimiter ]
    ArrayEnd,

    /// Dictionary start delimiter <<
    DictStart,

    /// Dictionary end delimiter >>
    DictEnd,

    /// Indirect object start keyword "obj"
    ObjStart,

    /// Indirect object end keyword "endobj"
    ObjEnd,

    /// Stream start keyword "stream"
    StreamStart,

    /// Stream end keyword "endstream"
    StreamEnd,

    /// Reference keyword "R" (as in "10 0 R")
    R,
}

/// Consume at least one PDF whitespace byte: space, tab, CR, LF, NUL, FF.
fn whitespace(input: &[u8]) -> IResult<&[u8], ()> {
    let (remaining, ws) =
        take_while(|c| matches!(c, b' ' | b'\t' | b'\r' | b'\n' | 0x00 | 0x0C))(input)?;

    if ws.is_empty() {
        return Err(nom::Err::Error(nom::error::Error::new(input, nom::error::ErrorKind::Space)));
    }

    Ok((remaining, ()))
}

/// Consume a comment: % up to (not including) the end of the line.
fn comment(input: &[u8]) -> IResult<&[u8], ()> {
    value((), preceded(char('%'), take_till(|c| c == b'\r' || c == b'\n')))(input)
}

/// Skip any run of whitespace and comments.
fn skip_ws(input: &[u8]) -> IResult<&[u8], &[u8]> {
    let mut remaining = input;

    while let Ok((rest, _)) = alt((whitespace, comment))(remaining) {
        remaining = rest;
    }

    Ok((remaining, input))
}

/// Parse an integer or real number.
///
/// Accepted forms: 42, -123, +17, 3.14, -2.5, .5, 5., -.002. The span is
/// recognized first, then classified by the presence of a decimal point;
/// `str::parse` on both i64 and f64 accepts every recognized span.
fn parse_number(input: &[u8]) -> IResult<&[u8], Token<'_>> {
    let (rest, span) = recognize(tuple((
        opt(one_of("+-")),
        alt((
            // digits, optionally followed by . and more digits (42, 5., 3.14)
            recognize(pair(digit1, opt(pair(char('.'), digit0)))),
            // leading decimal point (.5)
            recognize(pair(char('.'), digit1)),
        )),
    )))(input)?;

    let text = std::str::from_utf8(span).map_err(|_| {
        nom::Err::Error(nom::error::Error::new(input, nom::error::ErrorKind::Digit))
    })?;

    if span.contains(&b'.') {
        let num: f64 = text.parse().map_err(|_| {
            nom::Err::Error(nom::error::Error::new(input, nom::error::ErrorKind::Float))
        })?;
        Ok((rest, Token::Real(num)))
    } else {
        let num: i64 = text.parse().map_err(|_| {
            nom::Err::Error(nom::error::Error::new(input, nom::error::ErrorKind::Digit))
        })?;
        Ok((rest, Token::Integer(num)))
    }
}

/// Parse a literal string enclosed in parentheses.
///
/// Tracks nesting depth so balanced inner parentheses stay part of the
/// string, and steps over backslash escapes (including 1-3 digit octal)
/// so an escaped parenthesis does not change the depth. The content is
/// returned raw; escape decoding happens in the parser.
fn parse_literal_string(input: &[u8]) -> IResult<&[u8], Token<'_>> {
    let (remaining, _) = char('(')(input)?;
    let mut depth = 1;
    let mut pos = 0;

    while depth > 0 && pos < remaining.len() {
        match remaining[pos] {
            b'\\' => {
                pos += 1;
                if pos >= remaining.len() {
                    break;
                }
                if remaining[pos].is_ascii_digit() {
                    // octal escape, up to three digits
                    let mut digits = 1;
                    while digits < 3
                        && pos + 1 < remaining.len()
                        && remaining[pos + 1].is_ascii_digit()
                    {
                        pos += 1;
                        digits += 1;
                    }
                }
                pos += 1;
            },
            b'(' => {
                depth += 1;
                pos += 1;
            },
            b')' => {
                depth -= 1;
                pos += 1;
            },
            _ => pos += 1,
        }
    }

    if depth != 0 {
        return Err(nom::Err::Error(nom::error::Error::new(input, nom::error::ErrorKind::Tag)));
    }

    // pos sits just past the closing parenthesis
    Ok((&remaining[pos..], Token::LiteralString(&remaining[..pos - 1])))
}

/// Parse a hexadecimal string enclosed in angle brackets.
///
/// Whitespace between digits is preserved here and stripped by the
/// parser, which also pads an odd digit count with a trailing 0.
fn parse_hex_string(input: &[u8]) -> IResult<&[u8], Token<'_>> {
    // << is a dictionary, not a hex string
    if input.len() >= 2 && input[0] == b'<' && input[1] == b'<' {
        return Err(nom::Err::Error(nom::error::Error::new(input, nom::error::ErrorKind::Tag)));
    }

    delimited(
        char('<'),
        map(
            take_while(|c: u8| c.is_ascii_hexdigit() || c.is_ascii_whitespace()),
            Token::HexString,
        ),
        char('>'),
    )(input)
}

/// Decode #XX escape sequences in a name.
///
/// Any byte of a name may be written as # followed by two hex digits.
/// A # not followed by two hex digits is kept literally, and the
/// following characters stay available for later escapes.
///
/// # Examples
///
/// ```
/// # use pdf_smith::lexer::decode_name_escapes;
/// assert_eq!(decode_name_escapes("A#20B#23C"), "A B#C");
/// assert_eq!(decode_name_escapes("Type"), "Type");
/// assert_eq!(decode_name_escapes("A#"), "A#");
/// ```
pub fn decode_name_escapes(name: &str) -> String {
    let mut result = String::with_capacity(name.len());
    let mut chars = name.chars();

    while let Some(ch) = chars.next() {
        if ch != '#' {
            result.push(ch);
            continue;
        }

        let mut lookahead = chars.clone();
        let hi = lookahead.next().and_then(|c| c.to_digit(16));
        let lo = lookahead.next().and_then(|c| c.to_digit(16));
        match (hi, lo) {
            (Some(hi), Some(lo)) => {
                result.push(((hi * 16 + lo) as u8) as char);
                chars = lookahead;
            },
            // not a valid escape, keep the # itself
            _ => result.push('#'),
        }
    }

    result
}

/// Parse a name starting with /.
///
/// The name runs until whitespace or a delimiter. Empty names (`/ `) are
/// technically invalid but tolerated; non-UTF8 bytes should have been
/// #XX-escaped by the producer and otherwise decode as empty.
fn parse_name(input: &[u8]) -> IResult<&[u8], Token<'_>> {
    preceded(
        char('/'),
        map(
            take_while(|c: u8| {
                !matches!(
                    c,
                    b' ' | b'\t' | b'\r' | b'\n' | 0x00 | 0x0C | // whitespace
                    b'/' | b'%' | // start of next name or comment
                    b'(' | b')' | b'<' | b'>' | b'[' | b']' | b'{' | b'}' // delimiters
                )
            }),
            |bytes| {
                let name_str = std::str::from_utf8(bytes).unwrap_or("");
                Token::Name(decode_name_escapes(name_str))
            },
        ),
    )(input)
}

/// Parse keywords and delimiters.
///
/// Order matters: `endstream` before `stream`, `<<` before a hex string
/// would match `<`, and multi-character keywords before the bare `R`.
fn parse_keyword(input: &[u8]) -> IResult<&[u8], Token<'_>> {
    alt((
        value(Token::False, tag(b"false")),
        value(Token::True, tag(b"true")),
        value(Token::Null, tag(b"null")),
        value(Token::ObjEnd, tag(b"endobj")),
        value(Token::ObjStart, tag(b"obj")),
        value(Token::StreamEnd, tag(b"endstream")),
        value(Token::StreamStart, tag(b"stream")),
        value(Token::DictStart, tag(b"<<")),
        value(Token::DictEnd, tag(b">>")),
        value(Token::ArrayStart, tag(b"[")),
        value(Token::ArrayEnd, tag(b"]")),
        value(Token::R, tag(b"R")),
    ))(input)
}

/// Parse a single token, skipping leading whitespace and comments.
///
/// Alternatives are tried in an order that resolves the grammar's
/// ambiguities: keywords first (so `true` is not three name characters
/// short of a number), then names, numbers, and finally the two string
/// forms.
pub fn token(input: &[u8]) -> IResult<&[u8], Token<'_>> {
    let (input, _) = skip_ws(input)?;

    alt((
        parse_keyword,
        parse_name,
        parse_number,
        parse_literal_string,
        parse_hex_string,
    ))(input)
}

/// Tokenize until the input is exhausted or no token matches.
pub fn tokens(input: &[u8]) -> IResult<&[u8], Vec<Token<'_>>> {
    many0(token)(input)
}

#[cfg(test)]
mod tests {
    use super::*;

    // ========================================================================
    // Numbers
    // ========================================================================

    #[test]
    fn test_integers() {
        assert_eq!(token(b"42"), Ok((&b""[..], Token::Integer(42))));
        assert_eq!(token(b"-123"), Ok((&b""[..], Token::Integer(-123))));
        assert_eq!(token(b"+17"), Ok((&b""[..], Token::Integer(17))));
        assert_eq!(token(b"0"), Ok((&b""[..], Token::Integer(0))));
    }

    #[test]
    fn test_reals() {
        assert_eq!(token(b"1.25"), Ok((&b""[..], Token::Real(1.25))));
        assert_eq!(token(b"-2.5"), Ok((&b""[..], Token::Real(-2.5))));
        assert_eq!(token(b".5"), Ok((&b""[..], Token::Real(0.5))));
        assert_eq!(token(b"5."), Ok((&b""[..], Token::Real(5.0))));
        assert_eq!(token(b"-.002"), Ok((&b""[..], Token::Real(-0.002))));
    }

    #[test]
    fn test_real_vs_integer_classification() {
        assert!(matches!(token(b"0").unwrap().1, Token::Integer(0)));
        assert!(matches!(token(b"0.0").unwrap().1, Token::Real(_)));
        assert!(matches!(token(b"5.").unwrap().1, Token::Real(_)));
    }

    #[test]
    fn test_number_stops_at_delimiter() {
        assert_eq!(token(b"42]"), Ok((&b"]"[..], Token::Integer(42))));
        assert_eq!(token(b"1.5>>"), Ok((&b">>"[..], Token::Real(1.5))));
    }

    // ========================================================================
    // Strings
    // ========================================================================

    #[test]
    fn test_literal_string() {
        assert_eq!(token(b"(Hello)"), Ok((&b""[..], Token::LiteralString(b"Hello"))));
        assert_eq!(token(b"()"), Ok((&b""[..], Token::LiteralString(b""))));
        assert_eq!(
            token(b"(Hello World)"),
            Ok((&b""[..], Token::LiteralString(b"Hello World")))
        );
    }

    #[test]
    fn test_literal_string_nested_parens() {
        assert_eq!(
            token(b"(Hello (nested) World)"),
            Ok((&b""[..], Token::LiteralString(b"Hello (nested) World")))
        );
    }

    #[test]
    fn test_literal_string_keeps_escapes_raw() {
        assert_eq!(
            token(b"(Line1\\nLine2)"),
            Ok((&b""[..], Token::LiteralString(b"Line1\\nLine2")))
        );
        assert_eq!(
            token(b"(Open \\( Close \\))"),
            Ok((&b""[..], Token::LiteralString(b"Open \\( Close \\)")))
        );
    }

    #[test]
    fn test_literal_string_octal_escape_span() {
        // \053 is one escape; the closing paren after it ends the string
        assert_eq!(token(b"(a\\053b)"), Ok((&b""[..], Token::LiteralString(b"a\\053b"))));
    }

    #[test]
    fn test_literal_string_unbalanced_fails() {
        assert!(token(b"(never closed").is_err());
    }

    #[test]
    fn test_hex_string() {
        assert_eq!(token(b"<48656C6C6F>"), Ok((&b""[..], Token::HexString(b"48656C6C6F"))));
        assert_eq!(token(b"<>"), Ok((&b""[..], Token::HexString(b""))));
        assert_eq!(
            token(b"<48 65 6C 6C 6F>"),
            Ok((&b""[..], Token::HexString(b"48 65 6C 6C 6F")))
        );
    }

    #[test]
    fn test_dict_start_is_not_hex_string() {
        assert_eq!(token(b"<<"), Ok((&b""[..], Token::DictStart)));
        assert_eq!(token(b"<ABC>"), Ok((&b""[..], Token::HexString(b"ABC"))));
    }

    // ========================================================================
    // Names
    // ========================================================================

    #[test]
    fn test_names() {
        assert_eq!(token(b"/Type"), Ok((&b""[..], Token::Name("Type".to_string()))));
        assert_eq!(
            token(b"/A;Name_With-Various***Characters"),
            Ok((&b""[..], Token::Name("A;Name_With-Various***Characters".to_string())))
        );
    }

    #[test]
    fn test_empty_name_tolerated() {
        assert_eq!(token(b"/ "), Ok((&b" "[..], Token::Name(String::new()))));
    }

    #[test]
    fn test_name_hex_escapes() {
        assert_eq!(token(b"/A#20B"), Ok((&b""[..], Token::Name("A B".to_string()))));
        assert_eq!(token(b"/A#20B#23C"), Ok((&b""[..], Token::Name("A B#C".to_string()))));
        assert_eq!(token(b"/A#ZZ"), Ok((&b""[..], Token::Name("A#ZZ".to_string()))));
    }

    #[test]
    fn test_decode_name_escapes_directly() {
        assert_eq!(decode_name_escapes("Type"), "Type");
        assert_eq!(decode_name_escapes("A#20B"), "A B");
        assert_eq!(decode_name_escapes("A#"), "A#");
        assert_eq!(decode_name_escapes("A#2"), "A#2");
        assert_eq!(decode_name_escapes("A#ZZ"), "A#ZZ");
        // a broken escape does not swallow the # of a following valid one
        assert_eq!(decode_name_escapes("A#1#30"), "A#10");
    }

    // ========================================================================
    // Keywords and delimiters
    // ========================================================================

    #[test]
    fn test_keywords() {
        assert_eq!(token(b"true"), Ok((&b""[..], Token::True)));
        assert_eq!(token(b"false"), Ok((&b""[..], Token::False)));
        assert_eq!(token(b"null"), Ok((&b""[..], Token::Null)));
        assert_eq!(token(b"obj"), Ok((&b""[..], Token::ObjStart)));
        assert_eq!(token(b"endobj"), Ok((&b""[..], Token::ObjEnd)));
        assert_eq!(token(b"stream"), Ok((&b""[..], Token::StreamStart)));
        assert_eq!(token(b"endstream"), Ok((&b""[..], Token::StreamEnd)));
        assert_eq!(token(b"R"), Ok((&b""[..], Token::R)));
    }

    #[test]
    fn test_delimiters() {
        assert_eq!(token(b"["), Ok((&b""[..], Token::ArrayStart)));
        assert_eq!(token(b"]"), Ok((&b""[..], Token::ArrayEnd)));
        assert_eq!(token(b"<<"), Ok((&b""[..], Token::DictStart)));
        assert_eq!(token(b">>"), Ok((&b""[..], Token::DictEnd)));
    }

    // ========================================================================
    // Whitespace and comments
    // ========================================================================

    #[test]
    fn test_skips_whitespace_and_comments() {
        assert_eq!(token(b"  \n\t42"), Ok((&b""[..], Token::Integer(42))));
        assert_eq!(token(b"% comment\n42"), Ok((&b""[..], Token::Integer(42))));
        assert_eq!(token(b"% one\n% two\n42"), Ok((&b""[..], Token::Integer(42))));
        assert_eq!(token(b"  % mixed\n  \t% more\n  42"), Ok((&b""[..], Token::Integer(42))));
    }

    // ========================================================================
    // Token sequences
    // ========================================================================

    #[test]
    fn test_tokens_sequence() {
        let (remaining, toks) = tokens(b"42 /Type (Hello) true").unwrap();
        assert_eq!(remaining, &b""[..]);
        assert_eq!(
            toks,
            vec![
                Token::Integer(42),
                Token::Name("Type".to_string()),
                Token::LiteralString(b"Hello"),
                Token::True,
            ]
        );
    }

    #[test]
    fn test_indirect_object_header_tokens() {
        let (_, toks) = tokens(b"1 0 obj\n<< /Type /Catalog /Pages 2 0 R >>\nendobj").unwrap();
        assert_eq!(
            toks,
            vec![
                Token::Integer(1),
                Token::Integer(0),
                Token::ObjStart,
                Token::DictStart,
                Token::Name("Type".to_string()),
                Token::Name("Catalog".to_string()),
                Token::Name("Pages".to_string()),
                Token::Integer(2),
                Token::Integer(0),
                Token::R,
                Token::DictEnd,
                Token::ObjEnd,
            ]
        );
    }
}
