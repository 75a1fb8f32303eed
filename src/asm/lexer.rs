use nom::{
    branch::alt,
    bytes::complete::{tag, tag_no_case},
    character::complete::{
        alpha1, alphanumeric0, alphanumeric1, anychar, digit1, hex_digit1, multispace1,
        not_line_ending,
    },
    combinator::{map, map_opt, map_res, recognize, value},
    multi::many0,
    sequence::{delimited, pair, preceded, terminated},
    IResult,
};

use crate::plat::{Opcode, Register};

use super::{AsmError, Span, Token, WithSpan};

impl Register {
    pub fn lex(inp: Span) -> IResult<Span, Self> {
        map_opt(lex_identifier, |s: Span| {
            Register::ALL
                .into_iter()
                .find(|reg| reg.to_string().eq_ignore_ascii_case(s.fragment()))
        })(inp)
    }
}

impl Opcode {
    pub fn lex(inp: Span) -> IResult<Span, Self> {
        map_res(lex_identifier, |s: Span| s.fragment().parse::<Opcode>())(inp)
    }
}

fn lex_identifier(inp: Span) -> IResult<Span, Span> {
    recognize(pair(alpha1, alphanumeric0))(inp)
}

fn lex_number(inp: Span) -> IResult<Span, u64> {
    alt((
        map_res(preceded(tag_no_case("0x"), hex_digit1), |x: Span| {
            u64::from_str_radix(x.fragment(), 16)
        }),
        map_res(digit1, |x: Span| x.fragment().parse::<u64>()),
        map(delimited(tag("'"), anychar, tag("'")), |c| c as u64),
    ))(inp)
}

/// Lexes a `$`-prefixed literal, without range checking.
pub fn lex_literal(inp: Span) -> IResult<Span, u64> {
    preceded(tag("$"), lex_number)(inp)
}

pub fn lex_label_def(inp: Span) -> IResult<Span, &str> {
    map(terminated(alphanumeric1, tag(":")), |s: Span| *s.fragment())(inp)
}

pub fn lex_label(inp: Span) -> IResult<Span, &str> {
    map(preceded(tag("%"), alphanumeric1), |s: Span| *s.fragment())(inp)
}

pub fn lex_comment(inp: Span) -> IResult<Span, Span> {
    preceded(tag(";"), not_line_ending)(inp)
}

pub fn lex_comment_or_whitespace(inp: Span) -> IResult<Span, Span> {
    alt((multispace1, lex_comment))(inp)
}

#[derive(Clone, Copy)]
enum Lexeme<'a> {
    Token(Token<'a>),
    Literal(u64),
}

fn lex_lexeme(inp: Span) -> IResult<Span, WithSpan<Lexeme>> {
    let (rest, item) = alt((
        value(Lexeme::Token(Token::Word), tag_no_case(".word")),
        map(lex_label_def, |t| Lexeme::Token(Token::LabelDef(t))),
        map(lex_label, |t| Lexeme::Token(Token::Label(t))),
        map(lex_literal, Lexeme::Literal),
        map(Register::lex, |t| Lexeme::Token(Token::Register(t))),
        map(Opcode::lex, |t| Lexeme::Token(Token::Mnemonic(t))),
    ))(inp)?;
    Ok((rest, WithSpan { span: inp, item }))
}

fn location(span: Span) -> (usize, usize) {
    (span.location_line() as usize, span.get_utf8_column())
}

/// Lexes assembly program text into a [Vec] of [Token]s, terminated by [Token::Eof].
pub fn lex_program(program: &str) -> Result<Vec<WithSpan<'_, Token<'_>>>, AsmError> {
    let span = Span::new(program);
    let (garbage, lexemes) = many0(delimited(
        many0(lex_comment_or_whitespace),
        lex_lexeme,
        many0(lex_comment_or_whitespace),
    ))(span)
    .map_err(|e| {
        let span = match e {
            nom::Err::Error(e) | nom::Err::Failure(e) => e.input,
            nom::Err::Incomplete(_) => span,
        };
        AsmError::Syntax {
            loc: location(span),
            span: span.fragment().to_string(),
        }
    })?;

    let (garbage, _) = many0(lex_comment_or_whitespace)(garbage).map_err(|_| AsmError::Syntax {
        loc: location(garbage),
        span: garbage.fragment().to_string(),
    })?;
    if !garbage.is_empty() {
        return Err(AsmError::FoundGarbage {
            loc: location(garbage),
            span: garbage
                .fragment()
                .split_whitespace()
                .next()
                .unwrap_or_default()
                .to_string(),
        });
    }

    let mut toks = lexemes
        .into_iter()
        .map(|l| {
            let item = match l.item {
                Lexeme::Token(t) => t,
                Lexeme::Literal(n) => {
                    Token::Literal(u16::try_from(n).map_err(|_| AsmError::LiteralOverflow(n))?)
                }
            };
            Ok(WithSpan { span: l.span, item })
        })
        .collect::<Result<Vec<_>, AsmError>>()?;
    toks.push(WithSpan {
        span: garbage,
        item: Token::Eof,
    });
    Ok(toks)
}
