//! HTML entity decoding for catalog text fields
//!
//! Catalog payloads carry titles like `Rock &amp; Roll` or `Don&#039;t`.
//! Named, decimal and hexadecimal references are decoded; anything that does
//! not parse as a known entity is kept verbatim.

use nom::{
    branch::alt,
    bytes::complete::{tag, tag_no_case, take_while1, take_while_m_n},
    character::complete::char,
    combinator::{map_opt, map_res},
    sequence::{delimited, preceded},
    IResult,
};

fn named(input: &str) -> IResult<&str, char> {
    map_opt(
        delimited(char('&'), take_while1(|c: char| c.is_ascii_alphanumeric()), char(';')),
        |name: &str| {
            Some(match name {
                "amp" => '&',
                "lt" => '<',
                "gt" => '>',
                "quot" => '"',
                "apos" => '\'',
                "nbsp" => '\u{00A0}',
                "copy" => '©',
                "reg" => '®',
                "trade" => '™',
                "hellip" => '…',
                "ndash" => '–',
                "mdash" => '—',
                "lsquo" => '‘',
                "rsquo" => '’',
                "ldquo" => '“',
                "rdquo" => '”',
                _ => return None,
            })
        },
    )(input)
}

fn decimal(input: &str) -> IResult<&str, char> {
    map_opt(
        map_res(
            delimited(
                tag("&#"),
                take_while_m_n(1, 7, |c: char| c.is_ascii_digit()),
                char(';'),
            ),
            |digits: &str| digits.parse::<u32>(),
        ),
        char::from_u32,
    )(input)
}

fn hexadecimal(input: &str) -> IResult<&str, char> {
    map_opt(
        map_res(
            delimited(
                preceded(tag("&#"), tag_no_case("x")),
                take_while_m_n(1, 6, |c: char| c.is_ascii_hexdigit()),
                char(';'),
            ),
            |digits: &str| u32::from_str_radix(digits, 16),
        ),
        char::from_u32,
    )(input)
}

fn entity(input: &str) -> IResult<&str, char> {
    alt((hexadecimal, decimal, named))(input)
}

/// Decode HTML character references in `input`.
pub fn decode_html_entities(input: &str) -> String {
    if !input.contains('&') {
        return input.to_string();
    }
    let mut out = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(idx) = rest.find('&') {
        out.push_str(&rest[..idx]);
        rest = &rest[idx..];
        match entity(rest) {
            Ok((remaining, decoded)) => {
                out.push(decoded);
                rest = remaining;
            }
            Err(_) => {
                out.push('&');
                rest = &rest[1..];
            }
        }
    }
    out.push_str(rest);
    out
}
