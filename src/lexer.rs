//! Splitting of an expanded command line into argument strings.

/// Token slots per line; one is reserved, so at most `MAX_TOKENS - 1` tokens are produced.
pub const MAX_TOKENS: usize = 128;

fn is_separator(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\n')
}

/// Splits `line` into whitespace separated tokens.
///
/// A token that starts with `'` or `"` extends to the matching quote, or to
/// the end of the line when the quote is unmatched; the quote characters are
/// not part of the token. Characters immediately after a closing quote start
/// a new token, so `"a"b` yields `a` and `b`. Tokens past `MAX_TOKENS - 1`
/// are dropped.
pub fn split_into_tokens(line: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut rest = line;

    while tokens.len() < MAX_TOKENS - 1 {
        rest = rest.trim_start_matches(is_separator);
        let Some(first) = rest.chars().next() else {
            break;
        };

        if first == '"' || first == '\'' {
            let body = &rest[1..];
            match body.find(first) {
                Some(close) => {
                    tokens.push(body[..close].to_string());
                    rest = &body[close + 1..];
                }
                None => {
                    tokens.push(body.to_string());
                    rest = "";
                }
            }
        } else {
            let end = rest.find(is_separator).unwrap_or(rest.len());
            tokens.push(rest[..end].to_string());
            rest = &rest[end..];
        }
    }
    tokens
}

/// Removes one pair of matching surrounding quotes from each token.
///
/// This runs after [`split_into_tokens`] so that a token such as `'"x"'`
/// loses both quote layers.
pub fn strip_quotes(tokens: &mut [String]) {
    for token in tokens.iter_mut() {
        let bytes = token.as_bytes();
        let len = bytes.len();
        if len >= 2
            && (bytes[0] == b'"' || bytes[0] == b'\'')
            && bytes[len - 1] == bytes[0]
        {
            *token = token[1..len - 1].to_string();
        }
    }
}
