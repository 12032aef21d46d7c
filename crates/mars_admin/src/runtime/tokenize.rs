//! Bash-like splitting of a single configuration string into arguments
//!
//! Only the quoting grammar is implemented: no globbing, no variable
//! expansion, no command substitution.
//!
//! ```text
//! "a a" 'b b' c\ c   ->  ["a a", "b b", "c c"]
//! "i""i" k" "k       ->  ["ii", "k k"]
//! ```

/// Quote character that opened an unterminated run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuoteKind {
    Single,
    Double,
}

impl std::fmt::Display for QuoteKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QuoteKind::Single => write!(f, "single quote"),
            QuoteKind::Double => write!(f, "double quote"),
        }
    }
}

/// Errors that can occur while tokenizing
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TokenizeError {
    #[error("Unterminated {quote} starting at byte {position}")]
    UnterminatedQuote { quote: QuoteKind, position: usize },

    #[error("Trailing backslash at byte {0} escapes nothing")]
    TrailingEscape(usize),
}

/// Split `input` into an argument vector.
///
/// Rules, left to right:
/// - whitespace outside quotes separates tokens (runs collapse)
/// - `\x` outside quotes yields `x`
/// - `"..."` keeps its content, `\x` inside yields `x`
/// - `'...'` keeps its content verbatim, except `\'` which yields `'`
/// - adjacent runs with no whitespace between them form one token
///
/// Unterminated quotes and a trailing lone backslash are rejected.
pub fn tokenize(input: &str) -> Result<Vec<String>, TokenizeError> {
    let mut args = Vec::new();
    let mut current = String::new();
    // Distinguishes `""` (an empty token) from no token at all
    let mut in_token = false;
    let mut chars = input.char_indices().peekable();

    while let Some((pos, c)) = chars.next() {
        match c {
            c if c.is_whitespace() => {
                if in_token {
                    args.push(std::mem::take(&mut current));
                    in_token = false;
                }
            }
            '\\' => {
                let (_, escaped) = chars.next().ok_or(TokenizeError::TrailingEscape(pos))?;
                current.push(escaped);
                in_token = true;
            }
            '"' => {
                in_token = true;
                loop {
                    match chars.next() {
                        Some((_, '"')) => break,
                        Some((esc, '\\')) => {
                            let (_, escaped) = chars.next().ok_or(
                                TokenizeError::UnterminatedQuote {
                                    quote: QuoteKind::Double,
                                    position: esc,
                                },
                            )?;
                            current.push(escaped);
                        }
                        Some((_, other)) => current.push(other),
                        None => {
                            return Err(TokenizeError::UnterminatedQuote {
                                quote: QuoteKind::Double,
                                position: pos,
                            })
                        }
                    }
                }
            }
            '\'' => {
                in_token = true;
                loop {
                    match chars.next() {
                        Some((_, '\'')) => break,
                        // A backslash pairs with the next char so `\'` cannot close the run
                        Some((_, '\\')) => match chars.next() {
                            Some((_, '\'')) => current.push('\''),
                            Some((_, other)) => {
                                current.push('\\');
                                current.push(other);
                            }
                            None => {
                                return Err(TokenizeError::UnterminatedQuote {
                                    quote: QuoteKind::Single,
                                    position: pos,
                                })
                            }
                        },
                        Some((_, other)) => current.push(other),
                        None => {
                            return Err(TokenizeError::UnterminatedQuote {
                                quote: QuoteKind::Single,
                                position: pos,
                            })
                        }
                    }
                }
            }
            other => {
                current.push(other);
                in_token = true;
            }
        }
    }

    if in_token {
        args.push(current);
    }

    Ok(args)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_string() {
        let input = r#""a a" 'b b' c\ c "d'd" 'e"e' 'f\'f' "g\"g" "i""i" 'j''j' k" "k l' l' mm n\\n"#;
        let result = tokenize(input).unwrap();
        assert_eq!(
            result,
            vec![
                "a a", "b b", "c c", "d'd", "e\"e", "f'f", "g\"g", "ii", "jj", "k k", "l l", "mm",
                "n\\n",
            ]
        );
        // Backslash followed by n, not a newline
        assert_eq!(result[12].len(), 3);
    }

    #[test]
    fn test_whitespace_only_is_empty() {
        for input in ["", " ", "   ", "\t", " \t\n  \r\n"] {
            assert_eq!(tokenize(input).unwrap(), Vec::<String>::new(), "{:?}", input);
        }
    }

    #[test]
    fn test_plain_words_split_on_whitespace() {
        let input = "-Xmx1024m -XX:+UseG1GC -Dfoo=bar com.example.Main";
        let expected: Vec<String> = input.split_whitespace().map(String::from).collect();
        assert_eq!(tokenize(input).unwrap(), expected);
    }

    #[test]
    fn test_consecutive_whitespace_collapses() {
        assert_eq!(tokenize("  a \t  b\n\nc  ").unwrap(), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_empty_quotes_yield_empty_token() {
        assert_eq!(tokenize(r#"a "" b"#).unwrap(), vec!["a", "", "b"]);
        assert_eq!(tokenize("''").unwrap(), vec![""]);
    }

    #[test]
    fn test_escapes_inside_double_quotes() {
        assert_eq!(tokenize(r#""x\\y""#).unwrap(), vec![r"x\y"]);
        assert_eq!(tokenize(r#""x\ny""#).unwrap(), vec!["xny"]);
    }

    #[test]
    fn test_single_quotes_keep_backslashes() {
        assert_eq!(tokenize(r"'C:\dir\file'").unwrap(), vec![r"C:\dir\file"]);
        assert_eq!(tokenize(r"'a\\'").unwrap(), vec![r"a\\"]);
    }

    #[test]
    fn test_jvm_options_with_spaces() {
        let input = r#"-Xmx2g "-Dmars.admin.name=My Cluster" -Dopt='x y'"#;
        assert_eq!(
            tokenize(input).unwrap(),
            vec!["-Xmx2g", "-Dmars.admin.name=My Cluster", "-Dopt=x y"]
        );
    }

    #[test]
    fn test_unterminated_double_quote() {
        let result = tokenize(r#"ok "broken"#);
        assert_eq!(
            result,
            Err(TokenizeError::UnterminatedQuote {
                quote: QuoteKind::Double,
                position: 3,
            })
        );
    }

    #[test]
    fn test_unterminated_single_quote() {
        let result = tokenize(r"'f\'");
        assert!(matches!(
            result,
            Err(TokenizeError::UnterminatedQuote {
                quote: QuoteKind::Single,
                position: 0,
            })
        ));
    }

    #[test]
    fn test_trailing_backslash() {
        assert_eq!(tokenize(r"abc\"), Err(TokenizeError::TrailingEscape(3)));
    }
}
