//! Test-file line parser.
//!
//! Every physical line of a `.t` file is exactly one [`Directive`], chosen by
//! its first character:
//!
//! ```text
//! # comment
//! :CHAIN1,CHAIN2
//! *table
//! !shell command
//! <rule>;<expected save|=>;OK|FAIL
//! ```

use thiserror::Error;

/// Structural defect in a test file line. Always fatal to the run.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("line {line}: expected `<rule>;<save>;<result>`, found {found} field(s)")]
    MissingField { line: usize, found: usize },
}

/// Expected serialized form of a test rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExpectedSave {
    /// `=`: the dump must contain the rule exactly as written.
    SameAsRule,
    /// Normalized form the backend is expected to print.
    Text(String),
}

/// Outcome a test author declared for a rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeclaredOutcome {
    Ok,
    Fail,
    /// Any other token. Behaves like [`DeclaredOutcome::Ok`].
    Other(String),
}

impl DeclaredOutcome {
    #[must_use]
    pub fn from_token(token: &str) -> Self {
        match token {
            "OK" => Self::Ok,
            "FAIL" => Self::Fail,
            other => Self::Other(other.to_string()),
        }
    }

    /// Only a literal `FAIL` asks for the rule to be rejected.
    #[must_use]
    pub fn expects_rejection(&self) -> bool {
        matches!(self, Self::Fail)
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Ok => "OK",
            Self::Fail => "FAIL",
            Self::Other(token) => token,
        }
    }
}

/// A `<rule>;<save>;<result>` line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestCase {
    /// Rule fragment as written, without chain or table.
    pub rule_spec: String,
    /// `rule_spec` split into process arguments. `None` when the quoting is
    /// unbalanced; such a rule can never be loaded.
    pub rule_args: Option<Vec<String>>,
    pub expected_save: ExpectedSave,
    pub outcome: DeclaredOutcome,
}

impl TestCase {
    /// Text searched for in the dump, before chain qualification.
    #[must_use]
    pub fn save_text(&self) -> &str {
        match &self.expected_save {
            ExpectedSave::SameAsRule => &self.rule_spec,
            ExpectedSave::Text(text) => text,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Directive {
    Comment,
    ChainSet(Vec<String>),
    TableSelect(String),
    ExternalCommand(String),
    TestCase(TestCase),
}

/// Parse one line (without its newline). `line_number` is 1-based and only
/// used for error reporting.
pub fn parse_line(line: &str, line_number: usize) -> Result<Directive, ParseError> {
    let mut chars = line.chars();
    let directive = match chars.next() {
        Some('#') => Directive::Comment,
        Some(':') => Directive::ChainSet(
            chars
                .as_str()
                .trim_end()
                .split(',')
                .map(str::to_string)
                .collect(),
        ),
        Some('!') => Directive::ExternalCommand(chars.as_str().trim_end().to_string()),
        Some('*') => Directive::TableSelect(chars.as_str().trim_end().to_string()),
        _ => Directive::TestCase(parse_test_case(line, line_number)?),
    };
    Ok(directive)
}

fn parse_test_case(line: &str, line_number: usize) -> Result<TestCase, ParseError> {
    let fields: Vec<&str> = line.split(';').collect();
    if fields.len() < 3 {
        return Err(ParseError::MissingField {
            line: line_number,
            found: fields.len(),
        });
    }

    let rule_spec = fields[0].to_string();
    let rule_args = split_words(&rule_spec);
    let expected_save = if fields[1] == "=" {
        ExpectedSave::SameAsRule
    } else {
        ExpectedSave::Text(fields[1].to_string())
    };

    Ok(TestCase {
        rule_spec,
        rule_args,
        expected_save,
        outcome: DeclaredOutcome::from_token(fields[2].trim_end()),
    })
}

/// Split a rule fragment into words with POSIX shell quoting rules:
/// whitespace separates words, `'...'` is literal, `"..."` honours `\"`,
/// `\\`, `\$` and `` \` ``, and a bare backslash escapes the next character.
///
/// Returns `None` on an unterminated quote or a trailing backslash.
#[must_use]
pub fn split_words(text: &str) -> Option<Vec<String>> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut in_word = false;
    let mut chars = text.chars();

    while let Some(c) = chars.next() {
        match c {
            c if c.is_whitespace() => {
                if in_word {
                    words.push(std::mem::take(&mut current));
                    in_word = false;
                }
            }
            '\'' => {
                in_word = true;
                loop {
                    match chars.next()? {
                        '\'' => break,
                        c => current.push(c),
                    }
                }
            }
            '"' => {
                in_word = true;
                loop {
                    match chars.next()? {
                        '"' => break,
                        '\\' => match chars.next()? {
                            c @ ('"' | '\\' | '$' | '`') => current.push(c),
                            '\n' => {}
                            c => {
                                current.push('\\');
                                current.push(c);
                            }
                        },
                        c => current.push(c),
                    }
                }
            }
            '\\' => {
                in_word = true;
                current.push(chars.next()?);
            }
            c => {
                in_word = true;
                current.push(c);
            }
        }
    }
    if in_word {
        words.push(current);
    }
    Some(words)
}
