//! Error types and source positions.

use std::fmt;
use std::sync::Arc;

use thiserror::Error;

/// Result type for every stage of the pipeline.
pub type Result<T> = std::result::Result<T, Error>;

/// A position in the input stream.
///
/// `line` and `column` are zero-based; `Display` prints them one-based.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Mark {
    pub name: Arc<str>,
    pub index: usize,
    pub line: usize,
    pub column: usize,
    /// The line of input around the position, when the reader still had it.
    pub snippet: Option<Arc<str>>,
}

impl Mark {
    /// Create a mark without a snippet.
    pub fn new(name: Arc<str>, index: usize, line: usize, column: usize) -> Self {
        Self {
            name,
            index,
            line,
            column,
            snippet: None,
        }
    }
}

impl fmt::Display for Mark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "  in \"{}\", line {}, column {}",
            self.name,
            self.line + 1,
            self.column + 1
        )?;
        if let Some(snippet) = &self.snippet {
            let caret = snippet
                .chars()
                .take(self.column)
                .map(|c| if c == '\t' { '\t' } else { ' ' })
                .collect::<String>();
            write!(f, ":\n    {}\n    {}^", snippet, caret)?;
        }
        Ok(())
    }
}

/// A problem found at a position, optionally inside a larger construct.
///
/// Renders like
/// `while scanning a simple key\n  in "<str>", line 1, column 1\ncould not find expected ':'\n  in ...`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MarkedProblem {
    pub context: Option<String>,
    pub context_mark: Option<Mark>,
    pub problem: String,
    pub problem_mark: Option<Mark>,
    pub note: Option<String>,
}

impl MarkedProblem {
    /// A problem with no surrounding context.
    pub fn new(problem: impl Into<String>, problem_mark: Option<Mark>) -> Self {
        Self {
            problem: problem.into(),
            problem_mark,
            ..Self::default()
        }
    }

    /// A problem found while processing the construct starting at `context_mark`.
    pub fn with_context(
        context: impl Into<String>,
        context_mark: Option<Mark>,
        problem: impl Into<String>,
        problem_mark: Option<Mark>,
    ) -> Self {
        Self {
            context: Some(context.into()),
            context_mark,
            problem: problem.into(),
            problem_mark,
            note: None,
        }
    }

    pub fn note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }
}

impl fmt::Display for MarkedProblem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut lines = Vec::new();
        if let Some(context) = &self.context {
            lines.push(context.clone());
        }
        // The context mark is skipped when it points at the problem itself.
        if let Some(mark) = &self.context_mark {
            let same = self.problem_mark.as_ref().map_or(false, |p| {
                p.name == mark.name && p.line == mark.line && p.column == mark.column
            });
            if self.problem_mark.is_none() || !same {
                lines.push(mark.to_string());
            }
        }
        lines.push(self.problem.clone());
        if let Some(mark) = &self.problem_mark {
            lines.push(mark.to_string());
        }
        if let Some(note) = &self.note {
            lines.push(note.clone());
        }
        write!(f, "{}", lines.join("\n"))
    }
}

/// Error type for decoding and encoding.
#[derive(Error, Debug)]
pub enum Error {
    /// Input contained a character outside the printable set, or bytes that
    /// are not valid UTF-8.
    #[error("{reason}: {found} at position {position} of \"{name}\"")]
    Reader {
        name: Arc<str>,
        position: usize,
        found: String,
        reason: &'static str,
    },

    /// Malformed token.
    #[error("{0}")]
    Scanner(MarkedProblem),

    /// Token sequence that does not match the grammar, or a bad directive.
    #[error("{0}")]
    Parser(MarkedProblem),

    /// Undefined alias, duplicate anchor, or more than one document where one
    /// was expected.
    #[error("{0}")]
    Composer(MarkedProblem),

    /// Invalid resolver registration.
    #[error("resolver: {0}")]
    Resolver(String),

    /// Node that cannot be turned into a value.
    #[error("{0}")]
    Constructor(MarkedProblem),

    /// Value that cannot be turned into a node.
    #[error("cannot represent value: {0}")]
    Representer(String),

    /// Event sequence or event content the emitter cannot write.
    #[error("emitter: {0}")]
    Emitter(String),

    /// The sink or the source failed.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    pub(crate) fn scanner(
        context: &str,
        context_mark: Mark,
        problem: impl Into<String>,
        problem_mark: Mark,
    ) -> Self {
        Error::Scanner(MarkedProblem::with_context(
            context,
            Some(context_mark),
            problem,
            Some(problem_mark),
        ))
    }

    pub(crate) fn parser(
        context: Option<(&str, Mark)>,
        problem: impl Into<String>,
        problem_mark: Mark,
    ) -> Self {
        Error::Parser(match context {
            Some((context, mark)) => {
                MarkedProblem::with_context(context, Some(mark), problem, Some(problem_mark))
            }
            None => MarkedProblem::new(problem, Some(problem_mark)),
        })
    }

    pub(crate) fn composer(
        context: Option<(&str, Mark)>,
        problem: impl Into<String>,
        problem_mark: Mark,
    ) -> Self {
        Error::Composer(match context {
            Some((context, mark)) => {
                MarkedProblem::with_context(context, Some(mark), problem, Some(problem_mark))
            }
            None => MarkedProblem::new(problem, Some(problem_mark)),
        })
    }

    pub(crate) fn constructor(
        context: Option<(&str, Mark)>,
        problem: impl Into<String>,
        problem_mark: Mark,
    ) -> Self {
        Error::Constructor(match context {
            Some((context, mark)) => {
                MarkedProblem::with_context(context, Some(mark), problem, Some(problem_mark))
            }
            None => MarkedProblem::new(problem, Some(problem_mark)),
        })
    }

    /// The position the error points at, when it has one.
    pub fn mark(&self) -> Option<&Mark> {
        match self {
            Error::Scanner(p) | Error::Parser(p) | Error::Composer(p) | Error::Constructor(p) => {
                p.problem_mark.as_ref().or(p.context_mark.as_ref())
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mark(line: usize, column: usize) -> Mark {
        Mark::new(Arc::from("<test>"), 0, line, column)
    }

    #[test]
    fn test_mark_display_is_one_based() {
        assert_eq!(
            mark(0, 4).to_string(),
            "  in \"<test>\", line 1, column 5"
        );
    }

    #[test]
    fn test_mark_snippet_caret() {
        let mut m = mark(2, 3);
        m.snippet = Some(Arc::from("key: [oops"));
        let text = m.to_string();
        assert!(text.ends_with("key: [oops\n       ^"), "{}", text);
    }

    #[test]
    fn test_problem_skips_duplicate_context_mark() {
        let p = MarkedProblem::with_context("while x", Some(mark(1, 1)), "bad", Some(mark(1, 1)));
        assert_eq!(p.to_string().matches("line 2").count(), 1);
    }

    #[test]
    fn test_error_mark() {
        let err = Error::composer(None, "found undefined alias", mark(3, 0));
        assert_eq!(err.mark().map(|m| m.line), Some(3));
        assert!(err.to_string().starts_with("found undefined alias"));
    }
}
