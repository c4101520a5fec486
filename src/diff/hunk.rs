use nom::{
    IResult, Parser,
    bytes::complete::tag,
    character::complete::{char, u32 as number},
    combinator::opt,
    sequence::preceded,
};
use std::fmt;

/// Role of a line inside a hunk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiffLineKind {
    Context,
    Add,
    Delete,
}

impl DiffLineKind {
    /// Prefix character used in unified diffs
    pub fn prefix(self) -> char {
        match self {
            DiffLineKind::Context => ' ',
            DiffLineKind::Add => '+',
            DiffLineKind::Delete => '-',
        }
    }
}

/// A single line of a hunk.
///
/// Line numbers are absolute: `old_line_number` is set for context and deleted
/// lines, `new_line_number` for context and added lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffLine {
    pub kind: DiffLineKind,
    /// Content without the prefix character or trailing newline
    pub text: String,
    pub old_line_number: Option<u32>,
    pub new_line_number: Option<u32>,
    /// Followed by `\ No newline at end of file`
    pub no_trailing_newline: bool,
    /// Included when formatting a patch; always true for context lines
    pub selected: bool,
}

impl DiffLine {
    pub fn context(text: impl Into<String>, old_line: u32, new_line: u32) -> Self {
        Self::with_numbers(DiffLineKind::Context, text, Some(old_line), Some(new_line))
    }

    pub fn add(text: impl Into<String>, new_line: u32) -> Self {
        Self::with_numbers(DiffLineKind::Add, text, None, Some(new_line))
    }

    pub fn delete(text: impl Into<String>, old_line: u32) -> Self {
        Self::with_numbers(DiffLineKind::Delete, text, Some(old_line), None)
    }

    fn with_numbers(
        kind: DiffLineKind,
        text: impl Into<String>,
        old_line_number: Option<u32>,
        new_line_number: Option<u32>,
    ) -> Self {
        Self {
            kind,
            text: text.into(),
            old_line_number,
            new_line_number,
            no_trailing_newline: false,
            selected: true,
        }
    }

    /// Mark the line as lacking a trailing newline
    #[must_use]
    pub fn without_newline(mut self) -> Self {
        self.no_trailing_newline = true;
        self
    }

    pub fn is_change(&self) -> bool {
        self.kind != DiffLineKind::Context
    }
}

/// The `@@ -old_start,old_len +new_start,new_len @@` line of a hunk.
///
/// A zero length side names the line *before* the change, as git does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HunkHeader {
    pub old_start: u32,
    pub old_len: u32,
    pub new_start: u32,
    pub new_len: u32,
}

impl HunkHeader {
    /// Parse a hunk header line, ignoring any trailing section heading.
    ///
    /// An omitted length means one line.
    pub fn parse(line: &str) -> Option<Self> {
        let parsed: IResult<&str, HunkHeader> =
            (tag("@@ -"), line_range, tag(" +"), line_range, tag(" @@"))
                .map(|(_, (old_start, old_len), _, (new_start, new_len), _)| HunkHeader {
                    old_start,
                    old_len,
                    new_start,
                    new_len,
                })
                .parse(line);

        parsed.ok().map(|(_, header)| header)
    }
}

/// `start[,len]`
fn line_range(input: &str) -> IResult<&str, (u32, u32)> {
    (number, opt(preceded(char(','), number)))
        .map(|(start, len)| (start, len.unwrap_or(1)))
        .parse(input)
}

impl fmt::Display for HunkHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@@ -")?;
        write_range(f, self.old_start, self.old_len)?;
        write!(f, " +")?;
        write_range(f, self.new_start, self.new_len)?;
        write!(f, " @@")
    }
}

fn write_range(f: &mut fmt::Formatter<'_>, start: u32, len: u32) -> fmt::Result {
    match len {
        1 => write!(f, "{start}"),
        n => write!(f, "{start},{n}"),
    }
}

/// A single hunk from a unified diff
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hunk {
    pub header: HunkHeader,
    pub lines: Vec<DiffLine>,
}

impl Hunk {
    /// Number of (old side, new side) lines in the body
    pub fn counts(&self) -> (u32, u32) {
        self.lines.iter().fold((0, 0), |(old, new), line| match line.kind {
            DiffLineKind::Context => (old + 1, new + 1),
            DiffLineKind::Delete => (old + 1, new),
            DiffLineKind::Add => (old, new + 1),
        })
    }
}

impl fmt::Display for Hunk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.header)?;
        for line in &self.lines {
            writeln!(f, "{}{}", line.kind.prefix(), line.text)?;
            if line.no_trailing_newline {
                writeln!(f, "\\ No newline at end of file")?;
            }
        }
        Ok(())
    }
}
