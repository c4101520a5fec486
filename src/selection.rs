//! Line selections for partial staging.
//!
//! A [`DiffSelection`] decides which change lines of a [`Diff`](crate::Diff)
//! end up in the patch. Besides "everything" and "nothing", a selection can
//! name individual lines with the `FILE:REFS` syntax:
//!
//! - `N` - Addition at new line N
//! - `-N` - Deletion at old line N
//! - `N..M` - Range of additions (inclusive)
//! - `-N..-M` - Range of deletions (inclusive)
//!
//! # Examples
//!
//! ```
//! use git_partial::selection::{parse_file_refs, LineRef};
//! use std::num::NonZeroU32;
//!
//! let refs = parse_file_refs("file.nix:-10,12").unwrap();
//! assert_eq!(refs.file, "file.nix");
//! assert_eq!(refs.refs, vec![
//!     LineRef::Delete(NonZeroU32::new(10).unwrap()),
//!     LineRef::Add(NonZeroU32::new(12).unwrap())
//! ]);
//! ```

use crate::diff::{DiffLine, DiffLineKind};
use error_set::error_set;
use nom::{
    IResult, Parser,
    bytes::complete::tag,
    character::complete::{char, digit1},
    combinator::{all_consuming, opt},
    sequence::preceded,
};
use std::num::NonZeroU32;

error_set! {
    /// Errors from parsing file:refs syntax
    SelectionError := {
        /// Input string does not contain a colon separator
        #[display("Invalid format '{input}': expected 'file:refs'")]
        InvalidFormat { input: String },
        /// File name portion before the colon is empty or whitespace
        #[display("Invalid format '{input}': file name cannot be empty")]
        EmptyFileName { input: String },
        /// No line references provided after the colon
        #[display("No line references provided")]
        EmptyRefs,
        /// Line number could not be parsed as a valid non-zero u32
        #[display("Invalid line number '{value}'")]
        InvalidLineNumber { value: String },
        /// Range has start greater than end
        #[display("Invalid range {start}..{end}: start must be <= end")]
        InvalidRange { start: u32, end: u32 },
        /// Deletion range whose end is not a deletion
        #[display("Delete reference must start with '-', got '{value}'")]
        InvalidDeleteRef { value: String },
    }
}

/// A reference to specific lines to stage.
///
/// Additions reference new line numbers, deletions reference old line numbers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineRef {
    /// Addition at new line number
    Add(NonZeroU32),
    /// Addition range (inclusive start and end)
    AddRange(NonZeroU32, NonZeroU32),
    /// Deletion at old line number
    Delete(NonZeroU32),
    /// Deletion range (inclusive start and end)
    DeleteRange(NonZeroU32, NonZeroU32),
}

impl LineRef {
    /// Whether this reference covers the given diff line
    pub fn matches(&self, line: &DiffLine) -> bool {
        match (line.kind, self) {
            (DiffLineKind::Add, LineRef::Add(n)) => line.new_line_number == Some(n.get()),
            (DiffLineKind::Add, LineRef::AddRange(start, end)) => line
                .new_line_number
                .is_some_and(|num| (start.get()..=end.get()).contains(&num)),
            (DiffLineKind::Delete, LineRef::Delete(n)) => line.old_line_number == Some(n.get()),
            (DiffLineKind::Delete, LineRef::DeleteRange(start, end)) => line
                .old_line_number
                .is_some_and(|num| (start.get()..=end.get()).contains(&num)),
            _ => false,
        }
    }
}

/// Which change lines of a diff to include in a patch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum DiffSelection {
    /// Every change line
    #[default]
    All,
    /// No change lines
    None,
    /// Change lines matched by at least one reference
    Lines(Vec<LineRef>),
}

impl DiffSelection {
    /// Whether a change line is selected. Context lines always are.
    pub fn includes(&self, line: &DiffLine) -> bool {
        if line.kind == DiffLineKind::Context {
            return true;
        }
        match self {
            DiffSelection::All => true,
            DiffSelection::None => false,
            DiffSelection::Lines(refs) => refs.iter().any(|r| r.matches(line)),
        }
    }
}

/// Parsed file reference with line selections.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileLineRefs {
    /// The file path
    pub file: String,
    /// The line references to stage from this file
    pub refs: Vec<LineRef>,
}

impl FileLineRefs {
    pub fn selection(&self) -> DiffSelection {
        DiffSelection::Lines(self.refs.clone())
    }
}

/// Parse a `file:refs` string into structured data.
///
/// # Errors
///
/// Returns [`SelectionError`] if:
/// - Input doesn't contain `:` separator
/// - File name is empty or whitespace
/// - No line references provided
/// - Line numbers are zero, malformed, or form an inverted range
pub fn parse_file_refs(input: &str) -> Result<FileLineRefs, SelectionError> {
    let Some((file, refs)) = input.split_once(':') else {
        return Err(SelectionError::InvalidFormat {
            input: input.to_string(),
        });
    };

    let file = file.trim();
    if file.is_empty() {
        return Err(SelectionError::EmptyFileName {
            input: input.to_string(),
        });
    }

    let refs = refs
        .split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(parse_single_ref)
        .collect::<Result<Vec<_>, _>>()?;

    if refs.is_empty() {
        return Err(SelectionError::EmptyRefs);
    }

    Ok(FileLineRefs {
        file: file.to_string(),
        refs,
    })
}

/// A line number with its optional deletion sign, still as digits
type SignedDigits<'a> = (bool, &'a str);

fn signed_digits(input: &str) -> IResult<&str, SignedDigits<'_>> {
    (opt(char('-')).map(|sign| sign.is_some()), digit1).parse(input)
}

fn single_ref(input: &str) -> IResult<&str, (SignedDigits<'_>, Option<SignedDigits<'_>>)> {
    all_consuming((signed_digits, opt(preceded(tag(".."), signed_digits)))).parse(input)
}

/// Parse one reference: `N`, `-N`, `N..M` or `-N..-M`
fn parse_single_ref(input: &str) -> Result<LineRef, SelectionError> {
    let Ok((_, (start, end))) = single_ref(input) else {
        return Err(SelectionError::InvalidLineNumber {
            value: input.to_string(),
        });
    };

    let (deletion, start_digits) = start;
    let start_num = line_number(start_digits)?;

    let Some((end_deletion, end_digits)) = end else {
        return Ok(if deletion {
            LineRef::Delete(start_num)
        } else {
            LineRef::Add(start_num)
        });
    };

    let end_num = line_number(end_digits)?;
    match (deletion, end_deletion) {
        (true, false) => {
            return Err(SelectionError::InvalidDeleteRef {
                value: end_digits.to_string(),
            });
        }
        (false, true) => {
            return Err(SelectionError::InvalidLineNumber {
                value: format!("-{end_digits}"),
            });
        }
        _ => {}
    }

    if start_num > end_num {
        return Err(SelectionError::InvalidRange {
            start: start_num.get(),
            end: end_num.get(),
        });
    }

    Ok(if deletion {
        LineRef::DeleteRange(start_num, end_num)
    } else {
        LineRef::AddRange(start_num, end_num)
    })
}

fn line_number(digits: &str) -> Result<NonZeroU32, SelectionError> {
    digits
        .parse::<NonZeroU32>()
        .map_err(|_| SelectionError::InvalidLineNumber {
            value: digits.to_string(),
        })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use similar_asserts::assert_eq;

    fn nz(n: u32) -> NonZeroU32 {
        NonZeroU32::new(n).unwrap()
    }

    #[test]
    fn parse_single_addition() {
        let result = parse_file_refs("flake.nix:137").unwrap();
        assert_eq!(result.file, "flake.nix");
        assert_eq!(result.refs, vec![LineRef::Add(nz(137))]);
    }

    #[test]
    fn parse_addition_range() {
        let result = parse_file_refs("flake.nix:39..43").unwrap();
        assert_eq!(result.refs, vec![LineRef::AddRange(nz(39), nz(43))]);
    }

    #[test]
    fn parse_deletion_range() {
        let result = parse_file_refs("gtk.nix:-10..-11").unwrap();
        assert_eq!(result.refs, vec![LineRef::DeleteRange(nz(10), nz(11))]);
    }

    #[test]
    fn parse_mixed_refs_with_spaces() {
        let result = parse_file_refs("gtk.nix: -10, -11 ,12..13").unwrap();
        assert_eq!(
            result.refs,
            vec![
                LineRef::Delete(nz(10)),
                LineRef::Delete(nz(11)),
                LineRef::AddRange(nz(12), nz(13)),
            ]
        );
    }

    #[test]
    fn parse_path_with_spaces() {
        let result = parse_file_refs("my notes.txt:3").unwrap();
        assert_eq!(result.file, "my notes.txt");
    }

    #[test]
    fn parse_invalid_format() {
        let result = parse_file_refs("no_colon");
        assert!(matches!(result, Err(SelectionError::InvalidFormat { .. })));
    }

    #[test]
    fn parse_empty_refs() {
        let result = parse_file_refs("file.nix: , ");
        assert!(matches!(result, Err(SelectionError::EmptyRefs)));
    }

    #[test]
    fn parse_whitespace_file_name() {
        let result = parse_file_refs("  :10");
        assert!(matches!(result, Err(SelectionError::EmptyFileName { .. })));
    }

    #[test]
    fn parse_zero_line_number() {
        let result = parse_file_refs("file.nix:-0");
        assert!(matches!(
            result,
            Err(SelectionError::InvalidLineNumber { .. })
        ));
    }

    #[test]
    fn zero_check_happens_before_range_validation() {
        let result = parse_file_refs("file.nix:10..0");
        assert!(matches!(
            result,
            Err(SelectionError::InvalidLineNumber { .. })
        ));
    }

    #[test]
    fn parse_garbage_reference() {
        let result = parse_file_refs("file.nix:10x");
        assert!(matches!(
            result,
            Err(SelectionError::InvalidLineNumber { .. })
        ));
    }

    #[test]
    fn parse_inverted_deletion_range() {
        let result = parse_file_refs("file.nix:-15..-10");
        assert!(matches!(
            result,
            Err(SelectionError::InvalidRange { start: 15, end: 10 })
        ));
    }

    #[test]
    fn parse_deletion_range_with_addition_end() {
        let result = parse_file_refs("file.nix:-10..15");
        assert!(matches!(
            result,
            Err(SelectionError::InvalidDeleteRef { .. })
        ));
    }

    #[test]
    fn parse_addition_range_with_deletion_end() {
        let result = parse_file_refs("file.nix:10..-15");
        assert!(matches!(
            result,
            Err(SelectionError::InvalidLineNumber { .. })
        ));
    }

    #[test]
    fn selection_matches_by_side() {
        let add = DiffLine::add("added", 12);
        let delete = DiffLine::delete("removed", 12);
        let context = DiffLine::context("same", 11, 11);

        let selection = DiffSelection::Lines(vec![LineRef::Add(nz(12))]);
        assert!(selection.includes(&add));
        assert!(!selection.includes(&delete));
        assert!(selection.includes(&context));

        let selection = DiffSelection::Lines(vec![LineRef::DeleteRange(nz(10), nz(12))]);
        assert!(!selection.includes(&add));
        assert!(selection.includes(&delete));
    }

    #[test]
    fn none_selection_keeps_context() {
        assert!(!DiffSelection::None.includes(&DiffLine::add("x", 1)));
        assert!(DiffSelection::None.includes(&DiffLine::context("x", 1, 1)));
    }
}
