//! Parsing of git's `--progress` output on stderr.
//!
//! Git reports progress as lines such as
//!
//! ```text
//! remote: Compressing objects:  45% (9/20)
//! Receiving objects: 100% (1000/1000), 1.20 MiB | 2.00 MiB/s, done.
//! ```
//!
//! Each operation moves through a fixed series of steps. [`GitProgressParser`]
//! weights those steps into a single overall percentage.

use nom::{
    IResult, Parser,
    branch::alt,
    bytes::complete::tag,
    character::complete::{char, space0, u8 as percent_number, u64 as count},
    combinator::eof,
};

/// Which git operation the progress lines come from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProgressKind {
    Clone,
    Checkout,
    Fetch,
    Push,
}

/// One step of an operation and its share of the overall progress
#[derive(Debug)]
struct ProgressStep {
    titles: &'static [&'static str],
    weight: f64,
}

const CLONE_STEPS: &[ProgressStep] = &[
    ProgressStep {
        titles: &["remote: Compressing objects"],
        weight: 0.1,
    },
    ProgressStep {
        titles: &["Receiving objects"],
        weight: 0.6,
    },
    ProgressStep {
        titles: &["Resolving deltas"],
        weight: 0.1,
    },
    ProgressStep {
        titles: &["Checking out files", "Updating files"],
        weight: 0.2,
    },
];

const CHECKOUT_STEPS: &[ProgressStep] = &[ProgressStep {
    titles: &["Checking out files", "Updating files"],
    weight: 1.0,
}];

const FETCH_STEPS: &[ProgressStep] = &[
    ProgressStep {
        titles: &["remote: Compressing objects"],
        weight: 0.1,
    },
    ProgressStep {
        titles: &["Receiving objects"],
        weight: 0.7,
    },
    ProgressStep {
        titles: &["Resolving deltas"],
        weight: 0.2,
    },
];

const PUSH_STEPS: &[ProgressStep] = &[
    ProgressStep {
        titles: &["Compressing objects"],
        weight: 0.2,
    },
    ProgressStep {
        titles: &["Writing objects"],
        weight: 0.8,
    },
];

impl ProgressKind {
    fn steps(self) -> &'static [ProgressStep] {
        match self {
            ProgressKind::Clone => CLONE_STEPS,
            ProgressKind::Checkout => CHECKOUT_STEPS,
            ProgressKind::Fetch => FETCH_STEPS,
            ProgressKind::Push => PUSH_STEPS,
        }
    }
}

/// A recognised progress line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressLine {
    /// Text before the value, e.g. `Receiving objects`
    pub title: String,
    /// The whole line as git printed it
    pub text: String,
    /// Step percentage, when git reports one
    pub percent: Option<u8>,
    pub value: u64,
    pub total: Option<u64>,
    /// The line ends with `done.`
    pub done: bool,
}

/// Parse a single progress line.
///
/// Both `Title: NN% (value/total)...` and `Title: value...` forms are
/// recognised. The title may itself contain `": "`, as remote lines do.
pub fn parse_progress_line(line: &str) -> Option<ProgressLine> {
    let line = line.trim_end();

    line.match_indices(": ").find_map(|(idx, sep)| {
        let title = &line[..idx];
        let rest = line[idx + sep.len()..].trim_start();
        let (_, (percent, value, total)) = progress_value(rest).ok()?;

        Some(ProgressLine {
            title: title.to_string(),
            text: line.to_string(),
            percent,
            value,
            total,
            done: line.ends_with("done."),
        })
    })
}

type ProgressValue = (Option<u8>, u64, Option<u64>);

fn progress_value(input: &str) -> IResult<&str, ProgressValue> {
    alt((with_percent, bare_value)).parse(input)
}

/// `45% (450/1000)`
fn with_percent(input: &str) -> IResult<&str, ProgressValue> {
    (
        percent_number,
        char('%'),
        space0,
        char('('),
        count,
        char('/'),
        count,
        char(')'),
    )
        .map(|(percent, _, _, _, value, _, total, _)| (Some(percent), value, Some(total)))
        .parse(input)
}

/// `5, done.` or a lone `5`
fn bare_value(input: &str) -> IResult<&str, ProgressValue> {
    (count, alt((tag(","), eof)))
        .map(|(value, _)| (None, value, None))
        .parse(input)
}

/// Output of [`GitProgressParser::parse`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressEvent {
    /// A line belonging to one of the operation's steps
    Progress { percent: u8, details: ProgressLine },
    /// Any other output, carrying the current overall percentage
    Context { percent: u8, text: String },
}

impl ProgressEvent {
    /// Overall progress of the operation, 0 to 100
    pub fn percent(&self) -> u8 {
        match self {
            ProgressEvent::Progress { percent, .. } | ProgressEvent::Context { percent, .. } => {
                *percent
            }
        }
    }
}

/// Turns the progress lines of one git invocation into overall percentages.
///
/// The parser is stateful: steps only advance, and the reported percentage
/// never decreases even if git repeats an earlier step.
#[derive(Debug, Clone)]
pub struct GitProgressParser {
    kind: ProgressKind,
    step_index: usize,
    last_percent: u8,
}

impl GitProgressParser {
    pub fn new(kind: ProgressKind) -> Self {
        Self {
            kind,
            step_index: 0,
            last_percent: 0,
        }
    }

    pub fn kind(&self) -> ProgressKind {
        self.kind
    }

    pub fn parse(&mut self, line: &str) -> ProgressEvent {
        let context = |percent| ProgressEvent::Context {
            percent,
            text: line.trim_end().to_string(),
        };

        let Some(details) = parse_progress_line(line) else {
            return context(self.last_percent);
        };

        let steps = self.kind.steps();
        let Some((index, step)) = steps
            .iter()
            .enumerate()
            .skip(self.step_index)
            .find(|(_, step)| step.titles.contains(&details.title.as_str()))
        else {
            return context(self.last_percent);
        };

        self.step_index = index;
        let base: f64 = steps.iter().take(index).map(|step| step.weight).sum();
        let fraction = f64::from(details.percent.unwrap_or(0)) / 100.0;
        let overall = ((base + step.weight * fraction) * 100.0).round().clamp(0.0, 100.0) as u8;

        self.last_percent = overall.max(self.last_percent);
        ProgressEvent::Progress {
            percent: self.last_percent,
            details,
        }
    }
}
