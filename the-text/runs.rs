//! Run tables and the read path shared by every styled text type.
//!
//! A run table is an ordered list of [`Run`]s over a UTF-16 buffer. Run `i`
//! covers `runs[i - 1].lim..runs[i].lim` (the first run starts at 0) and the
//! last run ends at the end of the text. The table always satisfies:
//!
//! - limits are strictly increasing, so every run is non-empty. The one
//!   exception is empty text, which has exactly one zero length run carrying
//!   the properties that text inserted at 0 would get;
//! - adjacent runs never have equal property sets;
//! - every run has a writing system unless its last character is a line
//!   separator.
//!
//! [`RunSource`] provides lookups and slicing over any type exposing a buffer
//! and a run table, which is how [`StyledString`](crate::StyledString) and
//! [`StringBuilder`](crate::StringBuilder) share their read path.

use std::ops::Range;

use the_core::{
  chars::{
    ends_with_line_separator,
    unit_is_object_replacement,
  },
  utf16,
};

use crate::{
  error::{
    Result,
    TextError,
  },
  props::{
    PropertySet,
    str_prop,
  },
};

/// A span of text sharing one property set. `lim` is the exclusive end offset
/// of the run in the owning buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Run {
  pub lim:   usize,
  pub props: PropertySet,
}

impl Run {
  #[inline]
  pub fn new(lim: usize, props: PropertySet) -> Self {
    Self { lim, props }
  }
}

/// Offset where run `irun` starts.
#[inline]
pub(crate) fn run_min(runs: &[Run], irun: usize) -> usize {
  if irun == 0 { 0 } else { runs[irun - 1].lim }
}

/// Checks the writing system requirement for one run.
pub(crate) fn check_run_props(units: &[u16], range: Range<usize>, props: &PropertySet) -> Result<()> {
  if props.writing_system().is_some() || ends_with_line_separator(&units[range.clone()]) {
    return Ok(());
  }
  Err(TextError::MissingWritingSystem { run_lim: range.end })
}

/// Validates a complete run table against `units`.
pub fn validate_runs(units: &[u16], runs: &[Run]) -> Result<()> {
  if runs.is_empty() {
    return Err(TextError::InvalidRuns { reason: "no runs" });
  }
  let placeholder = units.is_empty() && runs.len() == 1;
  let mut min = 0;
  for (irun, run) in runs.iter().enumerate() {
    if run.lim > units.len() {
      return Err(TextError::InvalidRuns {
        reason: "run extends past the end of the text",
      });
    }
    if run.lim < min {
      return Err(TextError::InvalidRuns {
        reason: "run limits are not increasing",
      });
    }
    if run.lim == min && !placeholder {
      return Err(TextError::InvalidRuns { reason: "empty run" });
    }
    if irun > 0 && runs[irun - 1].props == run.props {
      return Err(TextError::InvalidRuns {
        reason: "adjacent runs have equal properties",
      });
    }
    check_run_props(units, min..run.lim, &run.props)?;
    min = run.lim;
  }
  if min != units.len() {
    return Err(TextError::InvalidRuns {
      reason: "runs do not cover the text",
    });
  }
  Ok(())
}

/// Read access to a buffer and its run table.
pub trait RunSource {
  /// The text as UTF-16 code units.
  fn units(&self) -> &[u16];

  /// The run table. Never empty.
  fn runs(&self) -> &[Run];

  /// Length of the text in code units.
  fn len(&self) -> usize {
    self.units().len()
  }

  fn is_empty(&self) -> bool {
    self.units().is_empty()
  }

  fn run_count(&self) -> usize {
    self.runs().len()
  }

  /// The text decoded to a `String`. Unpaired surrogates become U+FFFD.
  fn text(&self) -> String {
    utf16::to_string_lossy(self.units())
  }

  /// Index of the run containing `offset`. An offset equal to the length
  /// belongs to the last run.
  fn run_containing(&self, offset: usize) -> Result<usize> {
    TextError::check_offset(offset, self.len())?;
    let runs = self.runs();
    let irun = runs.partition_point(|run| run.lim <= offset);
    Ok(irun.min(runs.len() - 1))
  }

  fn bounds_of_run(&self, irun: usize) -> Result<Range<usize>> {
    let runs = self.runs();
    let run = runs.get(irun).ok_or(TextError::RunOutOfBounds {
      index: irun,
      count: runs.len(),
    })?;
    Ok(run_min(runs, irun)..run.lim)
  }

  fn props_of_run(&self, irun: usize) -> Result<&PropertySet> {
    let runs = self.runs();
    runs
      .get(irun)
      .map(|run| &run.props)
      .ok_or(TextError::RunOutOfBounds {
        index: irun,
        count: runs.len(),
      })
  }

  fn props_at(&self, offset: usize) -> Result<&PropertySet> {
    let irun = self.run_containing(offset)?;
    Ok(&self.runs()[irun].props)
  }

  fn run_units(&self, irun: usize) -> Result<&[u16]> {
    let bounds = self.bounds_of_run(irun)?;
    Ok(&self.units()[bounds])
  }

  fn run_text(&self, irun: usize) -> Result<String> {
    self.run_units(irun).map(utf16::to_string_lossy)
  }

  /// Runs in document order, with their text.
  fn run_infos(&self) -> RunInfos<'_> {
    RunInfos {
      units: self.units(),
      runs:  self.runs(),
      index: 0,
    }
  }

  /// Checks the run table invariants described in the module docs.
  fn check_invariants(&self) -> Result<()> {
    validate_runs(self.units(), self.runs())
  }
}

/// One run as seen by rendering and export code.
#[derive(Debug, Clone)]
pub struct RunInfo<'a> {
  pub index: usize,
  pub range: Range<usize>,
  pub units: &'a [u16],
  pub props: &'a PropertySet,
}

impl<'a> RunInfo<'a> {
  pub fn text(&self) -> String {
    utf16::to_string_lossy(self.units)
  }

  /// Object description if this run stands for an embedded object rather
  /// than literal text.
  pub fn object_data(&self) -> Option<&'a str> {
    self.props.str_prop(str_prop::OBJ_DATA)
  }

  /// Whether the run is a single object replacement character carrying
  /// object data.
  pub fn is_object_placeholder(&self) -> bool {
    self.object_data().is_some()
      && matches!(self.units, [unit] if unit_is_object_replacement(*unit))
  }
}

#[derive(Debug, Clone)]
pub struct RunInfos<'a> {
  units: &'a [u16],
  runs:  &'a [Run],
  index: usize,
}

impl<'a> Iterator for RunInfos<'a> {
  type Item = RunInfo<'a>;

  fn next(&mut self) -> Option<RunInfo<'a>> {
    let run = self.runs.get(self.index)?;
    let range = run_min(self.runs, self.index)..run.lim;
    let info = RunInfo {
      index: self.index,
      units: &self.units[range.clone()],
      range,
      props: &run.props,
    };
    self.index += 1;
    Some(info)
  }

  fn size_hint(&self) -> (usize, Option<usize>) {
    let rest = self.runs.len() - self.index;
    (rest, Some(rest))
  }
}

impl ExactSizeIterator for RunInfos<'_> {}
