//! Random access editing of styled text.
//!
//! A [`StringBuilder`] owns a mutable copy of a buffer and its run table.
//! Every edit keeps the run table invariants intact: affected runs are split
//! where an edit boundary falls inside them, rewritten, and merged again with
//! any neighbour that ends up with equal properties.
//!
//! Edits validate before they commit. A failed call leaves the builder as it
//! was.
//!
//! ```
//! use the_text::{PropertySet, RunSource, StringBuilder, StyledString};
//!
//! let p1 = PropertySet::with_ws(5);
//! let p2 = PropertySet::with_ws(6);
//! let mut builder = StyledString::new("ab", p1.clone())?.to_builder();
//! builder.replace(1..1, "X", Some(&p2))?;
//! assert_eq!(builder.text(), "aXb");
//! assert_eq!(builder.run_count(), 3);
//!
//! builder.set_properties(0..3, &p1)?;
//! assert_eq!(builder.run_count(), 1);
//! # Ok::<(), the_text::TextError>(())
//! ```

use std::ops::Range;

use the_core::utf16;

use crate::{
  StyledString,
  error::{
    Result,
    TextError,
  },
  props::{
    IntValue,
    PropId,
    PropertySet,
  },
  runs::{
    Run,
    RunSource,
    check_run_props,
    run_min,
  },
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StringBuilder {
  units: Vec<u16>,
  runs:  Vec<Run>,
}

impl StringBuilder {
  /// An empty builder. Text inserted at 0 gets `props`, which needs a writing
  /// system.
  pub fn new(props: PropertySet) -> Result<Self> {
    check_run_props(&[], 0..0, &props)?;
    Ok(Self {
      units: Vec::new(),
      runs:  vec![Run::new(0, props)],
    })
  }

  /// Replaces `range` with `text`.
  ///
  /// Without `props` the new text takes the properties of the character
  /// before the range, or of the first character when the range starts at 0.
  /// Replacing everything with nothing leaves a placeholder carrying `props`
  /// when given.
  pub fn replace(&mut self, range: Range<usize>, text: &str, props: Option<&PropertySet>) -> Result<()> {
    self.replace_units(range, &utf16::encode_str(text), props)
  }

  /// [`replace`](Self::replace) for text already in UTF-16.
  pub fn replace_units(
    &mut self,
    range: Range<usize>,
    units: &[u16],
    props: Option<&PropertySet>,
  ) -> Result<()> {
    TextError::check_range(range.start, range.end, self.len())?;
    if units.is_empty() {
      let placeholder = props.map(|props| Run::new(0, props.clone()));
      return self.splice(range, &[], placeholder.as_slice());
    }
    let props = match props {
      Some(props) => props.clone(),
      None => self.inherited_props(range.start).clone(),
    };
    self.splice(range, units, &[Run::new(units.len(), props)])
  }

  /// Replaces `range` with the text and runs of `src`.
  ///
  /// Replacing everything with an empty `src` leaves an empty builder
  /// carrying the properties of `src`'s placeholder run.
  pub fn replace_styled(&mut self, range: Range<usize>, src: &StyledString) -> Result<()> {
    self.splice(range, src.units(), src.runs())
  }

  /// Sets the properties of every character in `range` to `props`.
  ///
  /// On an empty builder the range `0..0` replaces the properties of the
  /// placeholder run.
  pub fn set_properties(&mut self, range: Range<usize>, props: &PropertySet) -> Result<()> {
    self.edit_props(range, |_| props.clone())
  }

  /// Sets (or with `None` removes) one integer property across `range`,
  /// leaving the other properties of each run alone.
  pub fn set_int_prop(&mut self, range: Range<usize>, id: PropId, value: Option<IntValue>) -> Result<()> {
    self.edit_props(range, |props| props.with_int(id, value))
  }

  /// Sets (or with `None` removes) one string property across `range`.
  pub fn set_str_prop(&mut self, range: Range<usize>, id: PropId, value: Option<&str>) -> Result<()> {
    self.edit_props(range, |props| props.with_str(id, value))
  }

  /// Deletes all text, keeping the properties of the first run for the
  /// placeholder.
  pub fn clear(&mut self) -> Result<()> {
    self.splice(0..self.len(), &[], &[])
  }

  /// Freezes the current contents. The builder stays usable.
  pub fn build(&self) -> StyledString {
    StyledString::from_parts(self.units.clone(), self.runs.clone())
  }

  /// Freezes the current contents, handing the buffers over without copying
  /// the text.
  pub fn finish(self) -> StyledString {
    StyledString::from_parts(self.units, self.runs)
  }

  fn inherited_props(&self, offset: usize) -> &PropertySet {
    let irun = if offset == 0 {
      0
    } else {
      self.runs.partition_point(|run| run.lim < offset)
    };
    &self.runs[irun.min(self.runs.len() - 1)].props
  }

  /// Core edit: replaces `range` with `new_units`, formatted by `new_runs`
  /// (limits relative to `new_units`). An empty `new_runs` entry is only
  /// consulted when the whole text is cleared, for the placeholder.
  fn splice(&mut self, range: Range<usize>, new_units: &[u16], new_runs: &[Run]) -> Result<()> {
    let len = self.units.len();
    let Range { start: min, end: lim } = range;
    TextError::check_range(min, lim, len)?;

    if new_units.is_empty() {
      if min == 0 && lim == len {
        let props = new_runs
          .first()
          .map_or_else(|| self.runs[0].props.clone(), |run| run.props.clone());
        check_run_props(&[], 0..0, &props)?;
        self.units.clear();
        self.runs.clear();
        self.runs.push(Run::new(0, props));
        return Ok(());
      }
      if min == lim {
        return Ok(());
      }
    }
    let new_runs = if new_units.is_empty() { &[][..] } else { new_runs };

    let mut new_min = 0;
    for run in new_runs {
      if run.lim <= new_min || run.lim > new_units.len() {
        return Err(TextError::InvalidRuns {
          reason: "inserted runs do not tile the inserted text",
        });
      }
      check_run_props(new_units, new_min..run.lim, &run.props)?;
      new_min = run.lim;
    }
    if new_min != new_units.len() {
      return Err(TextError::InvalidRuns {
        reason: "inserted runs do not cover the inserted text",
      });
    }

    let inserted = new_units.len();
    let mut runs = Vec::with_capacity(self.runs.len() + new_runs.len() + 1);
    if len == 0 {
      // the placeholder run goes away with the first real text
      runs.extend_from_slice(new_runs);
    } else {
      let first = self.runs.partition_point(|run| run.lim <= min);
      runs.extend_from_slice(&self.runs[..first]);
      if first < self.runs.len() {
        let first_min = run_min(&self.runs, first);
        if first_min < min {
          let props = &self.runs[first].props;
          check_run_props(&self.units, first_min..min, props)?;
          runs.push(Run::new(min, props.clone()));
        }
      }
      let block_min = runs.len();
      runs.extend(
        new_runs
          .iter()
          .map(|run| Run::new(run.lim + min, run.props.clone())),
      );
      let block_lim = runs.len();
      let after = self.runs.partition_point(|run| run.lim <= lim);
      runs.extend(
        self.runs[after..]
          .iter()
          .map(|run| Run::new(run.lim - lim + min + inserted, run.props.clone())),
      );
      coalesce(&mut runs, block_min.saturating_sub(1)..block_lim + 1);
    }

    self.units.splice(min..lim, new_units.iter().copied());
    self.runs = runs;
    debug_assert_eq!(self.check_invariants(), Ok(()));
    Ok(())
  }

  fn edit_props(
    &mut self,
    range: Range<usize>,
    mut edit: impl FnMut(&PropertySet) -> PropertySet,
  ) -> Result<()> {
    let len = self.units.len();
    let Range { start: min, end: lim } = range;
    TextError::check_range(min, lim, len)?;

    if len == 0 {
      let props = edit(&self.runs[0].props);
      check_run_props(&[], 0..0, &props)?;
      self.runs[0].props = props;
      return Ok(());
    }
    if min == lim {
      return Ok(());
    }

    let mut runs = self.runs.clone();
    split_at(&mut runs, min);
    split_at(&mut runs, lim);
    let first = runs.partition_point(|run| run.lim <= min);
    let last = runs.partition_point(|run| run.lim <= lim);
    if first > 0 {
      let before = first - 1;
      check_run_props(&self.units, run_min(&runs, before)..min, &runs[before].props)?;
    }
    for irun in first..last {
      let props = edit(&runs[irun].props);
      check_run_props(&self.units, run_min(&runs, irun)..runs[irun].lim, &props)?;
      runs[irun].props = props;
    }
    coalesce(&mut runs, first.saturating_sub(1)..last + 1);

    self.runs = runs;
    debug_assert_eq!(self.check_invariants(), Ok(()));
    Ok(())
  }
}

/// Makes sure a run boundary exists at `offset`.
fn split_at(runs: &mut Vec<Run>, offset: usize) {
  let irun = runs.partition_point(|run| run.lim <= offset);
  if irun < runs.len() && run_min(runs, irun) < offset {
    let props = runs[irun].props.clone();
    runs.insert(irun, Run::new(offset, props));
  }
}

/// Merges neighbours with equal properties among `runs[window]`.
fn coalesce(runs: &mut Vec<Run>, window: Range<usize>) {
  let end = window.end.min(runs.len());
  for irun in (window.start + 1..end).rev() {
    if runs[irun - 1].props == runs[irun].props {
      runs.remove(irun - 1);
    }
  }
}

impl RunSource for StringBuilder {
  #[inline]
  fn units(&self) -> &[u16] {
    &self.units
  }

  #[inline]
  fn runs(&self) -> &[Run] {
    &self.runs
  }
}

impl From<&StyledString> for StringBuilder {
  fn from(src: &StyledString) -> Self {
    Self {
      units: src.units().to_vec(),
      runs:  src.runs().to_vec(),
    }
  }
}
