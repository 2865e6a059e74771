//! The immutable styled string.

use std::{
  fmt,
  ops::Range,
  slice,
  sync::{
    Arc,
    atomic::{
      AtomicU8,
      Ordering,
    },
  },
};

use bitflags::bitflags;
use the_core::utf16;

use crate::{
  StringBuilder,
  error::{
    Result,
    TextError,
  },
  incremental::IncrementalBuilder,
  props::PropertySet,
  runs::{
    Run,
    RunSource,
    check_run_props,
    run_min,
    validate_runs,
  },
};

bitflags! {
  /// Normalization forms a string is known to be in.
  #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
  pub struct NormForms: u8 {
    const NFD  = 1 << 0;
    const NFKD = 1 << 1;
    const NFC  = 1 << 2;
    const NFKC = 1 << 3;
    const FCD  = 1 << 4;
    const NFSC = 1 << 5;
  }
}

#[derive(Debug)]
enum RunStorage {
  Single(Run),
  Multi(Box<[Run]>),
}

impl RunStorage {
  fn from_vec(mut runs: Vec<Run>) -> Self {
    if runs.len() == 1 {
      if let Some(run) = runs.pop() {
        return RunStorage::Single(run);
      }
    }
    RunStorage::Multi(runs.into_boxed_slice())
  }

  #[inline]
  fn as_slice(&self) -> &[Run] {
    match self {
      RunStorage::Single(run) => slice::from_ref(run),
      RunStorage::Multi(runs) => runs,
    }
  }
}

struct Inner {
  units: Box<[u16]>,
  runs:  RunStorage,
  /// Monotone cache of [`NormForms`] bits. Only ever grows, and any thread
  /// setting a bit sets the same bit, so relaxed ordering is enough.
  forms: AtomicU8,
}

/// Immutable styled text: UTF-16 code units plus a run table.
///
/// Cloning only bumps a reference count, and clones compare equal to each
/// other through a pointer check. A `StyledString` can be shared between
/// threads freely.
#[derive(Clone)]
pub struct StyledString(Arc<Inner>);

impl StyledString {
  /// A single run string.
  pub fn new(text: &str, props: PropertySet) -> Result<Self> {
    Self::from_units(utf16::encode_str(text), props)
  }

  /// A single run string from UTF-16 code units.
  pub fn from_units(units: impl Into<Box<[u16]>>, props: PropertySet) -> Result<Self> {
    let units = units.into();
    check_run_props(&units, 0..units.len(), &props)?;
    let run = Run::new(units.len(), props);
    Ok(Self::from_storage(units, RunStorage::Single(run)))
  }

  /// The empty string. `props` is what text inserted into it will get, and
  /// must still carry a writing system.
  pub fn empty(props: PropertySet) -> Result<Self> {
    Self::from_units(Vec::new(), props)
  }

  /// A string from a complete run table, which must satisfy the invariants
  /// documented in [`runs`](crate::runs).
  pub fn from_runs(units: impl Into<Box<[u16]>>, runs: Vec<Run>) -> Result<Self> {
    let units = units.into();
    validate_runs(&units, &runs)?;
    Ok(Self::from_storage(units, RunStorage::from_vec(runs)))
  }

  /// Skips validation. Callers must already uphold the run invariants.
  pub(crate) fn from_parts(units: impl Into<Box<[u16]>>, runs: Vec<Run>) -> Self {
    let units = units.into();
    debug_assert_eq!(validate_runs(&units, &runs), Ok(()));
    Self::from_storage(units, RunStorage::from_vec(runs))
  }

  fn from_storage(units: Box<[u16]>, runs: RunStorage) -> Self {
    StyledString(Arc::new(Inner {
      units,
      runs,
      forms: AtomicU8::new(0),
    }))
  }

  /// Whether `a` and `b` are the same shared instance.
  #[inline]
  pub fn ptr_eq(a: &Self, b: &Self) -> bool {
    Arc::ptr_eq(&a.0, &b.0)
  }

  /// Copies `range` into a new string.
  ///
  /// The whole string returns `self` without copying. An empty range still
  /// carries the properties of the run containing the cut point.
  pub fn substring(&self, range: Range<usize>) -> Result<StyledString> {
    let len = self.len();
    TextError::check_range(range.start, range.end, len)?;
    if range.start == 0 && range.end == len {
      return Ok(self.clone());
    }

    let runs = self.runs();
    let units: Box<[u16]> = self.units()[range.clone()].into();
    let irun_min = self.run_containing(range.start)?;
    let irun_lim = if range.is_empty() {
      irun_min
    } else {
      self.run_containing(range.end - 1)?
    };

    // only the last piece loses characters at its end, so only it can end up
    // without the line separator that excused a missing writing system
    let last_min = if irun_lim == irun_min {
      0
    } else {
      run_min(runs, irun_lim) - range.start
    };
    check_run_props(&units, last_min..units.len(), &runs[irun_lim].props)?;

    let storage = if irun_min == irun_lim {
      RunStorage::Single(Run::new(units.len(), runs[irun_min].props.clone()))
    } else {
      RunStorage::Multi(
        runs[irun_min..=irun_lim]
          .iter()
          .map(|run| Run::new(run.lim.min(range.end) - range.start, run.props.clone()))
          .collect(),
      )
    };
    let sub = Self::from_storage(units, storage);
    // decomposed forms survive slicing, composed ones need not
    sub.mark_normalized(self.known_forms() & (NormForms::NFD | NormForms::NFKD | NormForms::FCD));
    Ok(sub)
  }

  /// Normalization forms this string is already known to be in.
  pub fn known_forms(&self) -> NormForms {
    NormForms::from_bits_truncate(self.0.forms.load(Ordering::Relaxed))
  }

  pub(crate) fn mark_normalized(&self, forms: NormForms) {
    if !forms.is_empty() {
      self.0.forms.fetch_or(forms.bits(), Ordering::Relaxed);
    }
  }

  /// A random access builder starting from this string.
  pub fn to_builder(&self) -> StringBuilder {
    StringBuilder::from(self)
  }

  /// An append only builder holding this string, with the pen set to the
  /// properties of the last run.
  pub fn to_incremental(&self) -> IncrementalBuilder {
    let mut builder = IncrementalBuilder::with_props(self.runs()[self.run_count() - 1].props.clone());
    builder.append_styled(self);
    builder
  }
}

impl RunSource for StyledString {
  #[inline]
  fn units(&self) -> &[u16] {
    &self.0.units
  }

  #[inline]
  fn runs(&self) -> &[Run] {
    self.0.runs.as_slice()
  }
}

/// Text, run boundaries and properties all have to match. Two strings with
/// the same text and properties but different split points are not equal,
/// since later edits would treat them differently.
impl PartialEq for StyledString {
  fn eq(&self, other: &Self) -> bool {
    if Self::ptr_eq(self, other) {
      return true;
    }
    self.units() == other.units() && self.runs() == other.runs()
  }
}

impl Eq for StyledString {}

impl fmt::Display for StyledString {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    for ch in char::decode_utf16(self.units().iter().copied()) {
      fmt::Write::write_char(f, ch.unwrap_or(char::REPLACEMENT_CHARACTER))?;
    }
    Ok(())
  }
}

impl fmt::Debug for StyledString {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let mut list = f.debug_list();
    for info in self.run_infos() {
      list.entry(&format_args!("{:?} {:?}", info.text(), info.props));
    }
    list.finish()
  }
}
