//! Append only construction of styled text.

use the_core::utf16;

use crate::{
  StyledString,
  error::Result,
  props::{
    IntValue,
    PropId,
    PropertySet,
    PropertySetBuilder,
  },
  runs::{
    Run,
    RunSource,
    check_run_props,
  },
};

/// Builds a [`StyledString`] front to back.
///
/// The builder keeps a pen: the properties given to whatever is appended
/// next. Changing the pen never touches text that is already in place.
#[derive(Debug, Clone, Default)]
pub struct IncrementalBuilder {
  units:   Vec<u16>,
  /// Empty until the first non-empty append.
  runs:    Vec<Run>,
  pen:     PropertySetBuilder,
  current: Option<PropertySet>,
}

impl IncrementalBuilder {
  pub fn new() -> Self {
    Self::default()
  }

  /// A builder whose pen starts out as `props`.
  pub fn with_props(props: PropertySet) -> Self {
    Self {
      pen: PropertySetBuilder::from(&props),
      current: Some(props),
      ..Self::default()
    }
  }

  pub fn len(&self) -> usize {
    self.units.len()
  }

  pub fn is_empty(&self) -> bool {
    self.units.is_empty()
  }

  pub fn run_count(&self) -> usize {
    self.runs.len()
  }

  /// The properties the pen currently writes with.
  pub fn props(&mut self) -> PropertySet {
    self.pen_props().clone()
  }

  /// Replaces the pen as a whole.
  pub fn set_props(&mut self, props: &PropertySet) {
    self.pen = PropertySetBuilder::from(props);
    self.current = Some(props.clone());
  }

  pub fn set_int_prop(&mut self, id: PropId, value: Option<IntValue>) {
    self.pen.update_int(id, value);
    self.current = None;
  }

  pub fn set_str_prop(&mut self, id: PropId, value: Option<&str>) {
    self.pen.update_str(id, value);
    self.current = None;
  }

  /// Empties the pen. Text appended afterwards needs a writing system set
  /// again unless it ends with a line separator.
  pub fn clear_props(&mut self) {
    self.pen.clear();
    self.current = None;
  }

  /// Appends `text` with the pen's properties.
  pub fn append(&mut self, text: &str) -> Result<()> {
    self.append_units(&utf16::encode_str(text))
  }

  pub fn append_units(&mut self, units: &[u16]) -> Result<()> {
    if units.is_empty() {
      return Ok(());
    }
    let props = self.pen_props().clone();
    // the run that ends up holding `units` ends with them too, merged or not
    check_run_props(units, 0..units.len(), &props)?;
    self.push_run(units, &props);
    Ok(())
  }

  /// Appends another string with its own formatting. The pen is left alone.
  pub fn append_styled(&mut self, src: &StyledString) {
    if src.is_empty() {
      return;
    }
    let mut min = 0;
    for run in src.runs() {
      self.push_run(&src.units()[min..run.lim], &run.props);
      min = run.lim;
    }
  }

  /// Appends anything exposing runs. Unlike [`append_styled`](Self::append_styled)
  /// the source's runs are not trusted and are checked first.
  pub fn append_source(&mut self, src: &dyn RunSource) -> Result<()> {
    if src.is_empty() {
      return Ok(());
    }
    src.check_invariants()?;
    for info in src.run_infos() {
      self.push_run(info.units, info.props);
    }
    Ok(())
  }

  /// Drops all text. The pen is kept.
  pub fn clear(&mut self) {
    self.units.clear();
    self.runs.clear();
  }

  /// Freezes what has been appended so far.
  ///
  /// An empty builder produces an empty string carrying the pen's
  /// properties, which then need a writing system.
  pub fn build(&self) -> Result<StyledString> {
    if self.units.is_empty() {
      let props = self.current.clone().unwrap_or_else(|| self.pen.build());
      return StyledString::empty(props);
    }
    Ok(StyledString::from_parts(self.units.clone(), self.runs.clone()))
  }

  fn pen_props(&mut self) -> &PropertySet {
    let pen = &self.pen;
    self.current.get_or_insert_with(|| pen.build())
  }

  fn push_run(&mut self, units: &[u16], props: &PropertySet) {
    self.units.extend_from_slice(units);
    let lim = self.units.len();
    match self.runs.last_mut() {
      Some(last) if last.props == *props => last.lim = lim,
      _ => self.runs.push(Run::new(lim, props.clone())),
    }
  }
}
