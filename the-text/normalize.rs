//! Unicode normalization that keeps formatting attached to the right
//! characters.
//!
//! Text is processed one segment at a time, a segment being a stretch the
//! normalizer can treat independently of its surroundings. A segment inside
//! a single run is handed to the plain normalization primitive and tagged with
//! that run's properties. A segment spanning runs is rebuilt character by
//! character: every input character is decomposed on its own, its pieces keep
//! their owner's properties through canonical reordering, and composition
//! forms then recompose the tagged sequence.
//!
//! [`NormalizationForm::Nfsc`] is NFC except that composition never joins
//! characters that are styled differently. Which differences count is decided
//! by [`NormalizeOptions`].

use std::{
  iter,
  ops::Range,
  time::Instant,
};

use the_core::{
  chars::char_is_line_separator,
  normalize::{
    self as unicode,
    Form,
    combining_class,
    compose_pair,
    decompose_char,
    has_boundary_before,
  },
  utf16,
};

use crate::{
  StyledString,
  config::NormalizeOptions,
  error::{
    Result,
    TextError,
  },
  props::PropertySet,
  runs::{
    Run,
    RunSource,
  },
  string::NormForms,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NormalizationForm {
  Nfd,
  Nfkd,
  Nfc,
  Nfkc,
  Fcd,
  /// Styled composition: NFC without composing across style changes.
  Nfsc,
}

impl NormalizationForm {
  pub const ALL: [NormalizationForm; 6] = [
    NormalizationForm::Nfd,
    NormalizationForm::Nfkd,
    NormalizationForm::Nfc,
    NormalizationForm::Nfkc,
    NormalizationForm::Fcd,
    NormalizationForm::Nfsc,
  ];

  pub const fn flag(self) -> NormForms {
    match self {
      NormalizationForm::Nfd => NormForms::NFD,
      NormalizationForm::Nfkd => NormForms::NFKD,
      NormalizationForm::Nfc => NormForms::NFC,
      NormalizationForm::Nfkc => NormForms::NFKC,
      NormalizationForm::Fcd => NormForms::FCD,
      NormalizationForm::Nfsc => NormForms::NFSC,
    }
  }

  /// Every form a string is in once it is in `self`.
  pub const fn implied(self) -> NormForms {
    match self {
      NormalizationForm::Nfd => NormForms::NFD.union(NormForms::FCD),
      NormalizationForm::Nfkd => NormForms::NFKD.union(NormForms::NFD).union(NormForms::FCD),
      NormalizationForm::Nfc => NormForms::NFC.union(NormForms::NFSC),
      NormalizationForm::Nfkc => NormForms::NFKC.union(NormForms::NFC).union(NormForms::NFSC),
      NormalizationForm::Fcd => NormForms::FCD,
      NormalizationForm::Nfsc => NormForms::NFSC,
    }
  }

  /// The primitive form used on segments that lie inside one run.
  const fn primitive(self) -> Form {
    match self {
      NormalizationForm::Nfd => Form::Nfd,
      NormalizationForm::Nfkd => Form::Nfkd,
      NormalizationForm::Nfc | NormalizationForm::Nfsc => Form::Nfc,
      NormalizationForm::Nfkc => Form::Nfkc,
      NormalizationForm::Fcd => Form::Fcd,
    }
  }

  const fn composes(self) -> bool {
    matches!(
      self,
      NormalizationForm::Nfc | NormalizationForm::Nfkc | NormalizationForm::Nfsc
    )
  }
}

/// One decoded character of the input together with the run it came from.
#[derive(Debug, Clone, Copy)]
struct Item {
  ch:    Option<char>,
  start: usize,
  end:   usize,
  irun:  usize,
}

/// Where one input segment ended up in the output, in code units.
#[derive(Debug, Clone)]
struct SegmentMap {
  input:  Range<usize>,
  output: Range<usize>,
}

type Tagged = (char, PropertySet);

impl StyledString {
  /// Returns this string in `form`.
  ///
  /// When the string is already known to be in `form`, or turns out to be,
  /// the same instance is returned.
  pub fn normalize(&self, form: NormalizationForm) -> StyledString {
    self.normalize_with(form, &NormalizeOptions::default())
  }

  pub fn normalize_with(&self, form: NormalizationForm, options: &NormalizeOptions) -> StyledString {
    self.normalize_tracking(form, options, &mut [])
  }

  /// [`normalize`](Self::normalize) that also moves `offsets` from this
  /// string into the result. An offset inside a segment that normalization
  /// rewrote lands at the end of that segment's output.
  pub fn normalize_with_offsets(
    &self,
    form: NormalizationForm,
    offsets: &mut [usize],
  ) -> Result<StyledString> {
    for &offset in offsets.iter() {
      TextError::check_offset(offset, self.len())?;
    }
    Ok(self.normalize_tracking(form, &NormalizeOptions::default(), offsets))
  }

  pub fn is_normalized(&self, form: NormalizationForm) -> bool {
    self.known_forms().contains(form.flag()) || StyledString::ptr_eq(&self.normalize(form), self)
  }

  fn normalize_tracking(
    &self,
    form: NormalizationForm,
    options: &NormalizeOptions,
    offsets: &mut [usize],
  ) -> StyledString {
    // the NFSC bit only describes the default options; NFC text is NFSC
    // whatever the options
    let styled_default = form != NormalizationForm::Nfsc || options.is_default();
    let known = self.known_forms();
    let already = if styled_default {
      known.contains(form.flag())
    } else {
      known.contains(NormForms::NFC)
    };
    if already {
      if !offsets.is_empty() {
        let items = decode(self);
        let maps: Vec<_> = segments(&items, form)
          .map(|segment| {
            let input = items[segment.start].start..items[segment.end - 1].end;
            SegmentMap {
              output: input.clone(),
              input,
            }
          })
          .collect();
        remap(offsets, &maps, self.len());
      }
      return self.clone();
    }
    if self.is_empty() {
      if styled_default {
        self.mark_normalized(form.implied());
      }
      return self.clone();
    }

    let items = decode(self);
    let start = tracing::enabled!(tracing::Level::DEBUG).then(Instant::now);
    let mut pass = Pass {
      form,
      options,
      units: self.units(),
      runs: self.runs(),
      out: Output::with_capacity(self.len()),
      maps: Vec::new(),
      chars: Vec::new(),
      scratch: Vec::new(),
      tagged: Vec::new(),
    };
    for segment in segments(&items, form) {
      pass.segment(&items[segment]);
    }
    let Pass { out, maps, .. } = pass;
    remap(offsets, &maps, out.units.len());

    let unchanged = out.units == self.units() && out.runs == self.runs();
    let result = if unchanged {
      self.clone()
    } else {
      StyledString::from_parts(out.units, out.runs)
    };
    if styled_default {
      result.mark_normalized(form.implied());
    }

    if let Some(start) = start {
      tracing::debug!(
        ?form,
        len = self.len(),
        unchanged,
        "normalization took {}s",
        Instant::now().duration_since(start).as_secs_f64()
      );
    }
    result
  }
}

/// Decodes every run separately, so a surrogate pair split by a run boundary
/// stays two unpaired surrogates with their own properties.
fn decode(s: &StyledString) -> Vec<Item> {
  let units = s.units();
  let mut items = Vec::with_capacity(units.len());
  let mut min = 0;
  for (irun, run) in s.runs().iter().enumerate() {
    items.extend(utf16::scalars(&units[min..run.lim]).map(|scalar| {
      Item {
        ch: scalar.ch,
        start: scalar.start + min,
        end: scalar.end + min,
        irun,
      }
    }));
    min = run.lim;
  }
  items
}

/// Splits `items` into independently normalizable ranges. Unpaired
/// surrogates always stand alone.
fn segments(items: &[Item], form: NormalizationForm) -> impl Iterator<Item = Range<usize>> + '_ {
  let boundary = match form {
    NormalizationForm::Nfsc => Form::Nfc,
    form => form.primitive(),
  };
  let mut min = 0;
  iter::from_fn(move || {
    if min >= items.len() {
      return None;
    }
    let mut lim = min + 1;
    if items[min].ch.is_some() {
      while lim < items.len()
        && items[lim]
          .ch
          .is_some_and(|ch| !has_boundary_before(ch, boundary))
      {
        lim += 1;
      }
    }
    let segment = min..lim;
    min = lim;
    Some(segment)
  })
}

fn remap(offsets: &mut [usize], maps: &[SegmentMap], out_len: usize) {
  for offset in offsets {
    let imap = maps.partition_point(|map| map.input.end <= *offset);
    *offset = match maps.get(imap) {
      Some(map) if map.input.start == *offset => map.output.start,
      Some(map) => map.output.end,
      None => out_len,
    };
  }
}

#[derive(Debug, Default)]
struct Output {
  units: Vec<u16>,
  runs:  Vec<Run>,
}

impl Output {
  fn with_capacity(len: usize) -> Self {
    Self {
      units: Vec::with_capacity(len),
      runs:  Vec::new(),
    }
  }

  fn push(&mut self, ch: char, props: &PropertySet) {
    utf16::push_char(&mut self.units, ch);
    self.extend_run(props);
  }

  fn push_unit(&mut self, unit: u16, props: &PropertySet) {
    self.units.push(unit);
    self.extend_run(props);
  }

  fn extend_run(&mut self, props: &PropertySet) {
    let lim = self.units.len();
    match self.runs.last_mut() {
      Some(last) if last.props == *props => last.lim = lim,
      _ => self.runs.push(Run::new(lim, props.clone())),
    }
  }
}

struct Pass<'a> {
  form:    NormalizationForm,
  options: &'a NormalizeOptions,
  units:   &'a [u16],
  runs:    &'a [Run],
  out:     Output,
  maps:    Vec<SegmentMap>,
  chars:   Vec<char>,
  scratch: Vec<char>,
  tagged:  Vec<Tagged>,
}

impl Pass<'_> {
  fn segment(&mut self, items: &[Item]) {
    let first = items[0];
    let input = first.start..items[items.len() - 1].end;
    let out_start = self.out.units.len();

    if first.ch.is_none() {
      for &unit in &self.units[input.clone()] {
        self.out.push_unit(unit, &self.runs[first.irun].props);
      }
    } else {
      self.chars.clear();
      self.chars.extend(items.iter().filter_map(|item| item.ch));
      if items.iter().all(|item| item.irun == first.irun) {
        let props = &self.runs[first.irun].props;
        self.scratch.clear();
        unicode::normalize_into(&self.chars, self.form.primitive(), &mut self.scratch);
        for &ch in &self.scratch {
          self.out.push(ch, props);
        }
      } else {
        tracing::trace!(
          start = input.start,
          end = input.end,
          "segment spans runs, assigning ownership per character"
        );
        self.mixed(items);
      }
    }

    self.maps.push(SegmentMap {
      input,
      output: out_start..self.out.units.len(),
    });
  }

  fn mixed(&mut self, items: &[Item]) {
    if self.form == NormalizationForm::Fcd && unicode::is_fcd(&self.chars) {
      for (item, &ch) in items.iter().zip(&self.chars) {
        self.out.push(ch, &self.runs[item.irun].props);
      }
      return;
    }

    let decomposition = self.form.primitive().decomposition();
    self.tagged.clear();
    for (item, &ch) in items.iter().zip(&self.chars) {
      self.scratch.clear();
      decompose_char(ch, decomposition, &mut self.scratch);
      let props = &self.runs[item.irun].props;
      self
        .tagged
        .extend(self.scratch.iter().map(|&piece| (piece, props.clone())));
    }
    reorder(&mut self.tagged);
    restore_writing_systems(&mut self.tagged);
    if self.form.composes() {
      let styled = (self.form == NormalizationForm::Nfsc).then_some(self.options);
      compose(&mut self.tagged, styled);
    }
    for (ch, props) in &self.tagged {
      self.out.push(*ch, props);
    }
  }
}

/// Canonical ordering. The sort is stable so marks of equal class keep their
/// order and their owners.
fn reorder(seq: &mut [Tagged]) {
  let mut i = 0;
  while i < seq.len() {
    if combining_class(seq[i].0) == 0 {
      i += 1;
      continue;
    }
    let start = i;
    while i < seq.len() && combining_class(seq[i].0) != 0 {
      i += 1;
    }
    seq[start..i].sort_by_key(|(ch, _)| combining_class(*ch));
  }
}

/// Reordering can pull marks owned by a run without a writing system away
/// from the line separator that ends that run. Only the last block of a
/// segment still runs on into its separator, so pieces of any earlier block
/// past its last separator take the properties of the nearest piece with a
/// writing system, preferring one before them.
fn restore_writing_systems(seq: &mut [Tagged]) {
  let mut start = 0;
  while start < seq.len() {
    let mut end = start + 1;
    while end < seq.len() && seq[end].1 == seq[start].1 {
      end += 1;
    }
    if end < seq.len() && seq[start].1.writing_system().is_none() {
      let keep = seq[start..end]
        .iter()
        .rposition(|(ch, _)| char_is_line_separator(*ch))
        .map_or(start, |i| start + i + 1);
      if keep < end {
        let donor = seq[..start]
          .iter()
          .rev()
          .chain(&seq[end..])
          .find(|(_, props)| props.writing_system().is_some())
          .map(|(_, props)| props.clone());
        if let Some(donor) = donor {
          tracing::trace!(pieces = end - keep, "restyling marks moved off their line separator");
          for piece in &mut seq[keep..end] {
            piece.1 = donor.clone();
          }
        }
      }
    }
    start = end;
  }
}

/// Canonical composition over a decomposed, ordered sequence.
///
/// With `styled` set, a character only composes with its starter when
/// [`NormalizeOptions::merge_props`] accepts the pair. A refused character
/// stays in place and blocks later ones exactly like any other uncomposed
/// character would, so NFC text comes out of styled composition unchanged.
fn compose(seq: &mut Vec<Tagged>, styled: Option<&NormalizeOptions>) {
  let mut out: Vec<Tagged> = Vec::with_capacity(seq.len());
  let mut starter: Option<usize> = None;
  // class of the last character kept after the starter
  let mut last_class: Option<u8> = None;

  for (ch, props) in seq.drain(..) {
    let class = combining_class(ch);
    if let Some(istarter) = starter {
      let blocked = last_class.is_some_and(|last| last == 0 || last >= class);
      if !blocked {
        if let Some(composite) = compose_pair(out[istarter].0, ch) {
          let merged = match styled {
            Some(options) => options.merge_props(&out[istarter].1, &props),
            None => Some(out[istarter].1.clone()),
          };
          if let Some(merged) = merged {
            out[istarter] = (composite, merged);
            continue;
          }
        }
      }
    }

    if class == 0 {
      starter = Some(out.len());
      last_class = None;
    } else {
      last_class = Some(class);
    }
    out.push((ch, props));
  }
  *seq = out;
}

#[cfg(test)]
mod test {
  use quickcheck::{
    Arbitrary,
    Gen,
  };

  use super::*;
  use crate::{
    IncrementalBuilder,
    config::StringMerge,
    props::{
      IntValue,
      PropertySetBuilder,
      int_prop,
      str_prop,
    },
  };

  fn p(ws: i32) -> PropertySet {
    PropertySet::with_ws(ws)
  }

  fn styled(pieces: &[(&str, &PropertySet)]) -> StyledString {
    let mut builder = IncrementalBuilder::new();
    for (text, props) in pieces {
      builder.set_props(props);
      builder.append(text).unwrap();
    }
    builder.build().unwrap()
  }

  fn shape(s: &StyledString) -> Vec<(String, PropertySet)> {
    s.run_infos()
      .map(|info| (info.text(), info.props.clone()))
      .collect()
  }

  #[test]
  fn composition_keeps_the_base_style() {
    let s = styled(&[("e\u{0301}", &p(1)), ("x", &p(2))]);
    let nfc = s.normalize(NormalizationForm::Nfc);
    assert_eq!(shape(&nfc), vec![
      ("\u{00E9}".to_string(), p(1)),
      ("x".to_string(), p(2)),
    ]);
  }

  #[test]
  fn mixed_styles_compose_under_nfc_but_not_nfsc() {
    let s = styled(&[("e", &p(1)), ("\u{0301}", &p(2))]);

    let nfc = s.normalize(NormalizationForm::Nfc);
    assert_eq!(shape(&nfc), vec![("\u{00E9}".to_string(), p(1))]);

    let nfsc = s.normalize(NormalizationForm::Nfsc);
    assert!(StyledString::ptr_eq(&nfsc, &s));
    assert!(nfsc.known_forms().contains(NormForms::NFSC));
  }

  #[test]
  fn nfsc_skips_differently_styled_marks() {
    let s = styled(&[("\u{00E9}", &p(1)), ("\u{0301}", &p(2))]);
    let nfsc = s.normalize(NormalizationForm::Nfsc);
    assert_eq!(nfsc.text(), "\u{00E9}\u{0301}");
    assert_eq!(nfsc.run_count(), 2);

    // the dot below stays apart, the circumflex still reaches the base
    let s = styled(&[("a", &p(1)), ("\u{0323}", &p(2)), ("\u{0302}", &p(1))]);
    let nfsc = s.normalize(NormalizationForm::Nfsc);
    assert_eq!(shape(&nfsc), vec![
      ("\u{00E2}".to_string(), p(1)),
      ("\u{0323}".to_string(), p(2)),
    ]);
    let nfc = s.normalize(NormalizationForm::Nfc);
    assert_eq!(nfc.text(), "\u{1EAD}");
    assert_eq!(nfc.props_at(0).unwrap(), &p(1));
  }

  #[test]
  fn nfc_text_is_already_nfsc() {
    // the cedilla sorts before the dot below and composes with nothing
    let s = styled(&[("\u{1EA1}", &p(1)), ("\u{0327}", &p(2))]);
    assert!(StyledString::ptr_eq(&s.normalize(NormalizationForm::Nfc), &s));
    let cached = s.normalize(NormalizationForm::Nfsc);
    assert!(StyledString::ptr_eq(&cached, &s));

    let computed = fresh(&s).normalize(NormalizationForm::Nfsc);
    assert_eq!(computed, cached);
    assert_eq!(shape(&computed), vec![
      ("\u{1EA1}".to_string(), p(1)),
      ("\u{0327}".to_string(), p(2)),
    ]);
  }

  #[test]
  fn reordered_marks_leave_line_break_runs_valid() {
    let s = StyledString::from_runs(vec![0x0301u16, 0x0323, 0x2028], vec![
      Run::new(1, p(1)),
      Run::new(3, PropertySet::empty()),
    ])
    .unwrap();
    for form in NormalizationForm::ALL {
      let out = s.normalize(form);
      assert!(out.check_invariants().is_ok(), "{form:?}");
      assert_eq!(
        shape(&out),
        vec![
          ("\u{0323}\u{0301}".to_string(), p(1)),
          ("\u{2028}".to_string(), PropertySet::empty()),
        ],
        "{form:?}"
      );
    }

    // restyled marks compose like any other mark of their new style
    let s = styled(&[("a\u{0301}\u{0300}", &p(1)), ("\u{0323}\u{2028}", &PropertySet::empty())]);
    let nfsc = s.normalize(NormalizationForm::Nfsc);
    assert_eq!(shape(&nfsc), vec![
      ("\u{1EA1}\u{0301}\u{0300}".to_string(), p(1)),
      ("\u{2028}".to_string(), PropertySet::empty()),
    ]);
    assert_eq!(fresh(&nfsc).normalize(NormalizationForm::Nfsc), nfsc);
    assert_eq!(s.normalize(NormalizationForm::Nfc), nfsc);
  }

  #[test]
  fn nfsc_merges_font_variations() {
    let base = PropertySetBuilder::new()
      .with_int(int_prop::WS, IntValue::new(1))
      .with_str(str_prop::FONT_VARIATIONS, "wght=700")
      .build();
    let mark = base.with_str(str_prop::FONT_VARIATIONS, Some("ital=1"));
    let s = styled(&[("e", &base), ("\u{0301}", &mark)]);

    let nfsc = s.normalize(NormalizationForm::Nfsc);
    assert_eq!(nfsc.text(), "\u{00E9}");
    assert_eq!(
      nfsc.props_at(0).unwrap().str_prop(str_prop::FONT_VARIATIONS),
      Some("wght=700,ital=1")
    );

    let never = NormalizeOptions {
      string_merge: StringMerge::Never,
      ..NormalizeOptions::default()
    };
    let strict = s.normalize_with(NormalizationForm::Nfsc, &never);
    assert_eq!(strict.text(), "e\u{0301}");
    // non-default options leave the cache alone
    assert!(!strict.known_forms().contains(NormForms::NFSC));
  }

  #[test]
  fn reordering_carries_styles() {
    let s = styled(&[("a", &p(1)), ("\u{0301}", &p(2)), ("\u{0323}", &p(3))]);
    let nfd = s.normalize(NormalizationForm::Nfd);
    assert_eq!(shape(&nfd), vec![
      ("a".to_string(), p(1)),
      ("\u{0323}".to_string(), p(3)),
      ("\u{0301}".to_string(), p(2)),
    ]);
  }

  #[test]
  fn hangul_jamo_follow_their_style() {
    let s = styled(&[("\u{1100}", &p(1)), ("\u{1161}", &p(2))]);
    let nfc = s.normalize(NormalizationForm::Nfc);
    assert_eq!(shape(&nfc), vec![("\u{AC00}".to_string(), p(1))]);
    assert_eq!(s.normalize(NormalizationForm::Nfsc).text(), "\u{1100}\u{1161}");

    let syllable = styled(&[("\u{AC01}", &p(1))]);
    assert_eq!(syllable.normalize(NormalizationForm::Nfd).text(), "\u{1100}\u{1161}\u{11A8}");
  }

  #[test]
  fn cache_short_circuits() {
    let s = styled(&[("\u{FB01}e\u{0301}", &p(1))]);
    let nfkd = s.normalize(NormalizationForm::Nfkd);
    assert_eq!(nfkd.text(), "fie\u{0301}");
    assert!(
      nfkd
        .known_forms()
        .contains(NormForms::NFKD | NormForms::NFD | NormForms::FCD)
    );
    assert!(StyledString::ptr_eq(&nfkd.normalize(NormalizationForm::Nfd), &nfkd));
    assert!(StyledString::ptr_eq(&nfkd.normalize(NormalizationForm::Nfkd), &nfkd));

    let nfkc = s.normalize(NormalizationForm::Nfkc);
    assert_eq!(nfkc.text(), "fi\u{00E9}");
    assert!(StyledString::ptr_eq(&nfkc.normalize(NormalizationForm::Nfc), &nfkc));
    assert!(StyledString::ptr_eq(&nfkc.normalize(NormalizationForm::Nfsc), &nfkc));
  }

  #[test]
  fn normalized_input_is_returned_as_is() {
    let s = styled(&[("plain ", &p(1)), ("text", &p(2))]);
    for form in NormalizationForm::ALL {
      assert!(StyledString::ptr_eq(&s.normalize(form), &s), "{form:?}");
    }
    assert_eq!(s.known_forms(), NormForms::all());
    assert!(s.is_normalized(NormalizationForm::Nfkc));
  }

  #[test]
  fn fcd_only_touches_misordered_segments() {
    let misordered = styled(&[("\u{00E9}", &p(1)), ("\u{0323}", &p(2))]);
    // é decomposes to e + acute (230) and the dot below (220) would sort first
    assert!(!misordered.is_normalized(NormalizationForm::Fcd));
    let fcd = misordered.normalize(NormalizationForm::Fcd);
    assert_eq!(shape(&fcd), vec![
      ("e".to_string(), p(1)),
      ("\u{0323}".to_string(), p(2)),
      ("\u{0301}".to_string(), p(1)),
    ]);

    let fine = styled(&[("\u{00E9}", &p(1)), ("x", &p(2))]);
    assert!(StyledString::ptr_eq(&fine.normalize(NormalizationForm::Fcd), &fine));
  }

  #[test]
  fn unpaired_surrogates_pass_through() {
    let s = StyledString::from_units(vec![0xD800, 'e' as u16, 0x0301, 0xDC00], p(1)).unwrap();
    let nfc = s.normalize(NormalizationForm::Nfc);
    assert_eq!(nfc.units(), &[0xD800, 0x00E9, 0xDC00]);
    assert!(nfc.check_invariants().is_ok());
  }

  #[test]
  fn offsets_move_with_the_text() {
    let s = styled(&[("ae\u{0301}b", &p(1))]);
    let mut offsets = [0, 1, 2, 3, 4];
    let nfc = s
      .normalize_with_offsets(NormalizationForm::Nfc, &mut offsets)
      .unwrap();
    assert_eq!(nfc.text(), "a\u{00E9}b");
    assert_eq!(offsets, [0, 1, 2, 2, 3]);

    assert_eq!(
      s.normalize_with_offsets(NormalizationForm::Nfc, &mut [5]),
      Err(TextError::OffsetOutOfBounds { offset: 5, len: 4 })
    );
  }

  #[test]
  fn offsets_snap_on_cached_strings() {
    let s = styled(&[("e\u{0301}", &p(1))]);
    let nfd = s.normalize(NormalizationForm::Nfd);
    assert!(StyledString::ptr_eq(&nfd, &s));
    let mut offsets = [0, 1, 2];
    let again = s
      .normalize_with_offsets(NormalizationForm::Nfd, &mut offsets)
      .unwrap();
    assert!(StyledString::ptr_eq(&again, &s));
    assert_eq!(offsets, [0, 2, 2]);
  }

  const ALPHABET: &[char] = &[
    'a', 'e', 'o', 'A', 'x', '\u{0300}', '\u{0301}', '\u{0302}', '\u{0308}', '\u{0323}',
    '\u{0327}', '\u{00E9}', '\u{1EA1}', '\u{1100}', '\u{1161}', '\u{11A8}', '\u{AC00}',
    '\u{FB01}', '\u{212B}', '\u{2028}',
  ];

  /// Plain writing systems, font variations that styled composition may
  /// merge, and an empty set that is only valid on line break runs.
  fn sample_style(pick: u8) -> PropertySet {
    match pick % 6 {
      pick @ 0..=2 => p(i32::from(pick)),
      3 => p(1).with_str(str_prop::FONT_VARIATIONS, Some("wght=700")),
      4 => p(1).with_str(str_prop::FONT_VARIATIONS, Some("ital=1")),
      _ => PropertySet::empty(),
    }
  }

  #[derive(Debug, Clone)]
  struct Sample(StyledString);

  impl Arbitrary for Sample {
    fn arbitrary(g: &mut Gen) -> Self {
      let picks: Vec<(u8, u8)> = Arbitrary::arbitrary(g);
      let mut builder = IncrementalBuilder::new();
      for (ch, style) in picks {
        let ch = ALPHABET[usize::from(ch) % ALPHABET.len()];
        let props = sample_style(style);
        builder.set_props(&props);
        if props.writing_system().is_some() {
          builder.append(ch.encode_utf8(&mut [0; 4])).unwrap();
        } else {
          builder.append(&format!("{ch}\u{2028}")).unwrap();
        }
      }
      builder.set_props(&p(0));
      Sample(builder.build().unwrap())
    }
  }

  fn fresh(s: &StyledString) -> StyledString {
    StyledString::from_runs(s.units().to_vec(), s.runs().to_vec()).unwrap()
  }

  quickcheck::quickcheck! {
    fn text_matches_the_primitive(sample: Sample) -> bool {
      let s = sample.0;
      [
        NormalizationForm::Nfd,
        NormalizationForm::Nfkd,
        NormalizationForm::Nfc,
        NormalizationForm::Nfkc,
      ]
      .into_iter()
      .all(|form| {
        let out = s.normalize(form);
        out.check_invariants().is_ok()
          && out.text() == unicode::normalize_str(&s.text(), form.primitive())
      })
    }

    // FCD leaves well ordered segments alone, so only equivalence is fixed
    fn fcd_is_canonically_equivalent(sample: Sample) -> bool {
      let s = sample.0;
      let out = s.normalize(NormalizationForm::Fcd);
      let chars: Vec<char> = out.text().chars().collect();
      out.check_invariants().is_ok()
        && unicode::is_fcd(&chars)
        && unicode::normalize_str(&out.text(), Form::Nfd) == unicode::normalize_str(&s.text(), Form::Nfd)
    }

    fn cached_forms_match_recomputed_ones(sample: Sample) -> bool {
      NormalizationForm::ALL.into_iter().all(|done| {
        let once = sample.0.normalize(done);
        NormalizationForm::ALL
          .into_iter()
          .filter(|form| done.implied().contains(form.flag()))
          .all(|form| {
            let cached = once.normalize(form);
            StyledString::ptr_eq(&cached, &once) && fresh(&once).normalize(form) == cached
          })
      })
    }

    fn normalization_is_idempotent(sample: Sample) -> bool {
      NormalizationForm::ALL.into_iter().all(|form| {
        let once = sample.0.normalize(form);
        let twice = fresh(&once).normalize(form);
        once.check_invariants().is_ok() && twice == once
      })
    }

    fn offsets_stay_ordered(sample: Sample) -> bool {
      let s = sample.0;
      let mut offsets: Vec<usize> = (0..=s.len()).collect();
      let out = s
        .normalize_with_offsets(NormalizationForm::Nfc, &mut offsets)
        .unwrap();
      offsets.windows(2).all(|pair| pair[0] <= pair[1]) && offsets.last() == Some(&out.len())
    }
  }
}
