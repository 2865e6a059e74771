//! Stateless Unicode normalization primitive.
//!
//! Thin layer over `unicode-normalization` that works on character slices and
//! adds the pieces the styled normalizer needs on top of plain string
//! normalization: segment boundary detection, the FCD check and access to the
//! per-character decomposition and composition tables.
//!
//! ```
//! use the_core::normalize::{Form, normalize};
//!
//! let composed = normalize(&['e', '\u{0301}'], Form::Nfc);
//! assert_eq!(composed, vec!['\u{00E9}']);
//! ```

use std::iter;

use unicode_normalization::{
  IsNormalized,
  UnicodeNormalization,
  char::{
    canonical_combining_class,
    compose,
    decompose_canonical,
    decompose_compatible,
  },
  is_nfc_quick,
  is_nfd_quick,
  is_nfkc_quick,
  is_nfkd_quick,
};

/// Normalization forms the primitive understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Form {
  /// Canonical decomposition.
  Nfd,
  /// Compatibility decomposition.
  Nfkd,
  /// Canonical decomposition followed by canonical composition.
  Nfc,
  /// Compatibility decomposition followed by canonical composition.
  Nfkc,
  /// "Fast C or D": canonically ordered decomposition, no composition
  /// required.
  Fcd,
}

impl Form {
  #[inline]
  pub const fn composes(self) -> bool {
    matches!(self, Form::Nfc | Form::Nfkc)
  }

  #[inline]
  pub const fn is_compatibility(self) -> bool {
    matches!(self, Form::Nfkd | Form::Nfkc)
  }

  /// The decomposition form underlying `self`.
  #[inline]
  pub const fn decomposition(self) -> Form {
    if self.is_compatibility() {
      Form::Nfkd
    } else {
      Form::Nfd
    }
  }
}

#[inline]
pub fn combining_class(ch: char) -> u8 {
  canonical_combining_class(ch)
}

/// Primary composite of `base` and `mark`, honouring composition exclusions.
#[inline]
pub fn compose_pair(base: char, mark: char) -> Option<char> {
  compose(base, mark)
}

/// Appends the full decomposition of a single character. A single character
/// decomposes to a canonically ordered sequence, so the output is already in
/// the requested decomposition form.
pub fn decompose_char(ch: char, form: Form, out: &mut Vec<char>) {
  if form.is_compatibility() {
    decompose_compatible(ch, |d| out.push(d));
  } else {
    decompose_canonical(ch, |d| out.push(d));
  }
}

/// Normalizes `chars` into `form`, appending to `out`.
pub fn normalize_into(chars: &[char], form: Form, out: &mut Vec<char>) {
  let input = chars.iter().copied();
  match form {
    Form::Nfd => out.extend(input.nfd()),
    Form::Nfkd => out.extend(input.nfkd()),
    Form::Nfc => out.extend(input.nfc()),
    Form::Nfkc => out.extend(input.nfkc()),
    Form::Fcd => {
      if is_fcd(chars) {
        out.extend_from_slice(chars);
      } else {
        out.extend(input.nfd());
      }
    },
  }
}

#[must_use]
pub fn normalize(chars: &[char], form: Form) -> Vec<char> {
  let mut out = Vec::with_capacity(chars.len());
  normalize_into(chars, form, &mut out);
  out
}

#[must_use]
pub fn normalize_str(text: &str, form: Form) -> String {
  let chars: Vec<char> = text.chars().collect();
  normalize(&chars, form).into_iter().collect()
}

/// Whether `chars` is already in `form`. Uses the quick check and only falls
/// back to a full comparison when it answers "maybe".
pub fn is_normalized(chars: &[char], form: Form) -> bool {
  let input = chars.iter().copied();
  let quick = match form {
    Form::Nfd => is_nfd_quick(input),
    Form::Nfkd => is_nfkd_quick(input),
    Form::Nfc => is_nfc_quick(input),
    Form::Nfkc => is_nfkc_quick(input),
    Form::Fcd => return is_fcd(chars),
  };
  match quick {
    IsNormalized::Yes => true,
    IsNormalized::No => false,
    IsNormalized::Maybe => normalize(chars, form) == chars,
  }
}

fn lead_trail_class(ch: char) -> (u8, u8) {
  let mut first = None;
  let mut last = ch;
  decompose_canonical(ch, |d| {
    first.get_or_insert(d);
    last = d;
  });
  let first = first.unwrap_or(ch);
  (combining_class(first), combining_class(last))
}

/// Whether the canonical decomposition of `chars` is canonically ordered.
pub fn is_fcd(chars: &[char]) -> bool {
  let mut prev_trail = 0;
  for &ch in chars {
    let (lead, trail) = lead_trail_class(ch);
    if lead != 0 && prev_trail > lead {
      return false;
    }
    prev_trail = trail;
  }
  true
}

/// Whether normalizing to `form` can never make `ch` interact with anything
/// before it. Text may be cut in front of such a character and both halves
/// normalized separately.
///
/// The answer is conservative: `false` only means the boundary is not
/// guaranteed.
pub fn has_boundary_before(ch: char, form: Form) -> bool {
  match form {
    Form::Nfd | Form::Fcd => lead_trail_class(ch).0 == 0,
    Form::Nfkd => {
      let mut lead = None;
      decompose_compatible(ch, |d| {
        lead.get_or_insert(d);
      });
      combining_class(lead.unwrap_or(ch)) == 0
    },
    Form::Nfc => {
      combining_class(ch) == 0 && matches!(is_nfc_quick(iter::once(ch)), IsNormalized::Yes)
    },
    Form::Nfkc => {
      combining_class(ch) == 0 && matches!(is_nfkc_quick(iter::once(ch)), IsNormalized::Yes)
    },
  }
}
