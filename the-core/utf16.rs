//! Helpers for walking UTF-16 buffers.
//!
//! Styled strings store their text as UTF-16 code units and every offset in
//! the engine is a code unit offset. Well formed surrogate pairs decode to a
//! single scalar; unpaired surrogates are tolerated and reported as scalars
//! without a character so callers can copy them through untouched.

#[inline]
pub const fn is_high_surrogate(unit: u16) -> bool {
  matches!(unit, 0xD800..=0xDBFF)
}

#[inline]
pub const fn is_low_surrogate(unit: u16) -> bool {
  matches!(unit, 0xDC00..=0xDFFF)
}

/// One decoded position of a UTF-16 buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Scalar {
  /// Offset of the first code unit.
  pub start: usize,
  /// Offset one past the last code unit.
  pub end:   usize,
  /// The decoded character, `None` for an unpaired surrogate.
  pub ch:    Option<char>,
}

impl Scalar {
  #[inline]
  pub fn len(&self) -> usize {
    self.end - self.start
  }

  #[inline]
  pub fn is_empty(&self) -> bool {
    self.start == self.end
  }
}

/// Iterator over the [`Scalar`]s of a UTF-16 buffer.
#[derive(Debug, Clone)]
pub struct Scalars<'a> {
  units: &'a [u16],
  pos:   usize,
}

impl Iterator for Scalars<'_> {
  type Item = Scalar;

  fn next(&mut self) -> Option<Scalar> {
    let start = self.pos;
    let unit = *self.units.get(start)?;

    if is_high_surrogate(unit) {
      if let Some(&low) = self.units.get(start + 1) {
        if is_low_surrogate(low) {
          let code = 0x10000 + (((unit as u32) - 0xD800) << 10) + ((low as u32) - 0xDC00);
          self.pos = start + 2;
          return Some(Scalar {
            start,
            end: start + 2,
            ch: char::from_u32(code),
          });
        }
      }
    }

    self.pos = start + 1;
    let ch = if is_low_surrogate(unit) || is_high_surrogate(unit) {
      None
    } else {
      char::from_u32(unit as u32)
    };
    Some(Scalar {
      start,
      end: start + 1,
      ch,
    })
  }

  fn size_hint(&self) -> (usize, Option<usize>) {
    let rest = self.units.len() - self.pos;
    (rest.div_ceil(2), Some(rest))
  }
}

pub fn scalars(units: &[u16]) -> Scalars<'_> {
  Scalars { units, pos: 0 }
}

#[inline]
pub fn push_char(out: &mut Vec<u16>, ch: char) {
  let mut buf = [0u16; 2];
  out.extend_from_slice(ch.encode_utf16(&mut buf));
}

pub fn encode_str(text: &str) -> Vec<u16> {
  text.encode_utf16().collect()
}

/// Decodes `units`, replacing unpaired surrogates with U+FFFD.
pub fn to_string_lossy(units: &[u16]) -> String {
  String::from_utf16_lossy(units)
}
