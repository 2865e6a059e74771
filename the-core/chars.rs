//! Classification of the few characters the styled text engine treats
//! specially.

/// U+2028 LINE SEPARATOR, the hard line break inside a paragraph.
///
/// A run whose last character is a line separator is the only kind of run
/// allowed to omit a writing system.
pub const LINE_SEPARATOR: char = '\u{2028}';

/// U+FFFC OBJECT REPLACEMENT CHARACTER, the placeholder text of runs that
/// stand for an embedded object.
pub const OBJECT_REPLACEMENT: char = '\u{FFFC}';

#[inline]
pub const fn char_is_line_separator(ch: char) -> bool {
  ch == LINE_SEPARATOR
}

/// Same as [`char_is_line_separator`] for a single UTF-16 code unit. The line
/// separator lives in the BMP so no surrogate handling is needed.
#[inline]
pub const fn unit_is_line_separator(unit: u16) -> bool {
  unit == LINE_SEPARATOR as u16
}

#[inline]
pub const fn unit_is_object_replacement(unit: u16) -> bool {
  unit == OBJECT_REPLACEMENT as u16
}

/// Whether `units` ends in a line separator.
#[inline]
pub fn ends_with_line_separator(units: &[u16]) -> bool {
  units.last().is_some_and(|&unit| unit_is_line_separator(unit))
}
