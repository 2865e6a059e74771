//! Compact binary form of a run table.
//!
//! All integers are little endian.
//!
//! ```text
//! format   = i32 run_count
//!            run_count × (i32 ich_min, i32 blob_offset)
//!            blob*
//! blob     = varint int_count, varint str_count,
//!            int_count × (varint id, u8 variant, zigzag varint value),
//!            str_count × (varint id, varint byte_len, utf-8 bytes)
//! ```
//!
//! Blob offsets count from the first byte after the run table. Runs with
//! equal property sets point at the same blob, and blobs are stored once
//! each, in the order runs first use them. Property ids inside a blob are
//! strictly increasing.
//!
//! [`serialize`] frames a whole string: `i32 unit_count`, the UTF-16 code
//! units, then the format.
//!
//! Decoding is strict: blobs must follow each other without gaps in first use
//! order, nothing may trail the last blob, and the decoded run table has to
//! pass the same validation as any other string.

use foldhash::fast::RandomState;
use hashbrown::HashMap;

use crate::{
  StyledString,
  config::CodecLimits,
  error::{
    Result,
    TextError,
  },
  props::{
    IntValue,
    PropVariant,
    PropertySet,
    PropertySetBuilder,
  },
  runs::{
    Run,
    RunSource,
    run_min,
  },
};

/// Outcome of [`encode_format`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoded {
  /// The format was written to the start of the buffer.
  Complete { written: usize },
  /// The buffer is too small and was left untouched.
  Truncated { required: usize },
}

const RUN_ENTRY: usize = 8;

fn to_i32(value: usize, what: &'static str) -> Result<i32> {
  i32::try_from(value).map_err(|_| TextError::TooLarge { what })
}

fn put_varint(out: &mut Vec<u8>, mut value: u64) {
  while value >= 0x80 {
    out.push((value as u8) | 0x80);
    value >>= 7;
  }
  out.push(value as u8);
}

#[inline]
fn zigzag(value: i32) -> u32 {
  ((value << 1) ^ (value >> 31)) as u32
}

#[inline]
fn unzigzag(value: u32) -> i32 {
  ((value >> 1) as i32) ^ -((value & 1) as i32)
}

fn put_blob(out: &mut Vec<u8>, props: &PropertySet) {
  put_varint(out, props.int_props().len() as u64);
  put_varint(out, props.str_props().len() as u64);
  for prop in props.int_props() {
    put_varint(out, u64::from(prop.id));
    out.push(prop.value.variant.to_byte());
    put_varint(out, u64::from(zigzag(prop.value.value)));
  }
  for prop in props.str_props() {
    put_varint(out, u64::from(prop.id));
    put_varint(out, prop.value.len() as u64);
    out.extend_from_slice(prop.value.as_bytes());
  }
}

/// Run table entries and the blob area, ready to be written.
struct Layout {
  entries: Vec<(i32, i32)>,
  blobs:   Vec<u8>,
}

impl Layout {
  fn new(s: &StyledString) -> Result<Self> {
    let runs = s.runs();
    let mut seen: HashMap<&PropertySet, i32, RandomState> = HashMap::default();
    let mut entries = Vec::with_capacity(runs.len());
    let mut blobs = Vec::new();
    for (irun, run) in runs.iter().enumerate() {
      let offset = match seen.get(&run.props) {
        Some(&offset) => offset,
        None => {
          let offset = to_i32(blobs.len(), "property data")?;
          put_blob(&mut blobs, &run.props);
          seen.insert(&run.props, offset);
          offset
        },
      };
      entries.push((to_i32(run_min(runs, irun), "run offset")?, offset));
    }
    to_i32(4 + entries.len() * RUN_ENTRY + blobs.len(), "formatting data")?;
    Ok(Self { entries, blobs })
  }

  fn len(&self) -> usize {
    4 + self.entries.len() * RUN_ENTRY + self.blobs.len()
  }

  fn write(&self, out: &mut Vec<u8>) {
    out.reserve(self.len());
    out.extend_from_slice(&(self.entries.len() as i32).to_le_bytes());
    for (min, offset) in &self.entries {
      out.extend_from_slice(&min.to_le_bytes());
      out.extend_from_slice(&offset.to_le_bytes());
    }
    out.extend_from_slice(&self.blobs);
  }
}

/// Measures or writes the format of `s`.
///
/// When `dst` is large enough the format is written to its start. Otherwise
/// nothing is written and the exact size needed is reported, so callers can
/// retry with a bigger buffer.
pub fn encode_format(s: &StyledString, dst: &mut [u8]) -> Result<Encoded> {
  let layout = Layout::new(s)?;
  let required = layout.len();
  if required > dst.len() {
    return Ok(Encoded::Truncated { required });
  }
  let mut bytes = Vec::with_capacity(required);
  layout.write(&mut bytes);
  dst[..required].copy_from_slice(&bytes);
  Ok(Encoded::Complete { written: required })
}

pub fn format_bytes(s: &StyledString) -> Result<Vec<u8>> {
  let layout = Layout::new(s)?;
  let mut bytes = Vec::with_capacity(layout.len());
  layout.write(&mut bytes);
  Ok(bytes)
}

/// Text and formatting together.
pub fn serialize(s: &StyledString) -> Result<Vec<u8>> {
  let layout = Layout::new(s)?;
  let units = s.units();
  let count = to_i32(units.len(), "text length")?;
  let mut bytes = Vec::with_capacity(4 + units.len() * 2 + layout.len());
  bytes.extend_from_slice(&count.to_le_bytes());
  for unit in units {
    bytes.extend_from_slice(&unit.to_le_bytes());
  }
  layout.write(&mut bytes);
  Ok(bytes)
}

/// Rebuilds a string from the format of its run table and its text.
pub fn decode_format(units: impl Into<Box<[u16]>>, bytes: &[u8]) -> Result<StyledString> {
  decode_format_with(units, bytes, &CodecLimits::default())
}

pub fn decode_format_with(
  units: impl Into<Box<[u16]>>,
  bytes: &[u8],
  limits: &CodecLimits,
) -> Result<StyledString> {
  let units = units.into();
  let mut reader = Reader::new(bytes);
  logged(decode_runs(units, &mut reader, limits))
}

/// Inverse of [`serialize`].
pub fn deserialize(bytes: &[u8]) -> Result<StyledString> {
  deserialize_with(bytes, &CodecLimits::default())
}

pub fn deserialize_with(bytes: &[u8], limits: &CodecLimits) -> Result<StyledString> {
  let mut reader = Reader::new(bytes);
  let decoded = read_units(&mut reader, limits).and_then(|units| decode_runs(units, &mut reader, limits));
  logged(decoded)
}

fn logged(decoded: Result<StyledString>) -> Result<StyledString> {
  if let Err(err) = &decoded {
    tracing::debug!(%err, "rejected styled string data");
  }
  decoded
}

fn read_units(reader: &mut Reader<'_>, limits: &CodecLimits) -> Result<Box<[u16]>> {
  let at = reader.pos;
  let count = reader.i32()?;
  let count = usize::try_from(count).map_err(|_| reader.malformed_at(at, "negative text length"))?;
  if count > limits.max_units {
    return Err(reader.malformed_at(at, "text longer than allowed"));
  }
  let bytes = reader.take(count * 2, "text cut short")?;
  Ok(
    bytes
      .chunks_exact(2)
      .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
      .collect(),
  )
}

fn decode_runs(units: Box<[u16]>, reader: &mut Reader<'_>, limits: &CodecLimits) -> Result<StyledString> {
  let len = units.len();
  if len > limits.max_units {
    return Err(reader.malformed("text longer than allowed"));
  }

  let at = reader.pos;
  let count = reader.i32()?;
  if count < 1 {
    return Err(reader.malformed_at(at, "run count must be positive"));
  }
  let count = count as usize;
  if count > limits.max_runs || count > len.max(1) {
    return Err(reader.malformed_at(at, "too many runs"));
  }
  if reader.remaining() < count * RUN_ENTRY {
    return Err(reader.malformed("run table cut short"));
  }

  let mut entries = Vec::with_capacity(count);
  for irun in 0..count {
    let at = reader.pos;
    let min = reader.i32()?;
    let offset = reader.i32()?;
    let min = usize::try_from(min).map_err(|_| reader.malformed_at(at, "negative run offset"))?;
    if irun == 0 && min != 0 {
      return Err(reader.malformed_at(at, "first run does not start at 0"));
    }
    if let Some(&(prev, _)) = entries.last() {
      if min <= prev {
        return Err(reader.malformed_at(at, "run offsets are not increasing"));
      }
    }
    if min >= len && len > 0 {
      return Err(reader.malformed_at(at, "run starts past the end of the text"));
    }
    let offset = usize::try_from(offset).map_err(|_| reader.malformed_at(at + 4, "negative blob offset"))?;
    entries.push((min, offset));
  }

  let blob_start = reader.pos;
  let mut decoded: HashMap<usize, PropertySet, RandomState> = HashMap::default();
  let mut runs = Vec::with_capacity(count);
  for (irun, &(_, offset)) in entries.iter().enumerate() {
    let props = match decoded.get(&offset) {
      Some(props) => props.clone(),
      None => {
        if reader.pos - blob_start != offset {
          return Err(reader.malformed("blob offsets leave gaps or overlap"));
        }
        let props = read_blob(reader, limits)?;
        decoded.insert(offset, props.clone());
        props
      },
    };
    let lim = entries.get(irun + 1).map_or(len, |&(min, _)| min);
    runs.push(Run::new(lim, props));
  }
  if reader.remaining() > 0 {
    return Err(reader.malformed("trailing bytes after the last blob"));
  }

  StyledString::from_runs(units, runs)
}

fn read_blob(reader: &mut Reader<'_>, limits: &CodecLimits) -> Result<PropertySet> {
  let at = reader.pos;
  let int_count = reader.varint()?;
  let str_count = reader.varint()?;
  if int_count.saturating_add(str_count) > limits.max_props as u64 {
    return Err(reader.malformed_at(at, "too many properties"));
  }

  let mut builder = PropertySetBuilder::new();
  let mut prev = None;
  for _ in 0..int_count {
    let id = reader.prop_id(&mut prev)?;
    let at = reader.pos;
    let variant = PropVariant::from_byte(reader.u8()?)
      .ok_or_else(|| reader.malformed_at(at, "unknown property variant"))?;
    let at = reader.pos;
    let value = u32::try_from(reader.varint()?)
      .map_err(|_| reader.malformed_at(at, "property value out of range"))?;
    builder.set_int(id, IntValue::with_variant(variant, unzigzag(value)));
  }

  let mut prev = None;
  for _ in 0..str_count {
    let id = reader.prop_id(&mut prev)?;
    let at = reader.pos;
    let byte_len = reader.varint()?;
    if byte_len > limits.max_str_bytes as u64 {
      return Err(reader.malformed_at(at, "string property longer than allowed"));
    }
    let at = reader.pos;
    let bytes = reader.take(byte_len as usize, "string property cut short")?;
    let value = std::str::from_utf8(bytes).map_err(|_| reader.malformed_at(at, "string property is not UTF-8"))?;
    builder.set_str(id, value);
  }
  Ok(builder.build())
}

struct Reader<'a> {
  bytes: &'a [u8],
  pos:   usize,
}

impl<'a> Reader<'a> {
  fn new(bytes: &'a [u8]) -> Self {
    Self { bytes, pos: 0 }
  }

  fn remaining(&self) -> usize {
    self.bytes.len() - self.pos
  }

  fn malformed(&self, reason: &'static str) -> TextError {
    self.malformed_at(self.pos, reason)
  }

  fn malformed_at(&self, offset: usize, reason: &'static str) -> TextError {
    TextError::Malformed { offset, reason }
  }

  fn take(&mut self, n: usize, reason: &'static str) -> Result<&'a [u8]> {
    if self.remaining() < n {
      return Err(self.malformed(reason));
    }
    let bytes = &self.bytes[self.pos..self.pos + n];
    self.pos += n;
    Ok(bytes)
  }

  fn u8(&mut self) -> Result<u8> {
    Ok(self.take(1, "unexpected end of data")?[0])
  }

  fn i32(&mut self) -> Result<i32> {
    let bytes = self.take(4, "unexpected end of data")?;
    Ok(i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
  }

  fn varint(&mut self) -> Result<u64> {
    let at = self.pos;
    let mut value = 0u64;
    for shift in (0..64).step_by(7) {
      let byte = self.u8()?;
      let bits = u64::from(byte & 0x7F);
      if shift == 63 && bits > 1 {
        break;
      }
      value |= bits << shift;
      if byte & 0x80 == 0 {
        return Ok(value);
      }
    }
    Err(self.malformed_at(at, "varint too long"))
  }

  /// A property id, which must be greater than the previous one.
  fn prop_id(&mut self, prev: &mut Option<u32>) -> Result<u32> {
    let at = self.pos;
    let id = u32::try_from(self.varint()?).map_err(|_| self.malformed_at(at, "property id out of range"))?;
    if prev.is_some_and(|prev| id <= prev) {
      return Err(self.malformed_at(at, "property ids are not increasing"));
    }
    *prev = Some(id);
    Ok(id)
  }
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
    props::{
      int_prop,
      str_prop,
    },
  };

  fn p(ws: i32) -> PropertySet {
    PropertySet::with_ws(ws)
  }

  fn units(text: &str) -> Vec<u16> {
    text.encode_utf16().collect()
  }

  fn three_runs() -> StyledString {
    StyledString::from_runs(units("abcdef"), vec![
      Run::new(2, p(1)),
      Run::new(4, p(2)),
      Run::new(6, p(1)),
    ])
    .unwrap()
  }

  /// Blob for a set holding only a writing system.
  fn ws_blob(ws: u8) -> Vec<u8> {
    vec![1, 0, int_prop::WS as u8, 0, ws * 2]
  }

  fn format(entries: &[(i32, i32)], blobs: &[u8]) -> Vec<u8> {
    let mut bytes = (entries.len() as i32).to_le_bytes().to_vec();
    for (min, offset) in entries {
      bytes.extend_from_slice(&min.to_le_bytes());
      bytes.extend_from_slice(&offset.to_le_bytes());
    }
    bytes.extend_from_slice(blobs);
    bytes
  }

  #[test]
  fn shared_props_share_a_blob() {
    let bytes = format_bytes(&three_runs()).unwrap();
    let mut blobs = ws_blob(1);
    blobs.extend(ws_blob(2));
    assert_eq!(bytes, format(&[(0, 0), (2, 5), (4, 0)], &blobs));
  }

  #[test]
  fn round_trips() {
    let rich = PropertySetBuilder::new()
      .with_int(int_prop::WS, IntValue::new(7))
      .with_int(int_prop::FONT_SIZE, IntValue::with_variant(PropVariant::MilliPoint, 12_000))
      .with_int(int_prop::OFFSET, IntValue::with_variant(PropVariant::MilliPoint, -3_000))
      .with_str(str_prop::FONT_FAMILY, "Charis SIL")
      .with_str(str_prop::OBJ_DATA, "\u{0004}guid")
      .build();
    let mut builder = IncrementalBuilder::with_props(p(1));
    builder.append("plain ").unwrap();
    builder.set_props(&rich);
    builder.append("fancy\u{FFFC}").unwrap();
    let s = builder.build().unwrap();

    let decoded = decode_format(s.units().to_vec(), &format_bytes(&s).unwrap()).unwrap();
    assert_eq!(decoded, s);
    assert_eq!(decoded.props_of_run(1).unwrap(), &rich);
    assert_eq!(deserialize(&serialize(&s).unwrap()).unwrap(), s);

    let empty = StyledString::empty(p(3)).unwrap();
    assert_eq!(deserialize(&serialize(&empty).unwrap()).unwrap(), empty);
  }

  #[test]
  fn measure_then_fill() {
    let s = three_runs();
    let expected = format_bytes(&s).unwrap();

    let mut small = vec![0; expected.len() - 1];
    assert_eq!(encode_format(&s, &mut small).unwrap(), Encoded::Truncated {
      required: expected.len(),
    });
    assert!(small.iter().all(|&b| b == 0));

    let mut big = vec![0xAA; expected.len() + 3];
    assert_eq!(encode_format(&s, &mut big).unwrap(), Encoded::Complete {
      written: expected.len(),
    });
    assert_eq!(&big[..expected.len()], &expected[..]);
    assert_eq!(&big[expected.len()..], &[0xAA; 3]);
  }

  fn rejects(text: &str, bytes: &[u8]) -> TextError {
    decode_format(units(text), bytes).unwrap_err()
  }

  #[test]
  fn rejects_broken_tables() {
    let blob = ws_blob(1);
    assert!(matches!(rejects("ab", &[]), TextError::Malformed { .. }));
    assert!(matches!(rejects("ab", &format(&[], &[])), TextError::Malformed { .. }));
    assert!(matches!(rejects("ab", &format(&[(1, 0)], &blob)), TextError::Malformed { .. }));
    assert!(matches!(
      rejects("abc", &format(&[(0, 0), (2, 0), (1, 0)], &blob)),
      TextError::Malformed { .. }
    ));
    assert!(matches!(
      rejects("ab", &format(&[(0, 0), (2, 0)], &blob)),
      TextError::Malformed { .. }
    ));
    // run table promises more entries than there are bytes
    let mut short = format(&[(0, 0)], &blob);
    short[0] = 3;
    assert!(matches!(rejects("abc", &short), TextError::Malformed { .. }));
  }

  #[test]
  fn rejects_broken_blobs() {
    let blob = ws_blob(1);
    // gap before the first blob
    let mut gapped = vec![0];
    gapped.extend(&blob);
    assert!(matches!(rejects("ab", &format(&[(0, 1)], &gapped)), TextError::Malformed { .. }));
    // trailing bytes
    let mut trailing = blob.clone();
    trailing.push(0);
    assert!(matches!(rejects("ab", &format(&[(0, 0)], &trailing)), TextError::Malformed { .. }));
    // unknown variant
    assert!(matches!(rejects("ab", &format(&[(0, 0)], &[1, 0, 1, 9, 2])), TextError::Malformed { .. }));
    // ids out of order
    assert!(matches!(
      rejects("ab", &format(&[(0, 0)], &[2, 0, 3, 0, 2, 1, 0, 2])),
      TextError::Malformed { .. }
    ));
    // invalid UTF-8
    assert!(matches!(
      rejects("ab", &format(&[(0, 0)], &[1, 1, 1, 0, 2, 1, 1, 0xFF])),
      TextError::Malformed { .. }
    ));
    // overlong varint
    assert!(matches!(
      rejects("ab", &format(&[(0, 0)], &[0xFF; 12])),
      TextError::Malformed { .. }
    ));
  }

  #[test]
  fn rejects_invalid_run_tables() {
    let mut blobs = ws_blob(1);
    blobs.extend([0, 0]);
    // adjacent runs sharing one blob
    assert_eq!(
      rejects("ab", &format(&[(0, 0), (1, 0)], &ws_blob(1))),
      TextError::InvalidRuns {
        reason: "adjacent runs have equal properties",
      }
    );
    // second blob is an empty set without a writing system
    assert_eq!(
      rejects("ab", &format(&[(0, 0), (1, 5)], &blobs)),
      TextError::MissingWritingSystem { run_lim: 2 }
    );
  }

  #[test]
  fn limits_apply() {
    let s = three_runs();
    let bytes = format_bytes(&s).unwrap();
    let limits = CodecLimits {
      max_runs: 2,
      ..CodecLimits::default()
    };
    assert!(decode_format_with(s.units().to_vec(), &bytes, &limits).is_err());

    let limits = CodecLimits {
      max_units: 3,
      ..CodecLimits::default()
    };
    assert!(deserialize_with(&serialize(&s).unwrap(), &limits).is_err());
  }

  #[derive(Debug, Clone)]
  struct Sample(StyledString);

  impl Arbitrary for Sample {
    fn arbitrary(g: &mut Gen) -> Self {
      let pieces: Vec<(String, u8, Option<u8>)> = Arbitrary::arbitrary(g);
      let mut builder = IncrementalBuilder::with_props(p(0));
      for (text, ws, bold) in pieces {
        builder.set_int_prop(int_prop::WS, Some(IntValue::new(i32::from(ws % 4) - 1)));
        builder.set_int_prop(int_prop::BOLD, bold.map(|b| IntValue::new(i32::from(b))));
        builder.append(&text).unwrap();
      }
      Sample(builder.build().unwrap())
    }
  }

  quickcheck::quickcheck! {
    fn serialized_strings_round_trip(sample: Sample) -> bool {
      let s = sample.0;
      deserialize(&serialize(&s).unwrap()).unwrap() == s
    }

    fn arbitrary_bytes_never_panic(text: String, bytes: Vec<u8>) -> bool {
      let _ = decode_format(units(&text), &bytes);
      let _ = deserialize(&bytes);
      true
    }
  }
}
