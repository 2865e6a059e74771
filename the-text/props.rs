//! Formatting attributes attached to runs of text.
//!
//! A [`PropertySet`] is an immutable bag of integer and string properties.
//! Sets are built with a [`PropertySetBuilder`] and interned on the way out,
//! so building the same contents twice normally hands back the same shared
//! handle. Equality checks handle identity first and only compare contents
//! when the handles differ.
//!
//! ```
//! use the_text::props::{PropertySet, PropertySetBuilder, IntValue, int_prop};
//!
//! let mut builder = PropertySetBuilder::new();
//! builder.set_int(int_prop::WS, IntValue::new(5));
//! builder.set_int(int_prop::BOLD, IntValue::new(1));
//! let a = builder.build();
//! let b = PropertySet::with_ws(5).to_builder().with_int(int_prop::BOLD, IntValue::new(1)).build();
//! assert_eq!(a, b);
//! assert!(PropertySet::ptr_eq(&a, &b));
//! ```

use std::{
  fmt,
  hash::{
    BuildHasher,
    Hash,
    Hasher,
  },
  sync::{
    Arc,
    Weak,
  },
};

use foldhash::fast::FixedState;
use hashbrown::HashTable;
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use smallvec::SmallVec;

use crate::Tendril;

pub type PropId = u32;

/// Well known integer property ids.
pub mod int_prop {
  use super::PropId;

  /// Writing system of the text. Required on every run.
  pub const WS: PropId = 1;
  pub const ITALIC: PropId = 2;
  pub const BOLD: PropId = 3;
  pub const SUPERSCRIPT: PropId = 4;
  pub const UNDERLINE: PropId = 5;
  pub const FONT_SIZE: PropId = 6;
  pub const OFFSET: PropId = 7;
  pub const FORE_COLOR: PropId = 8;
  pub const BACK_COLOR: PropId = 9;
  pub const UNDER_COLOR: PropId = 10;
  pub const BASE_WS: PropId = 16;
}

/// Well known string property ids.
pub mod str_prop {
  use super::PropId;

  pub const FONT_FAMILY: PropId = 1;
  pub const CHAR_STYLE: PropId = 2;
  pub const PARA_STYLE: PropId = 3;
  pub const TAB_LIST: PropId = 4;
  pub const TAGS: PropId = 5;
  /// Marks the run's text as a placeholder for an embedded object. The value
  /// describes the object (picture, link target, ...).
  pub const OBJ_DATA: PropId = 6;
  pub const FONT_VARIATIONS: PropId = 7;
  pub const NAMED_STYLE: PropId = 133;
}

/// How an integer property value is to be interpreted.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum PropVariant {
  #[default]
  Default    = 0,
  MilliPoint = 1,
  Relative   = 2,
  Enum       = 3,
}

impl PropVariant {
  #[inline]
  pub const fn to_byte(self) -> u8 {
    self as u8
  }

  pub const fn from_byte(byte: u8) -> Option<Self> {
    match byte {
      0 => Some(Self::Default),
      1 => Some(Self::MilliPoint),
      2 => Some(Self::Relative),
      3 => Some(Self::Enum),
      _ => None,
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IntValue {
  pub variant: PropVariant,
  pub value:   i32,
}

impl IntValue {
  #[inline]
  pub const fn new(value: i32) -> Self {
    Self {
      variant: PropVariant::Default,
      value,
    }
  }

  #[inline]
  pub const fn with_variant(variant: PropVariant, value: i32) -> Self {
    Self { variant, value }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IntProp {
  pub id:    PropId,
  pub value: IntValue,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StrProp {
  pub id:    PropId,
  pub value: Tendril,
}

/// Property lists, each sorted by id with unique ids.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
struct Props {
  ints: SmallVec<[IntProp; 4]>,
  strs: SmallVec<[StrProp; 2]>,
}

impl Props {
  fn set_int(&mut self, id: PropId, value: Option<IntValue>) {
    match (self.ints.binary_search_by_key(&id, |p| p.id), value) {
      (Ok(i), Some(value)) => self.ints[i].value = value,
      (Ok(i), None) => {
        self.ints.remove(i);
      },
      (Err(i), Some(value)) => self.ints.insert(i, IntProp { id, value }),
      (Err(_), None) => {},
    }
  }

  fn set_str(&mut self, id: PropId, value: Option<&str>) {
    match (self.strs.binary_search_by_key(&id, |p| p.id), value) {
      (Ok(i), Some(value)) => self.strs[i].value = Tendril::from(value),
      (Ok(i), None) => {
        self.strs.remove(i);
      },
      (Err(i), Some(value)) => {
        self.strs.insert(i, StrProp {
          id,
          value: Tendril::from(value),
        })
      },
      (Err(_), None) => {},
    }
  }

  fn int(&self, id: PropId) -> Option<IntValue> {
    self
      .ints
      .binary_search_by_key(&id, |p| p.id)
      .ok()
      .map(|i| self.ints[i].value)
  }

  fn str(&self, id: PropId) -> Option<&str> {
    self
      .strs
      .binary_search_by_key(&id, |p| p.id)
      .ok()
      .map(|i| self.strs[i].value.as_str())
  }
}

/// Immutable, shared set of formatting properties.
///
/// Cloning is cheap: the contents live behind an `Arc`.
#[derive(Clone)]
pub struct PropertySet(Arc<Props>);

impl PropertySet {
  /// The set with no properties at all.
  pub fn empty() -> Self {
    intern(Props::default())
  }

  /// A set holding only a writing system.
  pub fn with_ws(ws: i32) -> Self {
    PropertySetBuilder::new()
      .with_int(int_prop::WS, IntValue::new(ws))
      .build()
  }

  /// Whether both handles point at the same interned set.
  #[inline]
  pub fn ptr_eq(a: &Self, b: &Self) -> bool {
    Arc::ptr_eq(&a.0, &b.0)
  }

  pub fn int_prop(&self, id: PropId) -> Option<IntValue> {
    self.0.int(id)
  }

  pub fn str_prop(&self, id: PropId) -> Option<&str> {
    self.0.str(id)
  }

  #[inline]
  pub fn writing_system(&self) -> Option<i32> {
    self.int_prop(int_prop::WS).map(|v| v.value)
  }

  pub fn int_props(&self) -> &[IntProp] {
    &self.0.ints
  }

  pub fn str_props(&self) -> &[StrProp] {
    &self.0.strs
  }

  pub fn is_empty(&self) -> bool {
    self.0.ints.is_empty() && self.0.strs.is_empty()
  }

  pub fn to_builder(&self) -> PropertySetBuilder {
    PropertySetBuilder {
      props: (*self.0).clone(),
    }
  }

  /// Copy of this set with one integer property changed (`None` removes it).
  /// Returns `self` when nothing changes.
  pub fn with_int(&self, id: PropId, value: Option<IntValue>) -> PropertySet {
    if self.int_prop(id) == value {
      return self.clone();
    }
    let mut builder = self.to_builder();
    builder.update_int(id, value);
    builder.build()
  }

  /// Copy of this set with one string property changed (`None` removes it).
  /// Returns `self` when nothing changes.
  pub fn with_str(&self, id: PropId, value: Option<&str>) -> PropertySet {
    if self.str_prop(id) == value {
      return self.clone();
    }
    let mut builder = self.to_builder();
    builder.update_str(id, value);
    builder.build()
  }
}

impl PartialEq for PropertySet {
  fn eq(&self, other: &Self) -> bool {
    Arc::ptr_eq(&self.0, &other.0) || self.0 == other.0
  }
}

impl Eq for PropertySet {}

impl Hash for PropertySet {
  fn hash<H: Hasher>(&self, state: &mut H) {
    self.0.hash(state);
  }
}

impl fmt::Debug for PropertySet {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let mut map = f.debug_map();
    for prop in &self.0.ints {
      let key = format!("int:{}", prop.id);
      match prop.value.variant {
        PropVariant::Default => map.entry(&key, &prop.value.value),
        variant => map.entry(&key, &format_args!("{}{variant:?}", prop.value.value)),
      };
    }
    for prop in &self.0.strs {
      map.entry(&format!("str:{}", prop.id), &prop.value.as_str());
    }
    map.finish()
  }
}

/// Mutable staging area for a [`PropertySet`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PropertySetBuilder {
  props: Props,
}

impl PropertySetBuilder {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn set_int(&mut self, id: PropId, value: IntValue) {
    self.props.set_int(id, Some(value));
  }

  pub fn remove_int(&mut self, id: PropId) {
    self.props.set_int(id, None);
  }

  pub fn set_str(&mut self, id: PropId, value: &str) {
    self.props.set_str(id, Some(value));
  }

  pub fn remove_str(&mut self, id: PropId) {
    self.props.set_str(id, None);
  }

  /// Sets or removes an integer property.
  pub fn update_int(&mut self, id: PropId, value: Option<IntValue>) {
    self.props.set_int(id, value);
  }

  /// Sets or removes a string property.
  pub fn update_str(&mut self, id: PropId, value: Option<&str>) {
    self.props.set_str(id, value);
  }

  #[must_use]
  pub fn with_int(mut self, id: PropId, value: IntValue) -> Self {
    self.set_int(id, value);
    self
  }

  #[must_use]
  pub fn with_str(mut self, id: PropId, value: &str) -> Self {
    self.set_str(id, value);
    self
  }

  pub fn int(&self, id: PropId) -> Option<IntValue> {
    self.props.int(id)
  }

  pub fn str(&self, id: PropId) -> Option<&str> {
    self.props.str(id)
  }

  pub fn clear(&mut self) {
    self.props.ints.clear();
    self.props.strs.clear();
  }

  pub fn is_empty(&self) -> bool {
    self.props.ints.is_empty() && self.props.strs.is_empty()
  }

  pub fn build(&self) -> PropertySet {
    intern(self.props.clone())
  }
}

impl From<&PropertySet> for PropertySetBuilder {
  fn from(props: &PropertySet) -> Self {
    props.to_builder()
  }
}

// Interning. The pool only holds weak references; dead entries are swept
// whenever the table has doubled since the last sweep.

const HASH_STATE: FixedState = FixedState::with_seed(0x5eed_7e47_57e1_ed00);
const MIN_PURGE: usize = 64;

struct Pool {
  table:    HashTable<(u64, Weak<Props>)>,
  purge_at: usize,
}

static POOL: Lazy<Mutex<Pool>> = Lazy::new(|| {
  Mutex::new(Pool {
    table:    HashTable::new(),
    purge_at: MIN_PURGE,
  })
});

fn intern(props: Props) -> PropertySet {
  let hash = HASH_STATE.hash_one(&props);
  let mut pool = POOL.lock();

  let existing = pool
    .table
    .find(hash, |(h, weak)| {
      *h == hash && weak.upgrade().is_some_and(|live| *live == props)
    })
    .and_then(|(_, weak)| weak.upgrade());
  if let Some(live) = existing {
    return PropertySet(live);
  }

  if pool.table.len() >= pool.purge_at {
    let before = pool.table.len();
    pool.table.retain(|(_, weak)| weak.strong_count() > 0);
    pool.purge_at = (pool.table.len() * 2).max(MIN_PURGE);
    tracing::trace!(
      before,
      after = pool.table.len(),
      "purged dead property sets from intern pool"
    );
  }

  let live = Arc::new(props);
  pool
    .table
    .insert_unique(hash, (hash, Arc::downgrade(&live)), |(h, _)| *h);
  PropertySet(live)
}
