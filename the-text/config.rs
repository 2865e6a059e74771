//! Tunables for normalization and decoding.
//!
//! Everything here has a sensible default; hosts that want to change it can
//! deserialize a [`Config`] from TOML:
//!
//! ```
//! use the_text::config::{Config, StringMerge};
//!
//! let config = Config::from_toml(
//!   r#"
//!   [normalize]
//!   string-merge = "never"
//!
//!   [codec]
//!   max-runs = 64
//!   "#,
//! )?;
//! assert_eq!(config.normalize.string_merge, StringMerge::Never);
//! assert_eq!(config.codec.max_runs, 64);
//! # Ok::<(), toml::de::Error>(())
//! ```

use serde::{
  Deserialize,
  Serialize,
};

use crate::props::{
  PropId,
  PropertySet,
  str_prop,
};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct Config {
  pub normalize: NormalizeOptions,
  pub codec:     CodecLimits,
}

impl Config {
  pub fn from_toml(src: &str) -> Result<Self, toml::de::Error> {
    toml::from_str(src)
  }
}

/// How differing string properties are reconciled when styled composition
/// joins two characters into one.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StringMerge {
  /// Join the two values with a comma.
  #[default]
  Concatenate,
  /// Treat any difference as a style break.
  Never,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct NormalizeOptions {
  pub string_merge:        StringMerge,
  /// String properties that may differ between a base character and a mark
  /// without blocking styled composition.
  pub mergeable_str_props: Vec<PropId>,
}

impl Default for NormalizeOptions {
  fn default() -> Self {
    Self {
      string_merge:        StringMerge::Concatenate,
      mergeable_str_props: vec![str_prop::FONT_VARIATIONS],
    }
  }
}

impl NormalizeOptions {
  pub fn is_default(&self) -> bool {
    *self == Self::default()
  }

  fn is_mergeable(&self, id: PropId) -> bool {
    self.mergeable_str_props.contains(&id)
  }

  /// The properties a composite of a `base` character and a `mark` character
  /// should carry, or `None` when the two are styled differently enough that
  /// they must not be composed.
  pub fn merge_props(&self, base: &PropertySet, mark: &PropertySet) -> Option<PropertySet> {
    if base == mark {
      return Some(base.clone());
    }
    if self.string_merge == StringMerge::Never || base.int_props() != mark.int_props() {
      return None;
    }

    let mut merged = base.to_builder();
    for prop in mark.str_props() {
      match base.str_prop(prop.id) {
        Some(value) if value == prop.value.as_str() => {},
        _ if !self.is_mergeable(prop.id) => return None,
        Some(value) => merged.set_str(prop.id, &format!("{value},{}", prop.value)),
        None => merged.set_str(prop.id, &prop.value),
      }
    }
    let base_only = base
      .str_props()
      .iter()
      .filter(|prop| mark.str_prop(prop.id).is_none());
    for prop in base_only {
      if !self.is_mergeable(prop.id) {
        return None;
      }
    }
    Some(merged.build())
  }
}

/// Upper bounds enforced while decoding untrusted formatting data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct CodecLimits {
  pub max_runs:      usize,
  /// Per property set, integer and string properties counted together.
  pub max_props:     usize,
  /// Per string property value.
  pub max_str_bytes: usize,
  pub max_units:     usize,
}

impl Default for CodecLimits {
  fn default() -> Self {
    Self {
      max_runs:      1 << 20,
      max_props:     256,
      max_str_bytes: 1 << 16,
      max_units:     i32::MAX as usize,
    }
  }
}

#[cfg(test)]
mod test {
  use super::*;
  use crate::props::{
    IntValue,
    PropertySetBuilder,
    int_prop,
  };

  fn styled(ws: i32, variations: Option<&str>, style: Option<&str>) -> PropertySet {
    let mut builder = PropertySetBuilder::new().with_int(int_prop::WS, IntValue::new(ws));
    builder.update_str(str_prop::FONT_VARIATIONS, variations);
    builder.update_str(str_prop::CHAR_STYLE, style);
    builder.build()
  }

  #[test]
  fn empty_toml_is_default() {
    assert_eq!(Config::from_toml("").unwrap(), Config::default());
    assert!(Config::default().normalize.is_default());
  }

  #[test]
  fn parses_every_field() {
    let config = Config::from_toml(
      r#"
      [normalize]
      string-merge = "concatenate"
      mergeable-str-props = [7, 2]

      [codec]
      max-runs = 10
      max-props = 3
      max-str-bytes = 100
      max-units = 1000
      "#,
    )
    .unwrap();
    assert_eq!(config.normalize.mergeable_str_props, vec![7, 2]);
    assert!(!config.normalize.is_default());
    assert_eq!(config.codec, CodecLimits {
      max_runs:      10,
      max_props:     3,
      max_str_bytes: 100,
      max_units:     1000,
    });
  }

  #[test]
  fn rejects_unknown_keys() {
    assert!(Config::from_toml("[codec]\nmax-blobs = 1").is_err());
    assert!(Config::from_toml("[normalize]\nstring-merge = \"sometimes\"").is_err());
  }

  #[test]
  fn merge_concatenates_font_variations() {
    let options = NormalizeOptions::default();
    let base = styled(1, Some("wght=700"), None);
    let mark = styled(1, Some("ital=1"), None);
    let merged = options.merge_props(&base, &mark).unwrap();
    assert_eq!(merged.str_prop(str_prop::FONT_VARIATIONS), Some("wght=700,ital=1"));

    let plain = styled(1, None, None);
    assert_eq!(options.merge_props(&plain, &mark).unwrap(), mark);
    assert_eq!(options.merge_props(&base, &plain).unwrap(), base);
  }

  #[test]
  fn merge_refuses_other_differences() {
    let options = NormalizeOptions::default();
    let base = styled(1, None, None);
    assert_eq!(options.merge_props(&base, &styled(2, None, None)), None);
    assert_eq!(options.merge_props(&base, &styled(1, None, Some("Strong"))), None);
    assert_eq!(options.merge_props(&styled(1, None, Some("Strong")), &base), None);

    let never = NormalizeOptions {
      string_merge: StringMerge::Never,
      ..NormalizeOptions::default()
    };
    assert_eq!(never.merge_props(&base, &styled(1, Some("ital=1"), None)), None);
    assert_eq!(never.merge_props(&base, &base.clone()), Some(base));
  }
}
