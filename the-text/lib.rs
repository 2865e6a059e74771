//! Immutable rich text strings, the builders that produce them, style aware
//! Unicode normalization and a compact binary format for their formatting.
//!
//! A [`StyledString`] is a UTF-16 buffer plus a run table: an ordered list of
//! [`Run`]s, each covering a span of text and pointing at a shared, immutable
//! [`PropertySet`]. Strings are edited through a [`StringBuilder`] (random
//! access) or an [`IncrementalBuilder`] (append only) and frozen back into a
//! [`StyledString`].

use smartstring::{
  LazyCompact,
  SmartString,
};

pub mod builder;
pub mod codec;
pub mod config;
pub mod error;
pub mod incremental;
pub mod normalize;
pub mod props;
pub mod runs;
pub mod string;

pub use builder::StringBuilder;
pub use config::{
  Config,
  NormalizeOptions,
};
pub use error::{
  Result,
  TextError,
};
pub use incremental::IncrementalBuilder;
pub use normalize::NormalizationForm;
pub use props::{
  IntValue,
  PropVariant,
  PropertySet,
  PropertySetBuilder,
};
pub use runs::{
  Run,
  RunSource,
};
pub use string::{
  NormForms,
  StyledString,
};

/// Small string used for string property values.
pub type Tendril = SmartString<LazyCompact>;
