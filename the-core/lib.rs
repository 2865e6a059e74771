//! Character level Unicode primitives shared by the styled text engine.
//!
//! Everything in here works on plain characters or UTF-16 code units and knows
//! nothing about formatting. The styled string types in `the-text` build on top
//! of these.

pub mod chars;
pub mod normalize;
pub mod utf16;
