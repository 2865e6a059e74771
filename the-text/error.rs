use thiserror::Error;

pub type Result<T> = std::result::Result<T, TextError>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum TextError {
  #[error("offset {offset} is out of bounds for text of length {len}")]
  OffsetOutOfBounds { offset: usize, len: usize },
  #[error("invalid range {min}..{lim} for text of length {len}")]
  InvalidRange { min: usize, lim: usize, len: usize },
  #[error("run index {index} is out of bounds for {count} runs")]
  RunOutOfBounds { index: usize, count: usize },
  #[error("run ending at {run_lim} has no writing system")]
  MissingWritingSystem { run_lim: usize },
  #[error("invalid run table: {reason}")]
  InvalidRuns { reason: &'static str },
  #[error("malformed format data at byte {offset}: {reason}")]
  Malformed { offset: usize, reason: &'static str },
  #[error("{what} does not fit the binary format")]
  TooLarge { what: &'static str },
}

impl TextError {
  pub(crate) fn check_range(min: usize, lim: usize, len: usize) -> Result<()> {
    if min > lim || lim > len {
      return Err(TextError::InvalidRange { min, lim, len });
    }
    Ok(())
  }

  pub(crate) fn check_offset(offset: usize, len: usize) -> Result<()> {
    if offset > len {
      return Err(TextError::OffsetOutOfBounds { offset, len });
    }
    Ok(())
  }
}
