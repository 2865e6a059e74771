use the_text::{
  IntValue,
  PropertySet,
  RunSource,
  StringBuilder,
  props::{
    PropertySetBuilder,
    int_prop,
    str_prop,
  },
};

const MAX_INITIAL_BYTES: usize = 1024;
const MAX_OPS: usize = 128;
const MAX_INSERT_BYTES: usize = 64;

#[derive(Debug, Clone, Copy)]
pub enum OpKind {
  Replace,
  Restyle,
  Bold,
  Variation,
}

#[derive(Debug, Clone)]
pub struct EditOp {
  pub kind:   OpKind,
  pub anchor: u16,
  pub extent: u16,
  pub style:  u8,
  pub insert: Vec<u8>,
}

pub struct Scenario {
  pub initial: Vec<u8>,
  pub ops:     Vec<EditOp>,
}

/// A small palette of property sets, including one without a writing
/// system so rejected edits get exercised too.
pub fn style(index: u8) -> PropertySet {
  match index % 6 {
    0 => PropertySet::empty(),
    1 | 2 => PropertySet::with_ws(i32::from(index % 6)),
    3 => {
      PropertySetBuilder::new()
        .with_int(int_prop::WS, IntValue::new(1))
        .with_str(str_prop::FONT_VARIATIONS, "wght=700")
        .build()
    },
    4 => {
      PropertySetBuilder::new()
        .with_int(int_prop::WS, IntValue::new(1))
        .with_str(str_prop::CHAR_STYLE, "Emphasis")
        .build()
    },
    _ => PropertySet::with_ws(-1),
  }
}

pub fn scenario_from_bytes(data: &[u8]) -> Scenario {
  let mut cursor = ByteCursor::new(data);
  let initial_len = cursor.up_to(MAX_INITIAL_BYTES);
  let initial = cursor.bytes(initial_len).to_vec();
  let op_count = cursor.up_to(MAX_OPS);
  let mut ops = Vec::with_capacity(op_count);
  for _ in 0..op_count {
    let kind = match cursor.byte() % 4 {
      0 => OpKind::Replace,
      1 => OpKind::Restyle,
      2 => OpKind::Bold,
      _ => OpKind::Variation,
    };
    let anchor = cursor.word();
    let extent = cursor.word();
    let style = cursor.byte();
    let insert_len = cursor.up_to(MAX_INSERT_BYTES);
    let insert = cursor.bytes(insert_len).to_vec();
    ops.push(EditOp {
      kind,
      anchor,
      extent,
      style,
      insert,
    });
  }
  Scenario { initial, ops }
}

/// Applies one edit. Errors are expected for some inputs and ignored; the
/// run invariants must hold either way.
pub fn apply_edit(builder: &mut StringBuilder, op: &EditOp) {
  let len = builder.len();
  let from = (op.anchor as usize) % (len + 1);
  let to = from + (op.extent as usize) % (len - from + 1);
  let range = from..to;

  let _ = match op.kind {
    OpKind::Replace => {
      let text = String::from_utf8_lossy(&op.insert);
      let props = (op.style % 2 == 0).then(|| style(op.style / 2));
      builder.replace(range, &text, props.as_ref())
    },
    OpKind::Restyle => builder.set_properties(range, &style(op.style)),
    OpKind::Bold => {
      let value = (op.style % 2 == 0).then_some(IntValue::new(1));
      builder.set_int_prop(range, int_prop::BOLD, value)
    },
    OpKind::Variation => {
      let value = ["wght=400", "ital=1"].get(usize::from(op.style % 3));
      builder.set_str_prop(range, str_prop::FONT_VARIATIONS, value.copied())
    },
  };

  if let Err(err) = builder.check_invariants() {
    panic!("run invariants broken after {op:?}: {err}");
  }
}

/// Reads scenario fields off the front of the fuzz input. Past the end every
/// read yields zeros.
struct ByteCursor<'a> {
  rest: &'a [u8],
}

impl<'a> ByteCursor<'a> {
  fn new(data: &'a [u8]) -> Self {
    Self { rest: data }
  }

  fn byte(&mut self) -> u8 {
    match self.rest.split_first() {
      Some((&byte, rest)) => {
        self.rest = rest;
        byte
      },
      None => 0,
    }
  }

  fn word(&mut self) -> u16 {
    u16::from_le_bytes([self.byte(), self.byte()])
  }

  /// A value in `0..=max`.
  fn up_to(&mut self, max: usize) -> usize {
    usize::from(self.word()) % (max + 1)
  }

  fn bytes(&mut self, len: usize) -> &'a [u8] {
    let (taken, rest) = self.rest.split_at(len.min(self.rest.len()));
    self.rest = rest;
    taken
  }
}
