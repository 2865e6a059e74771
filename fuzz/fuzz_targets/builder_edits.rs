#![no_main]

mod common;

use libfuzzer_sys::fuzz_target;
use the_text::{
  NormalizationForm,
  PropertySet,
  RunSource,
  StyledString,
  codec,
};

use crate::common::{
  apply_edit,
  scenario_from_bytes,
};

fuzz_target!(|data: &[u8]| {
  let scenario = scenario_from_bytes(data);
  let initial = String::from_utf8_lossy(&scenario.initial);
  let Ok(start) = StyledString::new(&initial, PropertySet::with_ws(1)) else {
    return;
  };

  let mut builder = start.to_builder();
  for op in &scenario.ops {
    apply_edit(&mut builder, op);
  }
  let s = builder.finish();

  for form in NormalizationForm::ALL {
    let normalized = s.normalize(form);
    if let Err(err) = normalized.check_invariants() {
      panic!("{form:?} broke run invariants: {err}");
    }
    assert!(normalized.is_normalized(form));
  }

  let bytes = codec::serialize(&s).expect("fuzz strings fit the format");
  let decoded = codec::deserialize(&bytes).expect("encoder output decodes");
  assert_eq!(decoded, s);
});
