#![no_main]

use libfuzzer_sys::fuzz_target;
use the_text::{
  RunSource,
  codec,
};

fuzz_target!(|data: &[u8]| {
  let Ok(s) = codec::deserialize(data) else {
    return;
  };
  if let Err(err) = s.check_invariants() {
    panic!("decoded string breaks run invariants: {err}");
  }
  let bytes = codec::serialize(&s).expect("decoded strings re-encode");
  let again = codec::deserialize(&bytes).expect("encoder output decodes");
  assert_eq!(again, s);
  assert!(bytes.len() <= data.len());
});
