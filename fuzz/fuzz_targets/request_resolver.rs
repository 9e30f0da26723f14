#![no_main]

use libfuzzer_sys::fuzz_target;
use pgoload::params::{resolve, DecodePolicy, MAX_ITERATIONS, MIN_COMPLEXITY};

fuzz_target!(|data: &[u8]| {
    // Any payload must resolve or fail cleanly, and accepted values are in range
    for policy in [DecodePolicy::Strict, DecodePolicy::Lenient] {
        if let Ok(params) = resolve(data, policy) {
            assert!((1..=MAX_ITERATIONS).contains(&params.iterations));
            assert!(params.validate().is_ok());
            assert!(params.complexity >= MIN_COMPLEXITY);
        }
    }
});
