#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(text) = std::str::from_utf8(data) {
        if let Ok(mol) = molvault_chem::parse(text) {
            let _ = molvault_chem::structural_key(&mol);
            let _ = molvault_chem::properties::ring_counts(&mol);
        }
    }
});
