#![no_main]

use libfuzzer_sys::fuzz_target;
use voxfield::SparseField;

fuzz_target!(|data: &[u8]| {
    // Decoding arbitrary bytes must fail cleanly, never panic
    if let Ok(field) = SparseField::from_bytes(data) {
        // Anything that decodes must survive a re-encode unchanged
        let bytes = field.to_bytes();
        let again = SparseField::from_bytes(&bytes).expect("re-encoded field must decode");
        assert_eq!(again.len(), field.len());
        assert_eq!(again.dimensions(), field.dimensions());

        // Queries on decoded data must not panic, whatever the dimensions
        for (location, _) in field.iter() {
            let _ = field.field_value(&location);
            let _ = field.voxel_center(&location);
        }
        let _ = field.non_zero_box();
        let _ = field.field_sum();
    }
});
