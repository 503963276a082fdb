#![no_main]

use libfuzzer_sys::arbitrary::{Arbitrary, Result, Unstructured};
use libfuzzer_sys::fuzz_target;
use voxfield::{SparseField, Vec3f, Vec3i};

#[derive(Debug)]
struct FuzzPair {
    a: SparseField,
    b: SparseField,
}

fn arbitrary_field(u: &mut Unstructured<'_>) -> Result<SparseField> {
    let dims = Vec3i::new(
        u.int_in_range(1..=32)?,
        u.int_in_range(1..=32)?,
        u.int_in_range(1..=32)?,
    );
    // Origins on a whole-voxel lattice, occasionally nudged off it
    let mut origin = Vec3f::new(
        u.int_in_range(-16i32..=16)? as f32,
        u.int_in_range(-16i32..=16)? as f32,
        u.int_in_range(-16i32..=16)? as f32,
    );
    if u.ratio(1, 8)? {
        origin.x += 0.5;
    }
    let mut field = SparseField::new(dims, origin, Vec3f::repeat(1.0));

    let count = u.int_in_range(0..=64)?;
    for _ in 0..count {
        let location = Vec3i::new(
            u.int_in_range(0..=dims.x - 1)?,
            u.int_in_range(0..=dims.y - 1)?,
            u.int_in_range(0..=dims.z - 1)?,
        );
        let value: f32 = u.arbitrary()?;
        field.add_value(&location, value);
    }
    Ok(field)
}

impl<'a> Arbitrary<'a> for FuzzPair {
    fn arbitrary(u: &mut Unstructured<'a>) -> Result<Self> {
        Ok(FuzzPair {
            a: arbitrary_field(u)?,
            b: arbitrary_field(u)?,
        })
    }
}

fuzz_target!(|pair: FuzzPair| {
    let FuzzPair { a, b } = pair;

    if let Ok(product) = voxfield::multiply(&a, &b) {
        assert!(product.len() <= a.len());
        for (location, _) in product.iter() {
            assert!(a.has_field_value(&location));
        }
    }
    let _ = voxfield::divide(&a, &b);

    if let Ok(sum) = voxfield::add(&a, &b) {
        assert!(sum.len() <= a.len() + b.len());
        let _ = SparseField::from_bytes(&sum.to_bytes()).expect("sum must round-trip");
    }
});
