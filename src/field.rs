//! Sparse scalar fields on regular voxel grids
//!
//! A [`SparseField`] addresses every voxel of its grid through a flat index but
//! only stores the voxels that were explicitly given a value. Storage is split
//! into an ordered map from flat location index to value position and a dense,
//! contiguous value array. Locations absent from the map read as
//! [`DEFAULT_FIELD_VALUE`].

use std::collections::BTreeMap;

use crate::error::{Error, Result};
use crate::geometry::{BoundingBox, Vec3f, Vec3i};
use crate::grid::GridCoordinates;
use crate::operator::FieldOperator;

/// Value reported for locations that hold no stored value
pub const DEFAULT_FIELD_VALUE: f32 = 0.0;

/// Values at or below this threshold do not count towards [`SparseField::non_zero_box`]
pub const NON_ZERO_THRESHOLD: f32 = 1.0e-4;

/// Flat location index of a voxel
pub type LocationIndex = i64;

/// A sparse scalar field over a regular 3D grid
///
/// Invariants:
/// - `index_map.len() == values.len()`
/// - every value position in the map is a valid index into `values`
/// - every value position is referenced exactly once
///
/// Dimensions are fixed at construction; entries are only ever created by
/// [`SparseField::add_value`].
#[derive(Debug, Clone, PartialEq)]
pub struct SparseField {
    pub(crate) dimensions: Vec3i,
    pub(crate) origin: Vec3f,
    pub(crate) voxel_size: Vec3f,
    pub(crate) index_map: BTreeMap<LocationIndex, usize>,
    pub(crate) values: Vec<f32>,
}

impl SparseField {
    /// Create an empty (all-default) field
    pub fn new(dimensions: Vec3i, origin: Vec3f, voxel_size: Vec3f) -> Self {
        Self {
            dimensions,
            origin,
            voxel_size,
            index_map: BTreeMap::new(),
            values: Vec::new(),
        }
    }

    /// Create an empty field on the grid described by `coordinates`
    pub fn from_coordinates(coordinates: &GridCoordinates) -> Self {
        Self::new(
            coordinates.dimensions,
            coordinates.origin,
            coordinates.spacing,
        )
    }

    /// Create a field from parallel location and value lists
    ///
    /// A location listed more than once accumulates its values.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SizeMismatch`] if the lists differ in length.
    pub fn from_locations(
        dimensions: Vec3i,
        locations: &[Vec3i],
        values: &[f32],
        origin: Vec3f,
        voxel_size: Vec3f,
    ) -> Result<Self> {
        if locations.len() != values.len() {
            return Err(Error::SizeMismatch {
                locations: locations.len(),
                values: values.len(),
            });
        }

        let mut field = Self::new(dimensions, origin, voxel_size);
        for (location, &value) in locations.iter().zip(values) {
            field.add_value(location, value);
        }
        Ok(field)
    }

    /// Number of voxels along each axis
    pub fn dimensions(&self) -> Vec3i {
        self.dimensions
    }

    /// Spatial position of the grid's minimum corner
    pub fn origin(&self) -> Vec3f {
        self.origin
    }

    /// Edge lengths of a voxel
    pub fn voxel_size(&self) -> Vec3f {
        self.voxel_size
    }

    /// Grid descriptor of this field
    pub fn coordinates(&self) -> GridCoordinates {
        GridCoordinates::new(self.origin, self.dimensions, self.voxel_size)
    }

    /// Number of defined locations
    pub fn len(&self) -> usize {
        self.index_map.len()
    }

    /// Whether no location holds a value
    pub fn is_empty(&self) -> bool {
        self.index_map.is_empty()
    }

    /// Flat index of a voxel location (row-major, x fastest)
    ///
    /// No bounds check is made; out-of-range locations yield indices that may
    /// alias other voxels or be negative.
    pub fn index_from_xyz(&self, location: &Vec3i) -> LocationIndex {
        let dim_x = i64::from(self.dimensions.x);
        let dim_y = i64::from(self.dimensions.y);
        i64::from(location.z)
            .wrapping_mul(dim_x.wrapping_mul(dim_y))
            .wrapping_add(i64::from(location.y) * dim_x)
            .wrapping_add(i64::from(location.x))
    }

    /// Voxel location of a flat index
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidIndex`] for a negative index
    /// - [`Error::IndexRoundTrip`] if the decoded location does not encode
    ///   back to `index` (e.g. degenerate dimensions)
    pub fn xyz_from_index(&self, index: LocationIndex) -> Result<Vec3i> {
        if index < 0 {
            return Err(Error::InvalidIndex(index));
        }
        let location = self.split_index(index);
        if self.index_from_xyz(&location) != index {
            return Err(Error::IndexRoundTrip {
                index,
                dimensions: self.dimensions,
            });
        }
        Ok(location)
    }

    // Degenerate x/y extents are clamped to 1 to keep the division defined;
    // the round-trip check in xyz_from_index rejects the result.
    fn split_index(&self, index: LocationIndex) -> Vec3i {
        let dim_x = i64::from(self.dimensions.x).max(1);
        let plane = dim_x * i64::from(self.dimensions.y).max(1);
        let z = index / plane;
        let remainder = index - z * plane;
        let y = remainder / dim_x;
        let x = remainder - y * dim_x;
        Vec3i::new(x as i32, y as i32, z as i32)
    }

    /// Value at `location`, or [`DEFAULT_FIELD_VALUE`] if none is stored
    pub fn field_value(&self, location: &Vec3i) -> f32 {
        self.index_map
            .get(&self.index_from_xyz(location))
            .map_or(DEFAULT_FIELD_VALUE, |&slot| self.values[slot])
    }

    pub(crate) fn stored_value(&self, location: &Vec3i) -> Option<f32> {
        self.index_map
            .get(&self.index_from_xyz(location))
            .map(|&slot| self.values[slot])
    }

    /// Whether `location` holds a stored value
    pub fn has_field_value(&self, location: &Vec3i) -> bool {
        self.index_map.contains_key(&self.index_from_xyz(location))
    }

    /// Overwrite the value at an already defined location
    ///
    /// # Errors
    ///
    /// Returns [`Error::UndefinedLocation`] if the location holds no value;
    /// the field is left unchanged.
    pub fn set_field_value(&mut self, location: &Vec3i, value: f32) -> Result<()> {
        let slot = *self
            .index_map
            .get(&self.index_from_xyz(location))
            .ok_or(Error::UndefinedLocation(*location))?;
        self.values[slot] = value;
        Ok(())
    }

    /// Add `value` to the location, creating the entry if it is undefined
    pub fn add_value(&mut self, location: &Vec3i, value: f32) {
        let index = self.index_from_xyz(location);
        match self.index_map.get(&index) {
            Some(&slot) => self.values[slot] += value,
            None => {
                self.index_map.insert(index, self.values.len());
                self.values.push(value);
            }
        }
    }

    /// Scale every stored value in place
    pub fn multiply(&mut self, factor: f32) {
        for value in &mut self.values {
            *value *= factor;
        }
    }

    /// Deep copy with every stored value scaled by `factor`
    pub fn scaled(&self, factor: f32) -> SparseField {
        let mut result = self.clone();
        result.multiply(factor);
        result
    }

    /// Sum of all stored values
    pub fn field_sum(&self) -> f32 {
        self.values.iter().map(|&v| f64::from(v)).sum::<f64>() as f32
    }

    /// Replace every stored value `v` with `operator.calculate(v)`
    pub fn apply_operator<O: FieldOperator + ?Sized>(&mut self, operator: &O) {
        for value in &mut self.values {
            *value = operator.calculate(*value);
        }
    }

    /// Iterate over `(location, value)` pairs in ascending flat-index order
    pub fn iter(&self) -> Iter<'_> {
        Iter {
            field: self,
            entries: self.index_map.iter(),
        }
    }

    /// Defined locations and their values as parallel lists
    pub fn field_values(&self) -> (Vec<Vec3i>, Vec<f32>) {
        self.iter().unzip()
    }

    /// Ordered map from flat index to `coefficient * ln(v)` for values above `eps`
    pub fn log_scaled_values(&self, coefficient: f32, eps: f32) -> BTreeMap<LocationIndex, f32> {
        self.index_map
            .iter()
            .filter_map(|(&index, &slot)| {
                let value = self.values[slot];
                (value > eps).then(|| (index, coefficient * value.ln()))
            })
            .collect()
    }

    /// Voxel whose box contains the spatial point `p`
    ///
    /// # Errors
    ///
    /// Returns [`Error::OutOfGrid`] if `p` lies below the origin or beyond the
    /// last voxel on any axis, or has a NaN or infinite coordinate.
    pub fn voxel_containing_point(&self, p: &Vec3f) -> Result<Vec3i> {
        let shifted = p - self.origin;
        let mut voxel = Vec3i::zeros();
        for axis in 0..3 {
            let index = (shifted[axis] / self.voxel_size[axis]).floor();
            // NaN fails both comparisons, so test for the accepted range
            let inside = index >= 0.0 && index < self.dimensions[axis] as f32;
            if !inside {
                return Err(Error::OutOfGrid { point: *p, axis });
            }
            voxel[axis] = index as i32;
        }
        Ok(voxel)
    }

    /// Whether `p` lies inside the grid
    pub fn in_range(&self, p: &Vec3f) -> bool {
        self.voxel_containing_point(p).is_ok()
    }

    /// Spatial box covered by voxel `v`
    pub fn voxel_box(&self, v: &Vec3i) -> BoundingBox {
        let min = self.origin + v.cast::<f32>().component_mul(&self.voxel_size);
        let max = self.origin + (v.cast::<f32>() + Vec3f::repeat(1.0)).component_mul(&self.voxel_size);
        BoundingBox::new(min, max)
    }

    /// Spatial centre of voxel `v`
    pub fn voxel_center(&self, v: &Vec3i) -> Vec3f {
        self.origin + (v.cast::<f32>() + Vec3f::repeat(0.5)).component_mul(&self.voxel_size)
    }

    /// Spatial centre of the voxel with the given flat index
    pub fn spatial_location(&self, index: LocationIndex) -> Result<Vec3f> {
        Ok(self.voxel_center(&self.xyz_from_index(index)?))
    }

    /// Spatial box covering every voxel whose value exceeds [`NON_ZERO_THRESHOLD`]
    ///
    /// Returns [`BoundingBox::empty`] when no value exceeds the threshold.
    pub fn non_zero_box(&self) -> BoundingBox {
        let mut bounds: Option<(Vec3i, Vec3i)> = None;
        for (location, value) in self.iter() {
            if value <= NON_ZERO_THRESHOLD {
                continue;
            }
            bounds = Some(match bounds {
                None => (location, location),
                Some((lo, hi)) => (
                    lo.zip_map(&location, |a, b| a.min(b)),
                    hi.zip_map(&location, |a, b| a.max(b)),
                ),
            });
        }

        match bounds {
            Some((lo, hi)) => BoundingBox::new(self.voxel_box(&lo).min, self.voxel_box(&hi).max),
            None => BoundingBox::empty(),
        }
    }
}

impl Default for SparseField {
    fn default() -> Self {
        Self::from_coordinates(&GridCoordinates::default())
    }
}

/// Iterator over the defined `(location, value)` pairs of a [`SparseField`]
pub struct Iter<'a> {
    field: &'a SparseField,
    entries: std::collections::btree_map::Iter<'a, LocationIndex, usize>,
}

impl Iterator for Iter<'_> {
    type Item = (Vec3i, f32);

    fn next(&mut self) -> Option<Self::Item> {
        let (&index, &slot) = self.entries.next()?;
        Some((self.field.split_index(index), self.field.values[slot]))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.entries.size_hint()
    }
}

impl ExactSizeIterator for Iter<'_> {}

impl<'a> IntoIterator for &'a SparseField {
    type Item = (Vec3i, f32);
    type IntoIter = Iter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field(dims: (i32, i32, i32)) -> SparseField {
        SparseField::new(
            Vec3i::new(dims.0, dims.1, dims.2),
            Vec3f::zeros(),
            Vec3f::repeat(1.0),
        )
    }

    #[test]
    fn test_undefined_location_reads_default() {
        let f = field((4, 4, 4));
        let loc = Vec3i::new(1, 2, 3);
        assert_eq!(f.field_value(&loc), DEFAULT_FIELD_VALUE);
        assert!(!f.has_field_value(&loc));
        assert!(f.is_empty());
    }

    #[test]
    fn test_add_value_accumulates() {
        let mut f = field((4, 4, 4));
        let loc = Vec3i::new(1, 2, 3);
        f.add_value(&loc, 1.5);
        f.add_value(&loc, 2.0);
        assert_eq!(f.field_value(&loc), 3.5);
        assert_eq!(f.len(), 1);
        assert_eq!(f.values.len(), 1);
    }

    #[test]
    fn test_set_field_value_requires_existing_entry() {
        let mut f = field((4, 4, 4));
        let loc = Vec3i::new(0, 1, 0);
        assert!(matches!(
            f.set_field_value(&loc, 1.0),
            Err(Error::UndefinedLocation(l)) if l == loc
        ));
        assert!(f.is_empty());

        f.add_value(&loc, 1.0);
        f.set_field_value(&loc, 7.0).unwrap();
        assert_eq!(f.field_value(&loc), 7.0);
    }

    #[test]
    fn test_index_layout() {
        let f = field((3, 4, 5));
        assert_eq!(f.index_from_xyz(&Vec3i::new(0, 0, 0)), 0);
        assert_eq!(f.index_from_xyz(&Vec3i::new(1, 0, 0)), 1);
        assert_eq!(f.index_from_xyz(&Vec3i::new(0, 1, 0)), 3);
        assert_eq!(f.index_from_xyz(&Vec3i::new(0, 0, 1)), 12);
        assert_eq!(f.xyz_from_index(59).unwrap(), Vec3i::new(2, 3, 4));
    }

    #[test]
    fn test_index_round_trip() {
        let f = field((7, 3, 5));
        for z in 0..5 {
            for y in 0..3 {
                for x in 0..7 {
                    let loc = Vec3i::new(x, y, z);
                    assert_eq!(f.xyz_from_index(f.index_from_xyz(&loc)).unwrap(), loc);
                }
            }
        }
    }

    #[test]
    fn test_negative_index_is_invalid() {
        let f = field((2, 2, 2));
        assert!(matches!(f.xyz_from_index(-1), Err(Error::InvalidIndex(-1))));
    }

    #[test]
    fn test_degenerate_dimensions_fail_round_trip() {
        let f = field((0, 0, 0));
        assert!(matches!(
            f.xyz_from_index(5),
            Err(Error::IndexRoundTrip { index: 5, .. })
        ));
    }

    #[test]
    fn test_from_locations() {
        let locations = [Vec3i::new(0, 0, 0), Vec3i::new(1, 1, 1)];
        let f = SparseField::from_locations(
            Vec3i::new(2, 2, 2),
            &locations,
            &[1.0, 2.0],
            Vec3f::zeros(),
            Vec3f::repeat(1.0),
        )
        .unwrap();
        assert_eq!(f.len(), 2);
        assert_eq!(f.field_value(&locations[1]), 2.0);

        let err = SparseField::from_locations(
            Vec3i::new(2, 2, 2),
            &locations,
            &[1.0],
            Vec3f::zeros(),
            Vec3f::repeat(1.0),
        );
        assert!(matches!(
            err,
            Err(Error::SizeMismatch {
                locations: 2,
                values: 1
            })
        ));
    }

    #[test]
    fn test_from_locations_repeated_location_accumulates() {
        let loc = Vec3i::new(1, 0, 0);
        let f = SparseField::from_locations(
            Vec3i::new(2, 2, 2),
            &[loc, loc],
            &[1.0, 4.0],
            Vec3f::zeros(),
            Vec3f::repeat(1.0),
        )
        .unwrap();
        assert_eq!(f.len(), 1);
        assert_eq!(f.field_value(&loc), 5.0);
    }

    #[test]
    fn test_multiply_and_sum() {
        let mut f = field((4, 4, 4));
        f.add_value(&Vec3i::new(0, 0, 0), 1.0);
        f.add_value(&Vec3i::new(1, 0, 0), 2.0);
        f.add_value(&Vec3i::new(2, 3, 1), 3.0);
        assert_eq!(f.field_sum(), 6.0);

        let copy = f.scaled(2.0);
        assert_eq!(copy.field_sum(), 12.0);
        assert_eq!(f.field_sum(), 6.0);

        f.multiply(0.5);
        assert_eq!(f.field_sum(), 3.0);
    }

    #[test]
    fn test_apply_closure_operator() {
        let mut f = field((2, 2, 2));
        f.add_value(&Vec3i::new(0, 0, 0), 3.0);
        f.add_value(&Vec3i::new(1, 1, 1), -2.0);
        f.apply_operator(&|v: f32| v * v);
        assert_eq!(f.field_value(&Vec3i::new(0, 0, 0)), 9.0);
        assert_eq!(f.field_value(&Vec3i::new(1, 1, 1)), 4.0);
    }

    #[test]
    fn test_iter_in_index_order() {
        let mut f = field((3, 3, 3));
        f.add_value(&Vec3i::new(2, 2, 2), 1.0);
        f.add_value(&Vec3i::new(0, 0, 0), 2.0);
        f.add_value(&Vec3i::new(1, 0, 1), 3.0);

        let (locations, values) = f.field_values();
        assert_eq!(
            locations,
            vec![Vec3i::new(0, 0, 0), Vec3i::new(1, 0, 1), Vec3i::new(2, 2, 2)]
        );
        assert_eq!(values, vec![2.0, 3.0, 1.0]);
        assert_eq!(f.iter().len(), 3);
    }

    #[test]
    fn test_log_scaled_values() {
        let mut f = field((3, 1, 1));
        f.add_value(&Vec3i::new(0, 0, 0), std::f32::consts::E);
        f.add_value(&Vec3i::new(1, 0, 0), 0.0);
        f.add_value(&Vec3i::new(2, 0, 0), 1.0);

        let scaled = f.log_scaled_values(2.0, 1e-3);
        assert_eq!(scaled.len(), 2);
        assert!((scaled[&0] - 2.0).abs() < 1e-5);
        assert_eq!(scaled[&2], 0.0);
    }

    #[test]
    fn test_voxel_containing_point() {
        let f = SparseField::new(
            Vec3i::new(10, 10, 10),
            Vec3f::new(-5.0, 0.0, 100.0),
            Vec3f::new(1.0, 2.0, 0.5),
        );
        let voxel = f
            .voxel_containing_point(&Vec3f::new(-4.5, 3.9, 104.9))
            .unwrap();
        assert_eq!(voxel, Vec3i::new(0, 1, 9));

        assert!(matches!(
            f.voxel_containing_point(&Vec3f::new(-5.5, 0.0, 100.0)),
            Err(Error::OutOfGrid { axis: 0, .. })
        ));
        assert!(matches!(
            f.voxel_containing_point(&Vec3f::new(0.0, 20.0, 100.0)),
            Err(Error::OutOfGrid { axis: 1, .. })
        ));
        assert!(f.in_range(&Vec3f::new(4.9, 19.9, 104.9)));
        assert!(!f.in_range(&Vec3f::new(4.9, 19.9, 105.0)));
    }

    #[test]
    fn test_non_finite_point_is_out_of_grid() {
        let f = field((4, 4, 4));
        for bad in [f32::NAN, f32::INFINITY, f32::NEG_INFINITY] {
            let p = Vec3f::new(bad, 1.0, 1.0);
            assert!(!f.in_range(&p));
            assert!(matches!(
                f.voxel_containing_point(&p),
                Err(Error::OutOfGrid { axis: 0, .. })
            ));
        }
        assert!(matches!(
            f.voxel_containing_point(&Vec3f::new(1.0, 1.0, f32::NAN)),
            Err(Error::OutOfGrid { axis: 2, .. })
        ));
        assert_eq!(
            f.voxel_containing_point(&Vec3f::new(0.0, 1.5, 3.99)).unwrap(),
            Vec3i::new(0, 1, 3)
        );
    }

    #[test]
    fn test_voxel_box_and_center() {
        let f = SparseField::new(
            Vec3i::new(10, 10, 10),
            Vec3f::new(1.0, 2.0, 3.0),
            Vec3f::new(2.0, 2.0, 2.0),
        );
        let b = f.voxel_box(&Vec3i::new(1, 0, 2));
        assert_eq!(b.min, Vec3f::new(3.0, 2.0, 7.0));
        assert_eq!(b.max, Vec3f::new(5.0, 4.0, 9.0));
        assert_eq!(f.voxel_center(&Vec3i::new(1, 0, 2)), Vec3f::new(4.0, 3.0, 8.0));

        let index = f.index_from_xyz(&Vec3i::new(1, 0, 2));
        assert_eq!(f.spatial_location(index).unwrap(), Vec3f::new(4.0, 3.0, 8.0));
    }

    #[test]
    fn test_non_zero_box() {
        let mut f = field((10, 10, 10));
        f.add_value(&Vec3i::new(0, 0, 0), 1e-6);
        f.add_value(&Vec3i::new(2, 5, 1), 1.0);
        f.add_value(&Vec3i::new(4, 3, 7), 2.0);
        f.add_value(&Vec3i::new(9, 9, 9), -3.0);

        let b = f.non_zero_box();
        assert!(!b.is_empty());
        assert_eq!(b.min, Vec3f::new(2.0, 3.0, 1.0));
        assert_eq!(b.max, Vec3f::new(5.0, 6.0, 8.0));
    }

    #[test]
    fn test_non_zero_box_empty() {
        let mut f = field((10, 10, 10));
        assert!(f.non_zero_box().is_empty());
        f.add_value(&Vec3i::new(1, 1, 1), 1e-5);
        assert!(f.non_zero_box().is_empty());
    }
}
