//! CSV export of positive field values
//!
//! One row per defined location whose value is greater than zero, preceded by
//! the header `locationX,locationY,locationZ,value`. Rows appear in ascending
//! flat-index order.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use tracing::{info, warn};

use crate::error::Result;
use crate::field::SparseField;

const SEPARATOR: char = ',';

/// How locations are written to CSV
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CsvCoordinates {
    /// 1-indexed voxel coordinates
    #[default]
    Voxel,
    /// Spatial coordinates of the voxel centre
    Spatial,
}

impl SparseField {
    /// Write the positive values of the field as CSV
    pub fn write_csv<W: Write>(&self, writer: &mut W, mode: CsvCoordinates) -> Result<()> {
        writeln!(
            writer,
            "locationX{0}locationY{0}locationZ{0}value",
            SEPARATOR
        )?;
        for (location, value) in self.iter() {
            if value <= 0.0 {
                continue;
            }
            let point = match mode {
                CsvCoordinates::Voxel => location.map(|c| c as f32 + 1.0),
                CsvCoordinates::Spatial => self.voxel_center(&location),
            };
            writeln!(
                writer,
                "{1}{0}{2}{0}{3}{0}{4}",
                SEPARATOR, point.x, point.y, point.z, value
            )?;
        }
        Ok(())
    }

    /// Save the positive values of the field to a CSV file
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`](crate::Error::Io) if the file cannot be created or
    /// written.
    pub fn save_csv<P: AsRef<Path>>(&self, path: P, mode: CsvCoordinates) -> Result<()> {
        let path = path.as_ref();
        let file = File::create(path).inspect_err(|e| {
            warn!(path = %path.display(), error = %e, "could not open csv file for writing");
        })?;
        let mut writer = BufWriter::new(file);
        self.write_csv(&mut writer, mode)?;
        writer.flush()?;
        info!(path = %path.display(), mode = ?mode, "exported sparse field as csv");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{Vec3f, Vec3i};

    fn sample() -> SparseField {
        let mut f = SparseField::new(
            Vec3i::new(4, 4, 4),
            Vec3f::new(10.0, 0.0, -2.0),
            Vec3f::new(2.0, 1.0, 0.5),
        );
        f.add_value(&Vec3i::new(1, 2, 3), 0.5);
        f.add_value(&Vec3i::new(0, 0, 0), 3.0);
        f.add_value(&Vec3i::new(3, 3, 3), 0.0);
        f.add_value(&Vec3i::new(2, 0, 0), -1.0);
        f
    }

    #[test]
    fn test_voxel_csv() {
        let mut out = Vec::new();
        sample().write_csv(&mut out, CsvCoordinates::Voxel).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert_eq!(
            text,
            "locationX,locationY,locationZ,value\n1,1,1,3\n2,3,4,0.5\n"
        );
    }

    #[test]
    fn test_spatial_csv() {
        let mut out = Vec::new();
        sample().write_csv(&mut out, CsvCoordinates::Spatial).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[1], "11,0.5,-1.75,3");
        assert_eq!(lines[2], "13,2.5,-0.25,0.5");
    }

    #[test]
    fn test_save_csv_unwritable_path_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("field.csv");
        assert!(matches!(
            sample().save_csv(&path, CsvCoordinates::Voxel),
            Err(crate::Error::Io(_))
        ));
        assert!(!path.exists());
    }

    #[test]
    fn test_empty_field_writes_header_only() {
        let f = SparseField::default();
        let mut out = Vec::new();
        f.write_csv(&mut out, CsvCoordinates::default()).unwrap();
        assert_eq!(out, b"locationX,locationY,locationZ,value\n");
    }
}
