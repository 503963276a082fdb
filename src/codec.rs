//! Binary field persistence format.
//!
//! All integers and floats are big-endian.
//!
//! ```text
//! version     u32 byte length + UTF-16BE code units ("2.0.0")
//! dimensions  i32 x3
//! origin      f32 x3
//! voxel size  f32 x3
//! index map   u32 count, then count x (i64 location index, i32 value index)
//! values      u32 count, then count x f32
//! ```
//!
//! Decoding validates the field invariants: location indices are
//! non-negative, unique and decodable to a voxel location, every value index
//! points into the value array, and the map and value array have the same
//! length.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::Path;

use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::field::{LocationIndex, SparseField};
use crate::geometry::{Vec3f, Vec3i};

/// Format version written and accepted by this crate
pub const FORMAT_VERSION: &str = "2.0.0";

const NULL_STRING: u32 = 0xFFFF_FFFF;

// Upper bound on speculative allocations driven by untrusted counts
const MAX_PREALLOC: usize = 1 << 16;

// ---- Write primitives ----

fn write_u32<W: Write>(w: &mut W, val: u32) -> io::Result<()> {
    w.write_all(&val.to_be_bytes())
}

fn write_i32<W: Write>(w: &mut W, val: i32) -> io::Result<()> {
    w.write_all(&val.to_be_bytes())
}

fn write_i64<W: Write>(w: &mut W, val: i64) -> io::Result<()> {
    w.write_all(&val.to_be_bytes())
}

fn write_f32<W: Write>(w: &mut W, val: f32) -> io::Result<()> {
    w.write_all(&val.to_be_bytes())
}

fn write_string<W: Write>(w: &mut W, s: &str) -> io::Result<()> {
    let units: Vec<u16> = s.encode_utf16().collect();
    write_u32(w, (units.len() * 2) as u32)?;
    for unit in units {
        w.write_all(&unit.to_be_bytes())?;
    }
    Ok(())
}

fn write_vec3i<W: Write>(w: &mut W, v: &Vec3i) -> io::Result<()> {
    v.iter().try_for_each(|&c| write_i32(w, c))
}

fn write_vec3f<W: Write>(w: &mut W, v: &Vec3f) -> io::Result<()> {
    v.iter().try_for_each(|&c| write_f32(w, c))
}

// ---- Read primitives ----

fn read_array<R: Read, const N: usize>(r: &mut R, context: &str) -> Result<[u8; N]> {
    let mut buf = [0u8; N];
    r.read_exact(&mut buf).map_err(|e| match e.kind() {
        io::ErrorKind::UnexpectedEof => Error::corrupt(context, "unexpected end of data"),
        _ => Error::Io(e),
    })?;
    Ok(buf)
}

fn read_u32<R: Read>(r: &mut R, context: &str) -> Result<u32> {
    Ok(u32::from_be_bytes(read_array(r, context)?))
}

fn read_i32<R: Read>(r: &mut R, context: &str) -> Result<i32> {
    Ok(i32::from_be_bytes(read_array(r, context)?))
}

fn read_i64<R: Read>(r: &mut R, context: &str) -> Result<i64> {
    Ok(i64::from_be_bytes(read_array(r, context)?))
}

fn read_f32<R: Read>(r: &mut R, context: &str) -> Result<f32> {
    Ok(f32::from_be_bytes(read_array(r, context)?))
}

fn read_string<R: Read>(r: &mut R, context: &str) -> Result<Option<String>> {
    let byte_len = read_u32(r, context)?;
    if byte_len == NULL_STRING {
        return Ok(None);
    }
    if byte_len % 2 != 0 {
        return Err(Error::corrupt(context, "odd UTF-16 byte length"));
    }
    let unit_count = (byte_len / 2) as usize;
    let mut units = Vec::with_capacity(unit_count.min(MAX_PREALLOC));
    for _ in 0..unit_count {
        units.push(u16::from_be_bytes(read_array(r, context)?));
    }
    String::from_utf16(&units)
        .map(Some)
        .map_err(|e| Error::corrupt(context, e))
}

fn read_vec3i<R: Read>(r: &mut R, context: &str) -> Result<Vec3i> {
    Ok(Vec3i::new(
        read_i32(r, context)?,
        read_i32(r, context)?,
        read_i32(r, context)?,
    ))
}

fn read_vec3f<R: Read>(r: &mut R, context: &str) -> Result<Vec3f> {
    Ok(Vec3f::new(
        read_f32(r, context)?,
        read_f32(r, context)?,
        read_f32(r, context)?,
    ))
}

fn read_index_map<R: Read>(r: &mut R) -> Result<BTreeMap<LocationIndex, usize>> {
    let count = read_u32(r, "index map")?;
    let mut map = BTreeMap::new();
    for _ in 0..count {
        let index = read_i64(r, "index map")?;
        let slot = read_i32(r, "index map")?;
        if index < 0 {
            return Err(Error::corrupt(
                "index map",
                format!("negative location index {}", index),
            ));
        }
        let slot = usize::try_from(slot).map_err(|_| {
            Error::corrupt("index map", format!("negative value index {}", slot))
        })?;
        if map.insert(index, slot).is_some() {
            return Err(Error::corrupt(
                "index map",
                format!("duplicate location index {}", index),
            ));
        }
    }
    Ok(map)
}

fn read_values<R: Read>(r: &mut R) -> Result<Vec<f32>> {
    let count = read_u32(r, "values")? as usize;
    let mut values = Vec::with_capacity(count.min(MAX_PREALLOC));
    for _ in 0..count {
        values.push(read_f32(r, "values")?);
    }
    Ok(values)
}

fn validate_slots(index_map: &BTreeMap<LocationIndex, usize>, value_count: usize) -> Result<()> {
    if index_map.len() != value_count {
        return Err(Error::corrupt(
            "field",
            format!(
                "{} locations but {} values",
                index_map.len(),
                value_count
            ),
        ));
    }
    let mut seen = vec![false; value_count];
    for (&index, &slot) in index_map {
        match seen.get_mut(slot) {
            Some(used) if !*used => *used = true,
            Some(_) => {
                return Err(Error::corrupt(
                    "index map",
                    format!("value index {} referenced twice", slot),
                ));
            }
            None => {
                return Err(Error::corrupt(
                    "index map",
                    format!(
                        "value index {} of location {} outside {} values",
                        slot, index, value_count
                    ),
                ));
            }
        }
    }
    Ok(())
}

impl SparseField {
    /// Serialize the field to a writer
    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        write_string(writer, FORMAT_VERSION)?;
        write_vec3i(writer, &self.dimensions)?;
        write_vec3f(writer, &self.origin)?;
        write_vec3f(writer, &self.voxel_size)?;

        write_u32(writer, self.index_map.len() as u32)?;
        for (&index, &slot) in &self.index_map {
            write_i64(writer, index)?;
            write_i32(writer, slot as i32)?;
        }

        write_u32(writer, self.values.len() as u32)?;
        for &value in &self.values {
            write_f32(writer, value)?;
        }
        Ok(())
    }

    /// Deserialize a field from a reader
    ///
    /// # Errors
    ///
    /// - [`Error::VersionMismatch`] if the version tag is not [`FORMAT_VERSION`]
    /// - [`Error::CorruptData`] if the stream is truncated, violates the
    ///   field invariants, or holds a location index that does not round-trip
    ///   through the dimensions
    pub fn read_from<R: Read>(reader: &mut R) -> Result<Self> {
        let version = read_string(reader, "version")?.unwrap_or_default();
        if version != FORMAT_VERSION {
            return Err(Error::VersionMismatch {
                found: version,
                expected: FORMAT_VERSION,
            });
        }

        let dimensions = read_vec3i(reader, "dimensions")?;
        let origin = read_vec3f(reader, "origin")?;
        let voxel_size = read_vec3f(reader, "voxel size")?;
        let index_map = read_index_map(reader)?;
        let values = read_values(reader)?;
        validate_slots(&index_map, values.len())?;

        let field = Self {
            dimensions,
            origin,
            voxel_size,
            index_map,
            values,
        };
        // Iteration decodes keys without a round-trip check
        if let Some(&index) = field
            .index_map
            .keys()
            .find(|&&index| field.xyz_from_index(index).is_err())
        {
            return Err(Error::corrupt(
                "index map",
                format!(
                    "location index {} does not map to a voxel of dimensions {:?}",
                    index, field.dimensions
                ),
            ));
        }
        Ok(field)
    }

    /// Serialize the field into a byte buffer
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buffer = Vec::with_capacity(self.encoded_len());
        // Writing into a Vec cannot fail
        let _ = self.write_to(&mut buffer);
        buffer
    }

    /// Deserialize a field from a byte buffer
    pub fn from_bytes(mut bytes: &[u8]) -> Result<Self> {
        Self::read_from(&mut bytes)
    }

    /// Exact size of the serialized field in bytes
    pub fn encoded_len(&self) -> usize {
        let version = 4 + FORMAT_VERSION.encode_utf16().count() * 2;
        let grid = 3 * 4 * 3;
        let map = 4 + self.index_map.len() * (8 + 4);
        let values = 4 + self.values.len() * 4;
        version + grid + map + values
    }

    /// Save the field to a file
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the file cannot be created or written.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let file = File::create(path).inspect_err(|e| {
            warn!(path = %path.display(), error = %e, "could not open file for writing");
        })?;
        let mut writer = BufWriter::new(file);
        self.write_to(&mut writer)?;
        writer.flush()?;
        info!(path = %path.display(), locations = self.len(), "saved sparse field");
        Ok(())
    }

    /// Load a field from a file
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the file cannot be opened, or any decoding
    /// error from [`SparseField::read_from`].
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).inspect_err(|e| {
            warn!(path = %path.display(), error = %e, "cannot open file for reading");
        })?;
        let field = Self::read_from(&mut BufReader::new(file))?;
        info!(path = %path.display(), locations = field.len(), "loaded sparse field");
        Ok(field)
    }
}
