//! Compact columnar encoding (bincode struct-of-arrays)
//!
//! Geometry is flattened into three offset columns:
//!
//! - `part_offsets[i]..part_offsets[i + 1]`: polygons of record `i`
//! - `ring_offsets[p]..ring_offsets[p + 1]`: rings of polygon `p`, exterior first
//! - `coord_offsets[r]..coord_offsets[r + 1]`: positions of ring `r` in `xs`/`ys`

use super::{CountyBoundary, NormalizedDataset, check_declared_bbox};
use crate::{LoadError, Result, geometry};
use bincode::Options;
use geo::{BoundingRect, Coord, LineString, MultiPolygon, Polygon};
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};
use std::ops::Range;

/// Bumped whenever the column layout changes
pub const COLUMNAR_FORMAT_VERSION: u16 = 1;

/// Guard against absurd allocations from a damaged length prefix
const SIZE_LIMIT: u64 = 1024 * 1024 * 1024;

#[derive(Debug, Default, Serialize, Deserialize)]
struct ColumnarDataset {
    format_version: u16,
    state_codes: Vec<String>,
    county_codes: Vec<String>,
    names: Vec<String>,
    /// `[min_lon, min_lat, max_lon, max_lat]` per record
    bboxes: Vec<[f64; 4]>,
    part_offsets: Vec<u32>,
    ring_offsets: Vec<u32>,
    coord_offsets: Vec<u32>,
    xs: Vec<f64>,
    ys: Vec<f64>,
}

fn options() -> impl Options {
    bincode::DefaultOptions::new().with_limit(SIZE_LIMIT)
}

pub(super) fn read<R: Read>(mut reader: R) -> Result<NormalizedDataset> {
    let mut data = Vec::new();
    reader.read_to_end(&mut data).map_err(|e| {
        LoadError::SchemaMismatch(format!("failed to read columnar payload: {e}"))
    })?;

    let columns: ColumnarDataset = options()
        .deserialize(&data)
        .map_err(|e| LoadError::SchemaMismatch(format!("not a columnar dataset: {e}")))?;

    if columns.format_version != COLUMNAR_FORMAT_VERSION {
        return Err(LoadError::SchemaMismatch(format!(
            "unsupported columnar format version {} (expected {})",
            columns.format_version, COLUMNAR_FORMAT_VERSION
        )));
    }
    check_column_lengths(&columns)?;

    let ColumnarDataset {
        state_codes,
        county_codes,
        names,
        bboxes,
        ..
    } = &columns;

    let mut records = Vec::with_capacity(state_codes.len());
    for index in 0..state_codes.len() {
        let boundary = decode_boundary(&columns, index)?;
        check_declared_bbox(index, bboxes[index], &boundary)?;
        records.push(CountyBoundary {
            state_code: state_codes[index].clone(),
            county_code: county_codes[index].clone(),
            name: names[index].clone(),
            boundary,
        });
    }

    Ok(NormalizedDataset { records })
}

/// Column lengths must agree with each other; anything else is not this schema
fn check_column_lengths(columns: &ColumnarDataset) -> Result<()> {
    let n = columns.state_codes.len();
    let mismatch = |what: &str| {
        Err(LoadError::SchemaMismatch(format!(
            "column length mismatch: {what}"
        )))
    };

    if columns.county_codes.len() != n || columns.names.len() != n || columns.bboxes.len() != n {
        return mismatch("attribute columns differ in length");
    }
    if columns.part_offsets.len() != n + 1 {
        return mismatch("part_offsets");
    }
    if columns.ring_offsets.is_empty() || columns.coord_offsets.is_empty() {
        return mismatch("ring_offsets/coord_offsets are empty");
    }
    if columns.xs.len() != columns.ys.len() {
        return mismatch("xs and ys");
    }
    Ok(())
}

fn decode_boundary(columns: &ColumnarDataset, index: usize) -> Result<MultiPolygon<f64>> {
    let corrupt = |reason: &str| LoadError::Corrupt {
        record: index,
        reason: reason.to_string(),
    };

    let parts = offset_range(&columns.part_offsets, index, columns.ring_offsets.len() - 1)
        .ok_or_else(|| corrupt("part offsets out of range"))?;

    let mut polygons = Vec::with_capacity(parts.len());
    for part in parts {
        let rings = offset_range(&columns.ring_offsets, part, columns.coord_offsets.len() - 1)
            .ok_or_else(|| corrupt("ring offsets out of range"))?;

        let mut line_strings = Vec::with_capacity(rings.len());
        for ring in rings {
            let coords = offset_range(&columns.coord_offsets, ring, columns.xs.len())
                .ok_or_else(|| corrupt("coordinate offsets out of range"))?;
            line_strings.push(LineString::new(
                coords
                    .map(|i| Coord {
                        x: columns.xs[i],
                        y: columns.ys[i],
                    })
                    .collect(),
            ));
        }

        if line_strings.is_empty() {
            return Err(corrupt("polygon has no rings"));
        }
        let exterior = line_strings.remove(0);
        polygons.push(Polygon::new(exterior, line_strings));
    }

    Ok(MultiPolygon::new(polygons))
}

/// `offsets[i]..offsets[i + 1]`, provided it is ordered and ends at or before `limit`
fn offset_range(offsets: &[u32], i: usize, limit: usize) -> Option<Range<usize>> {
    let start = *offsets.get(i)? as usize;
    let end = *offsets.get(i + 1)? as usize;
    (start <= end && end <= limit).then_some(start..end)
}

pub(super) fn write<W: Write>(dataset: &NormalizedDataset, writer: W) -> std::io::Result<()> {
    let mut columns = ColumnarDataset {
        format_version: COLUMNAR_FORMAT_VERSION,
        part_offsets: vec![0],
        ring_offsets: vec![0],
        coord_offsets: vec![0],
        ..Default::default()
    };

    for record in &dataset.records {
        let bbox = record.boundary.bounding_rect().ok_or_else(|| {
            std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!(
                    "county {}{} has an empty boundary",
                    record.state_code, record.county_code
                ),
            )
        })?;

        columns.state_codes.push(record.state_code.clone());
        columns.county_codes.push(record.county_code.clone());
        columns.names.push(record.name.clone());
        columns.bboxes.push(geometry::rect_to_array(&bbox));

        for polygon in &record.boundary {
            for ring in std::iter::once(polygon.exterior()).chain(polygon.interiors()) {
                for coord in ring.coords() {
                    columns.xs.push(coord.x);
                    columns.ys.push(coord.y);
                }
                columns.coord_offsets.push(to_offset(columns.xs.len())?);
            }
            columns
                .ring_offsets
                .push(to_offset(columns.coord_offsets.len() - 1)?);
        }
        columns
            .part_offsets
            .push(to_offset(columns.ring_offsets.len() - 1)?);
    }

    options()
        .serialize_into(writer, &columns)
        .map_err(std::io::Error::other)
}

fn to_offset(value: usize) -> std::io::Result<u32> {
    u32::try_from(value).map_err(std::io::Error::other)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{county, grid_dataset, square};

    fn encode(columns: &ColumnarDataset) -> Vec<u8> {
        options().serialize(columns).unwrap()
    }

    fn single_square_columns() -> ColumnarDataset {
        ColumnarDataset {
            format_version: COLUMNAR_FORMAT_VERSION,
            state_codes: vec!["06".to_string()],
            county_codes: vec!["037".to_string()],
            names: vec!["Los Angeles".to_string()],
            bboxes: vec![[0.0, 0.0, 1.0, 1.0]],
            part_offsets: vec![0, 1],
            ring_offsets: vec![0, 1],
            coord_offsets: vec![0, 5],
            xs: vec![0.0, 1.0, 1.0, 0.0, 0.0],
            ys: vec![0.0, 0.0, 1.0, 1.0, 0.0],
        }
    }

    #[test]
    fn test_read_hand_built_columns() {
        let bytes = encode(&single_square_columns());
        let dataset = read(bytes.as_slice()).unwrap();
        assert_eq!(dataset.len(), 1);
        assert_eq!(dataset.records[0].boundary, MultiPolygon::new(vec![square(0.0, 0.0, 1.0)]));
    }

    #[test]
    fn test_write_then_read_with_holes_and_parts() {
        let mut dataset = grid_dataset(2, 1);
        let holed = Polygon::new(
            square(0.0, 0.0, 4.0).exterior().clone(),
            vec![square(1.0, 1.0, 1.0).exterior().clone()],
        );
        dataset.records.push(county(
            "01",
            "003",
            "Holed",
            vec![holed, square(20.0, 20.0, 1.0)],
        ));

        let mut buffer = Vec::new();
        write(&dataset, &mut buffer).unwrap();
        let decoded = read(buffer.as_slice()).unwrap();
        assert_eq!(decoded, dataset);
    }

    #[test]
    fn test_wrong_version_is_schema_mismatch() {
        let mut columns = single_square_columns();
        columns.format_version = 99;
        let result = read(encode(&columns).as_slice());
        assert!(matches!(result, Err(LoadError::SchemaMismatch(_))));
    }

    #[test]
    fn test_column_length_mismatch() {
        let mut columns = single_square_columns();
        columns.names.clear();
        let result = read(encode(&columns).as_slice());
        assert!(matches!(result, Err(LoadError::SchemaMismatch(_))));
    }

    #[test]
    fn test_bad_offsets_are_corrupt() {
        let mut columns = single_square_columns();
        columns.coord_offsets = vec![0, 9];
        let result = read(encode(&columns).as_slice());
        assert!(matches!(result, Err(LoadError::Corrupt { record: 0, .. })));
    }

    #[test]
    fn test_bbox_not_enclosing_is_corrupt() {
        let mut columns = single_square_columns();
        columns.bboxes = vec![[0.0, 0.0, 0.5, 0.5]];
        let result = read(encode(&columns).as_slice());
        assert!(matches!(result, Err(LoadError::Corrupt { record: 0, .. })));
    }

    #[test]
    fn test_truncated_payload() {
        let bytes = encode(&single_square_columns());
        let result = read(&bytes[..bytes.len() / 2]);
        assert!(matches!(result, Err(LoadError::SchemaMismatch(_))));
    }

    #[test]
    fn test_trailing_garbage_rejected() {
        let mut bytes = encode(&single_square_columns());
        bytes.extend_from_slice(b"junk");
        assert!(read(bytes.as_slice()).is_err());
    }

    #[test]
    fn test_offset_range() {
        assert_eq!(offset_range(&[0, 2, 5], 1, 5), Some(2..5));
        assert_eq!(offset_range(&[0, 2, 5], 1, 4), None);
        assert_eq!(offset_range(&[0, 3, 2], 1, 5), None);
        assert_eq!(offset_range(&[0, 3], 1, 5), None);
    }
}
