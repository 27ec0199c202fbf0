//! Source loader for the bundled county boundary dataset
//!
//! The dataset ships in two interchangeable encodings:
//!
//! - [`Encoding::GeoJson`]: a self-describing GeoJSON `FeatureCollection`
//!   (one feature per county, TIGER/Line property names)
//! - [`Encoding::Columnar`]: a compact bincode struct-of-arrays
//!
//! Both decode into the same [`NormalizedDataset`]. Either file may be gzip
//! compressed, signalled by a trailing `.gz` extension. Loading is all or
//! nothing: a single bad record fails the whole load.

mod columnar;
mod geojson;

pub use columnar::COLUMNAR_FORMAT_VERSION;

use crate::{LoadError, RegionId, Result, geometry};
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use geo::{BoundingRect, LineString, MultiPolygon};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

/// Declared bounding boxes may be rounded by the producer; allow this much slack (degrees)
const BBOX_TOLERANCE: f64 = 1e-9;

/// On-disk encoding of the boundary dataset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Encoding {
    /// Verbose, self-describing GeoJSON
    #[serde(rename = "geojson")]
    GeoJson,
    /// Compact columnar bincode
    #[default]
    Columnar,
}

impl Encoding {
    /// Canonical file names looked up inside a dataset directory, plain first
    pub fn file_names(self) -> [&'static str; 2] {
        match self {
            Encoding::GeoJson => ["counties.geojson", "counties.geojson.gz"],
            Encoding::Columnar => ["counties.bin", "counties.bin.gz"],
        }
    }

    /// The other encoding
    pub fn other(self) -> Self {
        match self {
            Encoding::GeoJson => Encoding::Columnar,
            Encoding::Columnar => Encoding::GeoJson,
        }
    }

    /// Detect the encoding from a file extension, ignoring a trailing `.gz`
    pub fn from_path(path: &Path) -> Option<Self> {
        let stem_path = if is_gzip(path) {
            Path::new(path.file_stem()?)
        } else {
            path
        };
        match stem_path.extension()?.to_str()? {
            "geojson" | "json" => Some(Encoding::GeoJson),
            "bin" => Some(Encoding::Columnar),
            _ => None,
        }
    }
}

/// One county as decoded from either encoding, before any derived metadata
#[derive(Debug, Clone, PartialEq)]
pub struct CountyBoundary {
    pub state_code: String,
    pub county_code: String,
    pub name: String,
    /// Rings in (lon, lat), exterior first, holes after
    pub boundary: MultiPolygon<f64>,
}

/// The normalized in-memory representation handed to the geometry store
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NormalizedDataset {
    pub records: Vec<CountyBoundary>,
}

impl NormalizedDataset {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Validate every record, failing on the first violation.
    ///
    /// Both decoders call this, so a dataset that passes here is accepted
    /// identically whichever encoding it came from.
    pub fn validate(&self) -> Result<()> {
        if self.records.is_empty() {
            return Err(LoadError::SchemaMismatch(
                "dataset contains no records".to_string(),
            ));
        }

        let mut seen: HashMap<RegionId, usize> = HashMap::with_capacity(self.records.len());
        for (index, record) in self.records.iter().enumerate() {
            validate_record(index, record)?;

            let region_id = RegionId::new(&record.state_code, &record.county_code);
            if let Some(first) = seen.insert(region_id.clone(), index) {
                return Err(LoadError::Corrupt {
                    record: index,
                    reason: format!("duplicate region id {region_id} (first seen at record #{first})"),
                });
            }
        }
        Ok(())
    }
}

/// Load the bundled dataset.
///
/// `path_hint` may be a file (its extension picks the encoding, falling back to
/// `preferred` when unrecognised) or a directory holding `counties.bin[.gz]`
/// and/or `counties.geojson[.gz]`. In a directory the preferred encoding wins;
/// the other one is only tried when the preferred file does not exist.
pub fn load(preferred: Encoding, path_hint: impl AsRef<Path>) -> Result<NormalizedDataset> {
    #[cfg(feature = "profiling")]
    profiling::scope!("loader::load");

    let (path, encoding) = locate(preferred, path_hint.as_ref())?;
    tracing::debug!(path = %path.display(), ?encoding, "Reading county boundary dataset");

    let reader = open_stream(&path)?;
    let dataset = read(encoding, reader)?;

    tracing::info!(
        records = dataset.len(),
        path = %path.display(),
        ?encoding,
        "Loaded county boundary dataset"
    );
    Ok(dataset)
}

/// Decode and validate a dataset from an uncompressed reader
pub fn read<R: Read>(encoding: Encoding, reader: R) -> Result<NormalizedDataset> {
    let dataset = match encoding {
        Encoding::GeoJson => geojson::read(reader)?,
        Encoding::Columnar => columnar::read(reader)?,
    };
    dataset.validate()?;
    Ok(dataset)
}

/// Encode a dataset into an uncompressed writer
pub fn write<W: Write>(
    dataset: &NormalizedDataset,
    encoding: Encoding,
    writer: W,
) -> std::io::Result<()> {
    match encoding {
        Encoding::GeoJson => geojson::write(dataset, writer),
        Encoding::Columnar => columnar::write(dataset, writer),
    }
}

/// Write a dataset to `path`, gzip compressing when the path ends in `.gz`.
///
/// Converts between encodings; it does not build or repair the data.
pub fn save(dataset: &NormalizedDataset, encoding: Encoding, path: &Path) -> std::io::Result<()> {
    let writer = BufWriter::new(File::create(path)?);
    if is_gzip(path) {
        let mut encoder = GzEncoder::new(writer, Compression::default());
        write(dataset, encoding, &mut encoder)?;
        encoder.finish()?.flush()
    } else {
        let mut writer = writer;
        write(dataset, encoding, &mut writer)?;
        writer.flush()
    }
}

/// Resolve the path hint to a concrete file and its encoding
fn locate(preferred: Encoding, hint: &Path) -> Result<(PathBuf, Encoding)> {
    if hint.is_file() {
        let encoding = Encoding::from_path(hint).unwrap_or(preferred);
        return Ok((hint.to_path_buf(), encoding));
    }

    if hint.is_dir() {
        for encoding in [preferred, preferred.other()] {
            for name in encoding.file_names() {
                let candidate = hint.join(name);
                if candidate.is_file() {
                    if encoding != preferred {
                        tracing::debug!(
                            ?preferred,
                            path = %candidate.display(),
                            "Preferred encoding missing, using alternate file"
                        );
                    }
                    return Ok((candidate, encoding));
                }
            }
        }
    }

    Err(LoadError::NotFound {
        path: hint.to_path_buf(),
    })
}

/// Opens a file, buffers it, and wraps it in a gzip decoder when the name ends in `.gz`
fn open_stream(path: &Path) -> Result<Box<dyn Read>> {
    let file = File::open(path).map_err(|e| {
        tracing::debug!(path = %path.display(), error = %e, "Failed to open dataset");
        LoadError::NotFound {
            path: path.to_path_buf(),
        }
    })?;

    let reader = BufReader::new(file);
    if is_gzip(path) {
        Ok(Box::new(GzDecoder::new(reader)))
    } else {
        Ok(Box::new(reader))
    }
}

fn is_gzip(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == "gz")
}

/// Per-record checks shared by both encodings
fn validate_record(index: usize, record: &CountyBoundary) -> Result<()> {
    let corrupt = |reason: String| LoadError::Corrupt {
        record: index,
        reason,
    };

    if record.state_code.trim().is_empty() || record.county_code.trim().is_empty() {
        return Err(corrupt("empty state or county code".to_string()));
    }
    if record.boundary.0.is_empty() {
        return Err(corrupt("geometry has no polygons".to_string()));
    }

    for (part, polygon) in record.boundary.iter().enumerate() {
        if !ring_is_non_empty(polygon.exterior()) {
            return Err(corrupt(format!("polygon {part} has an empty exterior ring")));
        }
        if polygon.interiors().iter().any(|ring| !ring_is_non_empty(ring)) {
            return Err(corrupt(format!("polygon {part} has an empty hole")));
        }
        let out_of_range = std::iter::once(polygon.exterior())
            .chain(polygon.interiors())
            .flat_map(|ring| ring.coords())
            .find(|c| !geometry::is_valid_wgs84(c.y, c.x));
        if let Some(c) = out_of_range {
            return Err(corrupt(format!(
                "coordinate ({}, {}) outside WGS84 range",
                c.x, c.y
            )));
        }
    }
    Ok(())
}

/// A ring is non-empty when it has at least three distinct consecutive positions
fn ring_is_non_empty(ring: &LineString<f64>) -> bool {
    let mut distinct = ring.0.clone();
    distinct.dedup();
    if distinct.len() > 1 && distinct.first() == distinct.last() {
        distinct.pop();
    }
    distinct.len() >= 3
}

/// Fail if a bounding box declared by the dataset does not enclose the geometry
fn check_declared_bbox(index: usize, declared: [f64; 4], boundary: &MultiPolygon<f64>) -> Result<()> {
    let Some(actual) = boundary.bounding_rect() else {
        // Empty geometry is reported by validate_record
        return Ok(());
    };

    let slack = geometry::rect_from_array([
        declared[0] - BBOX_TOLERANCE,
        declared[1] - BBOX_TOLERANCE,
        declared[2] + BBOX_TOLERANCE,
        declared[3] + BBOX_TOLERANCE,
    ]);
    if declared.iter().all(|v| v.is_finite()) && geometry::rect_encloses(&slack, &actual) {
        Ok(())
    } else {
        Err(LoadError::Corrupt {
            record: index,
            reason: format!(
                "declared bbox {:?} does not enclose geometry bbox {:?}",
                declared,
                geometry::rect_to_array(&actual)
            ),
        })
    }
}
