//! GeoJSON encoding: one `Feature` per county inside a `FeatureCollection`

use super::{CountyBoundary, NormalizedDataset, check_declared_bbox};
use crate::{LoadError, Result, geometry};
use geo::{BoundingRect, Coord, LineString, MultiPolygon, Polygon};
use serde::Deserialize;
use serde_json::{Map, Value, json};
use std::io::{Read, Write};

/// Accepted property names, TIGER/Line first
const STATE_KEYS: &[&str] = &["STATEFP", "state_code"];
const COUNTY_KEYS: &[&str] = &["COUNTYFP", "county_code"];
const NAME_KEYS: &[&str] = &["NAME", "name"];

/// Top-level container; features are decoded one by one so errors can name the record
#[derive(Deserialize)]
struct FeatureCollectionRaw {
    #[serde(rename = "type")]
    kind: String,
    features: Vec<Value>,
}

/// Positions may carry a third ordinate, so they are decoded as plain vectors
#[derive(Deserialize)]
#[serde(tag = "type", content = "coordinates")]
enum GeometryRaw {
    Polygon(Vec<Vec<Vec<f64>>>),
    MultiPolygon(Vec<Vec<Vec<Vec<f64>>>>),
}

pub(super) fn read<R: Read>(reader: R) -> Result<NormalizedDataset> {
    let collection: FeatureCollectionRaw = serde_json::from_reader(reader).map_err(|e| {
        LoadError::SchemaMismatch(format!("not a GeoJSON FeatureCollection: {e}"))
    })?;
    if collection.kind != "FeatureCollection" {
        return Err(LoadError::SchemaMismatch(format!(
            "expected a FeatureCollection, found {}",
            collection.kind
        )));
    }

    let records = collection
        .features
        .into_iter()
        .enumerate()
        .map(|(index, feature)| parse_feature(index, feature))
        .collect::<Result<Vec<_>>>()?;

    Ok(NormalizedDataset { records })
}

fn parse_feature(index: usize, feature: Value) -> Result<CountyBoundary> {
    let corrupt = |reason: String| LoadError::Corrupt {
        record: index,
        reason,
    };

    let Value::Object(mut feature) = feature else {
        return Err(corrupt("feature is not a JSON object".to_string()));
    };

    let properties = match feature.get("properties") {
        Some(Value::Object(props)) => props,
        _ => {
            return Err(LoadError::SchemaMismatch(format!(
                "feature #{index} has no properties object"
            )));
        }
    };
    let state_code = required_str(index, properties, STATE_KEYS)?;
    let county_code = required_str(index, properties, COUNTY_KEYS)?;
    let name = required_str(index, properties, NAME_KEYS)?;

    let geometry_value = feature.remove("geometry").ok_or_else(|| {
        LoadError::SchemaMismatch(format!("feature #{index} has no geometry member"))
    })?;
    if geometry_value.is_null() {
        return Err(corrupt("geometry is null".to_string()));
    }
    let geometry: GeometryRaw = serde_json::from_value(geometry_value)
        .map_err(|e| corrupt(format!("unsupported or malformed geometry: {e}")))?;

    let boundary = match geometry {
        GeometryRaw::Polygon(rings) => MultiPolygon::new(vec![to_polygon(index, rings)?]),
        GeometryRaw::MultiPolygon(parts) => MultiPolygon::new(
            parts
                .into_iter()
                .map(|rings| to_polygon(index, rings))
                .collect::<Result<Vec<_>>>()?,
        ),
    };

    if let Some(bbox) = feature.get("bbox") {
        check_declared_bbox(index, parse_bbox(index, bbox)?, &boundary)?;
    }

    Ok(CountyBoundary {
        state_code,
        county_code,
        name,
        boundary,
    })
}

/// Look up the first present key; absence is a schema problem, a wrong type is a bad record
fn required_str(index: usize, properties: &Map<String, Value>, keys: &[&str]) -> Result<String> {
    let value = keys
        .iter()
        .find_map(|key| properties.get(*key))
        .ok_or_else(|| {
            LoadError::SchemaMismatch(format!(
                "feature #{index} is missing property {}",
                keys[0]
            ))
        })?;

    match value {
        Value::String(s) => Ok(s.clone()),
        other => Err(LoadError::Corrupt {
            record: index,
            reason: format!("property {} must be a string, found {other}", keys[0]),
        }),
    }
}

fn to_polygon(index: usize, rings: Vec<Vec<Vec<f64>>>) -> Result<Polygon<f64>> {
    let mut rings = rings
        .into_iter()
        .map(|ring| to_line_string(index, ring))
        .collect::<Result<Vec<_>>>()?;
    if rings.is_empty() {
        return Err(LoadError::Corrupt {
            record: index,
            reason: "polygon has no rings".to_string(),
        });
    }
    let exterior = rings.remove(0);
    Ok(Polygon::new(exterior, rings))
}

fn to_line_string(index: usize, positions: Vec<Vec<f64>>) -> Result<LineString<f64>> {
    positions
        .into_iter()
        .map(|position| match position.as_slice() {
            [x, y, ..] => Ok(Coord { x: *x, y: *y }),
            _ => Err(LoadError::Corrupt {
                record: index,
                reason: format!("position {position:?} has fewer than two ordinates"),
            }),
        })
        .collect::<Result<Vec<_>>>()
        .map(LineString::new)
}

/// Accepts 2D `[minx, miny, maxx, maxy]` and 3D `[minx, miny, minz, maxx, maxy, maxz]`
fn parse_bbox(index: usize, value: &Value) -> Result<[f64; 4]> {
    let numbers: Option<Vec<f64>> = value
        .as_array()
        .and_then(|items| items.iter().map(Value::as_f64).collect());

    match numbers.as_deref() {
        Some([a, b, c, d]) => Ok([*a, *b, *c, *d]),
        Some([a, b, _, d, e, _]) => Ok([*a, *b, *d, *e]),
        _ => Err(LoadError::Corrupt {
            record: index,
            reason: format!("malformed bbox {value}"),
        }),
    }
}

pub(super) fn write<W: Write>(dataset: &NormalizedDataset, writer: W) -> std::io::Result<()> {
    let features: Vec<Value> = dataset
        .records
        .iter()
        .map(|record| {
            let polygons: Vec<Value> = record.boundary.iter().map(polygon_coordinates).collect();
            let geometry = match polygons.as_slice() {
                [single] => json!({ "type": "Polygon", "coordinates": single }),
                _ => json!({ "type": "MultiPolygon", "coordinates": polygons }),
            };

            let mut feature = json!({
                "type": "Feature",
                "properties": {
                    "STATEFP": record.state_code,
                    "COUNTYFP": record.county_code,
                    "GEOID": format!("{}{}", record.state_code, record.county_code),
                    "NAME": record.name,
                },
                "geometry": geometry,
            });
            if let (Some(bbox), Value::Object(map)) = (record.boundary.bounding_rect(), &mut feature)
            {
                map.insert("bbox".to_string(), json!(geometry::rect_to_array(&bbox)));
            }
            feature
        })
        .collect();

    let collection = json!({
        "type": "FeatureCollection",
        "features": features,
    });
    serde_json::to_writer(writer, &collection)?;
    Ok(())
}

fn polygon_coordinates(polygon: &Polygon<f64>) -> Value {
    let rings: Vec<Vec<[f64; 2]>> = std::iter::once(polygon.exterior())
        .chain(polygon.interiors())
        .map(|ring| ring.coords().map(|c| [c.x, c.y]).collect())
        .collect();
    json!(rings)
}
