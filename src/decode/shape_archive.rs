// Zipped shapefile decoder
//
// The archive members are extracted into a private scratch directory that
// lives exactly as long as the `ShapefileArchive` value.

use crate::core::constants::{PRJ_EXT, SHP_EXT, SIDECAR_EXTS};
use crate::core::error::{IngestError, Result};
use crate::core::geometry::{AttributeValue, Coord, Feature, Geometry};
use shapefile::dbase::{FieldValue, Record};
use shapefile::{PolygonRing, Shape};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{Read, Seek};
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, info, warn};
use zip::ZipArchive;

pub struct ShapefileArchive {
    scratch: TempDir,
    shp_path: PathBuf,
    stem: String,
    prj_wkt: Option<String>,
}

fn extension_of(name: &str) -> Option<String> {
    Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
}

fn is_shp_entry(name: &str) -> bool {
    !name.ends_with('/')
        && !name.starts_with("__MACOSX/")
        && extension_of(name).as_deref() == Some(SHP_EXT)
}

/// `dir/fields.shp` -> `dir/fields`
fn entry_stem(name: &str) -> &str {
    name.rfind('.').map(|i| &name[..i]).unwrap_or(name)
}

impl ShapefileArchive {
    /// Locates the principal `.shp` entry and extracts it together with its
    /// same-stem sidecars into a fresh scratch directory.
    pub fn open<R: Read + Seek>(input: R, scratch_parent: Option<&Path>) -> Result<Self> {
        let mut archive = ZipArchive::new(input)?;
        let names: Vec<String> = archive.file_names().map(str::to_string).collect();

        let shp_entry = names
            .iter()
            .filter(|n| is_shp_entry(n))
            .min()
            .cloned()
            .ok_or_else(|| {
                IngestError::NoGeometryFound(format!(
                    "archive holds {} entries, none with a .{} extension",
                    names.len(),
                    SHP_EXT
                ))
            })?;

        let stem_path = entry_stem(&shp_entry).to_string();
        let base = Path::new(&stem_path)
            .file_name()
            .and_then(|f| f.to_str())
            .filter(|f| !f.is_empty())
            .unwrap_or("features")
            .to_string();

        let mut builder = tempfile::Builder::new();
        builder.prefix("fieldlog-shp-");
        let scratch = match scratch_parent {
            Some(parent) => builder.tempdir_in(parent)?,
            None => builder.tempdir()?,
        };
        debug!("shapefile scratch area: {}", scratch.path().display());

        let shp_path = scratch.path().join(format!("{}.{}", base, SHP_EXT));
        extract(&mut archive, &shp_entry, &shp_path)?;

        let mut prj_wkt = None;
        for ext in SIDECAR_EXTS {
            let sibling = names.iter().find(|n| {
                entry_stem(n).eq_ignore_ascii_case(&stem_path) && extension_of(n).as_deref() == Some(ext)
            });
            if let Some(entry) = sibling {
                let target = scratch.path().join(format!("{}.{}", base, ext));
                extract(&mut archive, entry, &target)?;
                if ext == PRJ_EXT {
                    // WKT keywords are ASCII; names may carry legacy code-page bytes
                    let bytes = std::fs::read(&target)?;
                    let text = String::from_utf8_lossy(&bytes);
                    let text = text.trim_start_matches('\u{feff}').trim().to_string();
                    if !text.is_empty() {
                        prj_wkt = Some(text);
                    }
                }
            }
        }

        info!(
            "shapefile '{}' extracted (projection file: {})",
            shp_entry,
            if prj_wkt.is_some() { "present" } else { "absent" }
        );

        Ok(Self {
            scratch,
            shp_path,
            stem: base,
            prj_wkt,
        })
    }

    pub fn projection_wkt(&self) -> Option<&str> {
        self.prj_wkt.as_deref()
    }

    /// Reads every non-null feature in file order. Feature ids are
    /// `<stem>.<n>`, 1-based over the records of the file.
    pub fn read_features(&self) -> Result<Vec<Feature>> {
        let mut reader = shapefile::Reader::from_path(&self.shp_path)?;
        let mut features = Vec::new();

        for (index, item) in reader.iter_shapes_and_records().enumerate() {
            let (shape, record) = item?;
            let geometry_id = format!("{}.{}", self.stem, index + 1);
            match to_geometry(shape) {
                Some(geometry) => features.push(Feature {
                    geometry_id,
                    geometry,
                    attributes: to_attributes(record),
                }),
                None => debug!("feature {} has no usable geometry, skipped", geometry_id),
            }
        }

        info!("shapefile '{}': {} features", self.stem, features.len());
        Ok(features)
    }
}

fn extract<R: Read + Seek>(archive: &mut ZipArchive<R>, entry: &str, target: &Path) -> Result<()> {
    let mut member = archive.by_name(entry)?;
    let mut out = File::create(target)?;
    std::io::copy(&mut member, &mut out)?;
    Ok(())
}

/// Entry-name scan only; no geometry store is opened.
pub fn test<R: Read + Seek>(input: R) -> bool {
    match ZipArchive::new(input) {
        Ok(archive) => archive.file_names().any(is_shp_entry),
        Err(e) => {
            debug!("shapefile probe failed: {}", e);
            false
        }
    }
}

trait ToCoord {
    fn coord(&self) -> Coord;
}

impl ToCoord for shapefile::Point {
    fn coord(&self) -> Coord {
        Coord::new(self.x, self.y)
    }
}

impl ToCoord for shapefile::PointM {
    fn coord(&self) -> Coord {
        Coord::new(self.x, self.y)
    }
}

impl ToCoord for shapefile::PointZ {
    fn coord(&self) -> Coord {
        Coord::with_z(self.x, self.y, self.z)
    }
}

fn coords<P: ToCoord>(points: &[P]) -> Vec<Coord> {
    points.iter().map(ToCoord::coord).collect()
}

fn lines<P: ToCoord>(parts: &[Vec<P>]) -> Geometry {
    let mut lines: Vec<Vec<Coord>> = parts.iter().map(|p| coords(p)).collect();
    if lines.len() == 1 {
        Geometry::LineString(lines.remove(0))
    } else {
        Geometry::MultiLineString(lines)
    }
}

/// Each outer ring opens a polygon; inner rings attach to the latest one.
fn polygons<P: ToCoord>(rings: &[PolygonRing<P>]) -> Geometry {
    let mut polygons: Vec<Vec<Vec<Coord>>> = Vec::new();
    for ring in rings {
        let ring_coords = coords(ring.points());
        match ring {
            PolygonRing::Outer(_) => polygons.push(vec![ring_coords]),
            PolygonRing::Inner(_) => match polygons.last_mut() {
                Some(polygon) => polygon.push(ring_coords),
                None => polygons.push(vec![ring_coords]),
            },
        }
    }
    if polygons.len() == 1 {
        Geometry::Polygon(polygons.remove(0))
    } else {
        Geometry::MultiPolygon(polygons)
    }
}

fn single_or_multi(points: Vec<Coord>) -> Geometry {
    if points.len() == 1 {
        Geometry::Point(points[0])
    } else {
        Geometry::MultiPoint(points)
    }
}

fn to_geometry(shape: Shape) -> Option<Geometry> {
    let geometry = match shape {
        Shape::NullShape => return None,
        Shape::Point(p) => Geometry::Point(p.coord()),
        Shape::PointM(p) => Geometry::Point(p.coord()),
        Shape::PointZ(p) => Geometry::Point(p.coord()),
        Shape::Multipoint(mp) => single_or_multi(coords(mp.points())),
        Shape::MultipointM(mp) => single_or_multi(coords(mp.points())),
        Shape::MultipointZ(mp) => single_or_multi(coords(mp.points())),
        Shape::Polyline(pl) => lines(pl.parts()),
        Shape::PolylineM(pl) => lines(pl.parts()),
        Shape::PolylineZ(pl) => lines(pl.parts()),
        Shape::Polygon(pg) => polygons(pg.rings()),
        Shape::PolygonM(pg) => polygons(pg.rings()),
        Shape::PolygonZ(pg) => polygons(pg.rings()),
        Shape::Multipatch(_) => {
            warn!("multipatch shapes are not supported");
            return None;
        }
    };
    if geometry.coords().is_empty() {
        return None;
    }
    Some(geometry)
}

fn to_attribute(value: FieldValue) -> AttributeValue {
    match value {
        FieldValue::Character(Some(s)) => AttributeValue::Text(s.trim_end().to_string()),
        FieldValue::Memo(s) => AttributeValue::Text(s),
        FieldValue::Numeric(Some(v)) => AttributeValue::Number(v),
        FieldValue::Float(Some(v)) => AttributeValue::Number(f64::from(v)),
        FieldValue::Double(v) | FieldValue::Currency(v) => AttributeValue::Number(v),
        FieldValue::Integer(v) => AttributeValue::Integer(i64::from(v)),
        FieldValue::Logical(Some(b)) => AttributeValue::Boolean(b),
        FieldValue::Date(Some(d)) => {
            AttributeValue::Text(format!("{:04}-{:02}-{:02}", d.year(), d.month(), d.day()))
        }
        FieldValue::Character(None)
        | FieldValue::Numeric(None)
        | FieldValue::Float(None)
        | FieldValue::Logical(None)
        | FieldValue::Date(None) => AttributeValue::Null,
        other => AttributeValue::Text(format!("{:?}", other)),
    }
}

fn to_attributes(record: Record) -> BTreeMap<String, AttributeValue> {
    record
        .into_iter()
        .map(|(name, value)| (name, to_attribute(value)))
        .collect()
}
