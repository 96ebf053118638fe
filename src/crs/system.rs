//! Coordinate reference systems resolved from WKT.

use crate::core::constants::{WGS84_A, WGS84_INV_F};
use crate::core::error::{IngestError, Result};
use crate::crs::projection::Projection;
use crate::crs::wkt::{self, WktNode, WktValue};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ellipsoid {
    pub a: f64,
    pub inv_f: f64,
}

impl Ellipsoid {
    pub const WGS84: Ellipsoid = Ellipsoid {
        a: WGS84_A,
        inv_f: WGS84_INV_F,
    };

    /// Flattening; a zero inverse flattening denotes a sphere.
    pub fn f(&self) -> f64 {
        if self.inv_f == 0.0 {
            0.0
        } else {
            1.0 / self.inv_f
        }
    }

    /// First eccentricity squared.
    pub fn e2(&self) -> f64 {
        let f = self.f();
        2.0 * f - f * f
    }

    pub fn e(&self) -> f64 {
        self.e2().sqrt()
    }

    pub fn same_as(&self, other: &Ellipsoid) -> bool {
        (self.a - other.a).abs() < 1e-6 && (self.f() - other.f()).abs() < 1e-15
    }
}

/// Position-vector 7-parameter shift to WGS84, as in `TOWGS84[...]`.
/// Translations in metres, rotations in arc-seconds, scale in ppm.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Helmert {
    pub tx: f64,
    pub ty: f64,
    pub tz: f64,
    pub rx: f64,
    pub ry: f64,
    pub rz: f64,
    pub ds: f64,
}

impl Helmert {
    pub fn is_zero(&self) -> bool {
        [self.tx, self.ty, self.tz, self.rx, self.ry, self.rz, self.ds]
            .iter()
            .all(|v| *v == 0.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Datum {
    pub name: String,
    pub ellipsoid: Ellipsoid,
    pub to_wgs84: Option<Helmert>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AxisOrder {
    /// x = longitude/easting, y = latitude/northing
    EastNorth,
    NorthEast,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GeographicSystem {
    pub name: String,
    pub datum: Datum,
    /// Prime meridian offset from Greenwich, degrees.
    pub prime_meridian: f64,
    /// Radians per angular unit.
    pub angular_unit: f64,
    pub axis_order: AxisOrder,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProjectedSystem {
    pub name: String,
    pub base: GeographicSystem,
    pub projection: Projection,
    /// Metres per linear unit.
    pub linear_unit: f64,
    pub axis_order: AxisOrder,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CoordinateSystem {
    Geographic(GeographicSystem),
    Projected(ProjectedSystem),
}

const DEGREE: f64 = std::f64::consts::PI / 180.0;

impl GeographicSystem {
    /// True when the datum needs no shift to reach WGS84.
    pub fn datum_is_wgs84(&self) -> bool {
        self.datum.ellipsoid.same_as(&Ellipsoid::WGS84)
            && self.datum.to_wgs84.map_or(true, |h| h.is_zero())
    }
}

impl CoordinateSystem {
    pub fn from_wkt(text: &str) -> Result<Self> {
        resolve(&wkt::parse(text)?)
    }

    pub fn name(&self) -> &str {
        match self {
            CoordinateSystem::Geographic(g) => &g.name,
            CoordinateSystem::Projected(p) => &p.name,
        }
    }

    /// Geographic WGS84 in degrees, longitude first.
    pub fn is_wgs84_lon_lat(&self) -> bool {
        match self {
            CoordinateSystem::Geographic(g) => {
                g.datum_is_wgs84()
                    && g.prime_meridian == 0.0
                    && (g.angular_unit - DEGREE).abs() < 1e-12
                    && g.axis_order == AxisOrder::EastNorth
            }
            CoordinateSystem::Projected(_) => false,
        }
    }
}

fn unsupported(msg: String) -> IngestError {
    IngestError::TransformUnavailable(msg)
}

fn resolve(node: &WktNode) -> Result<CoordinateSystem> {
    match node.keyword.as_str() {
        "GEOGCS" => Ok(CoordinateSystem::Geographic(geographic(node)?)),
        "PROJCS" => Ok(CoordinateSystem::Projected(projected(node)?)),
        other => Err(unsupported(format!("unsupported coordinate system type {}", other))),
    }
}

fn unit_factor(node: &WktNode, default: f64) -> f64 {
    node.child("UNIT")
        .and_then(|u| u.numbers().first().copied())
        .filter(|f| *f > 0.0)
        .unwrap_or(default)
}

fn axis_order(node: &WktNode) -> AxisOrder {
    let first = node
        .children_named("AXIS")
        .next()
        .and_then(|axis| axis.words().first().map(|w| w.to_string()));
    match first.as_deref() {
        Some("NORTH") | Some("SOUTH") => AxisOrder::NorthEast,
        _ => AxisOrder::EastNorth,
    }
}

fn geographic(node: &WktNode) -> Result<GeographicSystem> {
    let datum_node = node
        .child("DATUM")
        .ok_or_else(|| unsupported("GEOGCS without DATUM".to_string()))?;
    let spheroid = datum_node
        .child("SPHEROID")
        .or_else(|| datum_node.child("ELLIPSOID"))
        .ok_or_else(|| unsupported("DATUM without SPHEROID".to_string()))?;
    let numbers = spheroid.numbers();
    let (a, inv_f) = match numbers.as_slice() {
        [a, inv_f, ..] if *a > 0.0 && *inv_f >= 0.0 => (*a, *inv_f),
        _ => return Err(unsupported("SPHEROID needs semi-major axis and inverse flattening".to_string())),
    };

    let to_wgs84 = datum_node.child("TOWGS84").map(|t| {
        let p = t.numbers();
        let at = |i: usize| p.get(i).copied().unwrap_or(0.0);
        Helmert {
            tx: at(0),
            ty: at(1),
            tz: at(2),
            rx: at(3),
            ry: at(4),
            rz: at(5),
            ds: at(6),
        }
    });

    let prime_meridian = node
        .child("PRIMEM")
        .and_then(|p| p.numbers().first().copied())
        .unwrap_or(0.0);
    let angular_unit = unit_factor(node, DEGREE);

    Ok(GeographicSystem {
        name: node.name().unwrap_or("unnamed").to_string(),
        datum: Datum {
            name: datum_node.name().unwrap_or("unnamed").to_string(),
            ellipsoid: Ellipsoid { a, inv_f },
            to_wgs84,
        },
        // PRIMEM is expressed in the angular unit of the GEOGCS
        prime_meridian: prime_meridian * angular_unit / DEGREE,
        angular_unit,
        axis_order: axis_order(node),
    })
}

/// `PARAMETER` nodes as (lower-cased name, value) pairs.
fn parameters(node: &WktNode) -> Vec<(String, f64)> {
    node.children_named("PARAMETER")
        .filter_map(|p| {
            let name = p.name()?.to_ascii_lowercase().replace(' ', "_");
            let value = p.args.iter().find_map(|a| match a {
                WktValue::Number(n) => Some(*n),
                _ => None,
            })?;
            Some((name, value))
        })
        .collect()
}

fn projected(node: &WktNode) -> Result<ProjectedSystem> {
    let base_node = node
        .child("GEOGCS")
        .ok_or_else(|| unsupported("PROJCS without GEOGCS".to_string()))?;
    let base = geographic(base_node)?;
    let method = node
        .child("PROJECTION")
        .and_then(|p| p.name())
        .ok_or_else(|| unsupported("PROJCS without PROJECTION".to_string()))?;

    let params = parameters(node);
    let linear_unit = unit_factor(node, 1.0);
    // Angular parameters are in the base GEOGCS unit, linear ones in the
    // PROJCS unit.
    let radians = base.angular_unit;
    let lat0 = lookup(&params, &["latitude_of_origin", "latitude_of_center"]).unwrap_or(0.0) * radians;
    let lon0 = lookup(
        &params,
        &["central_meridian", "longitude_of_origin", "longitude_of_center"],
    )
    .unwrap_or(0.0)
        * radians;
    let k0 = lookup(&params, &["scale_factor", "scale_factor_at_natural_origin"]).unwrap_or(1.0);
    let false_easting = lookup(&params, &["false_easting"]).unwrap_or(0.0) * linear_unit;
    let false_northing = lookup(&params, &["false_northing"]).unwrap_or(0.0) * linear_unit;

    let normalized = method.to_ascii_lowercase().replace([' ', '-'], "_");
    let projection = match normalized.as_str() {
        "transverse_mercator" | "gauss_kruger" => {
            Projection::TransverseMercator {
                lat0,
                lon0,
                k0,
                false_easting,
                false_northing,
            }
        }
        "mercator" | "mercator_1sp" | "mercator_2sp" => {
            let k0 = match lookup(&params, &["standard_parallel_1"]) {
                Some(sp) => Projection::mercator_scale_at(&base.datum.ellipsoid, sp * radians),
                None => k0,
            };
            Projection::Mercator {
                lon0,
                k0,
                false_easting,
                false_northing,
            }
        }
        "lambert_conformal_conic_1sp" => Projection::LambertConformalConic {
            lat0,
            lon0,
            lat1: lat0,
            lat2: lat0,
            k0,
            false_easting,
            false_northing,
        },
        "lambert_conformal_conic" | "lambert_conformal_conic_2sp" => {
            let lat1 = lookup(&params, &["standard_parallel_1"])
                .map(|v| v * radians)
                .unwrap_or(lat0);
            let lat2 = lookup(&params, &["standard_parallel_2"])
                .map(|v| v * radians)
                .unwrap_or(lat1);
            Projection::LambertConformalConic {
                lat0,
                lon0,
                lat1,
                lat2,
                k0,
                false_easting,
                false_northing,
            }
        }
        other => return Err(unsupported(format!("unsupported projection method {}", other))),
    };
    debug!("resolved projection {:?}", projection);

    Ok(ProjectedSystem {
        name: node.name().unwrap_or("unnamed").to_string(),
        base,
        projection,
        linear_unit,
        axis_order: axis_order(node),
    })
}

fn lookup(params: &[(String, f64)], names: &[&str]) -> Option<f64> {
    names
        .iter()
        .find_map(|n| params.iter().find(|(k, _)| k == n).map(|(_, v)| *v))
}
