//! Source system to WGS84 longitude/latitude degrees.

use crate::core::error::{IngestError, Result};
use crate::core::geometry::Coord;
use crate::crs::projection::Projection;
use crate::crs::system::{AxisOrder, CoordinateSystem, Ellipsoid, GeographicSystem, Helmert};

const ARC_SECOND: f64 = std::f64::consts::PI / (180.0 * 3600.0);

#[derive(Debug, Clone)]
struct Unprojection {
    projection: Projection,
    linear_unit: f64,
    axis_order: AxisOrder,
}

/// Compiled transform from one [`CoordinateSystem`] to WGS84 lon/lat.
#[derive(Debug, Clone)]
pub struct CoordinateTransform {
    source_name: String,
    unproject: Option<Unprojection>,
    geographic: GeographicSystem,
    identity: bool,
}

impl CoordinateTransform {
    pub fn new(source: &CoordinateSystem) -> Self {
        let identity = source.is_wgs84_lon_lat();
        let (unproject, geographic) = match source {
            CoordinateSystem::Geographic(g) => (None, g.clone()),
            CoordinateSystem::Projected(p) => (
                Some(Unprojection {
                    projection: p.projection,
                    linear_unit: p.linear_unit,
                    axis_order: p.axis_order,
                }),
                p.base.clone(),
            ),
        };
        Self {
            source_name: source.name().to_string(),
            unproject,
            geographic,
            identity,
        }
    }

    pub fn is_identity(&self) -> bool {
        self.identity
    }

    /// Rewrites `coord` in place as WGS84 (longitude, latitude) degrees.
    /// `z` is carried through unchanged.
    pub fn transform(&self, coord: &mut Coord) -> Result<()> {
        if self.identity {
            return Ok(());
        }
        let ellipsoid = self.geographic.datum.ellipsoid;

        // geodetic radians on the source datum, Greenwich based
        let (lon, lat) = match &self.unproject {
            Some(u) => {
                let (e, n) = ordered(u.axis_order, coord.x, coord.y);
                u.projection
                    .inverse(&ellipsoid, e * u.linear_unit, n * u.linear_unit)
                    .ok_or_else(|| self.failure(coord, "inverse projection did not converge"))?
            }
            None => {
                let (lon, lat) = ordered(self.geographic.axis_order, coord.x, coord.y);
                (lon * self.geographic.angular_unit, lat * self.geographic.angular_unit)
            }
        };
        let lon = lon + self.geographic.prime_meridian.to_radians();

        let (lon, lat) = if self.geographic.datum_is_wgs84() {
            (lon, lat)
        } else {
            let shift = self.geographic.datum.to_wgs84.unwrap_or_default();
            shift_datum(&ellipsoid, &shift, lon, lat)
        };

        let (lon, lat) = (normalize_degrees(lon.to_degrees()), lat.to_degrees());
        if !lon.is_finite() || !lat.is_finite() || lat.abs() > 90.0 {
            return Err(self.failure(coord, "result outside the WGS84 domain"));
        }
        coord.x = lon;
        coord.y = lat;
        Ok(())
    }

    fn failure(&self, coord: &Coord, reason: &str) -> IngestError {
        IngestError::TransformUnavailable(format!(
            "cannot transform ({}, {}) from {}: {}",
            coord.x, coord.y, self.source_name, reason
        ))
    }
}

fn ordered(order: AxisOrder, x: f64, y: f64) -> (f64, f64) {
    match order {
        AxisOrder::EastNorth => (x, y),
        AxisOrder::NorthEast => (y, x),
    }
}

fn normalize_degrees(lon: f64) -> f64 {
    if lon > 180.0 || lon < -180.0 {
        (lon + 180.0).rem_euclid(360.0) - 180.0
    } else {
        lon
    }
}

fn to_geocentric(ell: &Ellipsoid, lon: f64, lat: f64) -> (f64, f64, f64) {
    let e2 = ell.e2();
    let (sin_lat, cos_lat) = lat.sin_cos();
    let n = ell.a / (1.0 - e2 * sin_lat * sin_lat).sqrt();
    (
        n * cos_lat * lon.cos(),
        n * cos_lat * lon.sin(),
        n * (1.0 - e2) * sin_lat,
    )
}

/// Bowring's closed form, accurate to well under a millimetre near the
/// surface.
fn from_geocentric(ell: &Ellipsoid, x: f64, y: f64, z: f64) -> (f64, f64) {
    let e2 = ell.e2();
    let b = ell.a * (1.0 - ell.f());
    let ep2 = (ell.a * ell.a - b * b) / (b * b);
    let p = (x * x + y * y).sqrt();
    let theta = (z * ell.a).atan2(p * b);
    let (st, ct) = theta.sin_cos();
    let lat = (z + ep2 * b * st.powi(3)).atan2(p - e2 * ell.a * ct.powi(3));
    (y.atan2(x), lat)
}

fn shift_datum(ell: &Ellipsoid, h: &Helmert, lon: f64, lat: f64) -> (f64, f64) {
    let (x, y, z) = to_geocentric(ell, lon, lat);
    let (rx, ry, rz) = (h.rx * ARC_SECOND, h.ry * ARC_SECOND, h.rz * ARC_SECOND);
    let m = 1.0 + h.ds * 1e-6;
    let x2 = h.tx + m * (x - rz * y + ry * z);
    let y2 = h.ty + m * (rz * x + y - rx * z);
    let z2 = h.tz + m * (-ry * x + rx * y + z);
    from_geocentric(&Ellipsoid::WGS84, x2, y2, z2)
}
