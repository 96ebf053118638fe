//! Ellipsoidal map projections.
//!
//! Angles are radians, lengths metres. Formulas follow the USGS
//! "Map Projections: A Working Manual" series expansions.

use crate::crs::system::Ellipsoid;
use std::f64::consts::{FRAC_PI_2, FRAC_PI_4};

const MAX_ITERATIONS: usize = 15;
const CONVERGENCE: f64 = 1e-12;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Projection {
    TransverseMercator {
        lat0: f64,
        lon0: f64,
        k0: f64,
        false_easting: f64,
        false_northing: f64,
    },
    Mercator {
        lon0: f64,
        k0: f64,
        false_easting: f64,
        false_northing: f64,
    },
    /// One-standard-parallel variants use `lat1 == lat2 == lat0`.
    LambertConformalConic {
        lat0: f64,
        lon0: f64,
        lat1: f64,
        lat2: f64,
        k0: f64,
        false_easting: f64,
        false_northing: f64,
    },
}

/// Meridian arc length from the equator to `phi`.
fn meridian_arc(ell: &Ellipsoid, phi: f64) -> f64 {
    let e2 = ell.e2();
    let e4 = e2 * e2;
    let e6 = e4 * e2;
    ell.a
        * ((1.0 - e2 / 4.0 - 3.0 * e4 / 64.0 - 5.0 * e6 / 256.0) * phi
            - (3.0 * e2 / 8.0 + 3.0 * e4 / 32.0 + 45.0 * e6 / 1024.0) * (2.0 * phi).sin()
            + (15.0 * e4 / 256.0 + 45.0 * e6 / 1024.0) * (4.0 * phi).sin()
            - (35.0 * e6 / 3072.0) * (6.0 * phi).sin())
}

/// Isometric-latitude helper `t` (Snyder 15-9).
fn conformal_t(e: f64, phi: f64) -> f64 {
    let es = e * phi.sin();
    (FRAC_PI_4 - phi / 2.0).tan() / ((1.0 - es) / (1.0 + es)).powf(e / 2.0)
}

/// Inverse of [`conformal_t`] by fixed-point iteration (Snyder 7-9).
fn latitude_from_t(e: f64, t: f64) -> Option<f64> {
    let mut phi = FRAC_PI_2 - 2.0 * t.atan();
    for _ in 0..MAX_ITERATIONS {
        let es = e * phi.sin();
        let next = FRAC_PI_2 - 2.0 * (t * ((1.0 - es) / (1.0 + es)).powf(e / 2.0)).atan();
        if (next - phi).abs() < CONVERGENCE {
            return Some(next);
        }
        phi = next;
    }
    None
}

fn lcc_m(e2: f64, phi: f64) -> f64 {
    phi.cos() / (1.0 - e2 * phi.sin().powi(2)).sqrt()
}

/// Cone constant `n`, mapping constant `F` and origin radius `rho0`.
fn lcc_constants(ell: &Ellipsoid, lat0: f64, lat1: f64, lat2: f64, k0: f64) -> (f64, f64, f64) {
    let e = ell.e();
    let e2 = ell.e2();
    let m1 = lcc_m(e2, lat1);
    let t1 = conformal_t(e, lat1);
    let n = if (lat1 - lat2).abs() < 1e-12 {
        lat1.sin()
    } else {
        (m1.ln() - lcc_m(e2, lat2).ln()) / (t1.ln() - conformal_t(e, lat2).ln())
    };
    let big_f = m1 / (n * t1.powf(n));
    let rho0 = ell.a * big_f * k0 * conformal_t(e, lat0).powf(n);
    (n, big_f, rho0)
}

fn wrap_longitude(lon: f64) -> f64 {
    let two_pi = 2.0 * std::f64::consts::PI;
    let wrapped = (lon + std::f64::consts::PI).rem_euclid(two_pi) - std::f64::consts::PI;
    if wrapped == -std::f64::consts::PI && lon > 0.0 {
        std::f64::consts::PI
    } else {
        wrapped
    }
}

impl Projection {
    /// Scale factor on the equator of a Mercator whose true-scale parallel
    /// is `phi1`.
    pub fn mercator_scale_at(ell: &Ellipsoid, phi1: f64) -> f64 {
        lcc_m(ell.e2(), phi1)
    }

    /// Geodetic (lon, lat) to projected (x, y).
    pub fn forward(&self, ell: &Ellipsoid, lon: f64, lat: f64) -> Option<(f64, f64)> {
        let e2 = ell.e2();
        let out = match *self {
            Projection::TransverseMercator {
                lat0,
                lon0,
                k0,
                false_easting,
                false_northing,
            } => {
                let ep2 = e2 / (1.0 - e2);
                let (sin, cos) = lat.sin_cos();
                let n = ell.a / (1.0 - e2 * sin * sin).sqrt();
                let t = lat.tan().powi(2);
                let c = ep2 * cos * cos;
                let a = wrap_longitude(lon - lon0) * cos;
                let x = false_easting
                    + k0 * n
                        * (a + (1.0 - t + c) * a.powi(3) / 6.0
                            + (5.0 - 18.0 * t + t * t + 72.0 * c - 58.0 * ep2) * a.powi(5) / 120.0);
                let y = false_northing
                    + k0 * (meridian_arc(ell, lat) - meridian_arc(ell, lat0)
                        + n * lat.tan()
                            * (a * a / 2.0
                                + (5.0 - t + 9.0 * c + 4.0 * c * c) * a.powi(4) / 24.0
                                + (61.0 - 58.0 * t + t * t + 600.0 * c - 330.0 * ep2) * a.powi(6)
                                    / 720.0));
                (x, y)
            }
            Projection::Mercator {
                lon0,
                k0,
                false_easting,
                false_northing,
            } => {
                if lat.abs() >= FRAC_PI_2 {
                    return None;
                }
                let x = false_easting + ell.a * k0 * wrap_longitude(lon - lon0);
                let y = false_northing - ell.a * k0 * conformal_t(ell.e(), lat).ln();
                (x, y)
            }
            Projection::LambertConformalConic {
                lat0,
                lon0,
                lat1,
                lat2,
                k0,
                false_easting,
                false_northing,
            } => {
                let (n, big_f, rho0) = lcc_constants(ell, lat0, lat1, lat2, k0);
                let rho = ell.a * big_f * k0 * conformal_t(ell.e(), lat).powf(n);
                let theta = n * wrap_longitude(lon - lon0);
                (
                    false_easting + rho * theta.sin(),
                    false_northing + rho0 - rho * theta.cos(),
                )
            }
        };
        finite(out)
    }

    /// Projected (x, y) to geodetic (lon, lat).
    pub fn inverse(&self, ell: &Ellipsoid, x: f64, y: f64) -> Option<(f64, f64)> {
        let e2 = ell.e2();
        let out = match *self {
            Projection::TransverseMercator {
                lat0,
                lon0,
                k0,
                false_easting,
                false_northing,
            } => {
                let ep2 = e2 / (1.0 - e2);
                let m = meridian_arc(ell, lat0) + (y - false_northing) / k0;
                let mu = m
                    / (ell.a * (1.0 - e2 / 4.0 - 3.0 * e2 * e2 / 64.0 - 5.0 * e2.powi(3) / 256.0));
                let sq = (1.0 - e2).sqrt();
                let e1 = (1.0 - sq) / (1.0 + sq);
                let phi1 = mu
                    + (3.0 * e1 / 2.0 - 27.0 * e1.powi(3) / 32.0) * (2.0 * mu).sin()
                    + (21.0 * e1 * e1 / 16.0 - 55.0 * e1.powi(4) / 32.0) * (4.0 * mu).sin()
                    + (151.0 * e1.powi(3) / 96.0) * (6.0 * mu).sin()
                    + (1097.0 * e1.powi(4) / 512.0) * (8.0 * mu).sin();

                let (sin1, cos1) = phi1.sin_cos();
                let tan1 = phi1.tan();
                let c1 = ep2 * cos1 * cos1;
                let t1 = tan1 * tan1;
                let n1 = ell.a / (1.0 - e2 * sin1 * sin1).sqrt();
                let r1 = ell.a * (1.0 - e2) / (1.0 - e2 * sin1 * sin1).powf(1.5);
                let d = (x - false_easting) / (n1 * k0);

                let lat = phi1
                    - (n1 * tan1 / r1)
                        * (d * d / 2.0
                            - (5.0 + 3.0 * t1 + 10.0 * c1 - 4.0 * c1 * c1 - 9.0 * ep2) * d.powi(4) / 24.0
                            + (61.0 + 90.0 * t1 + 298.0 * c1 + 45.0 * t1 * t1 - 252.0 * ep2 - 3.0 * c1 * c1)
                                * d.powi(6)
                                / 720.0);
                let lon = lon0
                    + (d - (1.0 + 2.0 * t1 + c1) * d.powi(3) / 6.0
                        + (5.0 - 2.0 * c1 + 28.0 * t1 - 3.0 * c1 * c1 + 8.0 * ep2 + 24.0 * t1 * t1)
                            * d.powi(5)
                            / 120.0)
                        / cos1;
                (lon, lat)
            }
            Projection::Mercator {
                lon0,
                k0,
                false_easting,
                false_northing,
            } => {
                let t = (-(y - false_northing) / (ell.a * k0)).exp();
                let lat = latitude_from_t(ell.e(), t)?;
                let lon = (x - false_easting) / (ell.a * k0) + lon0;
                (lon, lat)
            }
            Projection::LambertConformalConic {
                lat0,
                lon0,
                lat1,
                lat2,
                k0,
                false_easting,
                false_northing,
            } => {
                let (n, big_f, rho0) = lcc_constants(ell, lat0, lat1, lat2, k0);
                let dx = x - false_easting;
                let dy = rho0 - (y - false_northing);
                let sign = n.signum();
                let rho = sign * (dx * dx + dy * dy).sqrt();
                let theta = (sign * dx).atan2(sign * dy);
                let t = (rho / (ell.a * k0 * big_f)).powf(1.0 / n);
                let lat = latitude_from_t(ell.e(), t)?;
                (theta / n + lon0, lat)
            }
        };
        finite(out)
    }
}

fn finite((a, b): (f64, f64)) -> Option<(f64, f64)> {
    if a.is_finite() && b.is_finite() {
        Some((a, b))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GRS80: Ellipsoid = Ellipsoid {
        a: 6_378_137.0,
        inv_f: 298.257_222_101,
    };

    fn utm(zone_meridian: f64) -> Projection {
        Projection::TransverseMercator {
            lat0: 0.0,
            lon0: zone_meridian.to_radians(),
            k0: 0.9996,
            false_easting: 500_000.0,
            false_northing: 0.0,
        }
    }

    fn lambert_93() -> Projection {
        Projection::LambertConformalConic {
            lat0: 46.5f64.to_radians(),
            lon0: 3.0f64.to_radians(),
            lat1: 49.0f64.to_radians(),
            lat2: 44.0f64.to_radians(),
            k0: 1.0,
            false_easting: 700_000.0,
            false_northing: 6_600_000.0,
        }
    }

    #[test]
    fn test_utm_origin_on_central_meridian() {
        let (lon, lat) = utm(9.0).inverse(&Ellipsoid::WGS84, 500_000.0, 0.0).unwrap();
        assert!((lon.to_degrees() - 9.0).abs() < 1e-12);
        assert!(lat.abs() < 1e-12);
    }

    #[test]
    fn test_utm_round_trip() {
        let projection = utm(9.0);
        for (lon, lat) in [(9.0, 48.0), (7.5, 47.2), (11.9, 54.8), (8.2, -33.9)] {
            let (x, y) = projection
                .forward(&Ellipsoid::WGS84, f64::to_radians(lon), f64::to_radians(lat))
                .unwrap();
            let (lon2, lat2) = projection.inverse(&Ellipsoid::WGS84, x, y).unwrap();
            assert!((lon2.to_degrees() - lon).abs() < 1e-8, "lon {} -> {}", lon, lon2.to_degrees());
            assert!((lat2.to_degrees() - lat).abs() < 1e-8, "lat {} -> {}", lat, lat2.to_degrees());
        }
    }

    #[test]
    fn test_utm_northing_of_48_degrees() {
        // On the central meridian the northing is k0 times the meridian arc.
        let (x, y) = utm(9.0)
            .forward(&Ellipsoid::WGS84, 9.0f64.to_radians(), 48.0f64.to_radians())
            .unwrap();
        assert!((x - 500_000.0).abs() < 1e-6);
        assert!((y - 5_316_300.2).abs() < 0.1, "northing {}", y);
    }

    #[test]
    fn test_lambert_93_origin() {
        let (lon, lat) = lambert_93().inverse(&GRS80, 700_000.0, 6_600_000.0).unwrap();
        assert!((lon.to_degrees() - 3.0).abs() < 1e-10);
        assert!((lat.to_degrees() - 46.5).abs() < 1e-10);
    }

    #[test]
    fn test_lambert_round_trip() {
        let projection = lambert_93();
        let (x, y) = projection
            .forward(&GRS80, 2.3522f64.to_radians(), 48.8566f64.to_radians())
            .unwrap();
        let (lon, lat) = projection.inverse(&GRS80, x, y).unwrap();
        assert!((lon.to_degrees() - 2.3522).abs() < 1e-9);
        assert!((lat.to_degrees() - 48.8566).abs() < 1e-9);
    }

    #[test]
    fn test_mercator_round_trip() {
        let projection = Projection::Mercator {
            lon0: 0.0,
            k0: 1.0,
            false_easting: 0.0,
            false_northing: 0.0,
        };
        let (x, y) = projection
            .forward(&Ellipsoid::WGS84, 5.0f64.to_radians(), 52.0f64.to_radians())
            .unwrap();
        assert!((x - 556_597.45).abs() < 0.01, "x {}", x);
        let (lon, lat) = projection.inverse(&Ellipsoid::WGS84, x, y).unwrap();
        assert!((lon.to_degrees() - 5.0).abs() < 1e-10);
        assert!((lat.to_degrees() - 52.0).abs() < 1e-10);
        assert!(projection.forward(&Ellipsoid::WGS84, 0.0, FRAC_PI_2).is_none());
    }
}
