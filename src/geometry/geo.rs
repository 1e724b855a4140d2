//! WGS84 geodetic <-> ECEF conversion.
//!
//! Both directions are frame-independent and stateless. Geodetic positions
//! use degrees for latitude/longitude and meters above the ellipsoid for
//! altitude; ECEF positions are meters.
//!
//! ECEF -> geodetic uses Heikkinen's closed-form solution, which is accurate
//! to well below a millimeter for any point outside the ellipsoid's inner
//! core, so there is no iteration count to tune.

use nalgebra::Vector3;

/// WGS84 semi-major axis (m).
pub const WGS84_A: f64 = 6_378_137.0;

/// WGS84 flattening.
pub const WGS84_F: f64 = 1.0 / 298.257_223_563;

/// WGS84 semi-minor axis (m).
pub const WGS84_B: f64 = WGS84_A * (1.0 - WGS84_F);

/// First eccentricity squared.
pub const WGS84_E2: f64 = WGS84_F * (2.0 - WGS84_F);

/// Second eccentricity squared.
const WGS84_EP2: f64 = (WGS84_A * WGS84_A - WGS84_B * WGS84_B) / (WGS84_B * WGS84_B);

/// Distance from the polar axis under which a point is treated as on-axis.
const POLAR_AXIS_EPS: f64 = 1e-9;

/// Geodetic position on the WGS84 ellipsoid.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Geodetic {
    /// Latitude in degrees, positive north.
    pub latitude: f64,
    /// Longitude in degrees, positive east.
    pub longitude: f64,
    /// Height above the ellipsoid in meters.
    pub altitude: f64,
}

impl Geodetic {
    pub fn new(latitude: f64, longitude: f64, altitude: f64) -> Self {
        Self {
            latitude,
            longitude,
            altitude,
        }
    }

    /// `[lat, lon, alt]` as laid out at the flat boundary.
    pub fn to_array(&self) -> [f64; 3] {
        [self.latitude, self.longitude, self.altitude]
    }

    pub fn from_array(v: [f64; 3]) -> Self {
        Self::new(v[0], v[1], v[2])
    }
}

/// Convert a geodetic position to ECEF.
pub fn wgs84_to_ecef(geo: &Geodetic) -> Vector3<f64> {
    let lat = geo.latitude.to_radians();
    let lon = geo.longitude.to_radians();
    let (sin_lat, cos_lat) = lat.sin_cos();
    let (sin_lon, cos_lon) = lon.sin_cos();

    // Prime vertical radius of curvature
    let n = WGS84_A / (1.0 - WGS84_E2 * sin_lat * sin_lat).sqrt();

    Vector3::new(
        (n + geo.altitude) * cos_lat * cos_lon,
        (n + geo.altitude) * cos_lat * sin_lon,
        (n * (1.0 - WGS84_E2) + geo.altitude) * sin_lat,
    )
}

/// Convert an ECEF position to geodetic coordinates.
pub fn ecef_to_wgs84(ecef: &Vector3<f64>) -> Geodetic {
    let (x, y, z) = (ecef.x, ecef.y, ecef.z);
    let p = (x * x + y * y).sqrt();

    if p < POLAR_AXIS_EPS {
        // On the polar axis the longitude is undefined; report 0.
        let latitude = if z >= 0.0 { 90.0 } else { -90.0 };
        return Geodetic::new(latitude, 0.0, z.abs() - WGS84_B);
    }

    let a = WGS84_A;
    let b = WGS84_B;
    let e2 = WGS84_E2;
    let z2 = z * z;

    let f = 54.0 * b * b * z2;
    let g = p * p + (1.0 - e2) * z2 - e2 * (a * a - b * b);
    let c = e2 * e2 * f * p * p / (g * g * g);
    let s = (1.0 + c + (c * c + 2.0 * c).sqrt()).cbrt();
    let k = s + 1.0 + 1.0 / s;
    let big_p = f / (3.0 * k * k * g * g);
    let q = (1.0 + 2.0 * e2 * e2 * big_p).sqrt();
    let r0 = -(big_p * e2 * p) / (1.0 + q)
        + (0.5 * a * a * (1.0 + 1.0 / q)
            - big_p * (1.0 - e2) * z2 / (q * (1.0 + q))
            - 0.5 * big_p * p * p)
            .max(0.0)
            .sqrt();
    let d = p - e2 * r0;
    let u = (d * d + z2).sqrt();
    let v = (d * d + (1.0 - e2) * z2).sqrt();
    let z0 = b * b * z / (a * v);

    let altitude = u * (1.0 - b * b / (a * v));
    let latitude = (z + WGS84_EP2 * z0).atan2(p).to_degrees();
    let longitude = y.atan2(x).to_degrees();

    Geodetic::new(latitude, longitude, altitude)
}
