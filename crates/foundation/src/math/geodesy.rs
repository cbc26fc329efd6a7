use super::Ecef;

/// WGS84 semi-major axis (meters).
pub const WGS84_A: f64 = 6_378_137.0;
/// WGS84 flattening.
pub const WGS84_F: f64 = 1.0 / 298.257_223_563;
/// WGS84 semi-minor axis (meters).
pub const WGS84_B: f64 = WGS84_A * (1.0 - WGS84_F);
/// WGS84 first eccentricity squared.
pub const WGS84_E2: f64 = WGS84_F * (2.0 - WGS84_F);
/// WGS84 second eccentricity squared.
pub const WGS84_EP2: f64 = (WGS84_A * WGS84_A - WGS84_B * WGS84_B) / (WGS84_B * WGS84_B);

/// Geodetic coordinates in radians and meters.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Geodetic {
    pub lat_rad: f64,
    pub lon_rad: f64,
    pub alt_m: f64,
}

impl Geodetic {
    pub fn new(lat_rad: f64, lon_rad: f64, alt_m: f64) -> Self {
        Self {
            lat_rad,
            lon_rad,
            alt_m,
        }
    }

    pub fn to_degrees(self) -> Cartographic {
        Cartographic {
            lat_deg: self.lat_rad.to_degrees(),
            lon_deg: self.lon_rad.to_degrees(),
            height_m: self.alt_m,
        }
    }
}

/// Geographic coordinates in degrees, as written into share documents.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Cartographic {
    pub lat_deg: f64,
    pub lon_deg: f64,
    pub height_m: f64,
}

impl Cartographic {
    pub fn new(lat_deg: f64, lon_deg: f64, height_m: f64) -> Self {
        Self {
            lat_deg,
            lon_deg,
            height_m,
        }
    }

    pub fn to_radians(self) -> Geodetic {
        Geodetic::new(self.lat_deg.to_radians(), self.lon_deg.to_radians(), self.height_m)
    }
}

pub fn geodetic_to_ecef(geo: Geodetic) -> Ecef {
    let (sin_lat, cos_lat) = geo.lat_rad.sin_cos();
    let (sin_lon, cos_lon) = geo.lon_rad.sin_cos();

    let n = WGS84_A / (1.0 - WGS84_E2 * sin_lat * sin_lat).sqrt();
    Ecef::new(
        (n + geo.alt_m) * cos_lat * cos_lon,
        (n + geo.alt_m) * cos_lat * sin_lon,
        (n * (1.0 - WGS84_E2) + geo.alt_m) * sin_lat,
    )
}

/// Bowring's closed-form inverse. Sub-millimetre on the ellipsoid surface,
/// which is far below what a pick location needs.
pub fn ecef_to_geodetic(ecef: Ecef) -> Geodetic {
    let p = ecef.x.hypot(ecef.y);
    let lon = ecef.y.atan2(ecef.x);

    let theta = (ecef.z * WGS84_A).atan2(p * WGS84_B);
    let (sin_theta, cos_theta) = theta.sin_cos();

    let lat = (ecef.z + WGS84_EP2 * WGS84_B * sin_theta.powi(3))
        .atan2(p - WGS84_E2 * WGS84_A * cos_theta.powi(3));

    let sin_lat = lat.sin();
    let n = WGS84_A / (1.0 - WGS84_E2 * sin_lat * sin_lat).sqrt();
    let alt = p / lat.cos() - n;

    Geodetic::new(lat, lon, alt)
}

pub fn ecef_to_cartographic(ecef: Ecef) -> Cartographic {
    ecef_to_geodetic(ecef).to_degrees()
}
