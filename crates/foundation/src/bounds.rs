/// Geographic rectangle in radians (west, south, east, north), the form the
/// mapping engine reports its view extent in.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct GeoRect {
    pub west: f64,
    pub south: f64,
    pub east: f64,
    pub north: f64,
}

/// The same rectangle expressed in degrees.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct GeoRectDegrees {
    pub west: f64,
    pub south: f64,
    pub east: f64,
    pub north: f64,
}

impl GeoRect {
    pub fn new(west: f64, south: f64, east: f64, north: f64) -> Self {
        Self {
            west,
            south,
            east,
            north,
        }
    }

    pub fn whole_world() -> Self {
        use std::f64::consts::{FRAC_PI_2, PI};
        Self::new(-PI, -FRAC_PI_2, PI, FRAC_PI_2)
    }

    pub fn from_degrees(r: GeoRectDegrees) -> Self {
        Self::new(
            r.west.to_radians(),
            r.south.to_radians(),
            r.east.to_radians(),
            r.north.to_radians(),
        )
    }

    pub fn to_degrees(self) -> GeoRectDegrees {
        GeoRectDegrees {
            west: self.west.to_degrees(),
            south: self.south.to_degrees(),
            east: self.east.to_degrees(),
            north: self.north.to_degrees(),
        }
    }
}

impl GeoRectDegrees {
    pub fn new(west: f64, south: f64, east: f64, north: f64) -> Self {
        Self {
            west,
            south,
            east,
            north,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{GeoRect, GeoRectDegrees};

    #[test]
    fn whole_world_in_degrees() {
        let d = GeoRect::whole_world().to_degrees();
        assert!((d.west + 180.0).abs() < 1e-12);
        assert!((d.north - 90.0).abs() < 1e-12);
    }

    #[test]
    fn degrees_convert_back_and_forth() {
        let d = GeoRect::from_degrees(GeoRectDegrees::new(170.0, -10.0, -170.0, 10.0)).to_degrees();
        assert!((d.west - 170.0).abs() < 1e-9);
        assert!((d.east + 170.0).abs() < 1e-9);
    }
}
