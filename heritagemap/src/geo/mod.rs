//! Geographic primitives
//!
//! Provides the [`Position`] snapshot shared by every component, great-circle
//! distance in metres, and the [`GeoBounds`] box reported by the map surface.

mod types;

pub use types::{GeoBounds, GeoError, Position, MAX_LAT, MAX_LON, MIN_LAT, MIN_LON};

/// Mean Earth radius in metres (IUGG).
pub const EARTH_RADIUS_M: f64 = 6_371_008.8;

/// Metres per degree of latitude (constant on a sphere).
const METERS_PER_DEGREE_LAT: f64 = EARTH_RADIUS_M * std::f64::consts::PI / 180.0;

/// Great-circle distance between two positions in metres (haversine).
#[inline]
pub fn haversine_m(a: &Position, b: &Position) -> f64 {
    let lat1 = a.latitude.to_radians();
    let lat2 = b.latitude.to_radians();
    let dlat = (b.latitude - a.latitude).to_radians();
    let dlon = (b.longitude - a.longitude).to_radians();

    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_M * h.sqrt().min(1.0).asin()
}

/// Bounding box covering a circle of `radius_m` around `center`.
///
/// Uses the local equirectangular approximation, which is what the map
/// surface itself uses for its search circle. Longitude span is widened by
/// `1 / cos(lat)` and capped near the poles.
pub fn bounds_around(center: &Position, radius_m: f64) -> GeoBounds {
    let dlat = radius_m / METERS_PER_DEGREE_LAT;
    let cos_lat = center.latitude.to_radians().cos().max(0.01);
    let dlon = (dlat / cos_lat).min(180.0);

    GeoBounds::new(
        (center.latitude - dlat).max(MIN_LAT),
        (center.latitude + dlat).min(MAX_LAT),
        (center.longitude - dlon).max(MIN_LON),
        (center.longitude + dlon).min(MAX_LON),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_distance_to_self_is_zero() {
        let p = Position::new(37.5, 127.0);
        assert_eq!(haversine_m(&p, &p), 0.0);
    }

    #[test]
    fn test_one_degree_latitude_is_about_111km() {
        let a = Position::new(0.0, 0.0);
        let b = Position::new(1.0, 0.0);
        let d = haversine_m(&a, &b);
        assert!((d - 111_195.0).abs() < 10.0, "got {}", d);
    }

    #[test]
    fn test_seoul_to_busan() {
        // City Hall to Busan Station, roughly 325 km as the crow flies
        let seoul = Position::new(37.5663, 126.9779);
        let busan = Position::new(35.1151, 129.0422);
        let d = haversine_m(&seoul, &busan);
        assert!((320_000.0..330_000.0).contains(&d), "got {}", d);
    }

    #[test]
    fn test_small_displacement_resolution() {
        // 0.0005° of latitude is ~55 m
        let a = Position::new(37.5, 127.0);
        let b = Position::new(37.5005, 127.0);
        let d = haversine_m(&a, &b);
        assert!((50.0..60.0).contains(&d), "got {}", d);
    }

    #[test]
    fn test_bounds_around_contains_center() {
        let c = Position::new(37.5, 127.0);
        let bounds = bounds_around(&c, 1000.0);
        assert!(bounds.contains(&c));
        assert!(bounds.north > c.latitude && bounds.south < c.latitude);
        // Longitude span is wider than latitude span away from the equator
        assert!(bounds.east - bounds.west > bounds.north - bounds.south);
    }

    #[test]
    fn test_bounds_edges_are_radius_away() {
        let c = Position::new(37.5, 127.0);
        let bounds = bounds_around(&c, 1000.0);
        let north = Position::new(bounds.north, c.longitude);
        let d = haversine_m(&c, &north);
        assert!((d - 1000.0).abs() < 1.0, "got {}", d);
    }

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn test_distance_is_symmetric(
                lat1 in -89.0..89.0_f64, lon1 in -180.0..180.0_f64,
                lat2 in -89.0..89.0_f64, lon2 in -180.0..180.0_f64,
            ) {
                let a = Position::new(lat1, lon1);
                let b = Position::new(lat2, lon2);
                prop_assert!((haversine_m(&a, &b) - haversine_m(&b, &a)).abs() < 1e-6);
            }

            #[test]
            fn test_distance_bounded_by_half_circumference(
                lat1 in -90.0..90.0_f64, lon1 in -180.0..180.0_f64,
                lat2 in -90.0..90.0_f64, lon2 in -180.0..180.0_f64,
            ) {
                let d = haversine_m(&Position::new(lat1, lon1), &Position::new(lat2, lon2));
                prop_assert!(d >= 0.0);
                prop_assert!(d <= std::f64::consts::PI * EARTH_RADIUS_M + 1.0);
            }
        }
    }
}
