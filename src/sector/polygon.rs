//! Point-in-polygon test shared by the geographic filter (C2) and the
//! sector loader (C5). Boundary points count as inside per spec.md §4.2's
//! tie-break rule; `geo::Contains` alone treats the boundary as outside,
//! so this wraps it with an exterior-ring intersection check.

use geo::{Contains, Intersects, Point, Polygon};

pub fn point_in_polygon_inclusive(polygon: &Polygon<f64>, lat: f64, lon: f64) -> bool {
    let point = Point::new(lon, lat);
    polygon.contains(&point) || polygon.exterior().intersects(&point)
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{Coord, LineString};

    fn square() -> Polygon<f64> {
        let coords: Vec<Coord<f64>> = vec![(0.0, 0.0), (0.0, 10.0), (10.0, 10.0), (10.0, 0.0), (0.0, 0.0)]
            .into_iter()
            .map(|(x, y)| Coord { x, y })
            .collect();
        Polygon::new(LineString::new(coords), vec![])
    }

    #[test]
    fn test_interior_point_is_inside() {
        assert!(point_in_polygon_inclusive(&square(), 5.0, 5.0));
    }

    #[test]
    fn test_boundary_point_is_inside() {
        assert!(point_in_polygon_inclusive(&square(), 0.0, 5.0));
    }

    #[test]
    fn test_exterior_point_is_outside() {
        assert!(!point_in_polygon_inclusive(&square(), 50.0, 50.0));
    }
}
