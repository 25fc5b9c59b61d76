use serde::Serialize;

use crate::models::candidate::{GridPoint, LatLng};

pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Kilometers per degree of latitude, used for lattice spacing.
const KM_PER_DEGREE: f64 = 111.0;

/// Lattice spacing relative to the probe radius. A square lattice with this
/// spacing leaves every point within `0.99 × probe_radius` of a lattice point.
const STEP_FACTOR: f64 = 1.4;

/// Great-circle distance in kilometers.
pub fn haversine_km(a: LatLng, b: LatLng) -> f64 {
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();
    let d_lat = (b.lat - a.lat).to_radians();
    let d_lng = (b.lng - a.lng).to_radians();

    let h = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lng / 2.0).sin().powi(2);
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());

    EARTH_RADIUS_KM * c
}

/// Probe points covering the disk of `area_radius_km` around `center`.
///
/// The lattice is anchored on the center and walked south to north, west to
/// east. Lattice points just outside the area (within one probe radius of the
/// rim) are pulled onto the rim along their bearing, so every returned point
/// lies inside the area and the rim stays covered. Output is deterministic.
pub fn generate_grid(center: LatLng, area_radius_km: f64, probe_radius_km: f64) -> Vec<GridPoint> {
    if !(probe_radius_km.is_finite() && probe_radius_km > 0.0) {
        return Vec::new();
    }
    let radius_m = (probe_radius_km * 1000.0).round() as u32;
    if !(area_radius_km.is_finite() && area_radius_km > 0.0) {
        return vec![GridPoint {
            lat: center.lat,
            lng: center.lng,
            radius_m,
        }];
    }

    let step_km = probe_radius_km * STEP_FACTOR;
    let step_lat = step_km / KM_PER_DEGREE;
    let step_lng = step_km / (KM_PER_DEGREE * center.lat.to_radians().cos().max(1e-6));
    let n = ((area_radius_km + probe_radius_km) / step_km).ceil() as i64;

    let mut points = Vec::new();
    for i in -n..=n {
        for j in -n..=n {
            let d_lat = i as f64 * step_lat;
            let d_lng = j as f64 * step_lng;
            let p = LatLng::new(center.lat + d_lat, center.lng + d_lng);
            let dist = haversine_km(center, p);

            let kept = if dist <= area_radius_km {
                Some(p)
            } else if dist <= area_radius_km + probe_radius_km {
                Some(pull_onto_rim(center, d_lat, d_lng, dist, area_radius_km))
            } else {
                None
            };

            if let Some(p) = kept {
                points.push(GridPoint {
                    lat: p.lat,
                    lng: p.lng,
                    radius_m,
                });
            }
        }
    }

    points
}

/// Scale an offset from `center` so the point sits on (just inside) the rim.
fn pull_onto_rim(center: LatLng, d_lat: f64, d_lng: f64, dist: f64, area_radius_km: f64) -> LatLng {
    let mut k = area_radius_km / dist;
    let mut p = LatLng::new(center.lat + d_lat * k, center.lng + d_lng * k);
    // The planar scale can land a hair outside the great-circle radius.
    for _ in 0..8 {
        if haversine_km(center, p) <= area_radius_km {
            break;
        }
        k *= 0.9999;
        p = LatLng::new(center.lat + d_lat * k, center.lng + d_lng * k);
    }
    p
}

/// Upper-bound cost estimate for a grid search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApiCallEstimate {
    pub grid_points: usize,
    pub keywords: usize,
    pub base_queries: usize,
    pub max_api_calls: usize,
    pub max_results_theoretical: usize,
}

pub fn estimate_api_calls(
    area_radius_km: f64,
    probe_radius_km: f64,
    keywords: usize,
    max_pages: usize,
) -> ApiCallEstimate {
    let grid_points = generate_grid(LatLng::new(0.0, 0.0), area_radius_km, probe_radius_km).len();
    let base_queries = grid_points * keywords;

    ApiCallEstimate {
        grid_points,
        keywords,
        base_queries,
        max_api_calls: base_queries * max_pages,
        // 20 results per page
        max_results_theoretical: base_queries * max_pages * 20,
    }
}
