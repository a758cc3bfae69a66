use crate::types::SkyPosition;
use std::collections::HashMap;

/// Nearest-within-radius capability over a point set
pub trait SpatialIndex: Send + Sync {
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Indices and separations (degrees) of all points within `radius_deg`,
    /// sorted by index
    fn within(&self, target: &SkyPosition, radius_deg: f64) -> Vec<(usize, f64)>;

    /// Closest point within `radius_deg`; equal separations go to the lower index
    fn nearest_within(&self, target: &SkyPosition, radius_deg: f64) -> Option<(usize, f64)> {
        nearest(self.within(target, radius_deg))
    }
}

/// Smallest separation, lower index on ties
pub fn nearest(hits: impl IntoIterator<Item = (usize, f64)>) -> Option<(usize, f64)> {
    hits.into_iter()
        .min_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)))
}

/// Linear scan over all points
#[derive(Debug, Clone)]
pub struct BruteForceIndex {
    points: Vec<SkyPosition>,
}

impl BruteForceIndex {
    pub fn new(points: Vec<SkyPosition>) -> Self {
        Self { points }
    }
}

impl SpatialIndex for BruteForceIndex {
    fn len(&self) -> usize {
        self.points.len()
    }

    fn within(&self, target: &SkyPosition, radius_deg: f64) -> Vec<(usize, f64)> {
        self.points
            .iter()
            .enumerate()
            .filter_map(|(i, p)| {
                let sep = target.separation_deg(p);
                (sep <= radius_deg).then_some((i, sep))
            })
            .collect()
    }
}

/// Equal-angle sky grid with sparse cells
#[derive(Debug, Clone)]
pub struct SkyGridIndex {
    points: Vec<SkyPosition>,
    cell_deg: f64,
    n_lat: i64,
    n_lon: i64,
    cells: HashMap<(i64, i64), Vec<usize>>,
}

impl SkyGridIndex {
    /// Smallest cell size accepted, one arcsecond
    pub const MIN_CELL_DEG: f64 = 1.0 / 3600.0;

    /// Build the grid; `cell_deg` is clamped to [1 arcsec, 180 deg]
    pub fn new(points: Vec<SkyPosition>, cell_deg: f64) -> Self {
        let cell_deg = if cell_deg.is_finite() {
            cell_deg.clamp(Self::MIN_CELL_DEG, 180.0)
        } else {
            1.0
        };
        let n_lat = (180.0 / cell_deg).ceil() as i64;
        let n_lon = (360.0 / cell_deg).ceil() as i64;

        let mut cells: HashMap<(i64, i64), Vec<usize>> = HashMap::new();
        for (i, p) in points.iter().enumerate() {
            let key = (
                Self::lat_bin(p.dec, cell_deg, n_lat),
                Self::lon_bin(p.ra, cell_deg, n_lon),
            );
            cells.entry(key).or_default().push(i);
        }

        log::debug!(
            "Built sky grid: {} points in {} occupied cells of {:.5} deg",
            points.len(),
            cells.len(),
            cell_deg
        );

        Self { points, cell_deg, n_lat, n_lon, cells }
    }

    fn lat_bin(dec: f64, cell_deg: f64, n_lat: i64) -> i64 {
        (((dec + 90.0) / cell_deg).floor() as i64).clamp(0, n_lat - 1)
    }

    fn lon_bin(ra: f64, cell_deg: f64, n_lon: i64) -> i64 {
        ((ra.rem_euclid(360.0) / cell_deg).floor() as i64).rem_euclid(n_lon)
    }

    /// Half-width in right ascension (degrees) of a cap, or `None` if it covers a pole
    fn ra_half_span(dec: f64, radius_deg: f64) -> Option<f64> {
        let sin_r = radius_deg.to_radians().sin();
        let cos_dec = dec.to_radians().cos();
        if radius_deg >= 90.0 || sin_r >= cos_dec {
            None
        } else {
            Some((sin_r / cos_dec).asin().to_degrees())
        }
    }

    fn scan(&self, target: &SkyPosition, radius_deg: f64, indices: impl Iterator<Item = usize>) -> Vec<(usize, f64)> {
        let mut hits: Vec<(usize, f64)> = indices
            .filter_map(|i| {
                let sep = target.separation_deg(&self.points[i]);
                (sep <= radius_deg).then_some((i, sep))
            })
            .collect();
        hits.sort_by_key(|h| h.0);
        hits
    }
}

impl SpatialIndex for SkyGridIndex {
    fn len(&self) -> usize {
        self.points.len()
    }

    fn within(&self, target: &SkyPosition, radius_deg: f64) -> Vec<(usize, f64)> {
        if self.points.is_empty() || radius_deg.is_nan() || radius_deg < 0.0 {
            return Vec::new();
        }

        let lat_lo = Self::lat_bin(target.dec - radius_deg, self.cell_deg, self.n_lat);
        let lat_hi = Self::lat_bin(target.dec + radius_deg, self.cell_deg, self.n_lat);

        // One cell of margin absorbs rounding at cell edges
        let lon_bins: Vec<i64> = match Self::ra_half_span(target.dec, radius_deg) {
            Some(half) if 2.0 * (half + self.cell_deg) < 360.0 => {
                let lo = ((target.ra - half) / self.cell_deg).floor() as i64 - 1;
                let hi = ((target.ra + half) / self.cell_deg).floor() as i64 + 1;
                let mut bins: Vec<i64> = (lo..=hi).map(|b| b.rem_euclid(self.n_lon)).collect();
                bins.sort_unstable();
                bins.dedup();
                bins
            }
            _ => (0..self.n_lon).collect(),
        };

        let n_cells = (lat_hi - lat_lo + 1) as usize * lon_bins.len();
        if n_cells > self.cells.len() {
            // Cheaper to walk the occupied cells than the candidate ones
            let indices = self
                .cells
                .iter()
                .filter(|((lat, lon), _)| {
                    *lat >= lat_lo - 1 && *lat <= lat_hi + 1 && lon_bins.binary_search(lon).is_ok()
                })
                .flat_map(|(_, members)| members.iter().copied());
            return self.scan(target, radius_deg, indices);
        }

        let mut candidates = Vec::new();
        for lat in (lat_lo - 1).max(0)..=(lat_hi + 1).min(self.n_lat - 1) {
            for &lon in &lon_bins {
                if let Some(members) = self.cells.get(&(lat, lon)) {
                    candidates.extend_from_slice(members);
                }
            }
        }
        self.scan(target, radius_deg, candidates.into_iter())
    }
}
