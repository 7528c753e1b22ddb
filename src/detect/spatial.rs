//! Spatial consistency: agreement between a cell and its strongest neighbours.
use crate::raster::Raster;

const NEIGH_OFFSETS: [(isize, isize); 8] = [
    (-1, -1),
    (-1, 0),
    (-1, 1),
    (0, -1),
    (0, 1),
    (1, -1),
    (1, 0),
    (1, 1),
];

/// For every finite cell of `preliminary` (a per-cell score in `[0, 1]`),
/// returns `min(p, support)` where `support` is the mean of the two largest
/// finite 8-neighbour scores (a missing second neighbour counts as 0).
/// An isolated hot cell therefore scores low; a corroborated one keeps its
/// own score. Non-finite cells stay `NaN`.
pub fn spatial_consistency(preliminary: &Raster) -> Raster {
    let (rows, cols) = (preliminary.rows, preliminary.cols);
    let mut out = Raster::nodata(rows, cols);
    for r in 0..rows {
        for c in 0..cols {
            let p = preliminary.get(r, c);
            if !p.is_finite() {
                continue;
            }
            let mut best = [0.0f32; 2];
            for (dr, dc) in NEIGH_OFFSETS {
                let rr = r as isize + dr;
                let cc = c as isize + dc;
                if rr < 0 || cc < 0 || rr >= rows as isize || cc >= cols as isize {
                    continue;
                }
                let q = preliminary.get(rr as usize, cc as usize);
                if !q.is_finite() {
                    continue;
                }
                if q > best[0] {
                    best[1] = best[0];
                    best[0] = q;
                } else if q > best[1] {
                    best[1] = q;
                }
            }
            let support = 0.5 * (best[0] + best[1]);
            out.set(r, c, p.min(support));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn isolated_cell_is_suppressed() {
        let mut p = Raster::filled(5, 5, 0.0);
        p.set(2, 2, 1.0);
        let s = spatial_consistency(&p);
        assert_eq!(s.get(2, 2), 0.0);
        assert_eq!(s.get(1, 1), 0.0);
    }

    #[test]
    fn corroborated_block_keeps_its_score() {
        let mut p = Raster::filled(6, 6, 0.0);
        for r in 1..4 {
            for c in 1..4 {
                p.set(r, c, 0.9);
            }
        }
        let s = spatial_consistency(&p);
        for r in 1..4 {
            for c in 1..4 {
                assert_eq!(s.get(r, c), 0.9, "cell {r},{c}");
            }
        }
        // the ring outside has strong neighbours but no own score
        assert_eq!(s.get(0, 0), 0.0);
    }

    #[test]
    fn nodata_is_preserved_and_ignored() {
        let mut p = Raster::filled(3, 3, 0.4);
        p.set(0, 0, f32::NAN);
        let s = spatial_consistency(&p);
        assert!(s.get(0, 0).is_nan());
        assert_eq!(s.get(1, 1), 0.4);
    }

    #[test]
    fn pair_of_cells_gets_half_support() {
        let mut p = Raster::filled(4, 4, 0.0);
        p.set(1, 1, 1.0);
        p.set(1, 2, 1.0);
        let s = spatial_consistency(&p);
        assert_eq!(s.get(1, 1), 0.5);
    }
}
