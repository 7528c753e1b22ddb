//! Outer boundary of a labelled component, traced along cell edges.
//!
//! Every cell side that faces a cell outside the component becomes a directed
//! edge on the corner lattice, oriented so the component lies on the left
//! (rows grow downwards). Edges are chained into closed loops; where two
//! loops touch at a corner (diagonal contact) the walk takes the sharpest
//! right turn, which keeps diagonally connected cells inside one ring. The
//! loop with the largest enclosed area is the outer boundary.
use std::collections::{BTreeMap, HashSet};

/// Corner-lattice vertex as `(row, col)`.
pub type Vertex = (i64, i64);

/// Closed outer ring of the cells in `cells` (raster indices of a grid with
/// `cols` columns). Consecutive collinear vertices are removed; the first
/// vertex is not repeated at the end. Returns an empty ring for no cells.
pub fn trace_outer_ring(cells: &[usize], cols: usize) -> Vec<Vertex> {
    if cells.is_empty() {
        return Vec::new();
    }
    let inside: HashSet<usize> = cells.iter().copied().collect();
    let has = |r: i64, c: i64| -> bool {
        r >= 0 && c >= 0 && (c as usize) < cols && inside.contains(&(r as usize * cols + c as usize))
    };

    let mut edges: Vec<(Vertex, Vertex)> = Vec::new();
    for &idx in cells {
        let (r, c) = ((idx / cols) as i64, (idx % cols) as i64);
        if !has(r - 1, c) {
            edges.push(((r, c + 1), (r, c)));
        }
        if !has(r, c - 1) {
            edges.push(((r, c), (r + 1, c)));
        }
        if !has(r + 1, c) {
            edges.push(((r + 1, c), (r + 1, c + 1)));
        }
        if !has(r, c + 1) {
            edges.push(((r + 1, c + 1), (r, c + 1)));
        }
    }

    let mut outgoing: BTreeMap<Vertex, Vec<usize>> = BTreeMap::new();
    for (k, (from, _)) in edges.iter().enumerate() {
        outgoing.entry(*from).or_default().push(k);
    }

    let mut used = vec![false; edges.len()];
    let mut best: Vec<Vertex> = Vec::new();
    let mut best_area = 0.0f64;
    for start in 0..edges.len() {
        if used[start] {
            continue;
        }
        let ring = walk_loop(start, &edges, &outgoing, &mut used);
        let area = signed_area(&ring).abs();
        if area > best_area {
            best_area = area;
            best = ring;
        }
    }
    remove_collinear(&best)
}

fn walk_loop(
    start: usize,
    edges: &[(Vertex, Vertex)],
    outgoing: &BTreeMap<Vertex, Vec<usize>>,
    used: &mut [bool],
) -> Vec<Vertex> {
    let mut ring = Vec::new();
    let mut current = start;
    loop {
        used[current] = true;
        let (from, to) = edges[current];
        ring.push(from);
        let dir_in = (to.0 - from.0, to.1 - from.1);
        let next = outgoing.get(&to).and_then(|candidates| {
            candidates
                .iter()
                .copied()
                .filter(|&k| !used[k])
                .max_by_key(|&k| {
                    let (a, b) = edges[k];
                    turn(dir_in, (b.0 - a.0, b.1 - a.1))
                })
        });
        match next {
            Some(k) => current = k,
            None => break,
        }
    }
    ring
}

/// Positive for a right turn in (row, col) space, 0 straight, negative left.
fn turn(d_in: (i64, i64), d_out: (i64, i64)) -> i64 {
    // (row, col) is a left-handed frame: col is x, row is y pointing down
    let (x1, y1) = (d_in.1, d_in.0);
    let (x2, y2) = (d_out.1, d_out.0);
    x1 * y2 - y1 * x2
}

/// Shoelace area of a ring in (row, col) lattice units.
pub fn signed_area(ring: &[Vertex]) -> f64 {
    let n = ring.len();
    if n < 3 {
        return 0.0;
    }
    let mut acc = 0i64;
    for i in 0..n {
        let (r0, c0) = ring[i];
        let (r1, c1) = ring[(i + 1) % n];
        acc += c0 * r1 - c1 * r0;
    }
    acc as f64 * 0.5
}

fn remove_collinear(ring: &[Vertex]) -> Vec<Vertex> {
    let n = ring.len();
    if n < 3 {
        return ring.to_vec();
    }
    let mut out = Vec::with_capacity(n);
    for i in 0..n {
        let prev = ring[(i + n - 1) % n];
        let cur = ring[i];
        let next = ring[(i + 1) % n];
        let cross = (cur.1 - prev.1) * (next.0 - cur.0) - (cur.0 - prev.0) * (next.1 - cur.1);
        if cross != 0 {
            out.push(cur);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cells(cols: usize, rc: &[(usize, usize)]) -> Vec<usize> {
        let mut v: Vec<usize> = rc.iter().map(|&(r, c)| r * cols + c).collect();
        v.sort_unstable();
        v
    }

    #[test]
    fn single_cell_is_a_unit_square() {
        let ring = trace_outer_ring(&cells(5, &[(2, 3)]), 5);
        assert_eq!(ring.len(), 4);
        assert_eq!(signed_area(&ring).abs(), 1.0);
        for v in [(2, 3), (2, 4), (3, 3), (3, 4)] {
            assert!(ring.contains(&v), "missing corner {v:?}");
        }
    }

    #[test]
    fn block_collapses_to_four_corners() {
        let block: Vec<(usize, usize)> = (1..4).flat_map(|r| (2..5).map(move |c| (r, c))).collect();
        let ring = trace_outer_ring(&cells(8, &block), 8);
        assert_eq!(ring.len(), 4);
        assert_eq!(signed_area(&ring).abs(), 9.0);
    }

    #[test]
    fn diagonal_pair_stays_in_one_ring() {
        let ring = trace_outer_ring(&cells(4, &[(0, 0), (1, 1)]), 4);
        assert_eq!(signed_area(&ring).abs(), 2.0);
        assert_eq!(ring.len(), 8);
    }

    #[test]
    fn inner_hole_does_not_replace_outer_ring() {
        let mut donut = Vec::new();
        for r in 0..3 {
            for c in 0..3 {
                if (r, c) != (1, 1) {
                    donut.push((r, c));
                }
            }
        }
        let ring = trace_outer_ring(&cells(3, &donut), 3);
        assert_eq!(signed_area(&ring).abs(), 9.0);
        assert_eq!(ring.len(), 4);
    }
}
