//! Douglas–Peucker simplification of closed rings.

pub type Point = [f64; 2];

fn perpendicular_distance(p: Point, a: Point, b: Point) -> f64 {
    let (dx, dy) = (b[0] - a[0], b[1] - a[1]);
    let len = (dx * dx + dy * dy).sqrt();
    if len == 0.0 {
        return ((p[0] - a[0]).powi(2) + (p[1] - a[1]).powi(2)).sqrt();
    }
    ((p[0] - a[0]) * dy - (p[1] - a[1]) * dx).abs() / len
}

/// Mark the vertices of `pts[lo..=hi]` kept by Douglas–Peucker.
fn dp_mark(pts: &[Point], lo: usize, hi: usize, tolerance: f64, keep: &mut [bool]) {
    let mut stack = vec![(lo, hi)];
    while let Some((lo, hi)) = stack.pop() {
        if hi <= lo + 1 {
            continue;
        }
        let (mut best, mut best_d) = (lo, -1.0f64);
        for k in lo + 1..hi {
            let d = perpendicular_distance(pts[k], pts[lo], pts[hi]);
            if d > best_d {
                best = k;
                best_d = d;
            }
        }
        if best_d > tolerance {
            keep[best] = true;
            stack.push((lo, best));
            stack.push((best, hi));
        }
    }
}

/// Simplify a closed ring (first vertex not repeated). The ring is split at
/// vertex 0 and the vertex farthest from it; both halves are simplified
/// independently so the result stays closed.
pub fn simplify_ring(ring: &[Point], tolerance: f64) -> Vec<Point> {
    let n = ring.len();
    if n <= 3 || tolerance <= 0.0 {
        return ring.to_vec();
    }
    let far = (1..n)
        .max_by(|&a, &b| {
            let da = perpendicular_distance(ring[a], ring[0], ring[0]);
            let db = perpendicular_distance(ring[b], ring[0], ring[0]);
            da.total_cmp(&db).then(b.cmp(&a))
        })
        .unwrap_or(n / 2);

    let mut closed = ring.to_vec();
    closed.push(ring[0]);
    let mut keep = vec![false; n + 1];
    keep[0] = true;
    keep[far] = true;
    dp_mark(&closed, 0, far, tolerance, &mut keep);
    dp_mark(&closed, far, n, tolerance, &mut keep);

    closed
        .iter()
        .take(n)
        .zip(&keep)
        .filter_map(|(p, &k)| k.then_some(*p))
        .collect()
}

/// Shoelace area; positive for counter-clockwise rings in a y-up frame.
pub fn ring_area(ring: &[Point]) -> f64 {
    let n = ring.len();
    if n < 3 {
        return 0.0;
    }
    let mut acc = 0.0;
    for i in 0..n {
        let a = ring[i];
        let b = ring[(i + 1) % n];
        acc += a[0] * b[1] - b[0] * a[1];
    }
    0.5 * acc
}
