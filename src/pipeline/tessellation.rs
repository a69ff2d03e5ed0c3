use std::collections::{BTreeSet, HashSet};

#[derive(Clone, Copy, Debug)]
struct Triangle {
    vertices: [usize; 3],
    center: (f64, f64),
    radius_sq: f64,
}

impl Triangle {
    /// `None` for collinear vertices, which have no circumcircle.
    fn new(coords: &[(f64, f64)], vertices: [usize; 3]) -> Option<Self> {
        let [a, b, c] = vertices.map(|v| coords[v]);
        let d = 2.0 * (a.0 * (b.1 - c.1) + b.0 * (c.1 - a.1) + c.0 * (a.1 - b.1));
        if d.abs() < f64::EPSILON {
            return None;
        }

        let (sa, sb, sc) = (
            a.0 * a.0 + a.1 * a.1,
            b.0 * b.0 + b.1 * b.1,
            c.0 * c.0 + c.1 * c.1,
        );
        let ux = (sa * (b.1 - c.1) + sb * (c.1 - a.1) + sc * (a.1 - b.1)) / d;
        let uy = (sa * (c.0 - b.0) + sb * (a.0 - c.0) + sc * (b.0 - a.0)) / d;
        let radius_sq = (a.0 - ux).powi(2) + (a.1 - uy).powi(2);

        Some(Self {
            vertices,
            center: (ux, uy),
            radius_sq,
        })
    }

    fn encloses(&self, p: (f64, f64)) -> bool {
        (p.0 - self.center.0).powi(2) + (p.1 - self.center.1).powi(2) < self.radius_sq
    }

    fn edges(&self) -> [[usize; 2]; 3] {
        let [a, b, c] = self.vertices;
        [ordered(a, b), ordered(b, c), ordered(c, a)]
    }
}

fn ordered(a: usize, b: usize) -> [usize; 2] {
    [a.min(b), a.max(b)]
}

/// Delaunay triangulation (Bowyer-Watson) of pixel positions, returned as
/// unique edges between point indices. Missing points are skipped and points
/// that land on the same pixel keep only the first index.
pub fn tessellate(points: &[Option<(f32, f32)>]) -> Vec<(usize, usize)> {
    let mut seen = HashSet::new();
    let mut ids = Vec::new();
    let mut coords: Vec<(f64, f64)> = Vec::new();
    for (id, point) in points.iter().enumerate() {
        let Some((x, y)) = *point else {
            continue;
        };
        if !(x.is_finite() && y.is_finite()) {
            continue;
        }
        if seen.insert((x.round() as i64, y.round() as i64)) {
            ids.push(id);
            coords.push((f64::from(x), f64::from(y)));
        }
    }
    if coords.len() < 3 {
        return Vec::new();
    }

    let (min_x, min_y, max_x, max_y) = coords.iter().fold(
        (f64::MAX, f64::MAX, f64::MIN, f64::MIN),
        |(min_x, min_y, max_x, max_y), &(x, y)| {
            (min_x.min(x), min_y.min(y), max_x.max(x), max_y.max(y))
        },
    );
    let span = (max_x - min_x).max(max_y - min_y).max(1.0);
    let (mid_x, mid_y) = ((min_x + max_x) / 2.0, (min_y + max_y) / 2.0);

    // Enclosing triangle; its corners are dropped at the end.
    let real = coords.len();
    coords.push((mid_x - 20.0 * span, mid_y - span));
    coords.push((mid_x, mid_y + 20.0 * span));
    coords.push((mid_x + 20.0 * span, mid_y - span));

    let mut triangles: Vec<Triangle> = Triangle::new(&coords, [real, real + 1, real + 2])
        .into_iter()
        .collect();

    for (i, &p) in coords[..real].iter().enumerate() {
        let (cavity, kept): (Vec<Triangle>, Vec<Triangle>) =
            triangles.into_iter().partition(|t| t.encloses(p));
        triangles = kept;

        let edges: Vec<[usize; 2]> = cavity.iter().flat_map(Triangle::edges).collect();
        for edge in &edges {
            if edges.iter().filter(|e| *e == edge).count() > 1 {
                continue;
            }
            if let Some(triangle) = Triangle::new(&coords, [edge[0], edge[1], i]) {
                triangles.push(triangle);
            }
        }
    }

    let mut unique = BTreeSet::new();
    for triangle in triangles.iter().filter(|t| t.vertices.iter().all(|v| *v < real)) {
        for [a, b] in triangle.edges() {
            let (a, b) = (ids[a], ids[b]);
            unique.insert((a.min(b), a.max(b)));
        }
    }
    unique.into_iter().collect()
}
