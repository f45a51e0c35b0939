//! Small reproducible terrains with water and boundaries, used by the tests
//! and the `demo` command.

use std::rc::Rc;

use crate::dataset::{CatchmentLines, Section};
use crate::error::Result;
use crate::geometry::{polyline, Point3};
use crate::route::Router;
use crate::tin::Tin;
use crate::water::WaterNetwork;

/// A terrain with its water network and boundary sections.
pub struct Scenario {
    pub tin: Rc<Tin>,
    pub water: Rc<WaterNetwork>,
    pub lines: CatchmentLines,
}

/// Grid of `columns` x `rows` vertices at integer coordinates, each cell
/// split along its rising diagonal.
pub fn diagonal_grid<F>(columns: usize, rows: usize, z: F) -> Result<Tin>
where
    F: Fn(f64, f64) -> f64,
{
    let mut vertices = Vec::with_capacity(columns * rows);
    for j in 0..rows {
        for i in 0..columns {
            let (x, y) = (i as f64, j as f64);
            vertices.push(Point3::new(x, y, z(x, y)));
        }
    }
    let at = |i: usize, j: usize| j * columns + i;
    let mut triangles = Vec::new();
    for j in 0..rows.saturating_sub(1) {
        for i in 0..columns.saturating_sub(1) {
            triangles.push([at(i, j), at(i + 1, j), at(i + 1, j + 1)]);
            triangles.push([at(i, j), at(i + 1, j + 1), at(i, j + 1)]);
        }
    }
    Tin::new(vertices, triangles)
}

/// Grid of `nx` x `ny` unit cells, each split into four triangles around a
/// vertex at its centre.
pub fn centered_grid<F>(nx: usize, ny: usize, z: F) -> Result<Tin>
where
    F: Fn(f64, f64) -> f64,
{
    let columns = nx + 1;
    let mut vertices = Vec::with_capacity(columns * (ny + 1) + nx * ny);
    for j in 0..=ny {
        for i in 0..=nx {
            let (x, y) = (i as f64, j as f64);
            vertices.push(Point3::new(x, y, z(x, y)));
        }
    }
    let corner = |i: usize, j: usize| j * columns + i;
    let mut triangles = Vec::with_capacity(4 * nx * ny);
    for j in 0..ny {
        for i in 0..nx {
            let (x, y) = (i as f64 + 0.5, j as f64 + 0.5);
            let centre = vertices.len();
            vertices.push(Point3::new(x, y, z(x, y)));
            let ll = corner(i, j);
            let lr = corner(i + 1, j);
            let ur = corner(i + 1, j + 1);
            let ul = corner(i, j + 1);
            triangles.push([centre, ll, lr]);
            triangles.push([centre, lr, ur]);
            triangles.push([centre, ur, ul]);
            triangles.push([centre, ul, ll]);
        }
    }
    Tin::new(vertices, triangles)
}

fn line(coords: &[(f64, f64)]) -> Vec<Point3> {
    coords.iter().map(|&(x, y)| Point3::new(x, y, 0.0)).collect()
}

/// Straight run of mesh vertices from `from` to `to` in steps of `step`
/// along each axis.
fn run(tin: &Tin, from: (f64, f64), to: (f64, f64), step: f64) -> Result<Vec<Point3>> {
    let n = ((to.0 - from.0).abs().max((to.1 - from.1).abs()) / step).round() as usize;
    let (sx, sy) = ((to.0 - from.0) / n as f64, (to.1 - from.1) / n as f64);
    (0..=n)
        .map(|k| {
            let k = k as f64;
            tin.vertex(&Point3::new(from.0 + k * sx, from.1 + k * sy, f64::NAN))
        })
        .collect()
}

/// Three rivers meeting at (6, 6) in a "T" on a 12 x 12 grid. Elevation
/// rises with the distance to the nearest river, so the diagonals below the
/// crossbar are ridges.
///
/// Sections "1" and "2" run from the confluence down the two ridges, "3"
/// climbs north to a junction at (6, 10) where "4" and "5" branch west and
/// east.
pub fn ridge_valley() -> Result<Scenario> {
    let rivers = vec![
        line(&[(6.0, 6.0), (6.0, 3.0), (6.0, 0.0)]),
        line(&[(2.0, 6.0), (4.0, 6.0), (6.0, 6.0)]),
        line(&[(10.0, 6.0), (8.0, 6.0), (6.0, 6.0)]),
    ];
    let distance = |x: f64, y: f64| {
        let p = Point3::new(x, y, 0.0);
        rivers
            .iter()
            .map(|r| polyline::distance_to(r, &p))
            .fold(f64::INFINITY, f64::min)
    };
    let tin = centered_grid(12, 12, |x, y| 10.0 + distance(x, y))?;
    let sections = vec![
        Section::new("1", run(&tin, (6.0, 6.0), (2.0, 2.0), 0.5)?),
        Section::new("2", run(&tin, (6.0, 6.0), (10.0, 2.0), 0.5)?),
        Section::new("3", run(&tin, (6.0, 6.0), (6.0, 10.0), 1.0)?),
        Section::new("4", run(&tin, (6.0, 10.0), (2.0, 10.0), 1.0)?),
        Section::new("5", run(&tin, (6.0, 10.0), (10.0, 10.0), 1.0)?),
    ];
    Ok(Scenario {
        water: Rc::new(WaterNetwork::new(rivers)?),
        lines: CatchmentLines::new(sections)?,
        tin: Rc::new(tin),
    })
}

/// One section lying along the straight crest y = 5 of a 10 x 10 grid; no
/// other route between its ends is as high.
pub fn crest() -> Result<Scenario> {
    let tin = centered_grid(10, 10, |_, y| 20.0 - (y - 5.0).abs())?;
    let section = Section::new("crest", run(&tin, (1.0, 5.0), (9.0, 5.0), 1.0)?);
    Ok(Scenario {
        water: Rc::new(WaterNetwork::new(vec![line(&[(0.0, 0.0), (10.0, 0.0)])])?),
        lines: CatchmentLines::new(vec![section])?,
        tin: Rc::new(tin),
    })
}

/// Three sections meeting at (3, 3) on a 6 x 6 grid rising to the east.
/// Section "short" is a single edge to (4, 3); "west" and "north" are two
/// edges long.
pub fn spur() -> Result<Scenario> {
    let tin = centered_grid(6, 6, |x, _| 10.0 + x)?;
    let sections = vec![
        Section::new("short", run(&tin, (3.0, 3.0), (4.0, 3.0), 1.0)?),
        Section::new("west", run(&tin, (3.0, 3.0), (1.0, 3.0), 1.0)?),
        Section::new("north", run(&tin, (3.0, 3.0), (3.0, 5.0), 1.0)?),
    ];
    Ok(Scenario {
        water: Rc::new(WaterNetwork::new(vec![line(&[(0.0, 0.0), (6.0, 0.0)])])?),
        lines: CatchmentLines::new(sections)?,
        tin: Rc::new(tin),
    })
}

pub const RIVER_UPSTREAM_1_START: (f64, f64) = (7.0, 0.0);
pub const RIVER_UPSTREAM_2_START: (f64, f64) = (8.0, 0.0);
pub const RIVER_CONFLUENCE: (f64, f64) = (7.0, 1.0);
pub const RIVER_MAIN_END: (f64, f64) = (8.0, 9.0);

/// The 45 point river valley cloud.
pub fn valley_points() -> Vec<Point3> {
    [
        (0, 0, 10), (1, 0, 11), (3, 2, 12), (5, 1, 11), (6, 3, 10), (7, 1, 10), (7, 0, 10),
        (8, 0, 10), (9, 2, 13), (11, 3, 14), (12, 2, 15), (13, 3, 15), (15, 2, 14),
        (1, 3, 11), (2, 6, 13), (4, 6, 1), (5, 4, 13), (7, 5, 10), (8, 5, 10), (10, 4, 14),
        (11, 6, 16), (13, 5, 15), (14, 4, 15),
        (0, 7, 12), (2, 8, 13), (4, 9, 12), (5, 9, 14), (6, 8, 11), (8, 9, 10), (9, 7, 10),
        (10, 9, 12), (13, 7, 13), (14, 8, 14), (15, 7, 13),
        (0, 10, 13), (1, 12, 12), (2, 10, 12), (4, 11, 14), (5, 11, 12), (7, 12, 10),
        (9, 10, 10), (11, 10, 11), (12, 12, 13), (13, 13, 12), (14, 11, 13),
    ]
    .iter()
    .map(|&(x, y, z)| Point3::new(x as f64, y as f64, z as f64))
    .collect()
}

/// [`valley_points`] triangulated, with two upstream rivers joining at
/// [`RIVER_CONFLUENCE`] and three sections enclosing the main river.
pub fn point_cloud_valley() -> Result<Scenario> {
    let tin = Rc::new(Tin::from_points(valley_points())?);
    let router = Router::new(Rc::clone(&tin));
    let at = |(x, y): (f64, f64)| Point3::new(x, y, f64::NAN);
    let confluence = at(RIVER_CONFLUENCE);

    let rivers = vec![
        router.make_route(&[at(RIVER_UPSTREAM_1_START), confluence], &[])?,
        router.make_route(&[at(RIVER_UPSTREAM_2_START), confluence], &[])?,
        router.make_route(&[confluence, at(RIVER_MAIN_END)], &[])?,
    ];
    let west = at((5.0, 11.0));
    let east = at((11.0, 10.0));
    let sections = vec![
        Section::new("1", router.make_route(&[confluence, at((5.0, 1.0)), west], &[])?),
        Section::new("2", router.make_route(&[west, east], &[])?),
        Section::new("3", router.make_route(&[east, at((13.0, 5.0)), confluence], &[])?),
    ];
    Ok(Scenario {
        water: Rc::new(WaterNetwork::new(rivers)?),
        lines: CatchmentLines::new(sections)?,
        tin,
    })
}
