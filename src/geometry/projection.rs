//! Axis-aligned projection of planar geometry into 2D

use glam::{Vec2, Vec3};

/// Axis-aligned plane used to flatten planar polygons
///
/// `opposite_winding` is set when projecting onto the plane would mirror
/// the polygon, so that counter-clockwise loops around the normal stay
/// counter-clockwise in 2D.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProjectionDirection {
    pub plane: ProjectionPlane,
    pub opposite_winding: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProjectionPlane {
    YZ,
    ZX,
    XY,
}

/// Choose the axis plane with least distortion for polygons with `normal`
pub fn get_projection_direction(normal: Vec3) -> ProjectionDirection {
    let abs = normal.abs();
    let maxv = abs.max_element();
    if maxv == abs.x {
        return ProjectionDirection {
            plane: ProjectionPlane::YZ,
            opposite_winding: normal.x < 0.0,
        };
    }
    if maxv == abs.y {
        return ProjectionDirection {
            plane: ProjectionPlane::ZX,
            opposite_winding: normal.y > 0.0,
        };
    }
    ProjectionDirection {
        plane: ProjectionPlane::XY,
        opposite_winding: normal.z < 0.0,
    }
}

#[inline]
pub fn get_projected_point(point: Vec3, dir: ProjectionDirection) -> Vec2 {
    match dir.plane {
        ProjectionPlane::YZ => Vec2::new(point.y, point.z),
        ProjectionPlane::ZX => Vec2::new(point.x, point.z),
        ProjectionPlane::XY => Vec2::new(point.x, point.y),
    }
}

/// Winding-aware projection: swaps the 2D axes when the direction mirrors
#[inline]
pub fn get_projected_point_with_winding(point: Vec3, dir: ProjectionDirection) -> Vec2 {
    let p = get_projected_point(point, dir);
    if dir.opposite_winding {
        Vec2::new(p.y, p.x)
    } else {
        p
    }
}
