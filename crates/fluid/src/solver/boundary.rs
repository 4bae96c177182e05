//! Wall collision against the simulation rectangle.

use glam::Vec2;

use crate::settings::Rect;

/// Resting positions are kept this far inside the walls.
pub const BOUNDARY_EPSILON: f32 = 1e-4;

/// Confinement rectangle and its collision response.
#[derive(Clone, Copy, Debug)]
pub struct Walls {
    pub bounds: Rect,
    inner: Rect,
    pub restitution: f32,
    pub friction: f32,
}

impl Walls {
    pub fn new(bounds: Rect, restitution: f32, friction: f32) -> Self {
        Self {
            bounds,
            inner: bounds.shrink(BOUNDARY_EPSILON),
            restitution,
            friction,
        }
    }

    /// Rectangle that corrected positions are clamped into.
    #[inline]
    pub fn inner(&self) -> Rect {
        self.inner
    }

    /// Correct a particle that moved from `previous` to `position`.
    ///
    /// The path is cut at the first wall it crosses. The part of the motion
    /// past the wall is split into normal and tangential components: the
    /// normal one is mirrored and scaled by restitution, the tangential one is
    /// scaled by `1 - friction`. The result is clamped into the inner
    /// rectangle, which also handles corners and paths that start outside.
    pub fn collide(&self, previous: Vec2, position: Vec2) -> Vec2 {
        let inner = self.inner;
        if !position.is_finite() {
            return if previous.is_finite() {
                inner.clamp(previous)
            } else {
                inner.center()
            };
        }
        if inner.contains(position) {
            return position;
        }
        if !previous.is_finite() || !self.bounds.contains(previous) {
            return inner.clamp(position);
        }

        let delta = position - previous;
        let mut t_hit = 1.0f32;
        let mut normal = Vec2::ZERO;
        let mut consider = |crossed: bool, wall: f32, start: f32, d: f32, n: Vec2| {
            if crossed && d != 0.0 {
                let t = ((wall - start) / d).clamp(0.0, 1.0);
                if t < t_hit {
                    t_hit = t;
                    normal = n;
                }
            }
        };
        consider(position.x < inner.min.x && delta.x < 0.0, inner.min.x, previous.x, delta.x, Vec2::X);
        consider(position.x > inner.max.x && delta.x > 0.0, inner.max.x, previous.x, delta.x, Vec2::NEG_X);
        consider(position.y < inner.min.y && delta.y < 0.0, inner.min.y, previous.y, delta.y, Vec2::Y);
        consider(position.y > inner.max.y && delta.y > 0.0, inner.max.y, previous.y, delta.y, Vec2::NEG_Y);

        let hit = previous + delta * t_hit;
        let overshoot = position - hit;
        let normal_part = normal * overshoot.dot(normal);
        let tangent_part = overshoot - normal_part;
        let bounced = hit - normal_part * self.restitution + tangent_part * (1.0 - self.friction);
        inner.clamp(bounced)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn walls(restitution: f32, friction: f32) -> Walls {
        Walls::new(Rect::new(Vec2::ZERO, Vec2::splat(10.0)), restitution, friction)
    }

    #[test]
    fn test_inside_is_untouched() {
        let w = walls(0.5, 0.5);
        let p = Vec2::new(3.0, 4.0);
        assert_eq!(w.collide(Vec2::new(2.0, 4.0), p), p);
    }

    #[test]
    fn test_floor_hit_reflects_normal_part() {
        let w = walls(0.5, 0.0);
        let out = w.collide(Vec2::new(5.0, 1.0), Vec2::new(6.0, -1.0));
        // Crosses y = eps halfway; 1.0 of overshoot below, mirrored at half strength.
        assert!((out.y - (BOUNDARY_EPSILON + 0.5 * (1.0 + BOUNDARY_EPSILON))).abs() < 1e-4, "{out}");
        assert!((out.x - 6.0).abs() < 1e-4, "tangential motion kept without friction: {out}");
    }

    #[test]
    fn test_full_friction_stops_tangential_motion() {
        let w = walls(0.0, 1.0);
        let out = w.collide(Vec2::new(5.0, 1.0), Vec2::new(7.0, -1.0));
        assert!((out.x - 6.0).abs() < 1e-3, "slides only to the hit point: {out}");
        assert!((out.y - BOUNDARY_EPSILON).abs() < 1e-5, "{out}");
    }

    #[test]
    fn test_corner_ends_inside() {
        let w = walls(1.0, 0.0);
        let out = w.collide(Vec2::new(0.5, 0.5), Vec2::new(-3.0, -2.0));
        assert!(w.inner().contains(out), "{out}");
    }

    #[test]
    fn test_start_outside_is_clamped() {
        let w = walls(1.0, 0.0);
        let out = w.collide(Vec2::new(-5.0, 5.0), Vec2::new(-4.0, 5.0));
        assert_eq!(out, Vec2::new(BOUNDARY_EPSILON, 5.0));
    }

    #[test]
    fn test_non_finite_falls_back() {
        let w = walls(0.3, 0.1);
        assert_eq!(w.collide(Vec2::new(2.0, 2.0), Vec2::NAN), Vec2::new(2.0, 2.0));
        let fallback = w.collide(Vec2::NAN, Vec2::NAN);
        assert!(fallback.abs_diff_eq(Vec2::splat(5.0), 1e-5), "{fallback}");
    }
}
