//! Turning window coordinates into world rays.

use na::{Matrix4, Vector3, Vector4};
use sim_physics::DEGENERATE_EPSILON;

/// Which clip-space depth range the projection produces.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum DepthConvention {
    /// Near plane at NDC z = -1, far at +1.
    #[default]
    OpenGl,
    /// Near plane at NDC z = 1, far (possibly infinite) at 0.
    ReverseZ,
}

impl DepthConvention {
    /// Two NDC depths on the view ray, nearest first.
    fn ray_depths(self) -> (f64, f64) {
        match self {
            DepthConvention::OpenGl => (-1.0, 0.0),
            DepthConvention::ReverseZ => (1.0, 0.5),
        }
    }
}

/// The camera the host renders with.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    /// Window size in pixels.
    pub width: f64,
    pub height: f64,
    /// World (Z-up sim frame) to clip space.
    pub projection_view: Matrix4<f64>,
    pub depth: DepthConvention,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ray {
    pub origin: Vector3<f64>,
    /// Unit length.
    pub direction: Vector3<f64>,
}

impl Ray {
    pub fn point_at(&self, distance: f64) -> Vector3<f64> {
        self.origin + self.direction * distance
    }
}

/// The world ray under window position `(x, y)`, with y growing downwards.
///
/// Starts on the near plane. None if the window is empty or the
/// projection cannot be inverted.
pub fn touch_ray(viewport: &Viewport, x: f64, y: f64) -> Option<Ray> {
    if !(viewport.width > 0.0 && viewport.height > 0.0) || !(x.is_finite() && y.is_finite()) {
        return None;
    }
    let inverse = viewport.projection_view.try_inverse()?;

    let ndc_x = x / viewport.width * 2.0 - 1.0;
    let ndc_y = (viewport.height - y) / viewport.height * 2.0 - 1.0;
    let (near, far) = viewport.depth.ray_depths();

    let unproject = |z: f64| {
        let p = inverse * Vector4::new(ndc_x, ndc_y, z, 1.0);
        if p.w.abs() < DEGENERATE_EPSILON {
            None
        } else {
            Some(p.xyz() / p.w)
        }
    };
    let from = unproject(near)?;
    let to = unproject(far)?;

    Some(Ray {
        origin: from,
        direction: (to - from).try_normalize(DEGENERATE_EPSILON)?,
    })
}
