use glam::{Mat4, Vec3};

#[derive(Clone, Copy, Debug)]
pub struct Camera {
    pub eye: Vec3,
    pub target: Vec3,
    pub up: Vec3,
    pub fov_y_radians: f32,
    pub near: f32,
    pub far: f32,
}

impl Camera {
    pub fn view(&self) -> Mat4 {
        Mat4::look_at_rh(self.eye, self.target, self.up)
    }

    pub fn proj(&self, aspect: f32) -> Mat4 {
        Mat4::perspective_rh(self.fov_y_radians, aspect, self.near, self.far)
    }

    pub fn view_proj(&self, aspect: f32) -> Mat4 {
        self.proj(aspect) * self.view()
    }
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            eye: Vec3::new(0.0, 12.0, 24.0),
            target: Vec3::ZERO,
            up: Vec3::Y,
            fov_y_radians: 60f32.to_radians(),
            near: 0.1,
            far: 200.0,
        }
    }
}

/// Sun light casting the batched shadow pass.
#[derive(Clone, Copy, Debug)]
pub struct DirectionalLight {
    pub direction: Vec3,
    /// Half-extent of the square region the shadow map covers.
    pub extent: f32,
}

impl DirectionalLight {
    /// Orthographic light-space matrix covering `extent` around `center`.
    pub fn view_proj(&self, center: Vec3) -> Mat4 {
        let dir = self.direction.normalize_or_zero();
        let dir = if dir == Vec3::ZERO { Vec3::NEG_Y } else { dir };
        let up = if dir.abs_diff_eq(Vec3::NEG_Y, 1e-3) || dir.abs_diff_eq(Vec3::Y, 1e-3) {
            Vec3::Z
        } else {
            Vec3::Y
        };
        let eye = center - dir * self.extent * 2.0;
        let view = Mat4::look_at_rh(eye, center, up);
        let proj = Mat4::orthographic_rh(
            -self.extent,
            self.extent,
            -self.extent,
            self.extent,
            0.1,
            self.extent * 4.0,
        );
        proj * view
    }
}

impl Default for DirectionalLight {
    fn default() -> Self {
        Self {
            direction: Vec3::new(-0.4, -1.0, -0.3),
            extent: 30.0,
        }
    }
}
