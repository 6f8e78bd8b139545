//! A simple fly camera.

use glam::{Mat4, Vec3};

/// Movement directions mapped from keyboard input.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum CameraMovement {
    Forward,
    Backward,
    Left,
    Right,
    Up,
    Down,
}

/// Free-flying perspective camera. Orientation is derived from yaw and pitch;
/// pitch is clamped short of the poles so the view basis never degenerates.
#[derive(Debug, Clone)]
pub struct Camera {
    position: Vec3,
    yaw: f32,
    pitch: f32,
    aspect: f32,
    fov_y: f32,
    speed: f32,
    sensitivity: f32,
}

const PITCH_LIMIT: f32 = 1.55;
const NEAR: f32 = 0.1;
const FAR: f32 = 100.0;

impl Camera {
    /// Camera at the given position looking down -Z, with the aspect ratio of the
    /// initial viewport.
    pub fn new(position: Vec3, aspect: f32) -> Self {
        Camera {
            position,
            yaw: -std::f32::consts::FRAC_PI_2,
            pitch: 0.0,
            aspect,
            fov_y: std::f32::consts::FRAC_PI_2,
            speed: 2.5,
            sensitivity: 0.0025,
        }
    }

    /// Unit vector the camera looks along.
    pub fn forward(&self) -> Vec3 {
        Vec3::new(
            self.yaw.cos() * self.pitch.cos(),
            self.pitch.sin(),
            self.yaw.sin() * self.pitch.cos(),
        )
        .normalize()
    }

    fn right(&self) -> Vec3 {
        self.forward().cross(Vec3::Y).normalize()
    }

    /// World to view matrix.
    pub fn view(&self) -> Mat4 {
        Mat4::look_at_rh(self.position, self.position + self.forward(), Vec3::Y)
    }

    /// View to clip matrix. Y is flipped for Vulkan's clip space.
    pub fn projection(&self) -> Mat4 {
        let mut projection = Mat4::perspective_rh(self.fov_y, self.aspect, NEAR, FAR);
        projection.y_axis.y *= -1.0;
        projection
    }

    /// Update the aspect ratio after a viewport resize.
    pub fn set_aspect(&mut self, width: u32, height: u32) {
        if height != 0 {
            self.aspect = width as f32 / height as f32;
        }
    }

    /// Move the camera along one of its axes, scaled by the frame delta time.
    pub fn process_movement(&mut self, direction: CameraMovement, delta_time: f32) {
        let velocity = self.speed * delta_time;
        match direction {
            CameraMovement::Forward => self.position += self.forward() * velocity,
            CameraMovement::Backward => self.position -= self.forward() * velocity,
            CameraMovement::Left => self.position -= self.right() * velocity,
            CameraMovement::Right => self.position += self.right() * velocity,
            CameraMovement::Up => self.position += Vec3::Y * velocity,
            CameraMovement::Down => self.position -= Vec3::Y * velocity,
        }
    }

    /// Rotate the camera from a relative mouse motion.
    pub fn process_mouse(&mut self, delta_x: f32, delta_y: f32) {
        self.yaw += delta_x * self.sensitivity;
        self.pitch = (self.pitch - delta_y * self.sensitivity).clamp(-PITCH_LIMIT, PITCH_LIMIT);
    }

    /// Current camera position.
    pub fn position(&self) -> Vec3 {
        self.position
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pitch_is_clamped() {
        let mut camera = Camera::new(Vec3::ZERO, 1.0);
        camera.process_mouse(0.0, -1.0e6);
        assert!(camera.forward().is_finite());
        assert!(camera.pitch <= PITCH_LIMIT);
        camera.process_mouse(0.0, 1.0e6);
        assert!(camera.pitch >= -PITCH_LIMIT);
    }

    #[test]
    fn aspect_ignores_zero_height() {
        let mut camera = Camera::new(Vec3::ZERO, 4.0 / 3.0);
        camera.set_aspect(800, 0);
        assert!((camera.aspect - 4.0 / 3.0).abs() < f32::EPSILON);
        camera.set_aspect(1920, 1080);
        assert!((camera.aspect - 1920.0 / 1080.0).abs() < 1.0e-6);
    }

    #[test]
    fn projection_flips_y() {
        let camera = Camera::new(Vec3::ZERO, 16.0 / 9.0);
        assert!(camera.projection().y_axis.y < 0.0);
    }
}
