//! Scene collaborators: the camera, model loading and the draw list.

pub mod camera;
pub mod draw;
pub mod mesh;
