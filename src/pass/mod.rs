//! The render pass graph: pass descriptions, render pass objects, the gbuffer,
//! explicit layout transitions and frame recording.

pub mod gbuffer;
pub mod graph;
pub mod render_pass;
pub mod transition;
