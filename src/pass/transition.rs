//! Explicit layout tracking for the gbuffer attachments.
//!
//! The gbuffer round-trips between `COLOR_ATTACHMENT_OPTIMAL` (geometry pass output)
//! and `SHADER_READ_ONLY_OPTIMAL` (combine pass input) once per frame. The tracker
//! records the current layout of every attachment and only hands out barrier masks
//! for transitions the pass graph actually performs; anything else means the graph
//! and this table have drifted apart and is reported as a fatal contract violation.

use anyhow::Result;
use ash::vk;

use crate::core::error::Error;

/// Source and destination stage/access masks for an image memory barrier.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct BarrierMasks {
    pub src_stage: vk::PipelineStageFlags,
    pub src_access: vk::AccessFlags,
    pub dst_stage: vk::PipelineStageFlags,
    pub dst_access: vk::AccessFlags,
}

/// Resolve the barrier masks for a recognized layout transition.
/// # Errors
/// [`Error::UnsupportedTransition`] for any pair this renderer never performs.
pub fn barrier_masks(from: vk::ImageLayout, to: vk::ImageLayout) -> Result<BarrierMasks> {
    match (from, to) {
        (vk::ImageLayout::UNDEFINED, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL) => Ok(BarrierMasks {
            src_stage: vk::PipelineStageFlags::TOP_OF_PIPE,
            src_access: vk::AccessFlags::empty(),
            dst_stage: vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
            dst_access: vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
        }),
        (vk::ImageLayout::UNDEFINED, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL) => Ok(BarrierMasks {
            src_stage: vk::PipelineStageFlags::TOP_OF_PIPE,
            src_access: vk::AccessFlags::empty(),
            dst_stage: vk::PipelineStageFlags::FRAGMENT_SHADER,
            dst_access: vk::AccessFlags::SHADER_READ,
        }),
        (vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL) => {
            Ok(BarrierMasks {
                src_stage: vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
                src_access: vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
                dst_stage: vk::PipelineStageFlags::FRAGMENT_SHADER,
                dst_access: vk::AccessFlags::SHADER_READ,
            })
        }
        (vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL) => {
            Ok(BarrierMasks {
                src_stage: vk::PipelineStageFlags::FRAGMENT_SHADER,
                src_access: vk::AccessFlags::SHADER_READ,
                dst_stage: vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
                dst_access: vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
            })
        }
        (from, to) => Err(anyhow::Error::from(Error::UnsupportedTransition(from, to))),
    }
}

/// Tracks the current layout of a fixed set of attachments, identified by index.
#[derive(Debug, Clone)]
pub struct LayoutTracker {
    layouts: Vec<vk::ImageLayout>,
}

impl LayoutTracker {
    /// Create a tracker for `count` attachments, all starting in `UNDEFINED`.
    pub fn new(count: usize) -> Self {
        LayoutTracker {
            layouts: vec![vk::ImageLayout::UNDEFINED; count],
        }
    }

    /// The current layout of attachment `index`.
    pub fn current(&self, index: usize) -> vk::ImageLayout {
        self.layouts[index]
    }

    /// Record a layout change performed implicitly by a render pass's final layout.
    /// No barrier is needed; the pass itself did the transition.
    pub fn assume(&mut self, index: usize, layout: vk::ImageLayout) {
        self.layouts[index] = layout;
    }

    /// Transition attachment `index` to `to`, returning the masks for the barrier
    /// that performs it. The tracker records the new layout.
    pub fn transition(&mut self, index: usize, to: vk::ImageLayout) -> Result<BarrierMasks> {
        let masks = barrier_masks(self.layouts[index], to)?;
        self.layouts[index] = to;
        Ok(masks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_returns_to_color_attachment() {
        let mut tracker = LayoutTracker::new(3);
        for index in 0..3 {
            // Geometry pass output, via the pass's final layout.
            tracker.assume(index, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL);
            tracker
                .transition(index, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL)
                .unwrap();
            assert_eq!(tracker.current(index), vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL);
            tracker
                .transition(index, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
                .unwrap();
            assert_eq!(tracker.current(index), vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL);
        }
    }

    #[test]
    fn unknown_transition_is_rejected() {
        let result = barrier_masks(
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        );
        let error = result.unwrap_err().downcast::<Error>().unwrap();
        assert!(matches!(error, Error::UnsupportedTransition(_, _)));
    }

    #[test]
    fn transition_masks_cover_write_then_read() {
        let masks = barrier_masks(
            vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        )
        .unwrap();
        assert_eq!(masks.src_access, vk::AccessFlags::COLOR_ATTACHMENT_WRITE);
        assert_eq!(masks.dst_access, vk::AccessFlags::SHADER_READ);
        assert_eq!(masks.dst_stage, vk::PipelineStageFlags::FRAGMENT_SHADER);
    }
}
