//! GPU-free checks of the frame protocol's data contracts: pass descriptions, the
//! gbuffer layout round-trip and the shader interface sizes.

use deimos::prelude::*;

fn init_logging() {
    let _ = pretty_env_logger::try_init();
}

#[test]
fn deferred_chain_pass_contracts() {
    init_logging();
    let prepass = PassLayout::depth_prepass();
    let geometry = PassLayout::geometry();
    let combine = PassLayout::combine(vk::Format::B8G8R8A8_SRGB);
    let forward = PassLayout::forward(vk::Format::B8G8R8A8_SRGB);

    // Only the pre-pass writes depth; everyone else tests against its result.
    assert!(prepass.depth_write);
    assert!(!geometry.depth_write);
    assert!(!combine.depth_write);
    assert!(!forward.depth_write);

    // The pre-pass clears depth; the later passes load it and never clear again.
    assert_eq!(prepass.depth.as_ref().unwrap().load_op, vk::AttachmentLoadOp::CLEAR);
    for pass in [&geometry, &combine, &forward] {
        assert_eq!(pass.depth.as_ref().unwrap().load_op, vk::AttachmentLoadOp::LOAD);
    }

    // Attachment shape: depth-only, three gbuffer targets, one swapchain target.
    assert_eq!(prepass.colors.len(), 0);
    assert_eq!(geometry.colors.len(), 3);
    assert_eq!(combine.colors.len(), 1);

    // The combine pass hands its output straight to presentation; the forward draws
    // blend over that same image instead of clearing it.
    assert_eq!(combine.colors[0].final_layout, vk::ImageLayout::PRESENT_SRC_KHR);
    assert_eq!(combine.colors[0].load_op, vk::AttachmentLoadOp::CLEAR);
    assert_eq!(forward.colors[0].load_op, vk::AttachmentLoadOp::LOAD);
}

#[test]
fn gbuffer_round_trip_across_frames() {
    init_logging();
    // Three tracked attachments, as in one gbuffer target set.
    let mut tracker = LayoutTracker::new(3);

    for _frame in 0..3 {
        for index in 0..3 {
            // The geometry pass leaves the target in attachment layout.
            tracker.assume(index, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL);
        }
        for index in 0..3 {
            tracker
                .transition(index, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL)
                .unwrap();
            // The combine pass must observe sampled layout.
            assert_eq!(tracker.current(index), vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL);
        }
        for index in 0..3 {
            tracker
                .transition(index, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
                .unwrap();
        }
    }
    // End of the simulated frames: ready for the next geometry pass.
    for index in 0..3 {
        assert_eq!(tracker.current(index), vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL);
    }
}

#[test]
fn unrecognized_transition_is_a_contract_violation() {
    init_logging();
    let error = barrier_masks(
        vk::ImageLayout::PRESENT_SRC_KHR,
        vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
    )
    .unwrap_err();
    let error = error.downcast::<Error>().unwrap();
    assert!(matches!(error, Error::UnsupportedTransition(_, _)));
}

#[test]
fn shader_interface_sizes() {
    init_logging();
    // The push constant block is vec2 + padding + vec3 + padding under std430.
    assert_eq!(std::mem::size_of::<PushConstants>(), 32);
    // Two mat4s in the camera uniform block.
    assert_eq!(std::mem::size_of::<CameraUniform>(), 128);
    // Position, normal, color, uv; tightly packed.
    assert_eq!(Vertex::binding_description().stride, 44);
}

#[test]
fn settings_feed_the_frame_ring() {
    init_logging();
    let settings = SettingsBuilder::new()
        .name("contract test")
        .frames_in_flight(3)
        .extent(640, 480)
        .build();
    assert_eq!(settings.frames_in_flight, 3);
    assert_eq!(settings.extent.width, 640);
}
