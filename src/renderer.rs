//! Top-level renderer: construction order, the per-frame protocol and swapchain
//! recreation. With the `winit` feature enabled this module also provides the event
//! loop glue.

use std::time::Instant;

use anyhow::Result;
use ash::vk;
use glam::Vec3;

use crate::allocator::Allocator;
use crate::command_pool::CommandPool;
use crate::core::debug::DebugMessenger;
use crate::core::device::Device;
use crate::core::instance::Instance;
use crate::core::physical_device::PhysicalDevice;
use crate::core::settings::RendererSettings;
use crate::descriptor::{Descriptors, MaterialBindings};
use crate::frame::{CameraUniform, FrameScheduler};
use crate::image::Texture;
use crate::pass::graph::RenderGraph;
use crate::pipeline::{Pipelines, PushConstants};
use crate::sampler::Sampler;
use crate::scene::camera::Camera;
use crate::scene::draw::DrawList;
use crate::scene::mesh;
use crate::wsi::surface::Surface;
use crate::wsi::swapchain::Swapchain;
use crate::wsi::window::Window;

/// Delta-time tracker for camera movement.
#[derive(Debug)]
pub struct FrameTimer {
    last: Instant,
}

impl FrameTimer {
    pub fn new() -> Self {
        FrameTimer {
            last: Instant::now(),
        }
    }

    /// Seconds since the previous call.
    pub fn delta(&mut self) -> f32 {
        let now = Instant::now();
        let delta = now.duration_since(self.last).as_secs_f32();
        self.last = now;
        delta
    }
}

impl Default for FrameTimer {
    fn default() -> Self {
        Self::new()
    }
}

/// Poll `size` until it reports a nonzero extent. A minimized window reports a zero
/// framebuffer; rendering resumes only once it is restored.
pub(crate) fn wait_nonzero_extent(mut size: impl FnMut() -> (u32, u32)) -> vk::Extent2D {
    loop {
        let (width, height) = size();
        if width != 0 && height != 0 {
            return vk::Extent2D {
                width,
                height,
            };
        }
        std::thread::sleep(std::time::Duration::from_millis(10));
    }
}

/// The textures one model binds, loaded from its material paths. Missing paths stay
/// `None` and resolve to the shared white texture.
#[derive(Debug)]
struct ModelTextures {
    base_color: Option<Texture>,
    normal: Option<Texture>,
    metal_rough: Option<Texture>,
}

/// The renderer. Construction wires the Vulkan stack in strict order; teardown is
/// the reverse, encoded in field declaration order (GPU objects drop before the
/// device, the device before the instance).
#[derive(Derivative)]
#[derivative(Debug)]
pub struct Renderer {
    pub camera: Camera,
    scheduler: FrameScheduler,
    draws: Option<DrawList>,
    /// [slot][model] descriptor sets, regrouped for the per-frame gbuffer rewrite.
    #[derivative(Debug = "ignore")]
    slot_sets: Vec<Vec<vk::DescriptorSet>>,
    #[derivative(Debug = "ignore")]
    model_textures: Vec<ModelTextures>,
    white: Texture,
    attachment_sampler: Sampler,
    pipelines: Pipelines,
    descriptors: Descriptors,
    graph: RenderGraph,
    swapchain: Swapchain,
    pool: CommandPool,
    allocator: Allocator,
    device: Device,
    physical_device: PhysicalDevice,
    surface: Surface,
    debug_messenger: Option<DebugMessenger>,
    instance: Instance,
    settings: RendererSettings,
    resize_requested: bool,
}

impl Renderer {
    /// Create the renderer over an existing window.
    pub fn new(settings: RendererSettings, window: &dyn Window) -> Result<Self> {
        let instance = Instance::new(&settings, window)?;
        let debug_messenger = if settings.validation {
            Some(DebugMessenger::new(&instance)?)
        } else {
            None
        };
        let mut surface = Surface::new(&instance, window)?;
        let physical_device = PhysicalDevice::select(&instance, &surface)?;
        surface.query_details(&physical_device)?;
        let device = Device::new(&instance, &physical_device, &settings)?;
        let allocator = Allocator::new(&instance, &device, &physical_device)?;
        let pool = CommandPool::new(device.clone())?;
        let swapchain = Swapchain::new(&instance, device.clone(), &settings, &surface, settings.extent)?;
        let graph = RenderGraph::new(device.clone(), &allocator, &swapchain)?;

        let meshes = match &settings.model_path {
            Some(path) => mesh::load(path)?,
            None => vec![],
        };
        let white = Texture::white(device.clone(), &allocator, &pool)?;
        let model_textures = meshes
            .iter()
            .map(|mesh| -> Result<ModelTextures> {
                let load = |path: &Option<std::path::PathBuf>| -> Result<Option<Texture>> {
                    match path {
                        Some(path) => Ok(Some(Texture::from_file(device.clone(), &allocator, &pool, path)?)),
                        None => Ok(None),
                    }
                };
                Ok(ModelTextures {
                    base_color: load(&mesh.material.base_color)?,
                    normal: load(&mesh.material.normal)?,
                    metal_rough: load(&mesh.material.metal_rough)?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let frames_in_flight = settings.frames_in_flight;
        let descriptors = Descriptors::new(device.clone(), meshes.len(), frames_in_flight)?;
        let scheduler = FrameScheduler::new(device.clone(), &allocator, &pool, frames_in_flight)?;

        let model_sets: Vec<Vec<vk::DescriptorSet>> = meshes
            .iter()
            .map(|_| descriptors.allocate_model_sets())
            .collect::<Result<Vec<_>>>()?;
        for (sets, textures) in model_sets.iter().zip(&model_textures) {
            descriptors.write_static_bindings(
                sets,
                scheduler.uniforms(),
                MaterialBindings::resolve(
                    &textures.base_color,
                    &textures.normal,
                    &textures.metal_rough,
                    &white,
                ),
            )?;
        }
        let slot_sets: Vec<Vec<vk::DescriptorSet>> = (0..frames_in_flight)
            .map(|slot| model_sets.iter().map(|sets| sets[slot]).collect())
            .collect();

        let draws = if meshes.is_empty() {
            info!("No model configured; rendering an empty scene");
            None
        } else {
            Some(DrawList::build(device.clone(), &allocator, &pool, &meshes, model_sets)?)
        };

        let attachment_sampler = Sampler::attachment(device.clone())?;
        let pipelines = Pipelines::new(
            device.clone(),
            &settings.shader_dir,
            descriptors.layout(),
            graph.prepass(),
            graph.geometry_pass(),
            graph.combine_pass(),
        )?;

        let camera = Camera::new(
            Vec3::new(0.0, 1.0, 3.0),
            swapchain.extent.width as f32 / swapchain.extent.height.max(1) as f32,
        );

        info!(
            "Renderer ready: {} frames in flight, {} swapchain images, {} meshes",
            frames_in_flight,
            swapchain.image_count(),
            meshes.len()
        );

        Ok(Renderer {
            camera,
            scheduler,
            draws,
            slot_sets,
            model_textures,
            white,
            attachment_sampler,
            pipelines,
            descriptors,
            graph,
            swapchain,
            pool,
            allocator,
            device,
            physical_device,
            surface,
            debug_messenger,
            instance,
            settings,
            resize_requested: false,
        })
    }

    /// Latch a window resize. The swapchain is recreated on the next frame rather
    /// than immediately, since resize events can arrive mid-frame.
    pub fn request_resize(&mut self) {
        self.resize_requested = true;
    }

    /// Render and present one frame.
    ///
    /// Stale-swapchain conditions are recovered by recreation; every other Vulkan
    /// error is fatal and propagates to the caller. There is no partial-frame retry.
    pub fn draw_frame(&mut self, window: &dyn Window) -> Result<()> {
        // 1. Wait until this slot's previous frame fully completed.
        self.scheduler.wait_current()?;

        // 2. Acquire a swapchain image. Out-of-date here means no image was
        // acquired; recreate and skip the frame without presenting.
        let slot = self.scheduler.current();
        let image_available = unsafe { self.scheduler.slot(slot).image_available.handle() };
        let image_index = match self.swapchain.acquire(image_available)? {
            Some(index) => index as usize,
            None => {
                debug!("Swapchain out of date on acquire; recreating");
                return self.recreate_swapchain(window);
            }
        };

        // The slot fence signaled, so no GPU work reads this slot's sets anymore;
        // retarget their gbuffer bindings at the acquired image's attachments.
        self.descriptors.write_gbuffer_bindings(
            &self.slot_sets[slot],
            &self.graph.gbuffer().targets[image_index],
            &self.attachment_sampler,
        );

        // 3. Write this frame's camera matrices into the slot's mapped uniform.
        self.scheduler.write_camera(CameraUniform {
            view: self.camera.view(),
            projection: self.camera.projection(),
        })?;

        // 4. Record the frame. The framebuffers follow the acquired image index, the
        // descriptor sets follow the slot index; the two are independent.
        self.scheduler.reset_current()?;
        let cmd = self.scheduler.slot(slot).command_buffer;
        unsafe {
            self.device
                .begin_command_buffer(cmd, &vk::CommandBufferBeginInfo::builder())?
        };
        let push = PushConstants::new(self.swapchain.extent, self.camera.forward());
        self.graph
            .record(cmd, image_index, slot, &self.pipelines, self.draws.as_ref(), &push)?;
        unsafe { self.device.end_command_buffer(cmd)? };

        // 5. Submit, fencing the slot.
        self.scheduler.submit_current()?;

        // 6. Present. Out-of-date or suboptimal after a queued present is recovered
        // by recreation; the presented frame itself is already in flight.
        let render_finished = unsafe { self.scheduler.slot(slot).render_finished.handle() };
        let needs_recreate = self.swapchain.present(
            self.device.present_queue(),
            render_finished,
            image_index as u32,
        )?;

        // 7. Advance the slot ring.
        self.scheduler.advance();

        if needs_recreate || self.resize_requested {
            self.recreate_swapchain(window)?;
        }
        Ok(())
    }

    /// Stop-the-world swapchain recreation: wait for a nonzero framebuffer, drain
    /// the device, then rebuild the swapchain and everything derived from its
    /// extent. Descriptor sets pick up the new gbuffer views on the next frame's
    /// per-slot rewrite.
    fn recreate_swapchain(&mut self, window: &dyn Window) -> Result<()> {
        let extent = wait_nonzero_extent(|| (window.width(), window.height()));
        debug!("Recreating swapchain at {}x{}", extent.width, extent.height);

        self.device.wait_idle()?;
        self.surface.query_details(&self.physical_device)?;
        self.swapchain.recreate(&self.settings, &self.surface, extent)?;
        self.graph.rebuild(&self.allocator, &self.swapchain)?;
        self.camera
            .set_aspect(self.swapchain.extent.width, self.swapchain.extent.height);
        self.resize_requested = false;
        Ok(())
    }

    /// Block until all GPU work has retired. Called before teardown.
    pub fn wait_idle(&self) -> Result<()> {
        self.device.wait_idle()
    }
}

#[cfg(feature = "winit")]
pub use event_loop::run;

#[cfg(feature = "winit")]
mod event_loop {
    use winit::event::{DeviceEvent, ElementState, Event, KeyboardInput, VirtualKeyCode, WindowEvent};
    use winit::event_loop::{ControlFlow, EventLoop};
    use winit::window::Window;

    use super::{FrameTimer, Renderer};
    use crate::scene::camera::CameraMovement;

    #[derive(Debug, Default)]
    struct InputState {
        forward: bool,
        backward: bool,
        left: bool,
        right: bool,
        up: bool,
        down: bool,
    }

    impl InputState {
        fn handle_key(&mut self, input: &KeyboardInput) {
            let pressed = input.state == ElementState::Pressed;
            match input.virtual_keycode {
                Some(VirtualKeyCode::W) => self.forward = pressed,
                Some(VirtualKeyCode::S) => self.backward = pressed,
                Some(VirtualKeyCode::A) => self.left = pressed,
                Some(VirtualKeyCode::D) => self.right = pressed,
                Some(VirtualKeyCode::Space) => self.up = pressed,
                Some(VirtualKeyCode::LShift) => self.down = pressed,
                _ => {}
            }
        }

        fn apply(&self, renderer: &mut Renderer, delta_time: f32) {
            let moves = [
                (self.forward, CameraMovement::Forward),
                (self.backward, CameraMovement::Backward),
                (self.left, CameraMovement::Left),
                (self.right, CameraMovement::Right),
                (self.up, CameraMovement::Up),
                (self.down, CameraMovement::Down),
            ];
            for (active, movement) in moves {
                if active {
                    renderer.camera.process_movement(movement, delta_time);
                }
            }
        }
    }

    /// Drive the renderer from a winit event loop until the window closes.
    pub fn run(mut renderer: Renderer, event_loop: EventLoop<()>, window: Window) -> ! {
        let mut timer = FrameTimer::new();
        let mut input = InputState::default();

        event_loop.run(move |event, _, control_flow| {
            *control_flow = ControlFlow::Poll;
            match event {
                Event::WindowEvent {
                    event, ..
                } => match event {
                    WindowEvent::CloseRequested => {
                        if let Err(err) = renderer.wait_idle() {
                            error!("Error while draining the device: {err}");
                        }
                        *control_flow = ControlFlow::Exit;
                    }
                    WindowEvent::Resized(_) => {
                        renderer.request_resize();
                    }
                    WindowEvent::KeyboardInput {
                        input: key, ..
                    } => {
                        input.handle_key(&key);
                    }
                    _ => {}
                },
                Event::DeviceEvent {
                    event: DeviceEvent::MouseMotion {
                        delta,
                    },
                    ..
                } => {
                    renderer.camera.process_mouse(delta.0 as f32, delta.1 as f32);
                }
                Event::MainEventsCleared => {
                    window.request_redraw();
                }
                Event::RedrawRequested(_) => {
                    let delta_time = timer.delta();
                    input.apply(&mut renderer, delta_time);
                    if let Err(err) = renderer.draw_frame(&window) {
                        error!("Fatal rendering error: {err:#}");
                        *control_flow = ControlFlow::Exit;
                    }
                }
                _ => {}
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn nonzero_extent_polls_until_restored() {
        let calls = Cell::new(0);
        let extent = wait_nonzero_extent(|| {
            let call = calls.get();
            calls.set(call + 1);
            if call < 3 {
                (0, 0)
            } else {
                (1280, 720)
            }
        });
        assert_eq!(calls.get(), 4);
        assert_eq!(extent.width, 1280);
        assert_eq!(extent.height, 720);
    }

    #[test]
    fn timer_delta_is_monotonic() {
        let mut timer = FrameTimer::new();
        assert!(timer.delta() >= 0.0);
        assert!(timer.delta() >= 0.0);
    }
}
