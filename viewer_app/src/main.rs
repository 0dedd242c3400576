//! Viewer: a lit cube and orbiting point lights on the frame engine
//!
//! Usage: `viewer [config.toml|config.ron]`

mod camera;
mod controller;
mod scene;

use std::error::Error;
use std::process::ExitCode;
use std::rc::Rc;
use std::time::Instant;

use frame_engine::foundation::logging;
use frame_engine::prelude::*;
use nalgebra::Vector3;

use camera::Camera;
use controller::KeyboardController;
use scene::Scene;

const FOV_Y_DEGREES: f32 = 50.0;
const NEAR_PLANE: f32 = 0.1;
const FAR_PLANE: f32 = 100.0;

fn main() -> ExitCode {
    let (config, config_error) = match std::env::args().nth(1) {
        Some(path) => match RendererConfig::load_from_file(&path) {
            Ok(config) => (config, None),
            Err(e) => (RendererConfig::default(), Some(format!("{path}: {e}"))),
        },
        None => (RendererConfig::default(), None),
    };

    logging::init_with_default_level(config.log_level_filter());
    if let Some(error) = config_error {
        log::warn!("Falling back to default configuration ({error})");
    }

    log::info!("Starting {}", config.application_name);
    match run(&config) {
        Ok(()) => {
            log::info!("Viewer finished");
            ExitCode::SUCCESS
        }
        Err(e) => {
            log::error!("Fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(config: &RendererConfig) -> Result<(), Box<dyn Error>> {
    let mut window = Window::new(&config.window_title, config.window_width, config.window_height)?;
    let device = Rc::new(Device::new(&mut window, &config.application_name, config.validation_enabled())?);

    let backend = VulkanBackend::new(Rc::clone(&device), config.acquire_timeout_ns);
    let mut renderer = Renderer::new(backend, &mut window, config.clear_settings())?;
    let mut uniforms = GlobalUniforms::new(&device)?;

    let mut simple_system = SimpleRenderSystem::new(
        Rc::clone(&device),
        renderer.swap_chain_render_pass(),
        renderer.render_pass_generation(),
        uniforms.set_layout(),
        config.simple_shaders.clone(),
    )?;
    let mut point_light_system = PointLightSystem::new(
        Rc::clone(&device),
        renderer.swap_chain_render_pass(),
        renderer.render_pass_generation(),
        uniforms.set_layout(),
        config.point_light_shaders.clone(),
    )?;

    let mut scene = Scene::new(&device)?;
    let mut camera = Camera::default();
    let controller = KeyboardController::default();
    let mut viewer = Transform::from_translation(Vector3::new(0.0, 0.0, -2.5));

    // Drain the GPU before teardown whether the loop ends cleanly or not
    let mut frame_loop = || -> Result<(), Box<dyn Error>> {
        let mut current_time = Instant::now();
        while !window.should_close() {
            window.poll_events();

            let now = Instant::now();
            let frame_time = now.duration_since(current_time).as_secs_f32();
            current_time = now;

            controller.move_in_plane_xz(|key| window.is_key_pressed(key), frame_time, &mut viewer);
            camera.set_view_yxz(viewer.translation, viewer.rotation);
            scene.update(frame_time);

            let Some(command_buffer) = renderer.begin_frame(&mut window)? else {
                continue;
            };

            let render_pass = renderer.swap_chain_render_pass();
            let generation = renderer.render_pass_generation();
            simple_system.refresh_pipeline(render_pass, generation)?;
            point_light_system.refresh_pipeline(render_pass, generation)?;

            camera.set_perspective_projection(
                FOV_Y_DEGREES.to_radians(),
                renderer.aspect_ratio(),
                NEAR_PLANE,
                FAR_PLANE,
            );

            let frame_index = renderer.frame_index();
            let frame = FrameInfo {
                frame_index,
                frame_time,
                command_buffer,
                projection: *camera.projection(),
                view: *camera.view(),
                global_descriptor_set: uniforms.descriptor_set(frame_index),
                items: scene.items(),
            };

            let mut ubo = GlobalUbo::default();
            ubo.set_camera(&frame.projection, &frame.view);
            PointLightSystem::update(&frame, &mut ubo);
            uniforms.update(frame_index, &ubo)?;

            renderer.begin_swap_chain_render_pass(command_buffer);
            simple_system.render(&frame);
            point_light_system.render(&frame);
            renderer.end_swap_chain_render_pass(command_buffer);
            renderer.end_frame(&mut window)?;
        }

        Ok(())
    };
    let outcome = frame_loop();

    keep_first_failure(outcome, device.wait_idle())
}

/// Combine the frame loop's result with the teardown idle wait, keeping the loop's error
fn keep_first_failure<E: Error + 'static>(
    outcome: Result<(), Box<dyn Error>>,
    idle: Result<(), E>,
) -> Result<(), Box<dyn Error>> {
    match (outcome, idle) {
        (Err(e), Err(idle_error)) => {
            log::error!("Waiting for device idle also failed: {idle_error}");
            Err(e)
        }
        (Err(e), Ok(())) => Err(e),
        (Ok(()), idle) => idle.map_err(Into::into),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_loop_error_wins_over_idle_error() {
        let outcome: Result<(), Box<dyn Error>> = Err("loop failed".into());
        let idle = Err(VulkanError::InvalidOperation {
            reason: "device lost".to_string(),
        });

        let error = keep_first_failure(outcome, idle).unwrap_err();
        assert_eq!(error.to_string(), "loop failed");
    }

    #[test]
    fn test_idle_error_reported_after_clean_loop() {
        let idle = Err(VulkanError::InvalidOperation {
            reason: "device lost".to_string(),
        });

        let error = keep_first_failure(Ok(()), idle).unwrap_err();
        assert!(error.downcast_ref::<VulkanError>().is_some());
    }

    #[test]
    fn test_clean_shutdown() {
        assert!(keep_first_failure(Ok(()), Ok::<(), VulkanError>(())).is_ok());
    }
}
