//! Frame orchestration
//!
//! The [`Renderer`] drives one frame at a time: acquire an image, hand the
//! caller a recording command buffer, submit and present, and rebuild the
//! swap chain whenever the surface goes stale or the window is resized.

use ash::vk;

use crate::render::api::{ClearSettings, FrameBackend, PresentTarget, SurfaceWindow, SwapChainStatus};
use crate::render::frame_slots::FrameSlot;
use crate::render::vulkan::{VulkanError, VulkanResult};

/// Per-frame orchestrator over a [`FrameBackend`]
///
/// Owns the swap chain and one primary command buffer per swap chain image.
pub struct Renderer<B: FrameBackend> {
    swap_chain: B::SwapChain,
    command_buffers: Vec<vk::CommandBuffer>,
    backend: B,
    clear: ClearSettings,
    current_image_index: u32,
    current_frame_index: FrameSlot,
    is_frame_started: bool,
    render_pass_generation: u64,
}

impl<B: FrameBackend> Renderer<B> {
    /// Create the initial swap chain and its command buffers
    ///
    /// Blocks while the window reports a zero-area framebuffer.
    pub fn new<W: SurfaceWindow>(backend: B, window: &mut W, clear: ClearSettings) -> VulkanResult<Self> {
        let extent = wait_for_nonzero_extent(window);
        let swap_chain = backend.create_swap_chain(extent, None)?;
        let command_buffers = backend.allocate_command_buffers(swap_chain.image_count())?;

        log::info!(
            "Renderer ready: {}x{} with {} swap chain images",
            extent.width,
            extent.height,
            command_buffers.len()
        );

        Ok(Self {
            swap_chain,
            command_buffers,
            backend,
            clear,
            current_image_index: 0,
            current_frame_index: FrameSlot::default(),
            is_frame_started: false,
            render_pass_generation: 0,
        })
    }

    /// Acquire the next image and begin recording its command buffer
    ///
    /// Returns `None` when the swap chain was out of date; it has been
    /// recreated and the caller should skip drawing this tick.
    pub fn begin_frame<W: SurfaceWindow>(&mut self, window: &mut W) -> VulkanResult<Option<vk::CommandBuffer>> {
        assert!(!self.is_frame_started, "Can't call begin_frame while already in progress");

        let (image_index, status) = self.swap_chain.acquire_next_image()?;
        if status == SwapChainStatus::OutOfDate {
            log::debug!("Swap chain out of date on acquire, skipping frame");
            self.recreate_swap_chain(window)?;
            return Ok(None);
        }

        self.current_image_index = image_index;
        self.is_frame_started = true;

        let command_buffer = self.active_command_buffer();
        self.backend.begin_command_buffer(command_buffer)?;
        Ok(Some(command_buffer))
    }

    /// Finish recording, submit and present
    ///
    /// The frame slot advances once per call whether or not the submit
    /// succeeds. Stale swap chains and pending resizes are handled here.
    pub fn end_frame<W: SurfaceWindow>(&mut self, window: &mut W) -> VulkanResult<()> {
        assert!(self.is_frame_started, "Can't call end_frame while frame is not in progress");

        let command_buffer = self.active_command_buffer();
        self.is_frame_started = false;
        if let Err(error) = self.backend.end_command_buffer(command_buffer) {
            self.swap_chain.abandon_frame();
            self.current_frame_index = self.current_frame_index.next();
            return Err(error);
        }

        let submitted = self
            .swap_chain
            .submit_command_buffers(&[command_buffer], self.current_image_index);
        self.current_frame_index = self.current_frame_index.next();
        let status = submitted?;

        if status.needs_recreation() || window.was_resized() {
            log::debug!("Recreating swap chain after present ({status:?})");
            window.reset_resized_flag();
            self.recreate_swap_chain(window)?;
        }
        Ok(())
    }

    /// Begin the swap chain render pass on the current frame's command buffer
    pub fn begin_swap_chain_render_pass(&self, command_buffer: vk::CommandBuffer) {
        assert!(self.is_frame_started, "Can't begin render pass when frame not in progress");
        assert_eq!(
            command_buffer,
            self.active_command_buffer(),
            "Can't begin render pass on command buffer from a different frame"
        );

        self.backend.begin_render_pass(
            command_buffer,
            self.swap_chain.render_pass(),
            self.swap_chain.framebuffer(self.current_image_index as usize),
            self.swap_chain.extent(),
            &self.clear,
        );
    }

    /// End the swap chain render pass
    pub fn end_swap_chain_render_pass(&self, command_buffer: vk::CommandBuffer) {
        assert!(self.is_frame_started, "Can't end render pass when frame not in progress");
        assert_eq!(
            command_buffer,
            self.active_command_buffer(),
            "Can't end render pass on command buffer from a different frame"
        );

        self.backend.end_render_pass(command_buffer);
    }

    /// Frame slot of the frame being recorded
    pub fn frame_index(&self) -> FrameSlot {
        assert!(self.is_frame_started, "Cannot get frame index when frame not in progress");
        self.current_frame_index
    }

    /// Render pass that pipelines must be built against
    pub fn swap_chain_render_pass(&self) -> vk::RenderPass {
        self.swap_chain.render_pass()
    }

    /// Bumped every time the swap chain (and its render pass) is replaced
    pub const fn render_pass_generation(&self) -> u64 {
        self.render_pass_generation
    }

    /// Width over height of the swap chain extent
    pub fn aspect_ratio(&self) -> f32 {
        self.swap_chain.extent_aspect_ratio()
    }

    /// Current swap chain extent
    pub fn swap_chain_extent(&self) -> vk::Extent2D {
        self.swap_chain.extent()
    }

    /// Number of allocated command buffers; always the swap chain image count
    pub fn command_buffer_count(&self) -> usize {
        self.command_buffers.len()
    }

    /// Whether a frame is between `begin_frame` and `end_frame`
    pub const fn is_frame_in_progress(&self) -> bool {
        self.is_frame_started
    }

    fn active_command_buffer(&self) -> vk::CommandBuffer {
        self.command_buffers[self.current_image_index as usize]
    }

    fn recreate_swap_chain<W: SurfaceWindow>(&mut self, window: &mut W) -> VulkanResult<()> {
        let extent = wait_for_nonzero_extent(window);
        self.backend.wait_idle()?;

        let replacement = self.backend.create_swap_chain(extent, Some(&self.swap_chain))?;
        if !self.swap_chain.compare_swap_formats(&replacement) {
            return Err(VulkanError::InvalidOperation {
                reason: "Swap chain image or depth format has changed".to_string(),
            });
        }
        let previous = std::mem::replace(&mut self.swap_chain, replacement);
        drop(previous);

        let image_count = self.swap_chain.image_count();
        if self.command_buffers.len() != image_count {
            log::debug!(
                "Swap chain image count changed {} -> {}, reallocating command buffers",
                self.command_buffers.len(),
                image_count
            );
            self.backend.free_command_buffers(&self.command_buffers);
            self.command_buffers = self.backend.allocate_command_buffers(image_count)?;
        }

        self.render_pass_generation += 1;
        log::info!(
            "Swap chain recreated at {}x{} (generation {})",
            extent.width,
            extent.height,
            self.render_pass_generation
        );
        Ok(())
    }
}

impl<B: FrameBackend> Drop for Renderer<B> {
    fn drop(&mut self) {
        self.backend.free_command_buffers(&self.command_buffers);
    }
}

fn wait_for_nonzero_extent<W: SurfaceWindow>(window: &mut W) -> vk::Extent2D {
    let mut extent = window.extent();
    while extent.width == 0 || extent.height == 0 {
        window.wait_events();
        extent = window.extent();
    }
    extent
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::frame_slots::InFlightTracker;
    use ash::vk::Handle;
    use std::cell::RefCell;
    use std::collections::VecDeque;
    use std::rc::Rc;

    #[derive(Default)]
    struct MockState {
        image_count: usize,
        color_format: vk::Format,
        acquire_results: VecDeque<vk::Result>,
        present_results: VecDeque<vk::Result>,
        created_extents: Vec<vk::Extent2D>,
        recreations: usize,
        acquire_slots: Vec<usize>,
        submit_slots: Vec<usize>,
        abandoned_slots: Vec<usize>,
        end_recording_results: VecDeque<vk::Result>,
        submitted: Vec<(vk::CommandBuffer, u32)>,
        present_statuses: Vec<SwapChainStatus>,
        wait_idle_calls: usize,
        live_command_buffers: Vec<vk::CommandBuffer>,
        next_handle: u64,
        render_passes_begun: usize,
    }

    struct MockSwapChain {
        state: Rc<RefCell<MockState>>,
        extent: vk::Extent2D,
        image_count: usize,
        format: vk::Format,
        render_pass: vk::RenderPass,
        tracker: InFlightTracker,
        next_image: u32,
    }

    impl PresentTarget for MockSwapChain {
        fn extent(&self) -> vk::Extent2D {
            self.extent
        }

        fn image_count(&self) -> usize {
            self.image_count
        }

        fn render_pass(&self) -> vk::RenderPass {
            self.render_pass
        }

        fn framebuffer(&self, image_index: usize) -> vk::Framebuffer {
            vk::Framebuffer::from_raw(100 + image_index as u64)
        }

        fn acquire_next_image(&mut self) -> VulkanResult<(u32, SwapChainStatus)> {
            let mut state = self.state.borrow_mut();
            state.acquire_slots.push(self.tracker.current_slot().index());
            let result = state.acquire_results.pop_front().unwrap_or(vk::Result::SUCCESS);
            let status = SwapChainStatus::from_vk(result)?;
            if status == SwapChainStatus::OutOfDate {
                return Ok((0, status));
            }
            let image_index = self.next_image;
            self.next_image = (self.next_image + 1) % self.image_count as u32;
            Ok((image_index, status))
        }

        fn submit_command_buffers(
            &mut self,
            command_buffers: &[vk::CommandBuffer],
            image_index: u32,
        ) -> VulkanResult<SwapChainStatus> {
            let mut state = self.state.borrow_mut();
            state.submit_slots.push(self.tracker.current_slot().index());
            self.tracker.claim_image(image_index as usize);
            self.tracker.advance();
            state.submitted.push((command_buffers[0], image_index));
            let result = state.present_results.pop_front().unwrap_or(vk::Result::SUCCESS);
            let status = SwapChainStatus::from_vk(result)?;
            state.present_statuses.push(status);
            Ok(status)
        }

        fn abandon_frame(&mut self) {
            self.state.borrow_mut().abandoned_slots.push(self.tracker.current_slot().index());
            self.tracker.advance();
        }

        fn compare_swap_formats(&self, other: &Self) -> bool {
            self.format == other.format
        }
    }

    struct MockBackend {
        state: Rc<RefCell<MockState>>,
    }

    impl FrameBackend for MockBackend {
        type SwapChain = MockSwapChain;

        fn create_swap_chain(
            &self,
            extent: vk::Extent2D,
            previous: Option<&MockSwapChain>,
        ) -> VulkanResult<MockSwapChain> {
            let mut state = self.state.borrow_mut();
            if previous.is_some() {
                state.recreations += 1;
            }
            state.created_extents.push(extent);
            state.next_handle += 1;
            let tracker = match previous {
                Some(previous) => InFlightTracker::starting_at(state.image_count, previous.tracker.current_slot()),
                None => InFlightTracker::new(state.image_count),
            };
            Ok(MockSwapChain {
                state: Rc::clone(&self.state),
                extent,
                image_count: state.image_count,
                format: state.color_format,
                render_pass: vk::RenderPass::from_raw(state.next_handle),
                tracker,
                next_image: 0,
            })
        }

        fn allocate_command_buffers(&self, count: usize) -> VulkanResult<Vec<vk::CommandBuffer>> {
            let mut state = self.state.borrow_mut();
            let buffers: Vec<_> = (0..count)
                .map(|_| {
                    state.next_handle += 1;
                    vk::CommandBuffer::from_raw(1000 + state.next_handle)
                })
                .collect();
            state.live_command_buffers.extend(&buffers);
            Ok(buffers)
        }

        fn free_command_buffers(&self, command_buffers: &[vk::CommandBuffer]) {
            self.state
                .borrow_mut()
                .live_command_buffers
                .retain(|b| !command_buffers.contains(b));
        }

        fn begin_command_buffer(&self, _command_buffer: vk::CommandBuffer) -> VulkanResult<()> {
            Ok(())
        }

        fn end_command_buffer(&self, _command_buffer: vk::CommandBuffer) -> VulkanResult<()> {
            match self.state.borrow_mut().end_recording_results.pop_front() {
                Some(error) => Err(VulkanError::Api(error)),
                None => Ok(()),
            }
        }

        fn begin_render_pass(
            &self,
            _command_buffer: vk::CommandBuffer,
            _render_pass: vk::RenderPass,
            _framebuffer: vk::Framebuffer,
            _extent: vk::Extent2D,
            _clear: &ClearSettings,
        ) {
            self.state.borrow_mut().render_passes_begun += 1;
        }

        fn end_render_pass(&self, _command_buffer: vk::CommandBuffer) {}

        fn wait_idle(&self) -> VulkanResult<()> {
            self.state.borrow_mut().wait_idle_calls += 1;
            Ok(())
        }
    }

    struct MockWindow {
        extent: vk::Extent2D,
        pending_extents: VecDeque<vk::Extent2D>,
        resized: bool,
        waits: usize,
    }

    impl MockWindow {
        fn new(width: u32, height: u32) -> Self {
            Self {
                extent: vk::Extent2D { width, height },
                pending_extents: VecDeque::new(),
                resized: false,
                waits: 0,
            }
        }
    }

    impl SurfaceWindow for MockWindow {
        fn extent(&self) -> vk::Extent2D {
            self.extent
        }

        fn was_resized(&self) -> bool {
            self.resized
        }

        fn reset_resized_flag(&mut self) {
            self.resized = false;
        }

        fn wait_events(&mut self) {
            self.waits += 1;
            if let Some(extent) = self.pending_extents.pop_front() {
                self.extent = extent;
            }
        }
    }

    fn setup(image_count: usize, width: u32, height: u32) -> (Rc<RefCell<MockState>>, MockWindow, Renderer<MockBackend>) {
        let state = Rc::new(RefCell::new(MockState {
            image_count,
            color_format: vk::Format::B8G8R8A8_SRGB,
            ..MockState::default()
        }));
        let mut window = MockWindow::new(width, height);
        let backend = MockBackend { state: Rc::clone(&state) };
        let renderer = Renderer::new(backend, &mut window, ClearSettings::default()).unwrap();
        (state, window, renderer)
    }

    fn draw_frame(renderer: &mut Renderer<MockBackend>, window: &mut MockWindow) -> VulkanResult<bool> {
        match renderer.begin_frame(window)? {
            Some(command_buffer) => {
                renderer.begin_swap_chain_render_pass(command_buffer);
                renderer.end_swap_chain_render_pass(command_buffer);
                renderer.end_frame(window)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    #[test]
    fn test_command_buffers_match_image_count() {
        for image_count in [2, 3, 4] {
            let (state, mut window, mut renderer) = setup(image_count, 640, 480);
            assert_eq!(renderer.command_buffer_count(), image_count);

            state.borrow_mut().image_count = image_count + 1;
            window.resized = true;
            draw_frame(&mut renderer, &mut window).unwrap();

            assert_eq!(state.borrow().recreations, 1);
            assert_eq!(renderer.command_buffer_count(), image_count + 1);
            assert_eq!(state.borrow().live_command_buffers.len(), image_count + 1);
        }
    }

    #[test]
    fn test_end_to_end_single_frame_at_800x600() {
        let (state, mut window, mut renderer) = setup(3, 800, 600);
        assert_eq!(renderer.swap_chain_extent(), vk::Extent2D { width: 800, height: 600 });

        let command_buffer = renderer.begin_frame(&mut window).unwrap().unwrap();
        assert_eq!(renderer.frame_index().index(), 0);
        renderer.begin_swap_chain_render_pass(command_buffer);
        renderer.end_swap_chain_render_pass(command_buffer);
        renderer.end_frame(&mut window).unwrap();

        let state = state.borrow();
        assert_eq!(state.present_statuses, vec![SwapChainStatus::Success]);
        assert_eq!(state.submitted, vec![(command_buffer, 0)]);
        assert_eq!(state.render_passes_begun, 1);
        assert_eq!(renderer.current_frame_index.index(), 1);
        assert_eq!(state.recreations, 0);
    }

    #[test]
    fn test_frame_slot_alternates_even_when_submit_fails() {
        let (state, mut window, mut renderer) = setup(3, 800, 600);
        state.borrow_mut().present_results =
            VecDeque::from(vec![vk::Result::SUCCESS, vk::Result::ERROR_DEVICE_LOST, vk::Result::SUCCESS]);

        let mut slots = Vec::new();
        for _ in 0..5 {
            renderer.begin_frame(&mut window).unwrap().unwrap();
            slots.push(renderer.frame_index().index());
            let _ = renderer.end_frame(&mut window);
        }

        assert_eq!(slots, vec![0, 1, 0, 1, 0]);
        assert_eq!(state.borrow().submit_slots, vec![0, 1, 0, 1, 0]);
        assert_eq!(renderer.current_frame_index.index(), 1);
    }

    #[test]
    fn test_failed_recording_still_advances_slot() {
        let (state, mut window, mut renderer) = setup(3, 800, 600);
        state
            .borrow_mut()
            .end_recording_results
            .push_back(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY);

        renderer.begin_frame(&mut window).unwrap().unwrap();
        let error = renderer.end_frame(&mut window).unwrap_err();
        assert!(matches!(error, VulkanError::Api(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY)));
        assert!(!renderer.is_frame_in_progress());
        assert_eq!(renderer.current_frame_index.index(), 1);

        renderer.begin_frame(&mut window).unwrap().unwrap();
        assert_eq!(renderer.frame_index().index(), 1);
        renderer.end_frame(&mut window).unwrap();

        let state = state.borrow();
        assert_eq!(state.abandoned_slots, vec![0]);
        assert_eq!(state.acquire_slots, vec![0, 1]);
        assert_eq!(state.submit_slots, vec![1]);
        assert_eq!(state.submitted.len(), 1);
    }

    #[test]
    fn test_out_of_date_acquire_recreates_once_and_skips_draw() {
        let (state, mut window, mut renderer) = setup(3, 800, 600);
        state.borrow_mut().acquire_results.push_back(vk::Result::ERROR_OUT_OF_DATE_KHR);

        let drew = draw_frame(&mut renderer, &mut window).unwrap();

        assert!(!drew);
        assert!(!renderer.is_frame_in_progress());
        let state = state.borrow();
        assert_eq!(state.recreations, 1);
        assert_eq!(state.wait_idle_calls, 1);
        assert!(state.submitted.is_empty());
        assert_eq!(renderer.render_pass_generation(), 1);
    }

    #[test]
    fn test_repeated_acquire_waits_on_same_slot() {
        let (state, mut window, mut renderer) = setup(2, 800, 600);
        state.borrow_mut().acquire_results =
            VecDeque::from(vec![vk::Result::ERROR_OUT_OF_DATE_KHR, vk::Result::ERROR_OUT_OF_DATE_KHR]);

        draw_frame(&mut renderer, &mut window).unwrap();
        draw_frame(&mut renderer, &mut window).unwrap();

        // Neither skipped frame reached submit, so the slot never moved
        assert_eq!(state.borrow().acquire_slots, vec![0, 0]);
        assert_eq!(renderer.current_frame_index.index(), 0);
        assert_eq!(state.borrow().submitted.len(), 0);
        assert_eq!(state.borrow().recreations, 2);
    }

    #[test]
    fn test_zero_extent_stalls_until_window_is_restored() {
        let (state, mut window, mut renderer) = setup(3, 800, 600);
        window.extent = vk::Extent2D { width: 0, height: 0 };
        window.pending_extents = VecDeque::from(vec![
            vk::Extent2D { width: 0, height: 0 },
            vk::Extent2D { width: 1024, height: 768 },
        ]);
        window.resized = true;

        draw_frame(&mut renderer, &mut window).unwrap();

        assert_eq!(window.waits, 2);
        assert!(!window.was_resized());
        assert_eq!(renderer.swap_chain_extent(), vk::Extent2D { width: 1024, height: 768 });
        assert_eq!(state.borrow().created_extents.last().copied(), Some(vk::Extent2D { width: 1024, height: 768 }));
        assert!(draw_frame(&mut renderer, &mut window).unwrap());
    }

    #[test]
    fn test_replacement_swap_chain_continues_renderer_slot() {
        let (state, mut window, mut renderer) = setup(3, 800, 600);
        state.borrow_mut().present_results.push_back(vk::Result::ERROR_OUT_OF_DATE_KHR);

        for _ in 0..4 {
            draw_frame(&mut renderer, &mut window).unwrap();
        }

        let state = state.borrow();
        assert_eq!(state.recreations, 1);
        assert_eq!(state.acquire_slots, vec![0, 1, 0, 1]);
        assert_eq!(state.submit_slots, vec![0, 1, 0, 1]);
    }

    #[test]
    fn test_suboptimal_present_triggers_recreation() {
        let (state, mut window, mut renderer) = setup(3, 800, 600);
        state.borrow_mut().present_results.push_back(vk::Result::SUBOPTIMAL_KHR);

        assert!(draw_frame(&mut renderer, &mut window).unwrap());
        assert_eq!(state.borrow().recreations, 1);
        assert_eq!(renderer.render_pass_generation(), 1);
    }

    #[test]
    fn test_suboptimal_acquire_still_draws() {
        let (state, mut window, mut renderer) = setup(3, 800, 600);
        state.borrow_mut().acquire_results.push_back(vk::Result::SUBOPTIMAL_KHR);

        assert!(draw_frame(&mut renderer, &mut window).unwrap());
        assert_eq!(state.borrow().submitted.len(), 1);
    }

    #[test]
    fn test_acquire_timeout_is_fatal() {
        let (state, mut window, mut renderer) = setup(3, 800, 600);
        state.borrow_mut().acquire_results.push_back(vk::Result::TIMEOUT);

        let result = renderer.begin_frame(&mut window);
        assert!(matches!(result, Err(VulkanError::Api(vk::Result::TIMEOUT))));
    }

    #[test]
    fn test_format_change_on_recreation_is_an_error() {
        let (state, mut window, mut renderer) = setup(3, 800, 600);
        state.borrow_mut().color_format = vk::Format::R8G8B8A8_UNORM;
        window.resized = true;

        renderer.begin_frame(&mut window).unwrap().unwrap();
        let result = renderer.end_frame(&mut window);
        assert!(matches!(result, Err(VulkanError::InvalidOperation { .. })));
    }

    #[test]
    fn test_render_pass_changes_with_generation() {
        let (_state, mut window, mut renderer) = setup(3, 800, 600);
        let first = renderer.swap_chain_render_pass();
        window.resized = true;
        draw_frame(&mut renderer, &mut window).unwrap();

        assert_ne!(renderer.swap_chain_render_pass(), first);
        assert_eq!(renderer.render_pass_generation(), 1);
    }

    #[test]
    fn test_drop_frees_command_buffers() {
        let (state, _window, renderer) = setup(3, 800, 600);
        assert_eq!(state.borrow().live_command_buffers.len(), 3);
        drop(renderer);
        assert!(state.borrow().live_command_buffers.is_empty());
    }

    #[test]
    #[should_panic(expected = "frame not in progress")]
    fn test_frame_index_outside_frame_panics() {
        let (_state, _window, renderer) = setup(3, 800, 600);
        let _ = renderer.frame_index();
    }

    #[test]
    #[should_panic(expected = "already in progress")]
    fn test_begin_frame_twice_panics() {
        let (_state, mut window, mut renderer) = setup(3, 800, 600);
        renderer.begin_frame(&mut window).unwrap();
        let _ = renderer.begin_frame(&mut window);
    }
}
