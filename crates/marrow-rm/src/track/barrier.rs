use marrow::ash::vk;
use tinyvec::TinyVec;

use super::StateInfo;

///A single state transition of a tracked resource, as computed by the [ResourceTracker](super::ResourceTracker).
///
/// Queue family ownership is never transferred, so the barrier always uses `QUEUE_FAMILY_IGNORED`.
#[derive(Clone, Copy, Debug)]
pub struct Barrier {
    pub src: StateInfo,
    pub dst: StateInfo,
    ///Affected subresources, `None` for buffers.
    pub range: Option<vk::ImageSubresourceRange>,
}

impl Barrier {
    ///True if the transition needs no barrier at all: both sides only read, and the layout does not change.
    pub fn is_noop(&self) -> bool {
        !self.src.is_write() && !self.dst.is_write() && self.src.layout == self.dst.layout
    }

    pub fn is_layout_transition(&self) -> bool {
        self.range.is_some() && self.src.layout != self.dst.layout
    }

    pub fn image_barrier(&self, image: vk::Image) -> vk::ImageMemoryBarrier2<'static> {
        vk::ImageMemoryBarrier2::default()
            .image(image)
            .subresource_range(self.range.unwrap_or(full_color_range()))
            .src_access_mask(self.src.access)
            .src_stage_mask(self.src.stage)
            .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .old_layout(self.src.layout)
            .dst_access_mask(self.dst.access)
            .dst_stage_mask(self.dst.stage)
            .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .new_layout(self.dst.layout)
    }

    pub fn buffer_barrier(&self, buffer: vk::Buffer) -> vk::BufferMemoryBarrier2<'static> {
        vk::BufferMemoryBarrier2::default()
            .buffer(buffer)
            .src_access_mask(self.src.access)
            .src_stage_mask(self.src.stage)
            .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .dst_access_mask(self.dst.access)
            .dst_stage_mask(self.dst.stage)
            .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .offset(0)
            .size(vk::WHOLE_SIZE)
    }
}

fn full_color_range() -> vk::ImageSubresourceRange {
    vk::ImageSubresourceRange {
        aspect_mask: vk::ImageAspectFlags::COLOR,
        base_mip_level: 0,
        level_count: vk::REMAINING_MIP_LEVELS,
        base_array_layer: 0,
        layer_count: vk::REMAINING_ARRAY_LAYERS,
    }
}

///Collects barriers of one pipeline point and turns them into a single `vk::DependencyInfo`.
///
/// Uses tinyvec internally, so up to [STACK_ALLOCATION](Self::STACK_ALLOCATION) barriers per type don't allocate. The
/// builder can outgrow that value.
#[derive(Debug, Default)]
pub struct BarrierBuilder {
    pub images: TinyVec<[vk::ImageMemoryBarrier2<'static>; Self::STACK_ALLOCATION]>,
    pub buffers: TinyVec<[vk::BufferMemoryBarrier2<'static>; Self::STACK_ALLOCATION]>,
}

impl BarrierBuilder {
    ///Amount of barriers per type that are stack allocated.
    pub const STACK_ALLOCATION: usize = 6;

    pub fn new() -> Self {
        Self::default()
    }

    ///Adds `barrier` for `image`. No-op transitions are skipped. Returns true if a barrier was added.
    ///
    /// Make sure that `image` is alive until the barrier was executed on the GPU.
    pub fn image(&mut self, image: vk::Image, barrier: &Barrier) -> bool {
        if barrier.is_noop() {
            return false;
        }
        let item = barrier.image_barrier(image);

        #[cfg(feature = "logging")]
        log::trace!("transition[{:?}] {:?} -> {:?}", image, barrier.src, barrier.dst);

        self.images.push(item);
        true
    }

    ///Adds `barrier` for `buffer`. No-op transitions are skipped. Returns true if a barrier was added.
    ///
    /// Make sure that `buffer` is alive until the barrier was executed on the GPU.
    pub fn buffer(&mut self, buffer: vk::Buffer, barrier: &Barrier) -> bool {
        if barrier.is_noop() {
            return false;
        }

        #[cfg(feature = "logging")]
        log::trace!("transition[{:?}] {:?} -> {:?}", buffer, barrier.src, barrier.dst);

        self.buffers.push(barrier.buffer_barrier(buffer));
        true
    }

    pub fn image_custom_barrier(&mut self, barrier: vk::ImageMemoryBarrier2<'static>) -> &mut Self {
        self.images.push(barrier);
        self
    }

    pub fn buffer_custom_barrier(&mut self, barrier: vk::BufferMemoryBarrier2<'static>) -> &mut Self {
        self.buffers.push(barrier);
        self
    }

    ///Returns a dependency info referencing the currently pushed barriers, ready for `vkCmdPipelineBarrier2`.
    pub fn as_dependency_info(&self) -> vk::DependencyInfo<'_> {
        vk::DependencyInfo::default()
            .image_memory_barriers(self.images.as_slice())
            .buffer_memory_barriers(self.buffers.as_slice())
    }

    ///Returns true if at least one barrier has been added.
    pub fn has_barrier(&self) -> bool {
        !self.images.is_empty() || !self.buffers.is_empty()
    }

    pub fn clear(&mut self) {
        self.images.clear();
        self.buffers.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::track::ResState;
    use marrow::ash::vk::Handle;

    fn barrier(src: ResState, dst: ResState, image: bool) -> Barrier {
        Barrier {
            src: src.info(),
            dst: dst.info(),
            range: image.then(full_color_range),
        }
    }

    #[test]
    fn read_after_read_is_skipped() {
        let mut builder = BarrierBuilder::new();
        assert!(!builder.buffer(
            vk::Buffer::from_raw(1),
            &barrier(ResState::UniformRead, ResState::UniformRead, false)
        ));
        assert!(!builder.image(
            vk::Image::from_raw(1),
            &barrier(ResState::ShaderReadOnly, ResState::ShaderReadOnly, true)
        ));
        assert!(!builder.has_barrier());

        //same layout, but a write on one side
        assert!(builder.buffer(
            vk::Buffer::from_raw(1),
            &barrier(ResState::TransferDst, ResState::VertexRead, false)
        ));
        //layout change between two read states
        assert!(builder.image(
            vk::Image::from_raw(2),
            &barrier(ResState::TransferSrc, ResState::ShaderReadOnly, true)
        ));
        let info = builder.as_dependency_info();
        assert_eq!(info.image_memory_barrier_count, 1);
        assert_eq!(info.buffer_memory_barrier_count, 1);
    }

    #[test]
    fn vulkan_barrier_fields() {
        let b = barrier(ResState::ColorAttachment, ResState::Present, true);
        let vb = b.image_barrier(vk::Image::from_raw(7));
        assert_eq!(vb.old_layout, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL);
        assert_eq!(vb.new_layout, vk::ImageLayout::PRESENT_SRC_KHR);
        assert_eq!(vb.src_stage_mask, vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT);
        assert_eq!(vb.src_queue_family_index, vk::QUEUE_FAMILY_IGNORED);
        assert_eq!(vb.dst_queue_family_index, vk::QUEUE_FAMILY_IGNORED);
        assert!(b.is_layout_transition());
    }
}
