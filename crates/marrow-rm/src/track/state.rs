use marrow::ash::vk;

///Synchronisation state of a resource: the stages that last used it, how they accessed it and (for images) its layout.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct StateInfo {
    pub stage: vk::PipelineStageFlags2,
    pub access: vk::AccessFlags2,
    ///Always `UNDEFINED` for buffers.
    pub layout: vk::ImageLayout,
}

impl StateInfo {
    pub const UNDEFINED: Self = StateInfo {
        stage: vk::PipelineStageFlags2::NONE,
        access: vk::AccessFlags2::NONE,
        layout: vk::ImageLayout::UNDEFINED,
    };

    const WRITE_MASK: vk::AccessFlags2 = vk::AccessFlags2::from_raw(
        vk::AccessFlags2::SHADER_WRITE.as_raw()
            | vk::AccessFlags2::SHADER_STORAGE_WRITE.as_raw()
            | vk::AccessFlags2::COLOR_ATTACHMENT_WRITE.as_raw()
            | vk::AccessFlags2::DEPTH_STENCIL_ATTACHMENT_WRITE.as_raw()
            | vk::AccessFlags2::TRANSFER_WRITE.as_raw()
            | vk::AccessFlags2::HOST_WRITE.as_raw()
            | vk::AccessFlags2::MEMORY_WRITE.as_raw(),
    );

    ///True if the state writes to the resource.
    pub fn is_write(&self) -> bool {
        self.access.intersects(Self::WRITE_MASK)
    }
}

///Logical resource states. Each one maps to a fixed [StateInfo], see [info](Self::info).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ResState {
    ///Content is undefined, i.e. freshly created or about to be overwritten completely.
    Undefined,
    ///Sampled / read in fragment or compute shaders.
    ShaderReadOnly,
    ///Written as color attachment.
    ColorAttachment,
    ///Written as depth/stencil attachment.
    DepthAttachment,
    ///Depth tested and sampled, but not written.
    DepthReadOnly,
    TransferSrc,
    TransferDst,
    ///Storage image or storage buffer, read and written by compute and fragment shaders.
    ShaderStorage,
    ///Handed to the presentation engine.
    Present,
    UniformRead,
    VertexRead,
    IndexRead,
    IndirectRead,
    ///Written by the host through a mapping.
    HostWrite,
}

impl ResState {
    pub const ALL: [Self; 14] = [
        Self::Undefined,
        Self::ShaderReadOnly,
        Self::ColorAttachment,
        Self::DepthAttachment,
        Self::DepthReadOnly,
        Self::TransferSrc,
        Self::TransferDst,
        Self::ShaderStorage,
        Self::Present,
        Self::UniformRead,
        Self::VertexRead,
        Self::IndexRead,
        Self::IndirectRead,
        Self::HostWrite,
    ];

    pub fn info(self) -> StateInfo {
        use vk::{AccessFlags2 as A, ImageLayout as L, PipelineStageFlags2 as S};

        let (stage, access, layout) = match self {
            Self::Undefined => (S::NONE, A::NONE, L::UNDEFINED),
            Self::ShaderReadOnly => (
                S::FRAGMENT_SHADER | S::COMPUTE_SHADER,
                A::SHADER_SAMPLED_READ | A::SHADER_READ,
                L::SHADER_READ_ONLY_OPTIMAL,
            ),
            Self::ColorAttachment => (
                S::COLOR_ATTACHMENT_OUTPUT,
                A::COLOR_ATTACHMENT_READ | A::COLOR_ATTACHMENT_WRITE,
                L::COLOR_ATTACHMENT_OPTIMAL,
            ),
            Self::DepthAttachment => (
                S::EARLY_FRAGMENT_TESTS | S::LATE_FRAGMENT_TESTS,
                A::DEPTH_STENCIL_ATTACHMENT_READ | A::DEPTH_STENCIL_ATTACHMENT_WRITE,
                L::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
            ),
            Self::DepthReadOnly => (
                S::EARLY_FRAGMENT_TESTS | S::LATE_FRAGMENT_TESTS | S::FRAGMENT_SHADER,
                A::DEPTH_STENCIL_ATTACHMENT_READ | A::SHADER_SAMPLED_READ,
                L::DEPTH_STENCIL_READ_ONLY_OPTIMAL,
            ),
            Self::TransferSrc => (S::ALL_TRANSFER, A::TRANSFER_READ, L::TRANSFER_SRC_OPTIMAL),
            Self::TransferDst => (S::ALL_TRANSFER, A::TRANSFER_WRITE, L::TRANSFER_DST_OPTIMAL),
            Self::ShaderStorage => (
                S::FRAGMENT_SHADER | S::COMPUTE_SHADER,
                A::SHADER_STORAGE_READ | A::SHADER_STORAGE_WRITE,
                L::GENERAL,
            ),
            //the present engine syncs through the semaphore
            Self::Present => (S::NONE, A::NONE, L::PRESENT_SRC_KHR),
            Self::UniformRead => (
                S::VERTEX_SHADER | S::FRAGMENT_SHADER | S::COMPUTE_SHADER,
                A::UNIFORM_READ,
                L::UNDEFINED,
            ),
            Self::VertexRead => (S::VERTEX_ATTRIBUTE_INPUT, A::VERTEX_ATTRIBUTE_READ, L::UNDEFINED),
            Self::IndexRead => (S::INDEX_INPUT, A::INDEX_READ, L::UNDEFINED),
            Self::IndirectRead => (S::DRAW_INDIRECT, A::INDIRECT_COMMAND_READ, L::UNDEFINED),
            Self::HostWrite => (S::HOST, A::HOST_WRITE, L::UNDEFINED),
        };

        StateInfo {
            stage,
            access,
            layout,
        }
    }

    ///True if the state exists for images.
    pub fn is_image_state(self) -> bool {
        !matches!(
            self,
            Self::UniformRead | Self::VertexRead | Self::IndexRead | Self::IndirectRead | Self::HostWrite
        )
    }

    ///True if the state exists for buffers.
    pub fn is_buffer_state(self) -> bool {
        matches!(
            self,
            Self::Undefined
                | Self::ShaderReadOnly
                | Self::TransferSrc
                | Self::TransferDst
                | Self::ShaderStorage
                | Self::UniformRead
                | Self::VertexRead
                | Self::IndexRead
                | Self::IndirectRead
                | Self::HostWrite
        )
    }
}

impl From<ResState> for StateInfo {
    fn from(s: ResState) -> Self {
        s.info()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_states() {
        let writes: Vec<_> = ResState::ALL
            .into_iter()
            .filter(|s| s.info().is_write())
            .collect();
        assert_eq!(
            writes,
            vec![
                ResState::ColorAttachment,
                ResState::DepthAttachment,
                ResState::TransferDst,
                ResState::ShaderStorage,
                ResState::HostWrite
            ]
        );
    }

    #[test]
    fn buffer_states_have_no_layout() {
        for s in ResState::ALL {
            if s.is_buffer_state() && s != ResState::Undefined && !s.is_image_state() {
                assert_eq!(s.info().layout, vk::ImageLayout::UNDEFINED);
            }
            assert!(s.is_buffer_state() || s.is_image_state());
        }
        assert_eq!(ResState::Undefined.info(), StateInfo::UNDEFINED);
    }
}
