//! # Frame pacing
//!
//! The CPU may record up to `frames_in_flight` frames ahead of the GPU. All frames share a single [Timeline]. Frame `f`
//! signals the value `f + 1` when its last submission finished, so:
//!
//! - frame `f` is finished iff `timeline >= f + 1`,
//! - the last finished frame is `timeline - 1` (none while the timeline is still at 0),
//! - before frame `f` reuses the per-frame slot `f % N`, frame `f - N` has to be finished, i.e. the pacer waits for
//!   `f - N + 1`.
//!
//! Submission is not done by the pacer. The renderer submits its command buffers and signals
//! [FrameToken::signal_value] on the timeline, then calls [end_frame](FramePacer::end_frame).
//!
//! Acquiring and presenting the swapchain image is abstracted by [PresentTarget]. A stale surface (out of date or
//! suboptimal) is not an error, but reported as [FrameStatus::SurfaceStale]. The caller then rebuilds the surface and
//! tries again.

use ash::vk;

use crate::{
    FrameError, SyncError,
    sync::{HostTimeline, Timeline},
};

///Acquire/present half of a swapchain.
pub trait PresentTarget {
    ///Acquires the next presentable image for `frame_slot`, returns its index.
    fn acquire_next_image(&mut self, frame_slot: usize) -> Result<u32, vk::Result>;
    ///Presents `image_index` after the work of `frame_slot` finished.
    fn present(&mut self, frame_slot: usize, image_index: u32) -> Result<(), vk::Result>;
}

///Target that never presents. Used for headless and offscreen rendering.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoPresent;

impl PresentTarget for NoPresent {
    fn acquire_next_image(&mut self, _frame_slot: usize) -> Result<u32, vk::Result> {
        Ok(0)
    }
    fn present(&mut self, _frame_slot: usize, _image_index: u32) -> Result<(), vk::Result> {
        Ok(())
    }
}

fn is_stale(result: vk::Result) -> bool {
    result == vk::Result::ERROR_OUT_OF_DATE_KHR || result == vk::Result::SUBOPTIMAL_KHR
}

///Everything the renderer needs to record and submit one frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameToken {
    pub frame: u64,
    ///Per-frame slot, `frame % frames_in_flight`.
    pub slot: usize,
    pub image_index: u32,
    ///Value the frame's last submission has to signal on the pacer's timeline.
    pub signal_value: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameStatus {
    Ready(FrameToken),
    ///The surface has to be rebuilt before the frame can start.
    SurfaceStale,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PresentStatus {
    Presented,
    ///Presentation worked, or was skipped, but the surface has to be rebuilt.
    SurfaceStale,
}

///Anything that knows which frame is recorded and which one the GPU finished. The ring allocator and temporary
/// resource tracking only depend on this.
pub trait FrameProgress {
    ///The frame currently being recorded.
    fn current_frame(&self) -> u64;
    ///Highest frame the GPU finished, `None` before the first one finished.
    fn last_finished_frame(&self) -> Option<u64>;
    ///Blocks until `frame` is finished.
    fn wait_for_frame(&self, frame: u64) -> Result<(), SyncError>;

    fn is_finished(&self, frame: u64) -> bool {
        self.last_finished_frame().is_some_and(|last| last >= frame)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FramePacerDesc {
    pub frames_in_flight: usize,
}

impl FramePacerDesc {
    pub const DEFAULT_FRAMES_IN_FLIGHT: usize = 2;
    pub const MAX_FRAMES_IN_FLIGHT: usize = 8;
}

impl Default for FramePacerDesc {
    fn default() -> Self {
        FramePacerDesc {
            frames_in_flight: Self::DEFAULT_FRAMES_IN_FLIGHT,
        }
    }
}

pub struct FramePacer<T: Timeline = HostTimeline> {
    timeline: T,
    frames_in_flight: usize,
    current_frame: u64,
    //Frame that was begun, but not ended yet
    in_progress: Option<FrameToken>,
}

impl<T: Timeline> FramePacer<T> {
    ///Creates a pacer on `timeline`. The timeline is expected to be at 0, which is "no frame finished".
    ///
    /// # Panics
    ///
    /// if `frames_in_flight` is 0 or greater than [FramePacerDesc::MAX_FRAMES_IN_FLIGHT].
    pub fn new(timeline: T, desc: FramePacerDesc) -> Self {
        assert!(
            desc.frames_in_flight > 0
                && desc.frames_in_flight <= FramePacerDesc::MAX_FRAMES_IN_FLIGHT,
            "frames in flight must be in 1..={}, was {}",
            FramePacerDesc::MAX_FRAMES_IN_FLIGHT,
            desc.frames_in_flight
        );

        FramePacer {
            timeline,
            frames_in_flight: desc.frames_in_flight,
            current_frame: 0,
            in_progress: None,
        }
    }

    pub fn timeline(&self) -> &T {
        &self.timeline
    }

    pub fn frames_in_flight(&self) -> usize {
        self.frames_in_flight
    }

    pub fn current_frame(&self) -> u64 {
        self.current_frame
    }

    pub fn frame_slot(&self) -> usize {
        (self.current_frame % self.frames_in_flight as u64) as usize
    }

    pub fn last_finished_frame(&self) -> Option<u64> {
        self.timeline.completed_value().checked_sub(1)
    }

    ///Frame that is currently recorded, if any.
    pub fn frame_in_progress(&self) -> Option<&FrameToken> {
        self.in_progress.as_ref()
    }

    ///Waits until the slot of the current frame is free again, then acquires the next image of `target`.
    ///
    /// Blocks for at most the duration of one frame on the GPU, as long as the renderer keeps submitting.
    pub fn begin_frame(&mut self, target: &mut impl PresentTarget) -> Result<FrameStatus, FrameError> {
        #[cfg(feature = "profiling")]
        puffin::profile_function!();

        if let Some(token) = &self.in_progress {
            return Err(FrameError::FrameInProgress(token.frame));
        }

        let frame = self.current_frame;
        let n = self.frames_in_flight as u64;
        if frame >= n {
            //frame - n has to be finished, it signals frame - n + 1
            let wait_value = frame - n + 1;
            #[cfg(feature = "logging")]
            log::trace!("Frame {} waits for frame {}", frame, frame - n);
            self.timeline.wait(wait_value)?;
        }

        let slot = self.frame_slot();
        let image_index = match target.acquire_next_image(slot) {
            Ok(idx) => idx,
            Err(e) if is_stale(e) => {
                #[cfg(feature = "logging")]
                log::info!("Surface stale on acquire for frame {}: {}", frame, e);
                return Ok(FrameStatus::SurfaceStale);
            }
            Err(e) => {
                #[cfg(feature = "logging")]
                log::error!("Failed to acquire image for frame {}: {}", frame, e);
                return Err(FrameError::Surface(e));
            }
        };

        let token = FrameToken {
            frame,
            slot,
            image_index,
            signal_value: frame + 1,
        };
        self.in_progress = Some(token);
        Ok(FrameStatus::Ready(token))
    }

    ///Presents the frame of `token` and advances the frame counter. The frame's work has to be submitted already
    /// (signaling [FrameToken::signal_value]).
    ///
    /// A stale surface still advances the frame, since the frame's work was submitted.
    pub fn end_frame(
        &mut self,
        token: FrameToken,
        target: &mut impl PresentTarget,
    ) -> Result<PresentStatus, FrameError> {
        match &self.in_progress {
            None => return Err(FrameError::NoFrameInProgress),
            Some(current) if current.frame != token.frame => {
                return Err(FrameError::TokenMismatch {
                    token: token.frame,
                    current: current.frame,
                });
            }
            Some(_) => {}
        }

        self.in_progress = None;
        self.current_frame += 1;

        match target.present(token.slot, token.image_index) {
            Ok(()) => Ok(PresentStatus::Presented),
            Err(e) if is_stale(e) => {
                #[cfg(feature = "logging")]
                log::info!("Surface stale on present of frame {}: {}", token.frame, e);
                Ok(PresentStatus::SurfaceStale)
            }
            Err(e) => {
                #[cfg(feature = "logging")]
                log::error!("Error while presenting frame {}: {}", token.frame, e);
                Err(FrameError::Surface(e))
            }
        }
    }

    ///Blocks until every submitted frame finished.
    pub fn wait_idle(&self) -> Result<(), SyncError> {
        self.timeline.wait(self.current_frame)
    }
}

impl<T: Timeline> FrameProgress for FramePacer<T> {
    fn current_frame(&self) -> u64 {
        self.current_frame
    }

    fn last_finished_frame(&self) -> Option<u64> {
        FramePacer::last_finished_frame(self)
    }

    fn wait_for_frame(&self, frame: u64) -> Result<(), SyncError> {
        self.timeline.wait(frame + 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn pacer(n: usize) -> FramePacer<HostTimeline> {
        FramePacer::new(
            HostTimeline::new(0).with_stall_timeout(Duration::from_millis(5)),
            FramePacerDesc {
                frames_in_flight: n,
            },
        )
    }

    fn begin(p: &mut FramePacer<HostTimeline>) -> FrameToken {
        match p.begin_frame(&mut NoPresent).unwrap() {
            FrameStatus::Ready(t) => t,
            FrameStatus::SurfaceStale => panic!("headless surface can't be stale"),
        }
    }

    #[test]
    fn frames_advance_and_report_finished() {
        let mut p = pacer(2);
        assert_eq!(p.last_finished_frame(), None);

        let t0 = begin(&mut p);
        assert_eq!((t0.frame, t0.slot, t0.signal_value), (0, 0, 1));
        p.end_frame(t0, &mut NoPresent).unwrap();

        let t1 = begin(&mut p);
        assert_eq!((t1.frame, t1.slot), (1, 1));
        p.end_frame(t1, &mut NoPresent).unwrap();
        assert_eq!(p.current_frame(), 2);

        //Frame 2 reuses slot 0 and needs frame 0 to be finished
        assert!(matches!(
            p.begin_frame(&mut NoPresent),
            Err(FrameError::Sync(SyncError::Stalled { target: 1, .. }))
        ));

        p.timeline().signal(t0.signal_value).unwrap();
        assert_eq!(p.last_finished_frame(), Some(0));
        assert!(p.is_finished(0));
        assert!(!p.is_finished(1));
        let t2 = begin(&mut p);
        assert_eq!(t2.slot, 0);
    }

    #[test]
    fn begin_twice_is_an_error() {
        let mut p = pacer(2);
        let t0 = begin(&mut p);
        assert_eq!(
            p.begin_frame(&mut NoPresent),
            Err(FrameError::FrameInProgress(0))
        );
        p.end_frame(t0, &mut NoPresent).unwrap();
        assert_eq!(
            p.end_frame(t0, &mut NoPresent),
            Err(FrameError::NoFrameInProgress)
        );
    }

    struct StaleOnce {
        stale: bool,
    }

    impl PresentTarget for StaleOnce {
        fn acquire_next_image(&mut self, _frame_slot: usize) -> Result<u32, vk::Result> {
            if std::mem::take(&mut self.stale) {
                Err(vk::Result::ERROR_OUT_OF_DATE_KHR)
            } else {
                Ok(3)
            }
        }
        fn present(&mut self, _frame_slot: usize, _image_index: u32) -> Result<(), vk::Result> {
            Err(vk::Result::SUBOPTIMAL_KHR)
        }
    }

    #[test]
    fn stale_surface_is_reported() {
        let mut p = pacer(2);
        let mut target = StaleOnce { stale: true };
        assert_eq!(p.begin_frame(&mut target), Ok(FrameStatus::SurfaceStale));
        assert!(p.frame_in_progress().is_none());

        let token = match p.begin_frame(&mut target).unwrap() {
            FrameStatus::Ready(t) => t,
            FrameStatus::SurfaceStale => panic!("should be rebuilt"),
        };
        assert_eq!(token.image_index, 3);
        assert_eq!(
            p.end_frame(token, &mut target),
            Ok(PresentStatus::SurfaceStale)
        );
        assert_eq!(p.current_frame(), 1);
    }

    #[test]
    #[should_panic(expected = "frames in flight")]
    fn zero_frames_in_flight_panics() {
        let _ = pacer(0);
    }
}
