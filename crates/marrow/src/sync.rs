//! # Synchronisation
//!
//! Everything in marrow that has to know "did the GPU pass this point yet" goes through the [Timeline] trait.
//! A timeline is a monotonically increasing 64 bit counter, signaled by the device (or the host) and waited on by
//! the host. This matches Vulkan's [timeline semaphores](https://www.khronos.org/blog/vulkan-timeline-semaphores), which
//! replaced fences for device->host synchronisation starting with Vulkan 1.2.
//!
//! - [TimelineSemaphore] is the Vulkan implementation.
//! - [HostTimeline] is a host side simulation. It is signaled by calling [signal](Timeline::signal), which makes it the
//!   "simulated fence clock" for headless runs and tests.
//!
//! ## Blocking
//!
//! [Timeline::wait] blocks the calling thread. The only places marrow calls it are frame begin (bounded by the number
//! of frames in flight) and the ring allocator's flush when the ring is full. Both are intended back pressure.

use std::{
    fmt::Debug,
    sync::{Condvar, Mutex},
    time::{Duration, Instant},
};

use ash::vk;

use crate::SyncError;

///Monotonic device/host counter.
pub trait Timeline {
    ///Highest value that is known to be reached.
    fn completed_value(&self) -> u64;

    ///Blocks until `value` is reached.
    fn wait(&self, value: u64) -> Result<(), SyncError>;

    ///Signals `value` from the host. Has to be greater than the current value.
    fn signal(&self, value: u64) -> Result<(), SyncError>;

    fn is_reached(&self, value: u64) -> bool {
        self.completed_value() >= value
    }
}

impl<T: Timeline + ?Sized> Timeline for std::sync::Arc<T> {
    fn completed_value(&self) -> u64 {
        (**self).completed_value()
    }
    fn wait(&self, value: u64) -> Result<(), SyncError> {
        (**self).wait(value)
    }
    fn signal(&self, value: u64) -> Result<(), SyncError> {
        (**self).signal(value)
    }
}

///Single Vulkan [timeline semaphore](https://www.khronos.org/blog/vulkan-timeline-semaphores).
pub struct TimelineSemaphore {
    pub inner: vk::Semaphore,
    device: ash::Device,
}

impl TimelineSemaphore {
    pub fn new(device: &ash::Device, initial_value: u64) -> Result<Self, vk::Result> {
        let mut timeline_ci = vk::SemaphoreTypeCreateInfo::default()
            .semaphore_type(vk::SemaphoreType::TIMELINE)
            .initial_value(initial_value);

        let semaphore = unsafe {
            let ci = vk::SemaphoreCreateInfo::default().push_next(&mut timeline_ci);
            device.create_semaphore(&ci, None)?
        };

        Ok(TimelineSemaphore {
            inner: semaphore,
            device: device.clone(),
        })
    }

    ///Blocks until `value` is reached or `timeout` (in nanoseconds) passed.
    pub fn wait_timeout(&self, value: u64, timeout: u64) -> Result<(), vk::Result> {
        let sem = [self.inner];
        let val = [value];
        let wait = vk::SemaphoreWaitInfo::default()
            .semaphores(&sem)
            .values(&val);

        unsafe { self.device.wait_semaphores(&wait, timeout) }
    }
}

impl Timeline for TimelineSemaphore {
    ///Current value of the semaphore. If the query fails (device lost), `u64::MAX` is returned, so nothing waits on a dead
    /// device.
    fn completed_value(&self) -> u64 {
        unsafe {
            self.device
                .get_semaphore_counter_value(self.inner)
                .unwrap_or(u64::MAX)
        }
    }

    fn wait(&self, value: u64) -> Result<(), SyncError> {
        self.wait_timeout(value, u64::MAX).map_err(|e| {
            #[cfg(feature = "logging")]
            log::error!("Failed to wait for timeline {:?} = {}: {}", self.inner, value, e);
            SyncError::from(e)
        })
    }

    fn signal(&self, value: u64) -> Result<(), SyncError> {
        let current = self.completed_value();
        if value <= current {
            return Err(SyncError::NotMonotonic {
                requested: value,
                current,
            });
        }
        let signal_info = vk::SemaphoreSignalInfo::default()
            .semaphore(self.inner)
            .value(value);
        unsafe { self.device.signal_semaphore(&signal_info)? };
        Ok(())
    }
}

impl Drop for TimelineSemaphore {
    fn drop(&mut self) {
        unsafe { self.device.destroy_semaphore(self.inner, None) }
    }
}

impl Debug for TimelineSemaphore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.inner.fmt(f)
    }
}

///Host simulated timeline.
///
/// By default [wait](Timeline::wait) blocks until another thread signals the value. A stall timeout can be set, after which
/// the wait fails with [SyncError::Stalled]. Single threaded test harnesses use that to turn a would-be deadlock into an
/// error.
pub struct HostTimeline {
    value: Mutex<u64>,
    signaled: Condvar,
    stall_timeout: Option<Duration>,
}

impl HostTimeline {
    pub fn new(initial_value: u64) -> Self {
        HostTimeline {
            value: Mutex::new(initial_value),
            signaled: Condvar::new(),
            stall_timeout: None,
        }
    }

    pub fn with_stall_timeout(mut self, timeout: Duration) -> Self {
        self.stall_timeout = Some(timeout);
        self
    }
}

impl Default for HostTimeline {
    fn default() -> Self {
        Self::new(0)
    }
}

impl Timeline for HostTimeline {
    fn completed_value(&self) -> u64 {
        *self.value.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn wait(&self, value: u64) -> Result<(), SyncError> {
        let start = Instant::now();
        let mut current = self.value.lock().unwrap_or_else(|p| p.into_inner());
        while *current < value {
            current = match self.stall_timeout {
                None => self.signaled.wait(current).unwrap_or_else(|p| p.into_inner()),
                Some(timeout) => {
                    let left = timeout.saturating_sub(start.elapsed());
                    if left.is_zero() {
                        #[cfg(feature = "logging")]
                        log::error!("Host timeline stalled at {}, waiting for {}", *current, value);
                        return Err(SyncError::Stalled {
                            target: value,
                            reached: *current,
                        });
                    }
                    self.signaled
                        .wait_timeout(current, left)
                        .unwrap_or_else(|p| p.into_inner())
                        .0
                }
            };
        }
        Ok(())
    }

    fn signal(&self, value: u64) -> Result<(), SyncError> {
        let mut current = self.value.lock().unwrap_or_else(|p| p.into_inner());
        if value <= *current {
            return Err(SyncError::NotMonotonic {
                requested: value,
                current: *current,
            });
        }
        *current = value;
        self.signaled.notify_all();
        Ok(())
    }
}

impl Debug for HostTimeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "HostTimeline({})", self.completed_value())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use static_assertions::assert_impl_all;
    use std::sync::Arc;

    #[test]
    fn impl_send_sync() {
        assert_impl_all!(TimelineSemaphore: Send, Sync);
        assert_impl_all!(HostTimeline: Send, Sync);
    }

    #[test]
    fn host_timeline_signal_and_wait() {
        let tl = HostTimeline::new(0).with_stall_timeout(Duration::from_millis(10));
        assert!(!tl.is_reached(1));
        tl.signal(2).unwrap();
        assert!(tl.is_reached(1));
        assert!(tl.wait(2).is_ok());
        assert_eq!(
            tl.signal(1),
            Err(SyncError::NotMonotonic {
                requested: 1,
                current: 2
            })
        );
    }

    #[test]
    fn host_timeline_stalls() {
        let tl = HostTimeline::new(3).with_stall_timeout(Duration::from_millis(5));
        assert_eq!(
            tl.wait(4),
            Err(SyncError::Stalled {
                target: 4,
                reached: 3
            })
        );
    }

    #[test]
    fn host_timeline_wakes_waiter() {
        let tl = Arc::new(HostTimeline::new(0));
        let signaler = {
            let tl = tl.clone();
            std::thread::spawn(move || {
                std::thread::sleep(Duration::from_millis(5));
                tl.signal(1).unwrap();
            })
        };
        assert!(tl.wait(1).is_ok());
        signaler.join().unwrap();
    }
}
