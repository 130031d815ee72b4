use std::fmt::Display;

use ahash::AHashMap;
use marrow::{
    frame::FramePacer,
    sync::Timeline,
};

///Identifies the timeline a [Guard] waits on. Single queue setups only use [MAIN](Self::MAIN).
#[derive(Hash, PartialEq, Eq, PartialOrd, Ord, Debug, Clone, Copy)]
pub struct TrackId(pub u32);

impl TrackId {
    ///The frame timeline.
    pub const MAIN: Self = TrackId(0);
}

impl Display for TrackId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "TrackId({})", self.0)
    }
}

///Point on a timeline after which some GPU work is known to be finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Guard {
    pub track: TrackId,
    pub target_value: u64,
}

impl From<Guard> for TrackId {
    fn from(g: Guard) -> Self {
        g.track
    }
}

impl Guard {
    pub fn new(track: TrackId, target_value: u64) -> Self {
        Guard {
            track,
            target_value,
        }
    }

    ///Guard that expires once `frame` finished on the main timeline.
    pub fn for_frame(frame: u64) -> Self {
        Guard {
            track: TrackId::MAIN,
            target_value: frame + 1,
        }
    }

    pub fn wait_value(&self) -> u64 {
        self.target_value
    }

    ///The later of two guards on the same track. Guards of different tracks can't be ordered, `self` is kept in that case.
    pub fn later(self, other: Guard) -> Guard {
        if self.track == other.track && other.target_value > self.target_value {
            other
        } else {
            self
        }
    }
}

///Answers whether the GPU passed a [Guard].
pub trait GuardQuery {
    ///Returns true whenever the guard value was reached, or the guard's track doesn't exist (anymore).
    fn guard_finished(&self, guard: &Guard) -> bool;
}

///Timelines of all tracks.
pub struct Tracks<T: Timeline>(pub AHashMap<TrackId, T>);

impl<T: Timeline> Tracks<T> {
    pub fn new() -> Self {
        Tracks(AHashMap::default())
    }
}

impl<T: Timeline> Default for Tracks<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Timeline> GuardQuery for Tracks<T> {
    fn guard_finished(&self, guard: &Guard) -> bool {
        match self.0.get(&guard.track) {
            Some(t) => t.is_reached(guard.target_value),
            None => true,
        }
    }
}

///The pacer's timeline is the [main](TrackId::MAIN) track.
impl<T: Timeline> GuardQuery for FramePacer<T> {
    fn guard_finished(&self, guard: &Guard) -> bool {
        if guard.track == TrackId::MAIN {
            self.timeline().is_reached(guard.target_value)
        } else {
            true
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use marrow::{
        frame::FramePacerDesc,
        sync::HostTimeline,
    };

    #[test]
    fn tracks_query() {
        let mut tracks = Tracks::new();
        tracks.0.insert(TrackId::MAIN, HostTimeline::new(0));
        tracks.0.insert(TrackId(1), HostTimeline::new(5));

        assert!(!tracks.guard_finished(&Guard::for_frame(0)));
        assert!(tracks.guard_finished(&Guard::new(TrackId(1), 5)));
        assert!(!tracks.guard_finished(&Guard::new(TrackId(1), 6)));
        //unknown tracks are considered finished
        assert!(tracks.guard_finished(&Guard::new(TrackId(7), 100)));

        tracks.0[&TrackId::MAIN].signal(1).unwrap();
        assert!(tracks.guard_finished(&Guard::for_frame(0)));
    }

    #[test]
    fn pacer_query() {
        let pacer = FramePacer::new(HostTimeline::new(0), FramePacerDesc::default());
        assert!(!pacer.guard_finished(&Guard::for_frame(0)));
        pacer.timeline().signal(1).unwrap();
        assert!(pacer.guard_finished(&Guard::for_frame(0)));
        assert!(!pacer.guard_finished(&Guard::for_frame(1)));
    }

    #[test]
    fn later_guard() {
        let a = Guard::for_frame(2);
        let b = Guard::for_frame(5);
        assert_eq!(a.later(b), b);
        assert_eq!(b.later(a), b);
        let other = Guard::new(TrackId(3), 100);
        assert_eq!(a.later(other), a);
    }
}
