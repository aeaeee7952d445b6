use std::rc::Rc;

use crate::note::Pan;

/// One leg of a channel volume envelope: `from` before `start`, `to` after
/// `end`, linear in between. Times are engine frame times.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VolumeFade {
    pub start: i64,
    pub end: i64,
    pub from: f64,
    pub to: f64,
}

impl VolumeFade {
    /// Envelope value at frame time `t`.
    pub fn at(&self, t: i64) -> f64 {
        if t >= self.end {
            self.to
        } else if t <= self.start {
            self.from
        } else {
            let frac = (t - self.start) as f64 / (self.end - self.start) as f64;
            self.from + frac * (self.to - self.from)
        }
    }
}

/// One leg of a channel stereo envelope; interpolation is per component.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PanFade {
    pub start: i64,
    pub end: i64,
    pub from: Pan,
    pub to: Pan,
}

impl PanFade {
    /// Envelope value at frame time `t`.
    pub fn at(&self, t: i64) -> Pan {
        if t >= self.end {
            self.to
        } else if t <= self.start {
            self.from
        } else {
            let frac = (t - self.start) as f64 / (self.end - self.start) as f64;
            Pan::lerp(&self.from, &self.to, frac)
        }
    }
}

/// Capability the host provides for each node of its channel tree.
///
/// While mixing a note the engine reads the node's envelopes and walks
/// upward through `parent`; `ancestors` backs per-channel note removal.
/// Handles are shared between the queue and the walk and released when the
/// note is destroyed.
pub trait Channel {
    fn volume(&self) -> Option<VolumeFade>;
    fn stereo(&self) -> Option<PanFade>;
    fn parent(&self) -> Option<ChannelRef>;
    fn ancestors(&self) -> Vec<ChannelRef>;
}

/// Shared handle to a host channel node.
pub type ChannelRef = Rc<dyn Channel>;

/// Two refs name the same host node.
pub(crate) fn same_channel(a: &ChannelRef, b: &ChannelRef) -> bool {
    Rc::ptr_eq(a, b)
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    /// Host-side channel stand-in with fixed envelopes.
    pub struct StubChannel {
        pub volume: Option<VolumeFade>,
        pub stereo: Option<PanFade>,
        pub parent: Option<ChannelRef>,
    }

    impl StubChannel {
        pub fn root() -> Rc<StubChannel> {
            Rc::new(StubChannel {
                volume: None,
                stereo: None,
                parent: None,
            })
        }

        pub fn with(
            volume: Option<VolumeFade>,
            stereo: Option<PanFade>,
            parent: Option<ChannelRef>,
        ) -> Rc<StubChannel> {
            Rc::new(StubChannel {
                volume,
                stereo,
                parent,
            })
        }
    }

    impl Channel for StubChannel {
        fn volume(&self) -> Option<VolumeFade> {
            self.volume
        }

        fn stereo(&self) -> Option<PanFade> {
            self.stereo
        }

        fn parent(&self) -> Option<ChannelRef> {
            self.parent.clone()
        }

        fn ancestors(&self) -> Vec<ChannelRef> {
            let mut out = Vec::new();
            let mut cur = self.parent.clone();
            while let Some(node) = cur {
                out.push(node.clone());
                cur = node.parent();
            }
            out
        }
    }
}
