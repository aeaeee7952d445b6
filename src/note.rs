use crate::channel::ChannelRef;
use crate::sample::{Sample, SampleId};

/// Stereo placement transform: positions a point source (or a pair of
/// points, for stereo samples) in the output field.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pan {
    pub scale_x: f64,
    pub shift_x: f64,
    pub scale_y: f64,
    pub shift_y: f64,
}

impl Pan {
    pub const IDENTITY: Pan = Pan {
        scale_x: 1.0,
        shift_x: 0.0,
        scale_y: 1.0,
        shift_y: 0.0,
    };

    pub fn new(scale_x: f64, shift_x: f64, scale_y: f64, shift_y: f64) -> Pan {
        Pan {
            scale_x,
            shift_x,
            scale_y,
            shift_y,
        }
    }

    /// Pure shift along the left/right axis, the common case.
    pub fn shifted(x: f64) -> Pan {
        Pan {
            shift_x: x,
            ..Pan::IDENTITY
        }
    }

    /// Applies `outer` around `inner`: the inner placement re-expressed in
    /// the outer transform's coordinates.
    pub fn compose(outer: &Pan, inner: &Pan) -> Pan {
        Pan {
            scale_x: inner.scale_x * outer.scale_x,
            shift_x: inner.shift_x * outer.scale_x + outer.shift_x,
            scale_y: inner.scale_y * outer.scale_y,
            shift_y: inner.shift_y * outer.scale_y + outer.shift_y,
        }
    }

    pub(crate) fn lerp(a: &Pan, b: &Pan, t: f64) -> Pan {
        Pan {
            scale_x: a.scale_x + (b.scale_x - a.scale_x) * t,
            shift_x: a.shift_x + (b.shift_x - a.shift_x) * t,
            scale_y: a.scale_y + (b.scale_y - a.scale_y) * t,
            shift_y: a.shift_y + (b.shift_y - a.shift_y) * t,
        }
    }
}

impl Default for Pan {
    fn default() -> Self {
        Pan::IDENTITY
    }
}

/// Callback fired once when a note leaves the queue.
pub type RemoveHook = Box<dyn FnOnce()>;

/// One scheduled playback of a sample.
pub(crate) struct Note {
    pub sample: SampleId,
    pub start_time: i64,
    /// 1.0 plays the sample at its native pitch.
    pub pitch: f64,
    /// 0.0 is mute, 1.0 unity; higher overdrives.
    pub volume: f64,
    pub pan: Pan,
    pub channel: Option<ChannelRef>,
    pub remove_hook: Option<RemoveHook>,

    /// Position in the sample, plus fraction in 0.16 fixed point.
    pub frame_pos: i64,
    pub frame_frac: i64,
    pub reps_left: u32,
}

impl Note {
    /// Builds a playback record and reports its expected length in device
    /// frames. `reps` beyond the first needs a loop window; without one the
    /// note plays through once.
    pub fn new(
        samp: &Sample,
        sample_id: SampleId,
        pitch: f64,
        volume: f64,
        pan: Pan,
        start_time: i64,
        reps: u32,
        channel: Option<ChannelRef>,
        remove_hook: Option<RemoveHook>,
    ) -> (Note, i64) {
        let ratio = samp.frame_rate_ratio * pitch;
        let (reps, duration) = if !samp.has_loop || reps <= 1 {
            (1, (samp.num_frames as f64 / ratio) as i64)
        } else {
            let src_frames = samp.num_frames + samp.loop_len * (reps as i64 - 1);
            (reps, (src_frames as f64 / ratio) as i64)
        };

        let note = Note {
            sample: sample_id,
            start_time,
            pitch,
            volume,
            pan,
            channel,
            remove_hook,
            frame_pos: 0,
            frame_frac: 0,
            reps_left: reps - 1,
        };
        (note, duration)
    }

    /// Loop passes needed to cover `duration` device frames: the part of the
    /// sample outside the loop window plays once, the loop makes up the
    /// rest, rounded up.
    pub fn reps_for_duration(samp: &Sample, pitch: f64, duration: i64) -> u32 {
        if !samp.has_loop {
            return 1;
        }
        let margins = samp.num_frames - samp.loop_len;
        let src_frames = (duration as f64 * (samp.frame_rate_ratio * pitch)) as i64;
        let reps = (src_frames - margins + (samp.loop_len - 1)) / samp.loop_len;
        reps.max(1) as u32
    }

    /// Fires the removal hook and releases the channel handle. The hook runs
    /// at most once.
    pub fn finish(&mut self) {
        if let Some(hook) = self.remove_hook.take() {
            hook();
        }
        self.channel = None;
    }
}
