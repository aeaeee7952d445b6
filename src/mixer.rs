use anyhow::Result;

use crate::channel::VolumeFade;
use crate::note::{Note, Pan};
use crate::queue::NoteQueue;
use crate::sample::{Sample, SampleStore};

/// Host callback run before each buffer. May schedule notes, stop playback
/// for channels, and rebase the clock; returning `Ok(true)` stops the
/// stream.
pub(crate) type TickFn<'a> = &'a mut dyn FnMut(&mut NoteQueue, &mut SampleStore) -> Result<bool>;

/// Per-note fold of the channel tree: the scalar volume with every constant
/// envelope multiplied in, the composed pan at both ends of the buffer, and
/// whether the pan actually moves inside it. Fades that are mid-flight land
/// in the mixer's range scratch instead.
struct Folded {
    volume: f64,
    pan_start: Pan,
    pan_end: Pan,
    pan_moves: bool,
}

/// The per-buffer mixing engine. Owns the fade-range scratch reused across
/// notes.
pub(crate) struct Mixer {
    ranges: Vec<VolumeFade>,
}

impl Mixer {
    pub fn new() -> Self {
        Mixer {
            ranges: Vec::with_capacity(2),
        }
    }

    /// Mixes one buffer of `buffer.len() / 2` interleaved stereo frames.
    /// Returns `Ok(true)` when the host requested a stop, in which case the
    /// buffer is left untouched.
    pub fn mix_into(
        &mut self,
        buffer: &mut [i32],
        queue: &mut NoteQueue,
        store: &mut SampleStore,
        tick: TickFn<'_>,
    ) -> Result<bool> {
        // Mixing deletes notes, which moves anything after them.
        queue.invalidate_hint();

        if tick(queue, store)? {
            return Ok(true);
        }
        // The tick may have rebased the clock; re-read it.
        let start_time = queue.current_time;
        let frames = (buffer.len() / 2) as i64;
        let end_time = start_time + frames;

        buffer.fill(0);

        let mut ix = 0;
        while ix < queue.notes.len() {
            // Sorted queue: the first future note ends the walk.
            if queue.notes[ix].start_time >= end_time {
                break;
            }
            let note = &mut queue.notes[ix];
            let finished = match store.get(note.sample) {
                Some(samp) if samp.loaded && samp.num_frames > note.frame_pos => {
                    self.mix_note(buffer, note, samp, start_time, end_time)
                }
                _ => {
                    log::warn!("Dropping a note whose sample is no longer loaded");
                    true
                }
            };
            if finished {
                let mut note = queue.notes.remove(ix);
                note.finish();
            } else {
                ix += 1;
            }
        }

        queue.current_time = end_time;
        Ok(false)
    }

    /// Mixes a single note into the accumulator. Returns true once the note
    /// has played out.
    fn mix_note(
        &mut self,
        buffer: &mut [i32],
        note: &mut Note,
        samp: &Sample,
        start_time: i64,
        end_time: i64,
    ) -> bool {
        let fold = self.fold_channels(note, start_time, end_time);

        // Pitch step in 0.16 fixed point.
        let step = samp.frame_rate_ratio * note.pitch;
        let lpitch = ((step * 65536.0) as i64).clamp(1, 0x1000_0000);

        let note_start = if note.start_time > start_time {
            note.start_time - start_time
        } else {
            0
        };

        if samp.num_channels == 1 {
            self.mix_mono(buffer, note, samp, &fold, lpitch, note_start, start_time)
        } else {
            self.mix_stereo(buffer, note, samp, &fold, lpitch, note_start, start_time)
        }
    }

    /// Walks the channel tree upward from the note, composing envelopes.
    fn fold_channels(&mut self, note: &Note, now: i64, end: i64) -> Folded {
        self.ranges.clear();
        let mut volume = note.volume;
        let mut pan_start = note.pan;
        let mut pan_end = note.pan;
        let mut pan_moves = false;

        let mut chan = note.channel.clone();
        while let Some(node) = chan {
            if let Some(fade) = node.volume() {
                if now >= fade.end {
                    volume *= fade.to;
                } else if fade.start >= end {
                    volume *= fade.from;
                } else {
                    self.ranges.push(fade);
                }
            }
            if let Some(fade) = node.stereo() {
                if now >= fade.end {
                    pan_start = Pan::compose(&fade.to, &pan_start);
                    pan_end = Pan::compose(&fade.to, &pan_end);
                } else if fade.start >= end {
                    pan_start = Pan::compose(&fade.from, &pan_start);
                    pan_end = Pan::compose(&fade.from, &pan_end);
                } else {
                    pan_moves = true;
                    pan_start = Pan::compose(&fade.at(now), &pan_start);
                    pan_end = Pan::compose(&fade.at(end), &pan_end);
                }
            }
            chan = node.parent();
        }

        Folded {
            volume,
            pan_start,
            pan_end,
            pan_moves,
        }
    }

    fn mix_mono(
        &self,
        buffer: &mut [i32],
        note: &mut Note,
        samp: &Sample,
        fold: &Folded,
        lpitch: i64,
        note_start: i64,
        start_time: i64,
    ) -> bool {
        let frames = (buffer.len() / 2) as i64;
        let (l0, r0) = point_source(fold.pan_start.shift_x, fold.pan_start.shift_y);
        let (l1, r1) = if fold.pan_moves {
            point_source(fold.pan_end.shift_x, fold.pan_end.shift_y)
        } else {
            (l0, r0)
        };

        let mut ivol_l = (fold.volume * l0 * 65536.0) as i64;
        let mut ivol_r = (fold.volume * r0 * 65536.0) as i64;
        let per_frame = !self.ranges.is_empty() || fold.pan_moves;

        let data = &samp.data;
        let num_frames = samp.num_frames;
        let mut frame_pos = note.frame_pos;
        let mut frame_frac = note.frame_frac;
        let mut finished = false;

        for lx in note_start..frames {
            let cur = frame_pos;
            let next = if frame_pos + 1 == samp.loop_end && note.reps_left > 0 {
                frame_pos + 1 - samp.loop_len
            } else {
                cur + 1
            };
            let v0 = data[cur as usize] as i64;
            // One past the end reads as silence, fading out the last frame.
            let v1 = data.get(next as usize).copied().unwrap_or(0) as i64;
            let mixed = v0 * (0x10000 - frame_frac) + v1 * frame_frac;

            if per_frame {
                let t = start_time + lx;
                let mut varvol = 1.0;
                for fade in &self.ranges {
                    varvol *= fade.at(t);
                }
                let fade_pos = lx as f64 / frames as f64;
                let gl = l0 + (l1 - l0) * fade_pos;
                let gr = r0 + (r1 - r0) * fade_pos;
                ivol_l = (fold.volume * varvol * gl * 65536.0) as i64;
                ivol_r = (fold.volume * varvol * gr * 65536.0) as i64;
            }

            let at = lx as usize * 2;
            buffer[at] += (((mixed >> 16) * ivol_l) >> 16) as i32;
            buffer[at + 1] += (((mixed >> 16) * ivol_r) >> 16) as i32;

            frame_frac += lpitch;
            frame_pos += frame_frac >> 16;
            frame_frac &= 0xFFFF;

            while note.reps_left > 0 && frame_pos >= samp.loop_end {
                frame_pos -= samp.loop_len;
                note.reps_left -= 1;
            }
            if frame_pos >= num_frames && note.reps_left == 0 {
                finished = true;
                break;
            }
        }

        note.frame_pos = frame_pos;
        note.frame_frac = frame_frac;
        finished
    }

    fn mix_stereo(
        &self,
        buffer: &mut [i32],
        note: &mut Note,
        samp: &Sample,
        fold: &Folded,
        lpitch: i64,
        note_start: i64,
        start_time: i64,
    ) -> bool {
        let frames = (buffer.len() / 2) as i64;
        // The two input channels sit at ±scale_x around the pan position.
        let p = &fold.pan_start;
        let (l0a, r0a) = point_source(p.shift_x - p.scale_x, p.shift_y);
        let (l0b, r0b) = point_source(p.shift_x + p.scale_x, p.shift_y);
        let (l1a, r1a, l1b, r1b) = if fold.pan_moves {
            let q = &fold.pan_end;
            let (la, ra) = point_source(q.shift_x - q.scale_x, q.shift_y);
            let (lb, rb) = point_source(q.shift_x + q.scale_x, q.shift_y);
            (la, ra, lb, rb)
        } else {
            (l0a, r0a, l0b, r0b)
        };

        let mut ivol0_l = (fold.volume * l0a * 65536.0) as i64;
        let mut ivol0_r = (fold.volume * r0a * 65536.0) as i64;
        let mut ivol1_l = (fold.volume * l0b * 65536.0) as i64;
        let mut ivol1_r = (fold.volume * r0b * 65536.0) as i64;
        let per_frame = !self.ranges.is_empty() || fold.pan_moves;

        let data = &samp.data;
        let num_frames = samp.num_frames;
        let mut frame_pos = note.frame_pos;
        let mut frame_frac = note.frame_frac;
        let mut finished = false;

        for lx in note_start..frames {
            let cur = frame_pos * 2;
            let next = if frame_pos + 1 == samp.loop_end && note.reps_left > 0 {
                (frame_pos + 1 - samp.loop_len) * 2
            } else {
                cur + 2
            };
            let v0 = data[cur as usize] as i64;
            let v1 = data.get(next as usize).copied().unwrap_or(0) as i64;
            let mixed0 = v0 * (0x10000 - frame_frac) + v1 * frame_frac;
            let v0 = data[cur as usize + 1] as i64;
            let v1 = data.get(next as usize + 1).copied().unwrap_or(0) as i64;
            let mixed1 = v0 * (0x10000 - frame_frac) + v1 * frame_frac;

            if per_frame {
                let t = start_time + lx;
                let mut varvol = 1.0;
                for fade in &self.ranges {
                    varvol *= fade.at(t);
                }
                let fade_pos = lx as f64 / frames as f64;
                let base = fold.volume * varvol * 65536.0;
                ivol0_l = (base * (l0a + (l1a - l0a) * fade_pos)) as i64;
                ivol0_r = (base * (r0a + (r1a - r0a) * fade_pos)) as i64;
                ivol1_l = (base * (l0b + (l1b - l0b) * fade_pos)) as i64;
                ivol1_r = (base * (r0b + (r1b - r0b) * fade_pos)) as i64;
            }

            let at = lx as usize * 2;
            buffer[at] +=
                ((((mixed0 >> 16) * ivol0_l) >> 16) + (((mixed1 >> 16) * ivol1_l) >> 16)) as i32;
            buffer[at + 1] +=
                ((((mixed0 >> 16) * ivol0_r) >> 16) + (((mixed1 >> 16) * ivol1_r) >> 16)) as i32;

            frame_frac += lpitch;
            frame_pos += frame_frac >> 16;
            frame_frac &= 0xFFFF;

            while note.reps_left > 0 && frame_pos >= samp.loop_end {
                frame_pos -= samp.loop_len;
                note.reps_left -= 1;
            }
            if frame_pos >= num_frames && note.reps_left == 0 {
                finished = true;
                break;
            }
        }

        note.frame_pos = frame_pos;
        note.frame_frac = frame_frac;
        finished
    }
}

/// Maps a stereo position to left/right gains. Inside the unit square the
/// nearer side stays at unity while the other rolls off linearly; outside,
/// the position is pulled back to the square's edge and both sides fall off
/// with the square of the distance.
fn point_source(x: f64, y: f64) -> (f64, f64) {
    let d = x.abs().max(y.abs());
    let (x, atten) = if d > 1.0 { (x / d, 1.0 / (d * d)) } else { (x, 1.0) };
    if x < 0.0 {
        (atten, (1.0 + x) * atten)
    } else {
        ((1.0 - x) * atten, atten)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::testing::StubChannel;
    use crate::channel::{ChannelRef, PanFade};
    use crate::sample::{PcmEncoding, SampleId};

    const ENC: PcmEncoding = PcmEncoding {
        bits: 16,
        signed: true,
        big_endian: false,
    };

    fn store() -> SampleStore {
        SampleStore::new(44100)
    }

    fn mono_sample(
        store: &mut SampleStore,
        values: &[i16],
        loop_window: Option<(i64, i64)>,
    ) -> SampleId {
        let id = store.create_blank();
        let bytes: Vec<u8> = values.iter().flat_map(|v| v.to_le_bytes()).collect();
        let (ls, le) = loop_window.unwrap_or((0, 0));
        store
            .load(id, 44100, values.len() as i64, &bytes, ls, le, 1, ENC)
            .unwrap();
        id
    }

    fn stereo_sample(store: &mut SampleStore, frames: &[(i16, i16)]) -> SampleId {
        let id = store.create_blank();
        let bytes: Vec<u8> = frames
            .iter()
            .flat_map(|(l, r)| [l.to_le_bytes(), r.to_le_bytes()])
            .flatten()
            .collect();
        store
            .load(id, 44100, frames.len() as i64, &bytes, 0, 0, 2, ENC)
            .unwrap();
        id
    }

    fn add_note(
        queue: &mut NoteQueue,
        store: &SampleStore,
        id: SampleId,
        pitch: f64,
        volume: f64,
        pan: Pan,
        start_time: i64,
        reps: u32,
        channel: Option<ChannelRef>,
    ) {
        let samp = store.get(id).unwrap();
        let (note, _) = Note::new(samp, id, pitch, volume, pan, start_time, reps, channel, None);
        queue.enqueue(note);
    }

    fn mix(
        mixer: &mut Mixer,
        queue: &mut NoteQueue,
        store: &mut SampleStore,
        frames: usize,
    ) -> Vec<i32> {
        let mut buffer = vec![0i32; frames * 2];
        let stopped = mixer
            .mix_into(&mut buffer, queue, store, &mut |_, _| Ok(false))
            .unwrap();
        assert!(!stopped);
        buffer
    }

    #[test]
    fn looped_single_frame_plays_reps_then_dies() {
        let mut store = store();
        let id = mono_sample(&mut store, &[0x4000], Some((0, 1)));
        let mut queue = NoteQueue::new();
        add_note(&mut queue, &store, id, 1.0, 1.0, Pan::IDENTITY, 0, 10, None);

        let mut mixer = Mixer::new();
        let buffer = mix(&mut mixer, &mut queue, &mut store, 256);
        for frame in 0..10 {
            assert_eq!(buffer[frame * 2], 0x4000, "left, frame {frame}");
            assert_eq!(buffer[frame * 2 + 1], 0x4000, "right, frame {frame}");
        }
        assert!(buffer[20..].iter().all(|&v| v == 0));
        assert!(queue.notes.is_empty());
        assert_eq!(queue.current_time, 256);
    }

    #[test]
    fn half_pitch_interpolates_a_tail() {
        let mut store = store();
        let id = mono_sample(&mut store, &[0x4000], Some((0, 1)));
        let mut queue = NoteQueue::new();
        add_note(&mut queue, &store, id, 0.5, 1.0, Pan::IDENTITY, 0, 1, None);

        let mut mixer = Mixer::new();
        let buffer = mix(&mut mixer, &mut queue, &mut store, 256);
        assert_eq!(&buffer[..4], &[0x4000, 0x4000, 0x2000, 0x2000]);
        assert!(buffer[4..].iter().all(|&v| v == 0));
        assert!(queue.notes.is_empty());
    }

    #[test]
    fn stereo_sample_hard_splits_at_unit_separation() {
        let mut store = store();
        let id = stereo_sample(&mut store, &[(0x4000, 0), (0, 0x4000)]);
        let mut queue = NoteQueue::new();
        add_note(&mut queue, &store, id, 1.0, 1.0, Pan::IDENTITY, 0, 1, None);

        let mut mixer = Mixer::new();
        let buffer = mix(&mut mixer, &mut queue, &mut store, 8);
        // Channel 0 lands hard left, channel 1 hard right.
        assert_eq!(&buffer[..4], &[0x4000, 0, 0, 0x4000]);
        assert!(buffer[4..].iter().all(|&v| v == 0));
        assert!(queue.notes.is_empty());
    }

    #[test]
    fn channel_volume_ramp_shapes_the_output() {
        let mut store = store();
        let id = mono_sample(&mut store, &[0x4000; 200], None);
        let chan: ChannelRef = StubChannel::with(
            Some(VolumeFade {
                start: 0,
                end: 100,
                from: 0.0,
                to: 1.0,
            }),
            None,
            None,
        );
        let mut queue = NoteQueue::new();
        add_note(&mut queue, &store, id, 1.0, 1.0, Pan::IDENTITY, 0, 1, Some(chan));

        let mut mixer = Mixer::new();
        let buffer = mix(&mut mixer, &mut queue, &mut store, 256);
        for frame in 0..100 {
            let ivol = (frame as f64 / 100.0 * 65536.0) as i64;
            let expected = ((0x4000 * ivol) >> 16) as i32;
            assert_eq!(buffer[frame * 2], expected, "frame {frame}");
            assert_eq!(buffer[frame * 2 + 1], expected, "frame {frame}");
        }
        for frame in 100..200 {
            assert_eq!(buffer[frame * 2], 0x4000, "frame {frame}");
        }
        assert!(buffer[400..].iter().all(|&v| v == 0));
    }

    #[test]
    fn constant_ramp_matches_scalar_volume_exactly() {
        let values: Vec<i16> = (0..97).map(|i| (i * 331) as i16).collect();

        let mut store_a = store();
        let id_a = mono_sample(&mut store_a, &values, None);
        let chan: ChannelRef = StubChannel::with(
            Some(VolumeFade {
                start: 0,
                end: 1000,
                from: 0.5,
                to: 0.5,
            }),
            None,
            None,
        );
        let mut queue_a = NoteQueue::new();
        add_note(&mut queue_a, &store_a, id_a, 1.0, 1.0, Pan::IDENTITY, 0, 1, Some(chan));
        let ramped = mix(&mut Mixer::new(), &mut queue_a, &mut store_a, 128);

        let mut store_b = store();
        let id_b = mono_sample(&mut store_b, &values, None);
        let mut queue_b = NoteQueue::new();
        add_note(&mut queue_b, &store_b, id_b, 1.0, 0.5, Pan::IDENTITY, 0, 1, None);
        let scaled = mix(&mut Mixer::new(), &mut queue_b, &mut store_b, 128);

        assert_eq!(ramped, scaled);
    }

    #[test]
    fn settled_envelope_folds_into_the_scalar() {
        let mut store = store();
        let id = mono_sample(&mut store, &[0x4000; 8], None);
        let chan: ChannelRef = StubChannel::with(
            Some(VolumeFade {
                start: -200,
                end: -100,
                from: 0.0,
                to: 0.25,
            }),
            None,
            None,
        );
        let mut queue = NoteQueue::new();
        add_note(&mut queue, &store, id, 1.0, 1.0, Pan::IDENTITY, 0, 1, Some(chan));
        let buffer = mix(&mut Mixer::new(), &mut queue, &mut store, 16);
        assert_eq!(buffer[0], 0x1000);
    }

    #[test]
    fn pan_sweep_crosses_the_field() {
        let mut store = store();
        let id = mono_sample(&mut store, &[0x4000; 250], None);
        let chan: ChannelRef = StubChannel::with(
            None,
            Some(PanFade {
                start: 0,
                end: 100,
                from: Pan::shifted(-1.0),
                to: Pan::shifted(1.0),
            }),
            None,
        );
        let mut queue = NoteQueue::new();
        add_note(&mut queue, &store, id, 1.0, 1.0, Pan::IDENTITY, 0, 1, Some(chan));

        // Mix in 50-frame buffers so the per-buffer pan fade tracks the
        // envelope closely.
        let mut mixer = Mixer::new();
        let mut left = Vec::new();
        let mut right = Vec::new();
        for _ in 0..4 {
            let buffer = mix(&mut mixer, &mut queue, &mut store, 50);
            for frame in buffer.chunks_exact(2) {
                left.push(frame[0]);
                right.push(frame[1]);
            }
        }

        assert_eq!((left[0], right[0]), (0x4000, 0));
        // Left only decays once the position crosses center; right is full
        // there and stays full.
        assert!(left[..50].iter().all(|&v| v == 0x4000));
        assert!(left[50..100].windows(2).all(|w| w[0] >= w[1]));
        assert!(left[99] < 0x0300);
        assert!(right[..50].windows(2).all(|w| w[0] <= w[1]));
        for frame in 100..200 {
            assert_eq!((left[frame], right[frame]), (0, 0x4000), "frame {frame}");
        }
    }

    #[test]
    fn point_source_properties() {
        // Inside the unit square the louder side is exactly unity.
        for ix in -10..=10 {
            for iy in -10..=10 {
                let (gl, gr) = point_source(ix as f64 / 10.0, iy as f64 / 10.0);
                assert_eq!(gl.max(gr), 1.0, "at ({ix}, {iy})");
                assert!(gl >= 0.0 && gr >= 0.0);
            }
        }
        // Hard edges.
        assert_eq!(point_source(-1.0, 0.0), (1.0, 0.0));
        assert_eq!(point_source(1.0, 0.0), (0.0, 1.0));
        // Outside: inverse-square falloff of the edge value.
        assert_eq!(point_source(2.0, 0.0), (0.0, 0.25));
        assert_eq!(point_source(0.0, 2.0), (0.25, 0.25));
        let (gl, gr) = point_source(-4.0, 0.0);
        assert_eq!((gl, gr), (1.0 / 16.0, 0.0));
        // Continuity across the unit boundary.
        let (inside_l, inside_r) = point_source(0.999, 0.0);
        let (outside_l, outside_r) = point_source(1.001, 0.0);
        assert!((inside_l - outside_l).abs() < 2e-3);
        assert!((inside_r - outside_r).abs() < 3e-3);
    }

    #[test]
    fn mixing_is_linear_in_the_queue() {
        let mut store = store();
        let a = mono_sample(&mut store, &[0x1000, 0x2000, -0x1800, 0x0400], None);
        let b = mono_sample(&mut store, &[-0x0800, 0x1400, 0x0C00, -0x2000], None);

        let mut queue = NoteQueue::new();
        add_note(&mut queue, &store, a, 1.0, 0.9, Pan::shifted(-0.5), 0, 1, None);
        add_note(&mut queue, &store, b, 0.75, 0.6, Pan::shifted(0.25), 1, 1, None);
        let together = mix(&mut Mixer::new(), &mut queue, &mut store, 16);

        let mut queue_a = NoteQueue::new();
        add_note(&mut queue_a, &store, a, 1.0, 0.9, Pan::shifted(-0.5), 0, 1, None);
        let only_a = mix(&mut Mixer::new(), &mut queue_a, &mut store, 16);

        let mut queue_b = NoteQueue::new();
        add_note(&mut queue_b, &store, b, 0.75, 0.6, Pan::shifted(0.25), 1, 1, None);
        let only_b = mix(&mut Mixer::new(), &mut queue_b, &mut store, 16);

        let summed: Vec<i32> = only_a.iter().zip(&only_b).map(|(x, y)| x + y).collect();
        assert_eq!(together, summed);
    }

    #[test]
    fn frame_counts_match_the_step() {
        // No loop: ceil(num_frames / step) output frames.
        for (pitch, expected) in [(1.0, 100usize), (2.0, 50), (0.75, 134)] {
            let mut store = store();
            let id = mono_sample(&mut store, &[0x4000; 100], None);
            let mut queue = NoteQueue::new();
            add_note(&mut queue, &store, id, pitch, 1.0, Pan::IDENTITY, 0, 1, None);
            let buffer = mix(&mut Mixer::new(), &mut queue, &mut store, 256);
            let produced = buffer.chunks_exact(2).take_while(|f| f[0] != 0).count();
            assert_eq!(produced, expected, "pitch {pitch}");
            assert!(queue.notes.is_empty(), "pitch {pitch}");
        }

        // With reps: ceil((num_frames + (reps-1) * loop_len) / step).
        let mut store = store();
        let id = mono_sample(&mut store, &[0x4000; 4], Some((1, 3)));
        let mut queue = NoteQueue::new();
        add_note(&mut queue, &store, id, 1.0, 1.0, Pan::IDENTITY, 0, 3, None);
        let buffer = mix(&mut Mixer::new(), &mut queue, &mut store, 64);
        let produced = buffer.chunks_exact(2).take_while(|f| f[0] != 0).count();
        assert_eq!(produced, 4 + 2 * 2);
        assert!(queue.notes.is_empty());
    }

    #[test]
    fn notes_start_mid_buffer_and_future_notes_wait() {
        let mut store = store();
        let id = mono_sample(&mut store, &[0x4000; 4], None);
        let mut queue = NoteQueue::new();
        add_note(&mut queue, &store, id, 1.0, 1.0, Pan::IDENTITY, 10, 1, None);
        add_note(&mut queue, &store, id, 1.0, 1.0, Pan::IDENTITY, 500, 1, None);

        let buffer = mix(&mut Mixer::new(), &mut queue, &mut store, 32);
        assert!(buffer[..20].iter().all(|&v| v == 0));
        assert_eq!(buffer[20], 0x4000);
        assert_eq!(buffer[26], 0x4000);
        assert!(buffer[28..].iter().all(|&v| v == 0));
        // The future note is untouched.
        assert_eq!(queue.notes.len(), 1);
        assert_eq!(queue.notes[0].start_time, 500);
        assert_eq!(queue.notes[0].frame_pos, 0);
    }

    #[test]
    fn stop_tick_leaves_the_buffer_alone() {
        let mut store = store();
        let mut queue = NoteQueue::new();
        let mut buffer = vec![7i32; 64];
        let stopped = Mixer::new()
            .mix_into(&mut buffer, &mut queue, &mut store, &mut |_, _| Ok(true))
            .unwrap();
        assert!(stopped);
        assert!(buffer.iter().all(|&v| v == 7));
        assert_eq!(queue.current_time, 0);
    }

    #[test]
    fn tick_errors_propagate() {
        let mut store = store();
        let mut queue = NoteQueue::new();
        let mut buffer = vec![0i32; 64];
        let result = Mixer::new().mix_into(&mut buffer, &mut queue, &mut store, &mut |_, _| {
            Err(anyhow::anyhow!("host failure"))
        });
        assert!(result.is_err());
    }

    #[test]
    fn tick_rebasing_applies_before_the_mix() {
        let mut store = store();
        let id = mono_sample(&mut store, &[0x4000; 4], None);
        let mut queue = NoteQueue::new();
        add_note(&mut queue, &store, id, 1.0, 1.0, Pan::IDENTITY, 1000, 1, None);
        queue.current_time = 996;

        let mut buffer = vec![0i32; 32];
        Mixer::new()
            .mix_into(&mut buffer, &mut queue, &mut store, &mut |queue, _| {
                queue.shift_timebase(996);
                Ok(false)
            })
            .unwrap();
        // After the shift the note starts at frame 4 of this buffer.
        assert!(buffer[..8].iter().all(|&v| v == 0));
        assert_eq!(buffer[8], 0x4000);
        assert_eq!(queue.current_time, 16);
    }
}
