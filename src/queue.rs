use crate::channel::{ChannelRef, same_channel};
use crate::note::Note;

/// Time-ordered queue of scheduled notes plus the engine clock.
///
/// The clock counts output frames; it only moves forward as buffers are
/// mixed, except when the host rebases it through `shift_timebase`.
pub(crate) struct NoteQueue {
    pub notes: Vec<Note>,
    pub current_time: i64,
    last_insert: Option<usize>,
}

impl NoteQueue {
    pub fn new() -> Self {
        NoteQueue {
            notes: Vec::new(),
            current_time: 0,
            last_insert: None,
        }
    }

    /// Inserts keeping start-time order. Scans forward from the previous
    /// insertion point whenever the new note does not precede it, so
    /// in-order scheduling stays cheap.
    pub fn enqueue(&mut self, note: Note) {
        let mut ix = match self.last_insert {
            Some(i) if i < self.notes.len() && self.notes[i].start_time <= note.start_time => i + 1,
            _ => 0,
        };
        while ix < self.notes.len() && self.notes[ix].start_time < note.start_time {
            ix += 1;
        }
        self.notes.insert(ix, note);
        self.last_insert = Some(ix);
    }

    /// Drops the insertion hint. Required before anything that can move or
    /// delete queued notes.
    pub fn invalidate_hint(&mut self) {
        self.last_insert = None;
    }

    /// Removes every note scheduled on `chan` or on a descendant of it,
    /// firing each removed note's hook.
    pub fn remove_by_channel(&mut self, chan: &ChannelRef) {
        self.last_insert = None;
        self.notes.retain_mut(|note| {
            let doomed = match &note.channel {
                Some(c) => {
                    same_channel(c, chan) || c.ancestors().iter().any(|a| same_channel(a, chan))
                }
                None => false,
            };
            if doomed {
                note.finish();
            }
            !doomed
        });
    }

    /// Rebases the clock: subtracts `offset` from the current time and from
    /// every queued start time. Keeps the frame counter bounded over long
    /// runs.
    pub fn shift_timebase(&mut self, offset: i64) {
        self.current_time -= offset;
        for note in &mut self.notes {
            note.start_time -= offset;
        }
    }

    /// Empties the queue, firing every hook.
    pub fn clear(&mut self) {
        self.last_insert = None;
        for note in &mut self.notes {
            note.finish();
        }
        self.notes.clear();
    }
}
