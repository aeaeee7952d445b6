use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result, anyhow, bail};

use crate::channel::ChannelRef;
use crate::device::{self, Backend, Output};
use crate::mixer::Mixer;
use crate::note::{Note, Pan, RemoveHook};
use crate::options::ExtraOpts;
use crate::queue::NoteQueue;
use crate::sample::{PcmEncoding, SampleId, SampleInfo, SampleStore};

/// Only one engine may own an output device at a time.
static ENGINE_ACTIVE: AtomicBool = AtomicBool::new(false);

/// Engine start-up parameters.
pub struct Config {
    pub output: Output,
    /// Requested device rate; the sink may negotiate a different one.
    pub rate: Option<u32>,
    pub verbose: bool,
    pub options: ExtraOpts,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            output: Output::Device(None),
            rate: None,
            verbose: false,
            options: ExtraOpts::new(),
        }
    }
}

/// A live soundscape engine: the sample store, the note queue, the mixer,
/// and the output sink it was initialized with.
pub struct Engine {
    backend: Box<dyn Backend>,
    store: SampleStore,
    queue: NoteQueue,
    mixer: Mixer,
}

impl Engine {
    /// Opens the output sink and builds an idle engine. Fails if another
    /// engine is live in this process, leaving that engine undisturbed.
    pub fn init(config: Config) -> Result<Engine> {
        if ENGINE_ACTIVE.swap(true, Ordering::SeqCst) {
            bail!("sound engine is already initialized");
        }
        match Engine::open(config) {
            Ok(engine) => Ok(engine),
            Err(err) => {
                ENGINE_ACTIVE.store(false, Ordering::SeqCst);
                Err(err)
            }
        }
    }

    fn open(config: Config) -> Result<Engine> {
        let backend = device::open(&config.output, config.rate, config.verbose, &config.options)
            .context("initializing sound output")?;
        let rate = backend.sound_rate();
        Ok(Engine {
            backend,
            store: SampleStore::new(rate),
            queue: NoteQueue::new(),
            mixer: Mixer::new(),
        })
    }

    /// The negotiated device rate in frames per second.
    pub fn frames_per_second(&self) -> u32 {
        self.backend.sound_rate()
    }

    /// The mixer's chunk size in frames.
    pub fn frames_per_buf(&self) -> usize {
        self.backend.frames_per_buf()
    }

    /// The engine clock, in frames since start (or since the last rebase).
    pub fn current_time(&self) -> i64 {
        self.queue.current_time
    }

    pub fn new_sample(&mut self) -> SampleId {
        self.store.create_blank()
    }

    pub fn load_sample(
        &mut self,
        id: SampleId,
        native_rate: u32,
        num_frames: i64,
        bytes: &[u8],
        loop_start: i64,
        loop_end: i64,
        num_channels: usize,
        encoding: PcmEncoding,
    ) -> Result<()> {
        self.store.load(
            id,
            native_rate,
            num_frames,
            bytes,
            loop_start,
            loop_end,
            num_channels,
            encoding,
        )
    }

    pub fn unload_sample(&mut self, id: SampleId) {
        self.store.unload(id)
    }

    pub fn delete_sample(&mut self, id: SampleId) {
        self.store.destroy(id)
    }

    pub fn is_sample_loaded(&self, id: SampleId) -> bool {
        self.store.is_loaded(id)
    }

    pub fn is_sample_error(&self, id: SampleId) -> bool {
        self.store.is_error(id)
    }

    pub fn sample_info(&self, id: SampleId) -> Option<SampleInfo> {
        self.store.info(id)
    }

    pub fn create_note(
        &mut self,
        sample: SampleId,
        pitch: f64,
        volume: f64,
        pan: Pan,
        start_time: i64,
        channel: Option<ChannelRef>,
        on_remove: Option<RemoveHook>,
    ) -> Result<i64> {
        self.scheduler()
            .create_note(sample, pitch, volume, pan, start_time, channel, on_remove)
    }

    pub fn create_note_reps(
        &mut self,
        sample: SampleId,
        pitch: f64,
        volume: f64,
        pan: Pan,
        start_time: i64,
        reps: u32,
        channel: Option<ChannelRef>,
        on_remove: Option<RemoveHook>,
    ) -> Result<i64> {
        self.scheduler().create_note_reps(
            sample, pitch, volume, pan, start_time, reps, channel, on_remove,
        )
    }

    pub fn create_note_duration(
        &mut self,
        sample: SampleId,
        pitch: f64,
        volume: f64,
        pan: Pan,
        start_time: i64,
        duration: i64,
        channel: Option<ChannelRef>,
        on_remove: Option<RemoveHook>,
    ) -> Result<i64> {
        self.scheduler().create_note_duration(
            sample, pitch, volume, pan, start_time, duration, channel, on_remove,
        )
    }

    pub fn stop_notes(&mut self, channel: &ChannelRef) {
        self.scheduler().stop_notes(channel)
    }

    pub fn adjust_timebase(&mut self, offset: i64) {
        self.scheduler().adjust_timebase(offset)
    }

    fn scheduler(&mut self) -> Scheduler<'_> {
        Scheduler {
            queue: &mut self.queue,
            store: &mut self.store,
        }
    }

    /// Drives the mixer until `on_tick` requests a stop, the sink reaches
    /// its configured end, or an error surfaces. The tick runs on this
    /// thread before every buffer.
    pub fn run_loop<F>(&mut self, mut on_tick: F) -> Result<()>
    where
        F: FnMut(&mut Scheduler<'_>) -> Result<bool>,
    {
        let Engine {
            backend,
            store,
            queue,
            mixer,
        } = self;
        let result = backend.run(&mut |buffer| {
            mixer.mix_into(buffer, queue, store, &mut |queue, store| {
                let mut sched = Scheduler { queue, store };
                on_tick(&mut sched)
            })
        });
        if let Err(ref err) = result {
            log::error!("Sound output loop failed: {err:#}");
        }
        result
    }

    /// Releases every queued note (firing hooks), drains and closes the
    /// sink, and frees the engine slot.
    pub fn shutdown(mut self) -> Result<()> {
        self.teardown()
    }

    fn teardown(&mut self) -> Result<()> {
        self.queue.clear();
        self.backend.close()
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        if let Err(err) = self.teardown() {
            log::error!("Error shutting down engine: {err:#}");
        }
        ENGINE_ACTIVE.store(false, Ordering::SeqCst);
    }
}

/// Note-scheduling surface, available directly on the engine and inside
/// `run_loop` ticks.
pub struct Scheduler<'a> {
    queue: &'a mut NoteQueue,
    store: &'a mut SampleStore,
}

impl Scheduler<'_> {
    pub fn current_time(&self) -> i64 {
        self.queue.current_time
    }

    /// Schedules a single playback. Returns the expected length in device
    /// frames.
    pub fn create_note(
        &mut self,
        sample: SampleId,
        pitch: f64,
        volume: f64,
        pan: Pan,
        start_time: i64,
        channel: Option<ChannelRef>,
        on_remove: Option<RemoveHook>,
    ) -> Result<i64> {
        self.create_note_reps(sample, pitch, volume, pan, start_time, 1, channel, on_remove)
    }

    /// Schedules a playback repeating its loop section `reps` times.
    pub fn create_note_reps(
        &mut self,
        sample: SampleId,
        pitch: f64,
        volume: f64,
        pan: Pan,
        start_time: i64,
        reps: u32,
        channel: Option<ChannelRef>,
        on_remove: Option<RemoveHook>,
    ) -> Result<i64> {
        let samp = self
            .store
            .get(sample)
            .filter(|s| s.loaded)
            .ok_or_else(|| anyhow!("sample is not loaded"))?;
        let (note, duration) = Note::new(
            samp, sample, pitch, volume, pan, start_time, reps, channel, on_remove,
        );
        self.queue.enqueue(note);
        Ok(duration)
    }

    /// Schedules a playback long enough to cover `duration` device frames.
    pub fn create_note_duration(
        &mut self,
        sample: SampleId,
        pitch: f64,
        volume: f64,
        pan: Pan,
        start_time: i64,
        duration: i64,
        channel: Option<ChannelRef>,
        on_remove: Option<RemoveHook>,
    ) -> Result<i64> {
        let samp = self
            .store
            .get(sample)
            .filter(|s| s.loaded)
            .ok_or_else(|| anyhow!("sample is not loaded"))?;
        let reps = Note::reps_for_duration(samp, pitch, duration);
        self.create_note_reps(sample, pitch, volume, pan, start_time, reps, channel, on_remove)
    }

    /// Removes every note on `channel` or its descendants, firing hooks.
    pub fn stop_notes(&mut self, channel: &ChannelRef) {
        self.queue.remove_by_channel(channel);
    }

    /// Rebases the engine clock backwards by `offset` frames.
    pub fn adjust_timebase(&mut self, offset: i64) {
        self.queue.shift_timebase(offset);
    }
}
