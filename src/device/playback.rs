use std::sync::{Arc, Condvar, Mutex, MutexGuard};

use anyhow::{Result, anyhow};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, FromSample, SampleFormat, SizedSample, Stream, StreamConfig};

use super::{Backend, DEFAULT_RATE, MixFn, clip_f32};
use crate::options::ExtraOpts;

const DEFAULT_BUFFER_BYTES: usize = 32768;
const DEFAULT_BUFFER_COUNT: usize = 6;

struct SlotState {
    full: bool,
    buf: Vec<f32>,
}

/// One hand-off buffer. The mixer thread fills it and blocks while it is
/// full; the device callback empties it and signals.
struct Slot {
    state: Mutex<SlotState>,
    cond: Condvar,
}

struct Ring {
    slots: Vec<Slot>,
}

fn lock_slot(slot: &Slot) -> MutexGuard<'_, SlotState> {
    slot.state.lock().unwrap_or_else(|e| e.into_inner())
}

/// Callback-driven hardware sink.
pub(crate) struct PlaybackSink {
    stream: Option<Stream>,
    ring: Arc<Ring>,
    filling: usize,
    sound_rate: u32,
    frames_per_buf: usize,
    valbuffer: Vec<i32>,
}

impl PlaybackSink {
    pub fn open(
        name: Option<&str>,
        rate_hint: Option<u32>,
        verbose: bool,
        opts: &ExtraOpts,
    ) -> Result<Self> {
        let host = cpal::default_host();

        if opts.has("listdevices") {
            match host.output_devices() {
                Ok(devices) => {
                    for device in devices {
                        if let Ok(id) = device.id() {
                            println!("Found device: {}", id);
                        }
                    }
                }
                Err(err) => log::warn!("Could not list output devices: {}", err),
            }
        }

        let device: Device = match name {
            Some(name) => match host
                .output_devices()?
                .find(|d| d.id().map_or(false, |n| n.to_string() == name))
            {
                Some(device) => device,
                None => {
                    log::warn!("Audio device not found: {}. Falling back to default.", name);
                    host.default_output_device()
                        .ok_or_else(|| anyhow!("No default output device available"))?
                }
            },
            None => host
                .default_output_device()
                .ok_or_else(|| anyhow!("No default output device available"))?,
        };

        if verbose {
            if let Ok(id) = device.id() {
                log::info!("Using output device: {}", id);
            }
        }

        let want_rate = rate_hint.unwrap_or(DEFAULT_RATE);
        let mut supported: Vec<_> = device
            .supported_output_configs()?
            .filter(|c| c.channels() >= 2)
            .collect();
        if supported.is_empty() {
            return Err(anyhow!("No stereo output configuration available"));
        }

        let pos = supported
            .iter()
            .position(|c| {
                c.sample_format() == SampleFormat::F32
                    && c.min_sample_rate() <= want_rate
                    && c.max_sample_rate() >= want_rate
            })
            .or_else(|| {
                supported.iter().position(|c| {
                    matches!(c.sample_format(), SampleFormat::I16 | SampleFormat::U16)
                        && c.min_sample_rate() <= want_rate
                        && c.max_sample_rate() >= want_rate
                })
            })
            .or_else(|| {
                supported
                    .iter()
                    .position(|c| c.sample_format() == SampleFormat::F32)
            })
            .unwrap_or(0);
        let range = supported.swap_remove(pos);

        let rate = want_rate.clamp(range.min_sample_rate(), range.max_sample_rate());
        if rate != want_rate {
            log::warn!("Requested {} fps not available, using {} fps", want_rate, rate);
        }

        let config = range.with_sample_rate(rate);
        let sample_format = config.sample_format();
        let stream_config: StreamConfig = config.into();
        let sound_rate = stream_config.sample_rate;
        let device_channels = stream_config.channels as usize;

        let buffer_bytes: usize = opts.get_parsed("buffersize").unwrap_or(DEFAULT_BUFFER_BYTES);
        let bufcount: usize = opts
            .get_parsed("buffercount")
            .unwrap_or(DEFAULT_BUFFER_COUNT)
            .max(2);
        let frames_per_buf = (buffer_bytes / 4).max(1);
        let samples_per_buf = frames_per_buf * 2;

        if verbose {
            log::info!(
                "Set sampling rate to {} fps, {} ring buffers of {} frames",
                sound_rate,
                bufcount,
                frames_per_buf
            );
        }

        let ring = Arc::new(Ring {
            slots: (0..bufcount)
                .map(|_| Slot {
                    state: Mutex::new(SlotState {
                        full: false,
                        buf: vec![0.0; samples_per_buf],
                    }),
                    cond: Condvar::new(),
                })
                .collect(),
        });

        let err_fn = |err| {
            log::error!("Stream error: {}", err);
        };
        let stream = match sample_format {
            SampleFormat::F32 => {
                build_stream::<f32>(&device, &stream_config, ring.clone(), device_channels, err_fn)?
            }
            SampleFormat::I16 => {
                build_stream::<i16>(&device, &stream_config, ring.clone(), device_channels, err_fn)?
            }
            SampleFormat::U16 => {
                build_stream::<u16>(&device, &stream_config, ring.clone(), device_channels, err_fn)?
            }
            other => return Err(anyhow!("Unsupported sample format: {:?}", other)),
        };
        stream.play()?;

        Ok(PlaybackSink {
            stream: Some(stream),
            ring,
            filling: 0,
            sound_rate,
            frames_per_buf,
            valbuffer: vec![0; samples_per_buf],
        })
    }
}

impl Backend for PlaybackSink {
    fn sound_rate(&self) -> u32 {
        self.sound_rate
    }

    fn frames_per_buf(&self) -> usize {
        self.frames_per_buf
    }

    fn run(&mut self, mix: MixFn<'_>) -> Result<()> {
        loop {
            if mix(&mut self.valbuffer)? {
                return Ok(());
            }

            let slot = &self.ring.slots[self.filling];
            let mut state = lock_slot(slot);
            while state.full {
                state = slot.cond.wait(state).unwrap_or_else(|e| e.into_inner());
            }
            for (dst, &src) in state.buf.iter_mut().zip(&self.valbuffer) {
                *dst = clip_f32(src);
            }
            state.full = true;
            drop(state);

            self.filling = (self.filling + 1) % self.ring.slots.len();
        }
    }

    fn close(&mut self) -> Result<()> {
        if self.stream.is_none() {
            return Ok(());
        }
        // Let the callback drain whatever is still queued.
        for slot in &self.ring.slots {
            let mut state = lock_slot(slot);
            while state.full {
                state = slot.cond.wait(state).unwrap_or_else(|e| e.into_inner());
            }
        }
        self.stream = None;
        Ok(())
    }
}

impl Drop for PlaybackSink {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            log::error!("Error closing playback sink: {err:#}");
        }
    }
}

/// Builds the device stream for one concrete sample type. The callback
/// drains ring slots through a carry buffer because device callbacks need
/// not line up with engine buffers, up-maps stereo onto however many
/// channels the device wants, and leaves silence when the ring runs dry.
fn build_stream<T>(
    device: &Device,
    config: &StreamConfig,
    ring: Arc<Ring>,
    device_channels: usize,
    err_fn: impl Fn(cpal::StreamError) + Send + 'static,
) -> Result<Stream>
where
    T: SizedSample + FromSample<f32> + Send + 'static,
{
    let samples_per_buf = lock_slot(&ring.slots[0]).buf.len();
    let mut carry: Vec<f32> = vec![0.0; samples_per_buf];
    let mut carry_pos = samples_per_buf;
    let mut emptying = 0usize;

    let stream = device.build_output_stream(
        config,
        move |output: &mut [T], _: &cpal::OutputCallbackInfo| {
            let frames = output.len() / device_channels;
            let mut out_idx = 0;
            for _ in 0..frames {
                if carry_pos >= carry.len() {
                    let slot = &ring.slots[emptying];
                    let mut state = lock_slot(slot);
                    if !state.full {
                        break;
                    }
                    carry.copy_from_slice(&state.buf);
                    state.full = false;
                    drop(state);
                    slot.cond.notify_one();
                    emptying = (emptying + 1) % ring.slots.len();
                    carry_pos = 0;
                }

                output[out_idx] = T::from_sample(carry[carry_pos]);
                output[out_idx + 1] = T::from_sample(carry[carry_pos + 1]);
                for ch in 2..device_channels {
                    output[out_idx + ch] = T::from_sample(0.0f32);
                }
                carry_pos += 2;
                out_idx += device_channels;
            }

            for sample in &mut output[out_idx..] {
                *sample = T::from_sample(0.0f32);
            }
        },
        err_fn,
        None,
    )?;

    Ok(stream)
}
