use std::path::PathBuf;

use anyhow::Result;
use byteorder::ByteOrder;

use crate::options::ExtraOpts;

pub(crate) mod file;
pub(crate) mod playback;
pub(crate) mod wavfile;

pub(crate) const DEFAULT_RATE: u32 = 44100;

/// Where the mixed stream goes.
#[derive(Debug, Clone)]
pub enum Output {
    /// A hardware sink through the system audio layer; `None` picks the
    /// default output device.
    Device(Option<String>),
    /// Headerless interleaved 16-bit PCM written to a file.
    RawFile(PathBuf),
    /// A WAV file.
    WavFile(PathBuf),
}

/// Byte order for 16-bit packing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Endian {
    Big,
    Little,
}

impl Endian {
    pub fn native() -> Endian {
        if cfg!(target_endian = "big") {
            Endian::Big
        } else {
            Endian::Little
        }
    }

    pub fn from_opts(opts: &ExtraOpts) -> Endian {
        match opts.get("end") {
            Some("big") => Endian::Big,
            Some("little") => Endian::Little,
            Some(other) => {
                log::warn!("Unknown byte order {:?}, using native", other);
                Endian::native()
            }
            None => Endian::native(),
        }
    }
}

/// One mixing pass: fills the accumulator and reports whether the host
/// asked to stop.
pub(crate) type MixFn<'a> = &'a mut dyn FnMut(&mut [i32]) -> Result<bool>;

/// A negotiated output sink. `run` owns the produce-and-deliver loop until
/// the mix callback requests a stop, the sink reaches its configured end,
/// or an error surfaces; `close` drains and finalizes, and must be safe to
/// call more than once.
pub(crate) trait Backend {
    fn sound_rate(&self) -> u32;
    fn frames_per_buf(&self) -> usize;
    fn run(&mut self, mix: MixFn<'_>) -> Result<()>;
    fn close(&mut self) -> Result<()>;
}

pub(crate) fn open(
    output: &Output,
    rate_hint: Option<u32>,
    verbose: bool,
    opts: &ExtraOpts,
) -> Result<Box<dyn Backend>> {
    match output {
        Output::Device(name) => Ok(Box::new(playback::PlaybackSink::open(
            name.as_deref(),
            rate_hint,
            verbose,
            opts,
        )?)),
        Output::RawFile(path) => Ok(Box::new(file::RawFileSink::open(
            path, rate_hint, verbose, opts,
        )?)),
        Output::WavFile(path) => Ok(Box::new(wavfile::WavFileSink::open(
            path, rate_hint, verbose, opts,
        )?)),
    }
}

/// Clamps an accumulator value into the 16-bit output range.
pub(crate) fn clip16(value: i32) -> i16 {
    value.clamp(-0x7FFF, 0x7FFF) as i16
}

/// Clipped accumulator value as a float in [-1, 1].
pub(crate) fn clip_f32(value: i32) -> f32 {
    clip16(value) as f32 / 32768.0
}

/// Packs clipped accumulator values as 16-bit samples.
pub(crate) fn pack_frames<E: ByteOrder>(values: &[i32], out: &mut [u8]) {
    for (value, bytes) in values.iter().zip(out.chunks_exact_mut(2)) {
        E::write_i16(bytes, clip16(*value));
    }
}
