use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use hound::{SampleFormat, WavSpec, WavWriter};

use super::{Backend, DEFAULT_RATE, MixFn, clip16};
use crate::options::ExtraOpts;

const DEFAULT_SECONDS: f64 = 5.0;
const DEFAULT_BUFFER_BYTES: usize = 16384;

/// Blocking-write sink producing a 16-bit stereo WAV file.
pub(crate) struct WavFileSink {
    writer: Option<WavWriter<BufWriter<File>>>,
    path: PathBuf,
    sound_rate: u32,
    frames_per_buf: usize,
    max_frames: i64,
    written_frames: i64,
    valbuffer: Vec<i32>,
}

impl WavFileSink {
    pub fn open(
        path: &Path,
        rate_hint: Option<u32>,
        verbose: bool,
        opts: &ExtraOpts,
    ) -> Result<Self> {
        if opts.has("listdevices") {
            println!("Device list: give any writable file as a device name.");
        }

        let seconds: f64 = opts.get_parsed("time").unwrap_or(DEFAULT_SECONDS);
        let buffer_bytes: usize = opts.get_parsed("buffersize").unwrap_or(DEFAULT_BUFFER_BYTES);
        let sound_rate = rate_hint.unwrap_or(DEFAULT_RATE);
        let frames_per_buf = (buffer_bytes / 4).max(1);
        let max_frames = (seconds * sound_rate as f64) as i64;

        let spec = WavSpec {
            channels: 2,
            sample_rate: sound_rate,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let writer = WavWriter::create(path, spec)
            .with_context(|| format!("opening output file {}", path.display()))?;

        if verbose {
            log::info!(
                "WAV sink: {} at {} fps, {}s of output ({} frames)",
                path.display(),
                sound_rate,
                seconds,
                max_frames
            );
        }

        Ok(WavFileSink {
            writer: Some(writer),
            path: path.to_path_buf(),
            sound_rate,
            frames_per_buf,
            max_frames,
            written_frames: 0,
            valbuffer: vec![0; frames_per_buf * 2],
        })
    }
}

impl Backend for WavFileSink {
    fn sound_rate(&self) -> u32 {
        self.sound_rate
    }

    fn frames_per_buf(&self) -> usize {
        self.frames_per_buf
    }

    fn run(&mut self, mix: MixFn<'_>) -> Result<()> {
        let writer = self.writer.as_mut().context("sink already closed")?;
        loop {
            if mix(&mut self.valbuffer)? {
                return Ok(());
            }

            for &value in &self.valbuffer {
                if let Err(err) = writer.write_sample(clip16(value)) {
                    log::error!("Error writing {}: {}", self.path.display(), err);
                    return Err(err).context("sound output write failed");
                }
            }

            self.written_frames += self.frames_per_buf as i64;
            if self.written_frames >= self.max_frames {
                return Ok(());
            }
        }
    }

    /// Finalizes the container so the header carries the real length.
    fn close(&mut self) -> Result<()> {
        if let Some(writer) = self.writer.take() {
            writer
                .finalize()
                .with_context(|| format!("finalizing {}", self.path.display()))?;
        }
        Ok(())
    }
}

impl Drop for WavFileSink {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            log::error!("Error closing WAV sink: {err:#}");
        }
    }
}
