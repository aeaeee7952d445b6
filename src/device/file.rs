use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use byteorder::{BigEndian, LittleEndian};

use super::{Backend, DEFAULT_RATE, Endian, MixFn, pack_frames};
use crate::options::ExtraOpts;

const DEFAULT_SECONDS: f64 = 5.0;
const DEFAULT_BUFFER_BYTES: usize = 16384;

/// Blocking-write sink producing headerless interleaved 16-bit PCM.
pub(crate) struct RawFileSink {
    writer: Option<BufWriter<File>>,
    path: PathBuf,
    endian: Endian,
    sound_rate: u32,
    frames_per_buf: usize,
    max_frames: i64,
    written_frames: i64,
    valbuffer: Vec<i32>,
    rawbuffer: Vec<u8>,
}

impl RawFileSink {
    pub fn open(
        path: &Path,
        rate_hint: Option<u32>,
        verbose: bool,
        opts: &ExtraOpts,
    ) -> Result<Self> {
        if opts.has("listdevices") {
            println!("Device list: give any writable file as a device name.");
        }

        let endian = Endian::from_opts(opts);
        let seconds: f64 = opts.get_parsed("time").unwrap_or(DEFAULT_SECONDS);
        let buffer_bytes: usize = opts.get_parsed("buffersize").unwrap_or(DEFAULT_BUFFER_BYTES);
        let sound_rate = rate_hint.unwrap_or(DEFAULT_RATE);
        let frames_per_buf = (buffer_bytes / 4).max(1);
        let max_frames = (seconds * sound_rate as f64) as i64;

        let file = File::create(path)
            .with_context(|| format!("opening output file {}", path.display()))?;

        if verbose {
            log::info!(
                "Raw file sink: {} at {} fps, 16-bit signed {}-endian, {}s of output ({} frames)",
                path.display(),
                sound_rate,
                if endian == Endian::Big { "big" } else { "little" },
                seconds,
                max_frames
            );
        }

        Ok(RawFileSink {
            writer: Some(BufWriter::new(file)),
            path: path.to_path_buf(),
            endian,
            sound_rate,
            frames_per_buf,
            max_frames,
            written_frames: 0,
            valbuffer: vec![0; frames_per_buf * 2],
            rawbuffer: vec![0; frames_per_buf * 4],
        })
    }
}

impl Backend for RawFileSink {
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

            match self.endian {
                Endian::Big => pack_frames::<BigEndian>(&self.valbuffer, &mut self.rawbuffer),
                Endian::Little => pack_frames::<LittleEndian>(&self.valbuffer, &mut self.rawbuffer),
            }
            if let Err(err) = writer.write_all(&self.rawbuffer) {
                log::error!("Error writing {}: {}", self.path.display(), err);
                return Err(err).context("sound output write failed");
            }

            self.written_frames += self.frames_per_buf as i64;
            if self.written_frames >= self.max_frames {
                return Ok(());
            }
        }
    }

    fn close(&mut self) -> Result<()> {
        if let Some(mut writer) = self.writer.take() {
            writer
                .flush()
                .with_context(|| format!("flushing {}", self.path.display()))?;
        }
        Ok(())
    }
}

impl Drop for RawFileSink {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            log::error!("Error closing raw file sink: {err:#}");
        }
    }
}
