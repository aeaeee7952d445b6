use std::collections::HashMap;

use anyhow::{Result, anyhow};

/// Handle to a sample owned by the engine's store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SampleId(u64);

/// Wire format of the raw PCM bytes handed to `load`.
#[derive(Debug, Clone, Copy)]
pub struct PcmEncoding {
    pub bits: u32,
    pub signed: bool,
    pub big_endian: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleInfo {
    pub native_rate: u32,
    pub num_frames: i64,
    pub loop_window: Option<(i64, i64)>,
}

/// A decoded PCM asset. Data is interleaved 16-bit signed, one or two
/// channels, read-only once loaded.
pub(crate) struct Sample {
    pub loaded: bool,
    pub error: bool,
    pub num_frames: i64,
    pub num_channels: usize,
    pub has_loop: bool,
    pub loop_start: i64,
    pub loop_end: i64,
    pub loop_len: i64,
    /// Native rate over device rate; 1.0 plays at the device rate.
    pub frame_rate_ratio: f64,
    pub native_rate: u32,
    pub data: Vec<i16>,
}

impl Sample {
    fn blank() -> Self {
        Sample {
            loaded: false,
            error: false,
            num_frames: 0,
            num_channels: 0,
            has_loop: false,
            loop_start: 0,
            loop_end: 0,
            loop_len: 0,
            frame_rate_ratio: 1.0,
            native_rate: 0,
            data: Vec::new(),
        }
    }
}

/// Owner of every sample for one engine instance. Notes refer to samples by
/// id; the host must not destroy a sample while notes still use it.
pub(crate) struct SampleStore {
    samples: HashMap<u64, Sample>,
    next_id: u64,
    sound_rate: u32,
}

impl SampleStore {
    pub fn new(sound_rate: u32) -> Self {
        SampleStore {
            samples: HashMap::new(),
            next_id: 0,
            sound_rate,
        }
    }

    pub fn create_blank(&mut self) -> SampleId {
        let id = self.next_id;
        self.next_id += 1;
        self.samples.insert(id, Sample::blank());
        SampleId(id)
    }

    pub fn get(&self, id: SampleId) -> Option<&Sample> {
        self.samples.get(&id.0)
    }

    /// Decodes raw PCM into the sample. Loading an already-loaded sample is
    /// a success no-op; any failure leaves the sample sticky-failed.
    pub fn load(
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
        let sound_rate = self.sound_rate;
        let samp = self
            .samples
            .get_mut(&id.0)
            .ok_or_else(|| anyhow!("no such sample"))?;

        if samp.error {
            return Err(anyhow!("sample is in the error state"));
        }
        if samp.loaded {
            return Ok(());
        }

        if encoding.bits != 8 && encoding.bits != 16 {
            samp.error = true;
            log::error!(
                "Unable to load sound data at {} bits per sample (only 8 and 16 supported)",
                encoding.bits
            );
            return Err(anyhow!("unsupported sample depth: {} bits", encoding.bits));
        }
        if num_frames < 0 || num_channels == 0 {
            samp.error = true;
            return Err(anyhow!(
                "bad sample shape: {} frames, {} channels",
                num_frames,
                num_channels
            ));
        }

        let bytes_per_value = (encoding.bits / 8) as usize;
        let expected = num_frames as usize * num_channels * bytes_per_value;
        if bytes.len() != expected {
            samp.error = true;
            log::error!(
                "Wrong number of bytes in sample data: got {}, expected {}",
                bytes.len(),
                expected
            );
            return Err(anyhow!("sample data length mismatch"));
        }

        // Channels beyond the first two are discarded.
        let num_channels_out = num_channels.min(2);
        let mut data = Vec::with_capacity(num_channels_out * num_frames as usize);
        if encoding.bits == 8 {
            for frame in bytes.chunks_exact(num_channels) {
                for &b in &frame[..num_channels_out] {
                    let b = if encoding.signed { b } else { b ^ 0x80 };
                    data.push(((b as i8) as i16) << 8);
                }
            }
        } else {
            for frame in bytes.chunks_exact(2 * num_channels) {
                for pair in frame.chunks_exact(2).take(num_channels_out) {
                    let (hi, lo) = if encoding.big_endian {
                        (pair[0], pair[1])
                    } else {
                        (pair[1], pair[0])
                    };
                    let hi = if encoding.signed { hi } else { hi ^ 0x80 };
                    data.push(i16::from_be_bytes([hi, lo]));
                }
            }
        }

        samp.data = data;
        samp.num_frames = num_frames;
        samp.num_channels = num_channels_out;
        samp.frame_rate_ratio = native_rate as f64 / sound_rate as f64;
        samp.native_rate = native_rate;

        if loop_start >= 0 && loop_end >= 0 && loop_start < loop_end {
            samp.has_loop = true;
            samp.loop_start = loop_start;
            samp.loop_end = loop_end;
        } else {
            samp.has_loop = false;
            samp.loop_start = 0;
            samp.loop_end = 0;
        }
        samp.loop_len = samp.loop_end - samp.loop_start;

        samp.loaded = true;
        Ok(())
    }

    /// Frees the decoded data but keeps the descriptor so the host can
    /// reload later.
    pub fn unload(&mut self, id: SampleId) {
        if let Some(samp) = self.samples.get_mut(&id.0) {
            if samp.error {
                return;
            }
            samp.data = Vec::new();
            samp.loaded = false;
        }
    }

    pub fn destroy(&mut self, id: SampleId) {
        self.samples.remove(&id.0);
    }

    pub fn is_loaded(&self, id: SampleId) -> bool {
        self.samples
            .get(&id.0)
            .is_some_and(|s| s.loaded && !s.error)
    }

    /// Destroyed or never-created handles read as errored.
    pub fn is_error(&self, id: SampleId) -> bool {
        self.samples.get(&id.0).is_none_or(|s| s.error)
    }

    pub fn info(&self, id: SampleId) -> Option<SampleInfo> {
        let samp = self.samples.get(&id.0).filter(|s| s.loaded)?;
        Some(SampleInfo {
            native_rate: samp.native_rate,
            num_frames: samp.num_frames,
            loop_window: samp.has_loop.then_some((samp.loop_start, samp.loop_end)),
        })
    }
}
