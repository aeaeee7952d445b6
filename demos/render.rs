// Demo host: renders a small generated soundscape to a WAV file.

use std::path::PathBuf;
use std::rc::Rc;

use anyhow::Result;
use clap::Parser;
use simplelog::{ColorChoice, Config as LogConfig, LevelFilter, TermLogger, TerminalMode};

use soundloom::{
    Channel, ChannelRef, Config, Engine, ExtraOpts, Output, Pan, PanFade, PcmEncoding, VolumeFade,
};

#[derive(Parser, Debug)]
#[command(about = "Render a demo soundscape to a WAV file")]
struct Args {
    /// Output WAV path
    #[arg(value_name = "OUTPUT", default_value = "soundscape.wav")]
    output: PathBuf,

    /// Seconds of audio to render
    #[arg(long, default_value_t = 10.0)]
    seconds: f64,

    /// Output frame rate
    #[arg(long, default_value_t = 44100)]
    rate: u32,
}

/// Minimal host-side channel node.
struct DemoChannel {
    volume: Option<VolumeFade>,
    stereo: Option<PanFade>,
    parent: Option<ChannelRef>,
}

impl Channel for DemoChannel {
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

/// One second of a sine tone as 16-bit little-endian PCM bytes.
fn tone_bytes(rate: u32, freq: f64) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(rate as usize * 2);
    for i in 0..rate {
        let phase = i as f64 / rate as f64 * freq * std::f64::consts::TAU;
        let value = (phase.sin() * 0.35 * 32767.0) as i16;
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    bytes
}

fn main() -> Result<()> {
    let args = Args::parse();
    TermLogger::init(
        LevelFilter::Info,
        LogConfig::default(),
        TerminalMode::Mixed,
        ColorChoice::Auto,
    )?;

    let mut opts = ExtraOpts::new();
    opts.push("time", Some(&args.seconds.to_string()));

    let mut engine = Engine::init(Config {
        output: Output::WavFile(args.output.clone()),
        rate: Some(args.rate),
        verbose: true,
        options: opts,
    })?;

    let rate = engine.frames_per_second();
    let encoding = PcmEncoding {
        bits: 16,
        signed: true,
        big_endian: false,
    };

    // A low drone that loops for the whole render, and a short chime.
    let drone = engine.new_sample();
    let bytes = tone_bytes(rate, 110.0);
    engine.load_sample(drone, rate, rate as i64, &bytes, 0, rate as i64, 1, encoding)?;

    let chime = engine.new_sample();
    let bytes = tone_bytes(rate, 660.0);
    engine.load_sample(chime, rate, rate as i64, &bytes, 0, 0, 1, encoding)?;

    // Channel tree: a slow fade-in on the root; chimes sweep the stereo
    // field on a child channel.
    let root: ChannelRef = Rc::new(DemoChannel {
        volume: Some(VolumeFade {
            start: 0,
            end: rate as i64 * 2,
            from: 0.0,
            to: 1.0,
        }),
        stereo: None,
        parent: None,
    });
    let mover: ChannelRef = Rc::new(DemoChannel {
        volume: None,
        stereo: Some(PanFade {
            start: 0,
            end: rate as i64 * 4,
            from: Pan::shifted(-1.0),
            to: Pan::shifted(1.0),
        }),
        parent: Some(root.clone()),
    });

    let total_frames = (args.seconds * rate as f64) as i64;
    let chime_gap = (rate as f64 * 0.75) as i64;
    let pitches = [1.0, 1.25, 1.5, 2.0];

    let mut started = false;
    let mut next_chime = 0i64;
    let mut chime_ix = 0usize;

    engine.run_loop(|sched| {
        let now = sched.current_time();
        if !started {
            started = true;
            sched.create_note_duration(
                drone,
                1.0,
                0.8,
                Pan::IDENTITY,
                now,
                total_frames,
                Some(root.clone()),
                None,
            )?;
        }
        if now >= next_chime {
            let pitch = pitches[chime_ix % pitches.len()];
            sched.create_note(chime, pitch, 0.5, Pan::IDENTITY, now, Some(mover.clone()), None)?;
            chime_ix += 1;
            next_chime = now + chime_gap;
        }
        Ok(false)
    })?;

    engine.shutdown()?;
    log::info!("Rendered {}", args.output.display());
    Ok(())
}
