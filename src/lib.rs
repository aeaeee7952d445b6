//! A programmable soundscape mixing engine.
//!
//! The engine mixes scheduled notes — playbacks of PCM samples at arbitrary
//! pitches, volumes, and stereo positions — into a stereo output stream,
//! applying volume and pan fades inherited from a host-provided channel
//! tree. Output goes to a hardware device through the system audio layer or
//! to a raw-PCM/WAV file sink.
//!
//! The host owns all scheduling: it loads samples, builds its channel tree,
//! and drives playback from the [`Engine::run_loop`] tick callback, which
//! runs on the mixing thread before every buffer.

mod engine;
mod mixer;
mod note;
mod queue;
mod sample;

pub mod channel;
pub mod device;
pub mod options;

pub use channel::{Channel, ChannelRef, PanFade, VolumeFade};
pub use device::Output;
pub use engine::{Config, Engine, Scheduler};
pub use note::{Pan, RemoveHook};
pub use options::ExtraOpts;
pub use sample::{PcmEncoding, SampleId, SampleInfo};
