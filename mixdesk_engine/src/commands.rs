use crate::assets::DecodedAudio;
use crate::mixer::StemVoice;

/// Changes sent from the control thread to the renderer, applied at the start
/// of a device buffer. Per-block parameters (gain, pan, punch) travel through
/// atomics instead; playheads are only ever written by the renderer.
pub enum RenderCommand {
    /// Joins the mix at the renderer's transport position.
    AttachVoice(Box<StemVoice>),
    /// New source URL for an existing stem: same chain, new buffer.
    ReplaceSource { slot: usize, audio: DecodedAudio },
    /// Moves every voice to `frame` and starts the clock.
    Start { frame: u64, epoch: u64 },
    /// Moves every voice to `frame`; running or not stays as it was.
    Locate { frame: u64, epoch: u64 },
    Halt,
    /// Drop every voice (new job or teardown).
    DetachAll,
}

/// Things the renderer hands back so they are freed off the audio thread.
pub enum Retired {
    Voice(Box<StemVoice>),
    Audio(DecodedAudio),
}
