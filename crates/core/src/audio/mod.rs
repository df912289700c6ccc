mod decode;
mod host;

use std::{
    fmt,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

pub use decode::{decode, DecodeTask, DecodedAudio};
#[cfg(feature = "device-output")]
pub use host::CpalHost;
pub use host::{AudioHost, AudioSink, HeadlessHost};

use crate::{PlaybackClock, Result, SpectrumAnalyser, SpectrumSnapshot, VisualizerError, FFT_SIZE};

/// Playback context shared by every source.
///
/// Suspending the context pauses whatever is playing through it; there is no
/// per-source pause.
#[derive(Debug)]
pub struct AudioContext {
    host_name: String,
    clock: PlaybackClock,
    suspended: Arc<AtomicBool>,
}

impl AudioContext {
    pub fn open(host: &dyn AudioHost) -> Result<Self> {
        host.probe()?;
        tracing::info!(host = host.name(), "audio context created");
        Ok(Self {
            host_name: host.name().to_string(),
            clock: PlaybackClock::start(),
            suspended: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn host_name(&self) -> &str {
        &self.host_name
    }

    pub fn suspend(&mut self) {
        if !self.is_suspended() {
            tracing::debug!("audio context suspended");
        }
        self.clock.pause();
        self.suspended.store(true, Ordering::Release);
    }

    pub fn resume(&mut self) {
        if self.is_suspended() {
            tracing::debug!("audio context resumed");
        }
        self.clock.resume();
        self.suspended.store(false, Ordering::Release);
    }

    pub fn is_suspended(&self) -> bool {
        self.suspended.load(Ordering::Acquire)
    }

    /// Running time of the context, excluding suspended stretches.
    pub fn current_time(&self) -> Duration {
        self.clock.elapsed()
    }

    /// Moves the context clock forward without waiting.
    pub fn advance(&mut self, delta: Duration) {
        self.clock.advance(delta);
    }
}

/// One track looping through the analysis stage.
struct Voice {
    track: Arc<DecodedAudio>,
    started_at: Duration,
    sink: Box<dyn AudioSink>,
}

impl Voice {
    fn position(&self, now: Duration) -> usize {
        self.track.position_at(now.saturating_sub(self.started_at))
    }
}

impl Drop for Voice {
    fn drop(&mut self) {
        self.sink.stop();
    }
}

/// Uploaded audio, its playback and the 256-bin energy it currently produces.
///
/// The shared [`AudioContext`] is created lazily by the first upload. Loading
/// stages a decoded track; [`AudioSpectrumSource::start`] stops and detaches
/// whatever was playing and loops the staged one instead, so at most one
/// track ever feeds the analyser.
pub struct AudioSpectrumSource {
    host: Arc<dyn AudioHost>,
    context: Option<AudioContext>,
    staged: Option<Arc<DecodedAudio>>,
    voice: Option<Voice>,
    analyser: SpectrumAnalyser,
    window: Vec<f32>,
}

impl AudioSpectrumSource {
    pub fn new(host: Arc<dyn AudioHost>) -> Self {
        Self {
            host,
            context: None,
            staged: None,
            voice: None,
            analyser: SpectrumAnalyser::new(),
            window: vec![0.0; FFT_SIZE],
        }
    }

    pub fn headless() -> Self {
        Self::new(Arc::new(HeadlessHost))
    }

    /// Creates the shared context if this is the first upload.
    pub fn ensure_context(&mut self) -> Result<&mut AudioContext> {
        if self.context.is_none() {
            self.context = Some(AudioContext::open(self.host.as_ref())?);
        }
        self.context
            .as_mut()
            .ok_or_else(|| VisualizerError::msg("audio context unavailable"))
    }

    pub fn context(&self) -> Option<&AudioContext> {
        self.context.as_ref()
    }

    pub fn context_mut(&mut self) -> Option<&mut AudioContext> {
        self.context.as_mut()
    }

    /// Decodes `bytes` and stages the track. A failure leaves the current
    /// track playing untouched.
    pub fn load(&mut self, bytes: &[u8]) -> Result<()> {
        self.ensure_context()?;
        let track = decode(bytes)?;
        self.stage(track)
    }

    /// Stages an already decoded track.
    pub fn stage(&mut self, track: DecodedAudio) -> Result<()> {
        self.ensure_context()?;
        tracing::info!(
            sample_rate = track.sample_rate(),
            channels = track.source_channels(),
            seconds = track.duration().as_secs_f32(),
            "audio asset decoded"
        );
        self.staged = Some(Arc::new(track));
        Ok(())
    }

    /// Starts looping the staged track, replacing the current one.
    pub fn start(&mut self) -> Result<()> {
        let track = self
            .staged
            .take()
            .ok_or_else(|| VisualizerError::msg("no audio track has been loaded"))?;

        if let Some(mut previous) = self.voice.take() {
            previous.sink.stop();
            tracing::debug!("previous audio source stopped");
        }

        let host = self.host.clone();
        let context = self.ensure_context()?;
        let sink = host.open_sink(track.clone(), context.suspended.clone())?;
        let started_at = context.current_time();

        self.analyser.reset();
        self.voice = Some(Voice {
            track,
            started_at,
            sink,
        });
        Ok(())
    }

    /// Suspends or resumes the shared context. Without a context this only
    /// matters once the first upload creates one.
    pub fn set_playing(&mut self, playing: bool) {
        if let Some(context) = self.context.as_mut() {
            if playing {
                context.resume();
            } else {
                context.suspend();
            }
        }
    }

    /// Stops and detaches the current track.
    pub fn clear(&mut self) {
        if self.voice.take().is_some() {
            tracing::info!("audio source cleared");
        }
        self.staged = None;
        self.analyser.reset();
    }

    pub fn is_loaded(&self) -> bool {
        self.voice.is_some()
    }

    pub fn is_playing(&self) -> bool {
        self.is_loaded()
            && self
                .context
                .as_ref()
                .map(|context| !context.is_suspended())
                .unwrap_or(false)
    }

    /// Energy of the current playback position. All zero when nothing is
    /// playing. Never blocks.
    pub fn sample(&mut self) -> SpectrumSnapshot {
        let (Some(voice), Some(context)) = (self.voice.as_ref(), self.context.as_ref()) else {
            return SpectrumSnapshot::silent();
        };
        if context.is_suspended() {
            return SpectrumSnapshot::silent();
        }

        let position = voice.position(context.current_time());
        voice.track.fill_window(position, &mut self.window);
        self.analyser.analyse(&self.window)
    }
}

impl fmt::Debug for AudioSpectrumSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AudioSpectrumSource")
            .field("host", &self.host.name())
            .field("context", &self.context)
            .field("staged", &self.staged.is_some())
            .field("playing", &self.is_playing())
            .finish()
    }
}
