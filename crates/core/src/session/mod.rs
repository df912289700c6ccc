use std::{cell::RefCell, fmt, rc::Rc, sync::Arc};

use crate::{
    engine::{EngineState, FrameInputs, FrameReport},
    render::Canvas,
    timeline::{CancellationHandle, FrameScheduler},
    AudioHost, AudioSpectrumSource, ColorFieldSampler, DecodeTask, HeadlessHost, NoiseKind,
    ParticleFieldEngine, PointerTracker, Result, SpectrumSnapshot, Style, VisualizerConfig,
    VisualizerError,
};

/// Outcome of a deferred upload, reported once it resolves.
#[derive(Debug)]
pub enum UploadEvent {
    AudioReady { seconds: f32 },
    AudioFailed(VisualizerError),
}

/// Everything the surrounding UI talks to.
///
/// Setters, uploads and pointer events mutate the session between frames;
/// [`VisualizerSession::frame`] then hands the engine one consistent snapshot
/// of all of it. Everything runs on one thread, so no locking is involved.
pub struct VisualizerSession {
    config: VisualizerConfig,
    pointer: PointerTracker,
    audio: AudioSpectrumSource,
    pending_audio: Option<DecodeTask>,
    colors: ColorFieldSampler,
    engine: ParticleFieldEngine,
    spectrum: SpectrumSnapshot,
    events: Vec<UploadEvent>,
    last_report: Option<FrameReport>,
    resume_on_upload: bool,
}

impl VisualizerSession {
    pub fn new(config: VisualizerConfig, host: Arc<dyn AudioHost>) -> Self {
        Self {
            config,
            pointer: PointerTracker::new(),
            audio: AudioSpectrumSource::new(host),
            pending_audio: None,
            colors: ColorFieldSampler::new(),
            engine: ParticleFieldEngine::new(),
            spectrum: SpectrumSnapshot::silent(),
            events: Vec::new(),
            last_report: None,
            resume_on_upload: true,
        }
    }

    pub fn headless(config: VisualizerConfig) -> Self {
        Self::new(config, Arc::new(HeadlessHost))
    }

    pub fn config(&self) -> &VisualizerConfig {
        &self.config
    }

    pub fn set_particle_size(&mut self, value: f32) {
        self.config.set_particle_size(value);
    }

    pub fn set_exposure(&mut self, value: f32) {
        self.config.set_exposure(value);
    }

    pub fn set_flow(&mut self, value: f32) {
        self.config.set_flow(value);
    }

    pub fn set_ink_density(&mut self, value: f32) {
        self.config.set_ink_density(value);
    }

    pub fn set_style(&mut self, style: Style) {
        self.config.set_style(style);
    }

    pub fn set_noise(&mut self, noise: NoiseKind) {
        self.config.set_noise(noise);
    }

    /// Pauses or resumes the shared audio context along with the flag.
    pub fn set_audio_playing(&mut self, playing: bool) {
        self.config.set_audio_playing(playing);
        self.audio.set_playing(playing);
    }

    /// Whether a newly started upload switches audio on. Enabled by default;
    /// when disabled the current `is_audio_playing` flag is kept.
    pub fn set_resume_on_upload(&mut self, resume: bool) {
        self.resume_on_upload = resume;
    }

    pub fn pointer_moved(&mut self, x: f32, y: f32) {
        self.pointer.update(x, y);
    }

    pub fn pointer_left(&mut self) {
        self.pointer.reset();
    }

    pub fn audio(&self) -> &AudioSpectrumSource {
        &self.audio
    }

    pub fn audio_mut(&mut self) -> &mut AudioSpectrumSource {
        &mut self.audio
    }

    /// Starts decoding an audio upload in the background. Fails right away
    /// only when the host cannot play audio at all. A newer upload supersedes
    /// one still decoding.
    pub fn upload_audio(&mut self, bytes: Vec<u8>) -> Result<()> {
        self.audio.ensure_context()?;
        if self.pending_audio.replace(DecodeTask::spawn(bytes)).is_some() {
            tracing::debug!("superseding in-flight audio decode");
        }
        Ok(())
    }

    /// Decodes and starts an audio upload on the calling thread.
    pub fn upload_audio_blocking(&mut self, bytes: &[u8]) -> Result<()> {
        self.audio.load(bytes)?;
        self.start_staged_audio()
    }

    /// Whether an audio upload is still decoding.
    pub fn audio_pending(&self) -> bool {
        self.pending_audio.is_some()
    }

    pub fn clear_audio(&mut self) {
        self.pending_audio = None;
        self.audio.clear();
    }

    /// Decodes an image upload. On failure the previous image stays active.
    pub fn upload_image(&mut self, bytes: &[u8]) -> Result<()> {
        self.colors.load(bytes).inspect_err(|err| {
            tracing::warn!(%err, "image upload rejected");
        })
    }

    pub fn clear_image(&mut self) {
        self.colors.clear();
    }

    /// Installs a finished background decode and returns every upload
    /// outcome since the last call.
    pub fn poll_uploads(&mut self) -> Vec<UploadEvent> {
        self.install_finished_decode();
        std::mem::take(&mut self.events)
    }

    fn install_finished_decode(&mut self) {
        let Some(result) = self.pending_audio.as_mut().and_then(DecodeTask::poll) else {
            return;
        };
        self.pending_audio = None;

        let installed = result.and_then(|track| {
            let seconds = track.duration().as_secs_f32();
            self.audio.stage(track)?;
            self.start_staged_audio()?;
            Ok(seconds)
        });
        self.events.push(match installed {
            Ok(seconds) => UploadEvent::AudioReady { seconds },
            Err(err) => {
                tracing::warn!(%err, "audio upload rejected");
                UploadEvent::AudioFailed(err)
            }
        });
    }

    fn start_staged_audio(&mut self) -> Result<()> {
        self.audio.start()?;
        let playing = self.resume_on_upload || self.config.is_audio_playing;
        self.set_audio_playing(playing);
        tracing::info!(playing, "audio source started");
        Ok(())
    }

    pub fn bind(&mut self) -> bool {
        self.engine.bind()
    }

    /// Stops the engine for good. A decode still in flight is abandoned and
    /// its result discarded.
    pub fn teardown(&mut self) {
        self.engine.stop();
        if self.pending_audio.take().is_some() {
            tracing::debug!("discarding in-flight audio decode");
        }
        self.audio.clear();
    }

    pub fn engine_state(&self) -> EngineState {
        self.engine.state()
    }

    pub fn last_report(&self) -> Option<FrameReport> {
        self.last_report
    }

    /// Latest spectrum handed to the engine.
    pub fn spectrum(&self) -> &SpectrumSnapshot {
        &self.spectrum
    }

    /// Runs one display frame.
    pub fn frame(&mut self, canvas: &mut dyn Canvas) -> FrameReport {
        if self.engine.state() == EngineState::Running {
            self.install_finished_decode();
        }

        let loaded = self.audio.is_loaded();
        self.spectrum = if loaded {
            self.audio.sample()
        } else {
            SpectrumSnapshot::silent()
        };

        let dims = self.config.grid_dims();
        let colors = self.colors.grid(dims);
        let inputs = FrameInputs {
            config: &self.config,
            pointer: self.pointer.state(),
            spectrum: loaded.then_some(&self.spectrum),
            colors,
        };

        let report = self.engine.render_frame(&inputs, canvas);
        self.last_report = Some(report);
        report
    }
}

impl fmt::Debug for VisualizerSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VisualizerSession")
            .field("config", &self.config)
            .field("pointer", &self.pointer.state())
            .field("audio", &self.audio)
            .field("audio_pending", &self.pending_audio.is_some())
            .field("image", &self.colors.has_image())
            .field("engine", &self.engine)
            .finish()
    }
}

/// Binds `session` and drives it from `scheduler`, drawing into `canvas`.
/// Cancel the returned handle (and tear the session down) to stop.
pub fn attach<C>(
    session: Rc<RefCell<VisualizerSession>>,
    canvas: Rc<RefCell<C>>,
    scheduler: &mut dyn FrameScheduler,
) -> CancellationHandle
where
    C: Canvas + 'static,
{
    session.borrow_mut().bind();
    scheduler.on_frame(Box::new(move |_tick| {
        let mut canvas = canvas.borrow_mut();
        session.borrow_mut().frame(&mut *canvas);
    }))
}
