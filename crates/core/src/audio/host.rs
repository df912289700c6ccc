use std::{
    fmt,
    sync::{atomic::AtomicBool, Arc},
};

use crate::{DecodedAudio, Result};

/// Platform audio subsystem that looped tracks are played through.
pub trait AudioHost: fmt::Debug {
    fn name(&self) -> &str;

    /// Fails with `UnsupportedEnvironment` when there is nothing to play on.
    fn probe(&self) -> Result<()>;

    /// Starts looping `track`. While `suspended` is set the sink must output
    /// silence and hold its position.
    fn open_sink(&self, track: Arc<DecodedAudio>, suspended: Arc<AtomicBool>) -> Result<Box<dyn AudioSink>>;
}

/// Handle to one playing track.
pub trait AudioSink {
    /// Stops output and detaches from the device. Idempotent.
    fn stop(&mut self);
}

/// Host without audible output. Playback position is derived purely from
/// the shared playback clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct HeadlessHost;

impl AudioHost for HeadlessHost {
    fn name(&self) -> &str {
        "headless"
    }

    fn probe(&self) -> Result<()> {
        Ok(())
    }

    fn open_sink(&self, _track: Arc<DecodedAudio>, _suspended: Arc<AtomicBool>) -> Result<Box<dyn AudioSink>> {
        Ok(Box::new(SilentSink))
    }
}

#[derive(Debug)]
struct SilentSink;

impl AudioSink for SilentSink {
    fn stop(&mut self) {}
}

#[cfg(feature = "device-output")]
pub use device::CpalHost;

#[cfg(feature = "device-output")]
mod device {
    use std::sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    };

    use cpal::{
        traits::{DeviceTrait, HostTrait, StreamTrait},
        SampleFormat,
    };

    use super::{AudioHost, AudioSink};
    use crate::{DecodedAudio, Result, VisualizerError};

    /// Plays through the default output device of the default cpal host.
    #[derive(Debug, Default, Clone, Copy)]
    pub struct CpalHost;

    fn unsupported(err: impl std::fmt::Display) -> VisualizerError {
        VisualizerError::UnsupportedEnvironment(err.to_string())
    }

    impl AudioHost for CpalHost {
        fn name(&self) -> &str {
            "cpal"
        }

        fn probe(&self) -> Result<()> {
            cpal::default_host()
                .default_output_device()
                .map(|_| ())
                .ok_or_else(|| unsupported("no audio output device found"))
        }

        fn open_sink(&self, track: Arc<DecodedAudio>, suspended: Arc<AtomicBool>) -> Result<Box<dyn AudioSink>> {
            let device = cpal::default_host()
                .default_output_device()
                .ok_or_else(|| unsupported("no audio output device found"))?;
            let supported = device.default_output_config().map_err(unsupported)?;
            if supported.sample_format() != SampleFormat::F32 {
                return Err(unsupported(format!(
                    "output format {:?} is not supported",
                    supported.sample_format()
                )));
            }

            let config: cpal::StreamConfig = supported.into();
            let channels = (config.channels as usize).max(1);
            let step = track.sample_rate() as f64 / config.sample_rate.0.max(1) as f64;
            let frames = track.frames() as f64;
            let mut cursor = 0.0f64;

            tracing::debug!(
                device = device.name().unwrap_or_else(|_| "unknown".to_string()),
                sample_rate = config.sample_rate.0,
                channels,
                "opening audio output"
            );

            let stream = device
                .build_output_stream(
                    &config,
                    move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                        let paused = suspended.load(Ordering::Acquire);
                        for frame in data.chunks_mut(channels) {
                            let value = if paused {
                                0.0
                            } else {
                                let value = track.samples()[cursor as usize % track.frames()];
                                cursor = (cursor + step) % frames;
                                value
                            };
                            frame.fill(value);
                        }
                    },
                    |err| tracing::warn!(%err, "audio output stream error"),
                    None,
                )
                .map_err(unsupported)?;
            stream.play().map_err(unsupported)?;

            Ok(Box::new(CpalSink {
                stream: Some(stream),
            }))
        }
    }

    struct CpalSink {
        stream: Option<cpal::Stream>,
    }

    impl AudioSink for CpalSink {
        fn stop(&mut self) {
            if let Some(stream) = self.stream.take() {
                let _ = stream.pause();
            }
        }
    }
}
