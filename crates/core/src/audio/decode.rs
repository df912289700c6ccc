use std::{
    io::{Cursor, ErrorKind},
    sync::mpsc::{self, Receiver, TryRecvError},
    thread::{self, JoinHandle},
    time::Duration,
};

use hound::{SampleFormat, WavReader};
use symphonia::core::{
    audio::SampleBuffer,
    codecs::{DecoderOptions, CODEC_TYPE_NULL},
    errors::Error as SymphoniaError,
    formats::FormatOptions,
    io::MediaSourceStream,
    meta::MetadataOptions,
    probe::Hint,
};

use crate::{Result, VisualizerError};

/// Mono PCM track ready for looping playback and analysis.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedAudio {
    samples: Vec<f32>,
    sample_rate: u32,
    source_channels: u16,
}

impl DecodedAudio {
    /// Wraps already-decoded mono samples.
    pub fn from_mono(samples: Vec<f32>, sample_rate: u32) -> Result<Self> {
        if samples.is_empty() {
            return Err(VisualizerError::Decode("audio asset contains no samples".into()));
        }
        if sample_rate == 0 {
            return Err(VisualizerError::Decode("audio asset has a zero sample rate".into()));
        }
        Ok(Self {
            samples,
            sample_rate,
            source_channels: 1,
        })
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Channel count of the uploaded asset before down-mixing.
    pub fn source_channels(&self) -> u16 {
        self.source_channels
    }

    pub fn frames(&self) -> usize {
        self.samples.len()
    }

    pub fn duration(&self) -> Duration {
        Duration::from_secs_f64(self.samples.len() as f64 / self.sample_rate as f64)
    }

    /// Frame index reached after looping for `elapsed`.
    pub fn position_at(&self, elapsed: Duration) -> usize {
        let frame = (elapsed.as_secs_f64() * self.sample_rate as f64) as u64;
        (frame % self.samples.len() as u64) as usize
    }

    /// Fills `out` with the samples that end just before `end`, wrapping
    /// around the start of the track.
    pub fn fill_window(&self, end: usize, out: &mut [f32]) {
        let len = self.samples.len();
        let start = (end % len + len * (out.len() / len + 1) - out.len()) % len;
        for (offset, slot) in out.iter_mut().enumerate() {
            *slot = self.samples[(start + offset) % len];
        }
    }
}

/// Decodes an uploaded audio asset and averages its channels to mono.
///
/// PCM WAV goes through `hound`. Everything else, and WAV encodings `hound`
/// cannot read, is probed by `symphonia` (MP3, AAC/M4A, FLAC, Ogg Vorbis,
/// AIFF, ADPCM WAV, ...).
pub fn decode(bytes: &[u8]) -> Result<DecodedAudio> {
    if !is_riff_wave(bytes) {
        return decode_container(bytes);
    }
    decode_wav(bytes).or_else(|err| {
        tracing::debug!(%err, "falling back to container probe for WAV asset");
        decode_container(bytes).map_err(|_| err)
    })
}

fn is_riff_wave(bytes: &[u8]) -> bool {
    bytes.len() >= 12 && &bytes[..4] == b"RIFF" && &bytes[8..12] == b"WAVE"
}

fn decode_wav(bytes: &[u8]) -> Result<DecodedAudio> {
    let reader = WavReader::new(Cursor::new(bytes))?;
    let spec = reader.spec();
    let interleaved: Vec<f32> = match spec.sample_format {
        SampleFormat::Float => reader
            .into_samples::<f32>()
            .collect::<std::result::Result<_, _>>()?,
        SampleFormat::Int => {
            let bits = spec.bits_per_sample.clamp(1, 32) as i32;
            let scale = 1.0 / 2f32.powi(bits - 1);
            reader
                .into_samples::<i32>()
                .map(|sample| sample.map(|value| value as f32 * scale))
                .collect::<std::result::Result<_, _>>()?
        }
    };

    downmix(&interleaved, spec.channels as usize, spec.sample_rate)
}

fn decode_container(bytes: &[u8]) -> Result<DecodedAudio> {
    let source = MediaSourceStream::new(Box::new(Cursor::new(bytes.to_vec())), Default::default());
    let probed = symphonia::default::get_probe().format(
        &Hint::new(),
        source,
        &FormatOptions::default(),
        &MetadataOptions::default(),
    )?;
    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|track| track.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| VisualizerError::Decode("asset contains no audio track".into()))?;
    let track_id = track.id;
    let mut sample_rate = track.codec_params.sample_rate;
    let mut decoder = symphonia::default::get_codecs().make(&track.codec_params, &DecoderOptions::default())?;

    let mut channels = 0usize;
    let mut interleaved = Vec::new();
    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(err)) if err.kind() == ErrorKind::UnexpectedEof => break,
            Err(SymphoniaError::ResetRequired) => break,
            Err(err) => return Err(err.into()),
        };
        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(SymphoniaError::DecodeError(reason)) => {
                tracing::debug!(reason, "skipping undecodable audio packet");
                continue;
            }
            Err(err) => return Err(err.into()),
        };
        let spec = *decoded.spec();
        sample_rate = Some(spec.rate);
        channels = spec.channels.count();

        let mut buffer = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
        buffer.copy_interleaved_ref(decoded);
        interleaved.extend_from_slice(buffer.samples());
    }

    let sample_rate =
        sample_rate.ok_or_else(|| VisualizerError::Decode("audio asset has no sample rate".into()))?;
    downmix(&interleaved, channels, sample_rate)
}

fn downmix(interleaved: &[f32], channels: usize, sample_rate: u32) -> Result<DecodedAudio> {
    if channels == 0 {
        return Err(VisualizerError::Decode("audio asset declares no channels".into()));
    }
    let mono = interleaved
        .chunks(channels)
        .filter(|frame| frame.len() == channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect();

    let mut decoded = DecodedAudio::from_mono(mono, sample_rate)?;
    decoded.source_channels = channels.min(u16::MAX as usize) as u16;
    Ok(decoded)
}

/// Audio decode running on a worker thread.
///
/// Polling never blocks. Dropping the task abandons the result; the worker
/// finishes on its own and its output is discarded.
#[derive(Debug)]
pub struct DecodeTask {
    receiver: Receiver<Result<DecodedAudio>>,
    _worker: JoinHandle<()>,
}

impl DecodeTask {
    pub fn spawn(bytes: Vec<u8>) -> Self {
        let (sender, receiver) = mpsc::channel();
        let worker = thread::spawn(move || {
            // The receiver is gone if the owner was torn down meanwhile.
            let _ = sender.send(decode(&bytes));
        });
        Self {
            receiver,
            _worker: worker,
        }
    }

    /// `None` while decoding is still running.
    pub fn poll(&mut self) -> Option<Result<DecodedAudio>> {
        match self.receiver.try_recv() {
            Ok(result) => Some(result),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => Some(Err(VisualizerError::Decode(
                "decoder worker exited without a result".into(),
            ))),
        }
    }

    /// Blocks until the decode finishes.
    pub fn wait(self) -> Result<DecodedAudio> {
        self.receiver.recv().unwrap_or_else(|_| {
            Err(VisualizerError::Decode(
                "decoder worker exited without a result".into(),
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{tone_aiff, tone_wav, tone_wav_with};

    #[test]
    fn decodes_int_wav_to_mono() {
        let decoded = decode(&tone_wav(440.0, 0.25, 8_000)).unwrap();
        assert_eq!(decoded.sample_rate(), 8_000);
        assert_eq!(decoded.frames(), 2_000);
        assert_eq!(decoded.source_channels(), 1);
        let peak = decoded.samples().iter().fold(0.0f32, |acc, s| acc.max(s.abs()));
        assert!(peak > 0.4 && peak <= 0.5 + 1e-3, "{peak}");
    }

    #[test]
    fn averages_stereo_channels() {
        let bytes = tone_wav_with(2, hound::SampleFormat::Float, 32, 1_600, |_, channel| {
            if channel == 0 {
                0.5
            } else {
                -0.5
            }
        });
        let decoded = decode(&bytes).unwrap();
        assert_eq!(decoded.source_channels(), 2);
        assert!(decoded.samples().iter().all(|s| s.abs() < 1e-6));
    }

    #[test]
    fn decodes_non_wav_containers() {
        let decoded = decode(&tone_aiff(2, 11_025, 1_000)).unwrap();
        assert_eq!(decoded.sample_rate(), 11_025);
        assert_eq!(decoded.source_channels(), 2);
        assert_eq!(decoded.frames(), 1_000);
        // Left carries the tone and right is silent, so the mix peaks at half.
        let peak = decoded.samples().iter().fold(0.0f32, |acc, s| acc.max(s.abs()));
        assert!(peak > 0.2 && peak <= 0.25 + 1e-3, "{peak}");
    }

    #[test]
    fn rejects_garbage() {
        let err = decode(b"ID3\x03\x00not really an mp3").unwrap_err();
        assert!(matches!(err, VisualizerError::Decode(_)));
        assert!(decode(&[]).is_err());
    }

    #[test]
    fn rejects_empty_track() {
        let bytes = tone_wav_with(1, hound::SampleFormat::Int, 16, 0, |_, _| 0.0);
        assert!(matches!(decode(&bytes), Err(VisualizerError::Decode(_))));
    }

    #[test]
    fn window_wraps_around_the_loop() {
        let track = DecodedAudio::from_mono(vec![0.0, 1.0, 2.0, 3.0, 4.0], 10).unwrap();
        let mut out = [0.0; 3];
        track.fill_window(2, &mut out);
        assert_eq!(out, [4.0, 0.0, 1.0]);

        let mut long = [0.0; 7];
        track.fill_window(0, &mut long);
        assert_eq!(long, [3.0, 4.0, 0.0, 1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn position_loops() {
        let track = DecodedAudio::from_mono(vec![0.0; 100], 100).unwrap();
        assert_eq!(track.duration(), Duration::from_secs(1));
        assert_eq!(track.position_at(Duration::from_millis(250)), 25);
        assert_eq!(track.position_at(Duration::from_millis(1_250)), 25);
    }

    #[test]
    fn deferred_decode_resolves() {
        let task = DecodeTask::spawn(tone_wav(220.0, 0.1, 8_000));
        let decoded = task.wait().unwrap();
        assert_eq!(decoded.frames(), 800);

        let mut failing = DecodeTask::spawn(b"nope".to_vec());
        let result = loop {
            if let Some(result) = failing.poll() {
                break result;
            }
            thread::sleep(Duration::from_millis(1));
        };
        assert!(result.is_err());
    }
}
