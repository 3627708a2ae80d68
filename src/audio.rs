use std::fs::File;
use std::path::Path;

use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::DecoderOptions;
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

/// Sample rate required by whisper.cpp.
pub const TARGET_SAMPLE_RATE: u32 = 16_000;

// ── Error ──────────────────────────────────────────────────────────────────────

#[derive(Debug)]
pub enum AudioError {
    Open(std::io::Error),
    Decode(String),
    Resample(String),
    /// The file decoded to zero samples (empty or audio-less container).
    NoSamples,
}

impl std::fmt::Display for AudioError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Open(e) => write!(f, "cannot open audio file: {e}"),
            Self::Decode(m) => write!(f, "decode failed: {m}"),
            Self::Resample(m) => write!(f, "resampling failed: {m}"),
            Self::NoSamples => write!(f, "no audio samples decoded"),
        }
    }
}

impl std::error::Error for AudioError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Open(e) => Some(e),
            _ => None,
        }
    }
}

// ── Public entry point ─────────────────────────────────────────────────────────

/// Decode an audio file and normalise it to mono 16 kHz f32 PCM — the exact
/// input format whisper.cpp expects.
///
/// Container/codec detection is delegated to symphonia's probe, with the file
/// extension as a hint when one exists. Multi-channel audio is downmixed by
/// arithmetic mean; sample rates other than 16 kHz go through a sinc
/// resampler.
pub fn load_mono_16k(path: &Path) -> Result<Vec<f32>, AudioError> {
    let decoded = decode(path)?;
    if decoded.samples.is_empty() {
        return Err(AudioError::NoSamples);
    }

    let mono = mix_to_mono(&decoded.samples, decoded.channels);
    if decoded.sample_rate == TARGET_SAMPLE_RATE {
        return Ok(mono);
    }
    resample(mono, decoded.sample_rate, TARGET_SAMPLE_RATE)
}

// ── Decode ─────────────────────────────────────────────────────────────────────

/// Raw decoded audio: interleaved f32 PCM at the source rate and layout.
struct Decoded {
    samples: Vec<f32>,
    sample_rate: u32,
    channels: usize,
}

fn decode(path: &Path) -> Result<Decoded, AudioError> {
    let file = File::open(path).map_err(AudioError::Open)?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| AudioError::Decode(e.to_string()))?;

    let mut format = probed.format;

    let track = format
        .default_track()
        .ok_or_else(|| AudioError::Decode("no default audio track found".to_string()))?;

    let track_id = track.id;

    let sample_rate = track
        .codec_params
        .sample_rate
        .ok_or_else(|| AudioError::Decode("sample rate missing from codec params".to_string()))?;

    let channels = track
        .codec_params
        .channels
        .map(|c| c.count())
        .unwrap_or(1);

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| AudioError::Decode(e.to_string()))?;

    let mut samples: Vec<f32> = Vec::new();

    loop {
        let packet = match format.next_packet() {
            Ok(p) => p,
            // Symphonia 0.5 signals end-of-stream as IoError(UnexpectedEof).
            Err(SymphoniaError::IoError(ref e))
                if e.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break;
            }
            Err(SymphoniaError::ResetRequired) => break,
            Err(e) => return Err(AudioError::Decode(e.to_string())),
        };

        if packet.track_id() != track_id {
            continue;
        }

        let buffer = match decoder.decode(&packet) {
            Ok(b) => b,
            // A malformed frame is skippable; anything else is terminal.
            Err(SymphoniaError::DecodeError(_)) => continue,
            Err(e) => return Err(AudioError::Decode(e.to_string())),
        };

        let spec = *buffer.spec();
        let mut interleaved = SampleBuffer::<f32>::new(buffer.capacity() as u64, spec);
        interleaved.copy_interleaved_ref(buffer);
        samples.extend_from_slice(interleaved.samples());
    }

    Ok(Decoded {
        samples,
        sample_rate,
        channels,
    })
}

// ── Normalise ──────────────────────────────────────────────────────────────────

/// Average interleaved multi-channel samples into a single mono channel.
fn mix_to_mono(samples: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return samples.to_vec();
    }

    samples
        .chunks_exact(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect()
}

/// Resample a mono f32 buffer from `from_rate` Hz to `to_rate` Hz using a
/// fixed-input sinc interpolator. The last chunk is zero-padded to meet the
/// fixed-size requirement and the internal delay line is flushed at the end.
fn resample(samples: Vec<f32>, from_rate: u32, to_rate: u32) -> Result<Vec<f32>, AudioError> {
    let ratio = to_rate as f64 / from_rate as f64;

    let params = SincInterpolationParameters {
        sinc_len: 256,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 256,
        window: WindowFunction::BlackmanHarris2,
    };

    let chunk_size = 1024_usize;

    let mut resampler = SincFixedIn::<f32>::new(ratio, 2.0, params, chunk_size, 1)
        .map_err(|e| AudioError::Resample(e.to_string()))?;

    let expected_output = (samples.len() as f64 * ratio) as usize + chunk_size;
    let mut output: Vec<f32> = Vec::with_capacity(expected_output);

    let mut pos = 0;
    while pos < samples.len() {
        let needed = resampler.input_frames_next();
        let end = (pos + needed).min(samples.len());

        let mut chunk = samples[pos..end].to_vec();
        chunk.resize(needed, 0.0);

        let waves = resampler
            .process(&[chunk], None)
            .map_err(|e| AudioError::Resample(e.to_string()))?;

        output.extend_from_slice(&waves[0]);
        pos += needed;
    }

    // Flush samples held in the resampler's delay line.
    let tail = resampler
        .process_partial::<Vec<f32>>(None, None)
        .map_err(|e| AudioError::Resample(e.to_string()))?;

    if let Some(channel) = tail.first() {
        output.extend_from_slice(channel);
    }

    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mono_input_passes_through_mixing_unchanged() {
        let samples = vec![0.1, -0.2, 0.3];
        assert_eq!(mix_to_mono(&samples, 1), samples);
    }

    #[test]
    fn stereo_frames_are_averaged() {
        let samples = vec![1.0, 0.0, 0.5, 0.5, -1.0, 1.0];
        assert_eq!(mix_to_mono(&samples, 2), vec![0.5, 0.5, 0.0]);
    }

    #[test]
    fn resampling_halves_the_sample_count_at_double_rate() {
        // One second of silence at 32 kHz should come out close to 16 000
        // samples; chunk zero-padding and the sinc delay line add up to a
        // chunk's worth of edge frames.
        let one_second = vec![0.0_f32; 32_000];
        let out = resample(one_second, 32_000, TARGET_SAMPLE_RATE).unwrap();
        let drift = (out.len() as i64 - 16_000).abs();
        assert!(drift <= 1_024, "unexpected output length {}", out.len());
    }

    #[test]
    fn missing_file_is_an_open_error() {
        let err = load_mono_16k(Path::new("/nonexistent/audio.wav")).unwrap_err();
        assert!(matches!(err, AudioError::Open(_)));
    }
}
