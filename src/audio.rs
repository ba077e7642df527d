//! Upload decoding (WAV, FLAC, AIFF) and WAV re-encoding for the recognition backend

use hound::{SampleFormat, WavSpec, WavWriter};
use std::io::{self, Cursor};
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader};
use symphonia::core::io::MediaSourceStream;
use symphonia::default::formats::{AiffReader, FlacReader, WavReader};
use thiserror::Error;

use crate::config::{BITS_PER_SAMPLE, CHANNELS, TARGET_SAMPLE_RATE};

#[derive(Error, Debug)]
pub enum AudioError {
    #[error("Failed to decode audio: {0}")]
    DecodeError(String),
    #[error("Unsupported audio layout: {0}")]
    UnsupportedFormat(String),
    #[error("Failed to encode WAV: {0}")]
    EncodingError(String),
}

impl AudioError {
    /// Decode and layout problems come from the upload itself.
    pub fn is_client_error(&self) -> bool {
        !matches!(self, AudioError::EncodingError(_))
    }
}

/// A decoded upload: the whole recording as one mono segment.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioClip {
    pub samples: Vec<i16>,
    pub sample_rate: u32,
}

impl AudioClip {
    /// Decode a complete audio file (container detected from its header),
    /// mixing down to mono i16.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, AudioError> {
        let mut format = open_container(bytes)?;

        let track = format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| AudioError::DecodeError("no audio track".to_string()))?;
        let track_id = track.id;
        let codec_params = track.codec_params.clone();

        let sample_rate = match codec_params.sample_rate {
            Some(rate) if rate > 0 => rate,
            _ => return Err(AudioError::UnsupportedFormat("missing sample rate".to_string())),
        };

        let mut decoder = symphonia::default::get_codecs()
            .make(&codec_params, &DecoderOptions::default())
            .map_err(|e| AudioError::UnsupportedFormat(e.to_string()))?;

        let mut samples = Vec::new();
        loop {
            let packet = match format.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::IoError(e)) if e.kind() == io::ErrorKind::UnexpectedEof => {
                    break
                }
                Err(SymphoniaError::ResetRequired) => break,
                Err(e) => return Err(AudioError::DecodeError(e.to_string())),
            };
            if packet.track_id() != track_id {
                continue;
            }

            let decoded = match decoder.decode(&packet) {
                Ok(decoded) => decoded,
                Err(SymphoniaError::DecodeError(e)) => {
                    tracing::warn!(error = e, "Skipping undecodable packet");
                    continue;
                }
                Err(e) => return Err(AudioError::DecodeError(e.to_string())),
            };

            let spec = *decoded.spec();
            let channels = spec.channels.count();
            if channels == 0 {
                return Err(AudioError::UnsupportedFormat("zero channels".to_string()));
            }
            let mut buf = SampleBuffer::<i16>::new(decoded.capacity() as u64, spec);
            buf.copy_interleaved_ref(decoded);
            samples.extend(mix_to_mono(buf.samples(), channels));
        }

        tracing::debug!(
            codec = ?codec_params.codec,
            sample_rate,
            frames = samples.len(),
            "Decoded upload"
        );

        Ok(Self {
            samples,
            sample_rate,
        })
    }

    pub fn duration_secs(&self) -> f64 {
        self.samples.len() as f64 / self.sample_rate as f64
    }

    /// Empty or all-zero recordings carry no speech at all.
    pub fn is_silent(&self) -> bool {
        self.samples.iter().all(|&s| s == 0)
    }

    /// Encode as 16 kHz, 16-bit mono WAV.
    pub fn to_wav_bytes(&self) -> Result<Vec<u8>, AudioError> {
        encode_wav(&self.samples, self.sample_rate)
    }
}

fn mix_to_mono(interleaved: &[i16], channels: usize) -> Vec<i16> {
    if channels == 1 {
        return interleaved.to_vec();
    }

    interleaved
        .chunks_exact(channels)
        .map(|frame| {
            let sum: i32 = frame.iter().map(|&s| s as i32).sum();
            (sum / channels as i32) as i16
        })
        .collect()
}

/// Pick the container reader from the file's magic bytes.
fn open_container(bytes: &[u8]) -> Result<Box<dyn FormatReader>, AudioError> {
    let source = Box::new(Cursor::new(bytes.to_vec()));
    let mss = MediaSourceStream::new(source, Default::default());
    let opts = FormatOptions::default();

    let reader: Box<dyn FormatReader> = match bytes.get(..4) {
        Some(b"RIFF") => Box::new(WavReader::try_new(mss, &opts).map_err(decode_error)?),
        Some(b"FORM") => Box::new(AiffReader::try_new(mss, &opts).map_err(decode_error)?),
        Some(b"fLaC") => Box::new(FlacReader::try_new(mss, &opts).map_err(decode_error)?),
        _ => {
            return Err(AudioError::DecodeError(
                "unrecognized container (expected WAV, AIFF or FLAC)".to_string(),
            ))
        }
    };
    Ok(reader)
}

fn decode_error(err: SymphoniaError) -> AudioError {
    AudioError::DecodeError(err.to_string())
}

pub fn encode_wav(samples: &[i16], original_sample_rate: u32) -> Result<Vec<u8>, AudioError> {
    // Whisper-style backends expect 16000Hz
    let processed_samples = if original_sample_rate != TARGET_SAMPLE_RATE {
        tracing::debug!(
            from = original_sample_rate,
            to = TARGET_SAMPLE_RATE,
            "Resampling upload"
        );
        resample(samples, original_sample_rate, TARGET_SAMPLE_RATE)
    } else {
        samples.to_vec()
    };

    let spec = WavSpec {
        channels: CHANNELS,
        sample_rate: TARGET_SAMPLE_RATE,
        bits_per_sample: BITS_PER_SAMPLE,
        sample_format: SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = WavWriter::new(&mut cursor, spec)
            .map_err(|e| AudioError::EncodingError(e.to_string()))?;

        for &sample in &processed_samples {
            writer
                .write_sample(sample)
                .map_err(|e| AudioError::EncodingError(e.to_string()))?;
        }

        writer
            .finalize()
            .map_err(|e| AudioError::EncodingError(e.to_string()))?;
    }

    Ok(cursor.into_inner())
}

fn resample(samples: &[i16], from: u32, to: u32) -> Vec<i16> {
    if from == to {
        return samples.to_vec();
    }

    let ratio = from as f64 / to as f64;
    let target_len = (samples.len() as f64 / ratio) as usize;
    let mut result = Vec::with_capacity(target_len);

    for i in 0..target_len {
        let pos = i as f64 * ratio;
        let index = pos as usize;

        if index + 1 < samples.len() {
            // Linear interpolation
            let fract = pos - index as f64;
            let s1 = samples[index] as f64;
            let s2 = samples[index + 1] as f64;
            let interpolated = s1 + (s2 - s1) * fract;
            result.push(interpolated as i16);
        } else if index < samples.len() {
            result.push(samples[index]);
        }
    }

    result
}
