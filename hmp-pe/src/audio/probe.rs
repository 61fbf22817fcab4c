//! Container probing and PCM decoding of buffered payloads

use crate::error::{Error, Result};
use bytes::Bytes;
use std::io::Cursor;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{CodecParameters, DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::formats::{FormatOptions, FormatReader};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::{debug, warn};

/// Mono PCM of a whole payload
#[derive(Debug, Clone)]
pub struct DecodedPcm {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl DecodedPcm {
    pub fn duration(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / self.sample_rate as f64
    }

    /// Up to `len` samples ending at `position` seconds
    pub fn window_at(&self, position: f64, len: usize) -> &[f32] {
        let end = ((position.max(0.0) * self.sample_rate as f64) as usize).min(self.samples.len());
        let start = end.saturating_sub(len);
        &self.samples[start..end]
    }
}

fn open(bytes: &Bytes) -> Result<(Box<dyn FormatReader>, u32, CodecParameters)> {
    let mss = MediaSourceStream::new(Box::new(Cursor::new(bytes.clone())), Default::default());

    let probed = symphonia::default::get_probe()
        .format(
            &Hint::new(),
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| Error::Sink(format!("Failed to probe format: {}", e)))?;

    let format = probed.format;
    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| Error::Sink("No audio track found".to_string()))?;
    let track_id = track.id;
    let params = track.codec_params.clone();

    Ok((format, track_id, params))
}

/// Duration in seconds declared by the container
pub fn probe_duration(bytes: &Bytes) -> Result<f64> {
    let (_, _, params) = open(bytes)?;

    let n_frames = params
        .n_frames
        .ok_or_else(|| Error::Sink("Container does not declare a length".to_string()))?;

    if let Some(time_base) = params.time_base {
        let time = time_base.calc_time(n_frames);
        return Ok(time.seconds as f64 + time.frac);
    }

    let sample_rate = params
        .sample_rate
        .filter(|&rate| rate > 0)
        .ok_or_else(|| Error::Sink("Sample rate not found".to_string()))?;
    Ok(n_frames as f64 / sample_rate as f64)
}

/// Decode the whole payload, downmixed to mono
pub fn decode_mono(bytes: &Bytes) -> Result<DecodedPcm> {
    let (mut format, track_id, params) = open(bytes)?;

    let sample_rate = params
        .sample_rate
        .ok_or_else(|| Error::Sink("Sample rate not found".to_string()))?;

    let mut decoder = symphonia::default::get_codecs()
        .make(&params, &DecoderOptions::default())
        .map_err(|e| Error::Sink(format!("Failed to create decoder: {}", e)))?;

    let mut samples = Vec::new();
    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(symphonia::core::errors::Error::IoError(ref e))
                if e.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break;
            }
            Err(e) => {
                warn!("Error reading packet: {}", e);
                break;
            }
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(e) => {
                warn!("Decode error: {}", e);
                continue;
            }
        };

        let channels = decoded.spec().channels.count().max(1);
        let mut buffer = SampleBuffer::<f32>::new(decoded.capacity() as u64, *decoded.spec());
        buffer.copy_interleaved_ref(decoded);

        samples.extend(
            buffer
                .samples()
                .chunks(channels)
                .map(|frame| frame.iter().sum::<f32>() / channels as f32),
        );
    }

    debug!("Decoded {} mono samples at {} Hz", samples.len(), sample_rate);
    Ok(DecodedPcm {
        samples,
        sample_rate,
    })
}
