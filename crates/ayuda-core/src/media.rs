//! Helpers for the binary payloads the assistant returns: `data:` URIs for
//! images and raw PCM for speech.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

/// Sample rate Gemini uses for speech when the MIME type doesn't say
pub const DEFAULT_SPEECH_SAMPLE_RATE: u32 = 24_000;

#[derive(Debug, thiserror::Error)]
pub enum MediaError {
    #[error("not a base64 data URI")]
    NotDataUri,
    #[error("invalid base64 payload: {0}")]
    Base64(#[from] base64::DecodeError),
}

/// Split a `data:<mime>;base64,<payload>` URI and decode the payload
pub fn decode_data_uri(uri: &str) -> Result<(String, Vec<u8>), MediaError> {
    let rest = uri.strip_prefix("data:").ok_or(MediaError::NotDataUri)?;
    let (header, payload) = rest.split_once(',').ok_or(MediaError::NotDataUri)?;
    let mime = header
        .strip_suffix(";base64")
        .ok_or(MediaError::NotDataUri)?;
    Ok((mime.to_string(), STANDARD.decode(payload)?))
}

pub fn decode_base64(payload: &str) -> Result<Vec<u8>, MediaError> {
    Ok(STANDARD.decode(payload.trim())?)
}

/// File extension for an image MIME type
pub fn image_extension(mime: &str) -> &'static str {
    match mime {
        "image/jpeg" | "image/jpg" => "jpg",
        "image/webp" => "webp",
        _ => "png",
    }
}

/// Whether a speech MIME type denotes headerless 16-bit PCM
pub fn is_raw_pcm(mime: &str) -> bool {
    let lower = mime.to_ascii_lowercase();
    lower.starts_with("audio/l16") || lower.contains("codec=pcm")
}

/// Read `rate=NNNN` from a MIME type such as `audio/L16;codec=pcm;rate=24000`
pub fn sample_rate(mime: &str) -> Option<u32> {
    mime.split(';')
        .filter_map(|param| param.trim().strip_prefix("rate="))
        .find_map(|rate| rate.parse().ok())
}

/// Prefix mono 16-bit little-endian PCM with a RIFF/WAVE header
pub fn wrap_pcm16_as_wav(pcm: &[u8], sample_rate: u32) -> Vec<u8> {
    const CHANNELS: u16 = 1;
    const BITS_PER_SAMPLE: u16 = 16;
    let block_align = CHANNELS * BITS_PER_SAMPLE / 8;
    let byte_rate = sample_rate * u32::from(block_align);
    let data_len = pcm.len() as u32;

    let mut wav = Vec::with_capacity(44 + pcm.len());
    wav.extend_from_slice(b"RIFF");
    wav.extend_from_slice(&(36 + data_len).to_le_bytes());
    wav.extend_from_slice(b"WAVE");
    wav.extend_from_slice(b"fmt ");
    wav.extend_from_slice(&16u32.to_le_bytes());
    wav.extend_from_slice(&1u16.to_le_bytes()); // PCM
    wav.extend_from_slice(&CHANNELS.to_le_bytes());
    wav.extend_from_slice(&sample_rate.to_le_bytes());
    wav.extend_from_slice(&byte_rate.to_le_bytes());
    wav.extend_from_slice(&block_align.to_le_bytes());
    wav.extend_from_slice(&BITS_PER_SAMPLE.to_le_bytes());
    wav.extend_from_slice(b"data");
    wav.extend_from_slice(&data_len.to_le_bytes());
    wav.extend_from_slice(pcm);
    wav
}
