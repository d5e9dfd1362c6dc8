//! Stream profiles: codec table, per-run stream parameters and the command
//! lines derived from them.

use std::fmt;
use std::str::FromStr;

use castconfig::Config;
use castdidl::ContentFeatures;
use thiserror::Error;

use crate::pipeline::CommandSpec;

/// Seconds in one year; the length announced for a stream that never ends.
pub const YEAR_SECONDS: u64 = 365 * 24 * 60 * 60;

pub const DEFAULT_CAPTURE_PROGRAM: &str = "parec";
pub const DEFAULT_TRANSCODE_PROGRAM: &str = "ffmpeg";
pub const DEFAULT_CLIENT_NAME: &str = "audiocast-rec";

pub const MAX_BITRATE: u32 = 10_000;
pub const MAX_SAMPLE_RATE: u32 = 768_000;
pub const MAX_CHANNELS: u16 = 32;
/// Largest read buffer a chunked response may ask for.
pub const MAX_CHUNK_BYTES: u64 = 64 * 1024 * 1024;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProfileError {
    #[error("unsupported codec: {0}")]
    UnsupportedCodec(String),
    #[error("unsupported bit depth {0} (expected 16, 24 or 32)")]
    BitDepth(u16),
    #[error("invalid {0}: must be greater than zero")]
    Zero(&'static str),
    #[error("{name} {value} is out of range (maximum {max})")]
    OutOfRange {
        name: &'static str,
        value: u64,
        max: u64,
    },
    #[error("{0} does not fit the stream size limits")]
    TooLarge(&'static str),
}

/// Output formats the transcoder can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Codec {
    Mp3,
    Aac,
    M4a,
    Flac,
    Opus,
    Wav,
    Lpcm,
}

impl Codec {
    pub fn name(&self) -> &'static str {
        match self {
            Codec::Mp3 => "mp3",
            Codec::Aac => "aac",
            Codec::M4a => "m4a",
            Codec::Flac => "flac",
            Codec::Opus => "opus",
            Codec::Wav => "wav",
            Codec::Lpcm => "lpcm",
        }
    }

    /// Extension of the stream path, `/stream.<ext>`.
    pub fn extension(&self) -> &'static str {
        match self {
            Codec::Opus => "ogg",
            other => other.name(),
        }
    }

    fn base_mime(&self) -> &'static str {
        match self {
            Codec::Mp3 => "audio/mpeg",
            Codec::Aac => "audio/aac",
            Codec::M4a => "audio/mp4",
            Codec::Flac => "audio/flac",
            Codec::Opus => "audio/ogg",
            Codec::Wav => "audio/wav",
            Codec::Lpcm => "audio/L16",
        }
    }

    /// No target bitrate: lossless or raw output.
    pub fn is_lossless(&self) -> bool {
        matches!(self, Codec::Flac | Codec::Wav | Codec::Lpcm)
    }

    /// Raw PCM samples, needing an explicit sample format on output.
    pub fn is_raw(&self) -> bool {
        matches!(self, Codec::Wav | Codec::Lpcm)
    }

    /// DLNA LPCM is big-endian on the wire.
    pub fn is_big_endian(&self) -> bool {
        matches!(self, Codec::Lpcm)
    }

    /// mp4 family containers, which need `+faststart`.
    pub fn is_mp4_container(&self) -> bool {
        matches!(self, Codec::M4a)
    }
}

impl fmt::Display for Codec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Codec {
    type Err = ProfileError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mp3" => Ok(Codec::Mp3),
            "aac" | "adts" => Ok(Codec::Aac),
            "m4a" | "mp4" => Ok(Codec::M4a),
            "flac" => Ok(Codec::Flac),
            "opus" | "ogg" => Ok(Codec::Opus),
            "wav" => Ok(Codec::Wav),
            "lpcm" | "pcm" => Ok(Codec::Lpcm),
            _ => Err(ProfileError::UnsupportedCodec(s.to_string())),
        }
    }
}

/// Per-run stream parameters, shared read-only by every request.
///
/// Codec and bitrate are only settable together so that lossless codecs
/// always carry a zero bitrate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamConfig {
    pub source: String,
    codec: Codec,
    bitrate: u32,
    chunk_seconds: u32,
    bit_depth: u16,
    sample_rate: u32,
    channels: u16,
    pub disable_chunked: bool,
    pub print_headers: bool,
    pub capture_program: String,
    pub transcode_program: String,
    pub client_name: String,
    year_seconds: u64,
}

impl StreamConfig {
    /// 16 bit, 44.1 kHz, stereo, 1 s chunks; 320 kbit/s for lossy codecs.
    pub fn new(source: impl Into<String>, codec: Codec) -> Self {
        Self {
            source: source.into(),
            codec,
            bitrate: if codec.is_lossless() { 0 } else { 320 },
            chunk_seconds: 1,
            bit_depth: 16,
            sample_rate: 44100,
            channels: 2,
            disable_chunked: false,
            print_headers: false,
            capture_program: DEFAULT_CAPTURE_PROGRAM.to_string(),
            transcode_program: DEFAULT_TRANSCODE_PROGRAM.to_string(),
            client_name: DEFAULT_CLIENT_NAME.to_string(),
            year_seconds: YEAR_SECONDS,
        }
    }

    pub fn from_config(config: &Config) -> Result<Self, ProfileError> {
        let codec: Codec = config.get_stream_codec().parse()?;
        let chunk_seconds = config.get_stream_chunk_seconds();
        let mut stream = Self::new(config.get_capture_source(), codec)
            .with_format(
                narrow("bit depth", config.get_stream_bit_depth(), u16::MAX)?,
                narrow("sample rate", config.get_stream_sample_rate(), u32::MAX)?,
                narrow("channel count", config.get_stream_channels(), u16::MAX)?,
            )?
            .with_bitrate(narrow("bitrate", config.get_stream_bitrate(), u32::MAX)?)?
            .with_chunk_seconds(narrow("chunk duration", chunk_seconds, u32::MAX)?)?;
        stream.disable_chunked = config.get_stream_disable_chunked();
        stream.print_headers = config.get_stream_print_headers();
        stream.capture_program = config.get_capture_program();
        stream.transcode_program = config.get_transcode_program();
        stream.client_name = config.get_capture_client_name();
        Ok(stream)
    }

    /// Target bitrate in kbit/s, ignored for lossless codecs.
    pub fn with_bitrate(mut self, kbps: u32) -> Result<Self, ProfileError> {
        at_most("bitrate", kbps.into(), MAX_BITRATE.into())?;
        self.bitrate = if self.codec.is_lossless() { 0 } else { kbps };
        self.checked()
    }

    pub fn with_chunk_seconds(mut self, seconds: u32) -> Result<Self, ProfileError> {
        if seconds == 0 {
            return Err(ProfileError::Zero("chunk duration"));
        }
        self.chunk_seconds = seconds;
        self.checked()
    }

    /// Length of the stream announced to renderers.
    pub fn with_year_seconds(mut self, seconds: u64) -> Result<Self, ProfileError> {
        if seconds == 0 {
            return Err(ProfileError::Zero("stream duration"));
        }
        self.year_seconds = seconds;
        self.checked()
    }

    pub fn with_format(
        mut self,
        bit_depth: u16,
        sample_rate: u32,
        channels: u16,
    ) -> Result<Self, ProfileError> {
        if !matches!(bit_depth, 16 | 24 | 32) {
            return Err(ProfileError::BitDepth(bit_depth));
        }
        if sample_rate == 0 {
            return Err(ProfileError::Zero("sample rate"));
        }
        if channels == 0 {
            return Err(ProfileError::Zero("channel count"));
        }
        at_most("sample rate", sample_rate.into(), MAX_SAMPLE_RATE.into())?;
        at_most("channel count", channels.into(), MAX_CHANNELS.into())?;
        self.bit_depth = bit_depth;
        self.sample_rate = sample_rate;
        self.channels = channels;
        self.checked()
    }

    /// Every size derived from the parameters must fit: the announced
    /// length, its duration in milliseconds and one chunk.
    fn checked(self) -> Result<Self, ProfileError> {
        let per_second = self.bytes_per_second();
        self.year_seconds
            .checked_mul(per_second)
            .ok_or(ProfileError::TooLarge("content length"))?;
        self.year_seconds
            .checked_mul(1000)
            .ok_or(ProfileError::TooLarge("stream duration"))?;
        let chunk = per_second
            .checked_mul(self.chunk_seconds.into())
            .filter(|bytes| *bytes <= MAX_CHUNK_BYTES)
            .ok_or(ProfileError::TooLarge("chunk size"))?;
        usize::try_from(chunk).map_err(|_| ProfileError::TooLarge("chunk size"))?;
        Ok(self)
    }

    pub fn codec(&self) -> Codec {
        self.codec
    }

    pub fn bitrate(&self) -> u32 {
        self.bitrate
    }

    pub fn chunk_seconds(&self) -> u32 {
        self.chunk_seconds
    }

    pub fn bit_depth(&self) -> u16 {
        self.bit_depth
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    pub fn year_seconds(&self) -> u64 {
        self.year_seconds
    }

    /// Announced stream length in milliseconds.
    pub fn duration_ms(&self) -> u64 {
        self.year_seconds.saturating_mul(1000)
    }

    pub fn big_endian(&self) -> bool {
        self.codec.is_big_endian()
    }

    pub fn stream_path(&self) -> String {
        format!("/stream.{}", self.codec.extension())
    }

    pub fn mime(&self) -> String {
        match self.codec {
            Codec::Lpcm => format!(
                "{};rate={};channels={}",
                self.codec.base_mime(),
                self.sample_rate,
                self.channels
            ),
            other => other.base_mime().to_string(),
        }
    }

    pub fn content_features(&self) -> ContentFeatures {
        ContentFeatures::live(self.codec.name().to_uppercase())
    }

    /// Byte rate used for sizing: from the bitrate, or
    /// sample-rate × bit-depth × channels when there is none.
    pub fn bytes_per_second(&self) -> u64 {
        if self.bitrate == 0 {
            u64::from(self.sample_rate) * u64::from(self.bit_depth) * u64::from(self.channels)
        } else {
            u64::from(self.bitrate) * 1000 / 8
        }
    }

    /// `Content-Length` announced when the response is not chunked.
    pub fn content_length(&self) -> u64 {
        self.year_seconds.saturating_mul(self.bytes_per_second())
    }

    /// Read size of one chunk in chunked mode.
    pub fn chunk_size(&self) -> usize {
        let bytes = self
            .bytes_per_second()
            .saturating_mul(self.chunk_seconds.into())
            .min(MAX_CHUNK_BYTES);
        usize::try_from(bytes).unwrap_or(usize::MAX).max(1)
    }

    /// Capture sample format, always little-endian.
    pub fn capture_format(&self) -> String {
        format!("s{}le", self.bit_depth)
    }

    fn output_pcm_codec(&self) -> String {
        let order = if self.big_endian() { "be" } else { "le" };
        format!("pcm_s{}{}", self.bit_depth, order)
    }

    fn output_format(&self) -> String {
        match self.codec {
            Codec::Mp3 => "mp3".to_string(),
            Codec::Aac => "adts".to_string(),
            Codec::M4a => "mp4".to_string(),
            Codec::Flac => "flac".to_string(),
            Codec::Opus => "opus".to_string(),
            Codec::Wav => "wav".to_string(),
            Codec::Lpcm => format!("s{}be", self.bit_depth),
        }
    }

    pub fn capture_args(&self) -> Vec<String> {
        vec![
            "-d".to_string(),
            self.source.clone(),
            "-n".to_string(),
            self.client_name.clone(),
            "--rate".to_string(),
            self.sample_rate.to_string(),
            "--channels".to_string(),
            self.channels.to_string(),
            "--format".to_string(),
            self.capture_format(),
        ]
    }

    pub fn transcode_args(&self) -> Vec<String> {
        let format = self.capture_format();
        let rate = self.sample_rate.to_string();
        let channels = self.channels.to_string();
        let input: [&str; 10] = [
            "-loglevel", "error", "-f", &format, "-ar", &rate, "-ac", &channels, "-i", "-",
        ];
        let mut args: Vec<String> = input.iter().map(|s| s.to_string()).collect();

        if self.bitrate != 0 {
            args.push("-b:a".to_string());
            args.push(format!("{}k", self.bitrate));
        }
        if self.codec.is_mp4_container() {
            args.push("-movflags".to_string());
            args.push("+faststart".to_string());
        }
        if self.codec.is_raw() {
            args.push("-c:a".to_string());
            args.push(self.output_pcm_codec());
        }

        args.push("-f".to_string());
        args.push(self.output_format());
        args.push("-".to_string());
        args
    }

    pub fn capture_command(&self) -> CommandSpec {
        CommandSpec::new(&self.capture_program, self.capture_args())
    }

    pub fn transcode_command(&self) -> CommandSpec {
        CommandSpec::new(&self.transcode_program, self.transcode_args())
    }
}

fn at_most(name: &'static str, value: u64, max: u64) -> Result<(), ProfileError> {
    if value > max {
        return Err(ProfileError::OutOfRange { name, value, max });
    }
    Ok(())
}

/// Converts a configured value, reporting it instead of clamping.
fn narrow<T>(name: &'static str, value: usize, max: T) -> Result<T, ProfileError>
where
    T: TryFrom<usize> + Into<u64>,
{
    T::try_from(value).map_err(|_| ProfileError::OutOfRange {
        name,
        value: u64::try_from(value).unwrap_or(u64::MAX),
        max: max.into(),
    })
}
