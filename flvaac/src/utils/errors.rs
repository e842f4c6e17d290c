use std::fmt::{Display, Formatter};

#[macro_export]
macro_rules! log_or_err {
    ($state:expr, $level:expr, $err:expr $(,)?) => {{
        if $level <= $state.fail_level {
            return Err($err.into());
        } else {
            match $level {
                ::log::Level::Error => ::log::error!("{}", $err),
                ::log::Level::Warn => ::log::warn!("{}", $err),
                ::log::Level::Info => ::log::info!("{}", $err),
                ::log::Level::Debug => ::log::debug!("{}", $err),
                ::log::Level::Trace => ::log::trace!("{}", $err),
            }
        }
    }};
}

/// Coarse classification shared by every error the pipeline reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// A field holds a value the container or codec does not allow.
    Format,
    /// A recognized feature this implementation does not handle.
    FormatUnsupported,
    /// MP3 or an unknown codec id.
    CodecUnsupported,
    /// The external decoder rejected a batch.
    DecodeFailure,
    /// The byte source failed.
    StreamIo,
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKind::Format => write!(f, "FormatError"),
            ErrorKind::FormatUnsupported => write!(f, "FormatUnsupported"),
            ErrorKind::CodecUnsupported => write!(f, "CodecUnsupported"),
            ErrorKind::DecodeFailure => write!(f, "DecodeFailure"),
            ErrorKind::StreamIo => write!(f, "StreamIoError"),
        }
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum DemuxError {
    #[error("Insufficient data for FLV header: {0} bytes")]
    HeaderTruncated(usize),

    #[error("FLV signature mismatch: {0:02X?}")]
    SignatureMismatch([u8; 4]),

    #[error("FLV header size must be at least 9, got {0}")]
    HeaderTooSmall(u32),

    #[error("FLV header size {0} is larger than the supported maximum")]
    HeaderTooLarge(u32),

    #[error("First parse does not start at data offset {expected} (got {found})")]
    UnexpectedFirstOffset { expected: usize, found: usize },

    #[error("PrevTagSize0 is {0}, expected 0")]
    NonZeroPrevTagSize0(u32),

    #[error("Unsupported tag type {0}, skipped")]
    UnsupportedTagType(u8),

    #[error("Tag has StreamID {0}, expected 0")]
    NonZeroStreamId(u32),

    #[error("Invalid PrevTagSize {found}, expected {expected}")]
    TagSizeMismatch { found: u32, expected: u32 },

    #[error("Invalid audio packet, missing SoundData payload")]
    EmptyAudioPacket,

    #[error("Invalid AAC packet, missing AACPacketType or data")]
    EmptyAacPacket,

    #[error("Unsupported audio codec idx: {0}")]
    UnsupportedCodec(u8),

    #[error("Unsupported audio codec idx: MP3")]
    Mp3Unsupported,

    #[error("Invalid audio sample rate idx: {0}")]
    InvalidSoundRate(u8),

    #[error("Unsupported AAC data type {0}")]
    UnsupportedPacketType(u8),

    #[error("Found another AudioSpecificConfig")]
    DuplicateSequenceHeader,

    #[error("AudioSpecificConfig truncated: {0}")]
    ConfigTruncated(String),

    #[error("AAC invalid sampling frequency index: {0}")]
    InvalidSamplingIndex(u8),

    #[error("AAC invalid channel configuration: {0}")]
    InvalidChannelConfig(u8),
}

impl DemuxError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DemuxError::UnsupportedCodec(_) | DemuxError::Mp3Unsupported => {
                ErrorKind::CodecUnsupported
            }
            DemuxError::UnsupportedPacketType(_) | DemuxError::UnsupportedTagType(_) => {
                ErrorKind::FormatUnsupported
            }
            _ => ErrorKind::Format,
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum DecodeError {
    #[error("Decoder rejected batch: {0}")]
    Rejected(String),

    #[error("Decoder produced no audio for {0} bytes of input")]
    NoAudio(usize),

    #[error("Decode worker is gone")]
    WorkerGone,
}

#[derive(thiserror::Error, Debug)]
pub enum StreamError {
    #[error("Byte source I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Byte source aborted: {0}")]
    Aborted(String),
}

#[derive(thiserror::Error, Debug)]
pub enum PlaybackError {
    #[error("Playback sink failed to start unit {unit}: {reason}")]
    StartFailed { unit: u64, reason: String },
}

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("No decode backend configured")]
    MissingDecoder,

    #[error("No playback sink configured")]
    MissingSink,

    #[error("Decode throttle must be at least 1")]
    ZeroThrottle,
}

#[derive(thiserror::Error, Debug)]
pub enum SessionError {
    #[error(transparent)]
    Demux(#[from] DemuxError),

    #[error(transparent)]
    Stream(#[from] StreamError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Session was destroyed")]
    Destroyed,
}

impl SessionError {
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            SessionError::Demux(e) => Some(e.kind()),
            SessionError::Stream(_) => Some(ErrorKind::StreamIo),
            SessionError::Config(_) | SessionError::Destroyed => None,
        }
    }
}

#[test]
fn demux_error_kinds() {
    assert_eq!(DemuxError::Mp3Unsupported.kind(), ErrorKind::CodecUnsupported);
    assert_eq!(DemuxError::UnsupportedCodec(7).kind(), ErrorKind::CodecUnsupported);
    assert_eq!(
        DemuxError::UnsupportedPacketType(3).kind(),
        ErrorKind::FormatUnsupported
    );
    assert_eq!(DemuxError::InvalidSamplingIndex(13).kind(), ErrorKind::Format);
    assert_eq!(DemuxError::InvalidSoundRate(5).to_string(), "Invalid audio sample rate idx: 5");
}
