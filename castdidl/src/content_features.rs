//! DLNA `contentFeatures.dlna.org` descriptor
//!
//! Renderers use this string (in the `ContentFeatures.DLNA.ORG` HTTP header and
//! in the fourth field of a `protocolInfo`) to negotiate seek and transcode
//! support for a resource.

use std::fmt;

pub const DLNA_ORG_FLAG_SENDER_PACED: u32 = 1 << 31;
pub const DLNA_ORG_FLAG_TIME_BASED_SEEK: u32 = 1 << 30;
pub const DLNA_ORG_FLAG_BYTE_BASED_SEEK: u32 = 1 << 29;
pub const DLNA_ORG_FLAG_PLAY_CONTAINER: u32 = 1 << 28;
pub const DLNA_ORG_FLAG_S0_INCREASE: u32 = 1 << 27;
pub const DLNA_ORG_FLAG_SN_INCREASE: u32 = 1 << 26;
pub const DLNA_ORG_FLAG_RTSP_PAUSE: u32 = 1 << 25;
pub const DLNA_ORG_FLAG_STREAMING_TRANSFER_MODE: u32 = 1 << 24;
pub const DLNA_ORG_FLAG_INTERACTIVE_TRANSFER_MODE: u32 = 1 << 23;
pub const DLNA_ORG_FLAG_BACKGROUND_TRANSFER_MODE: u32 = 1 << 22;
pub const DLNA_ORG_FLAG_CONNECTION_STALL: u32 = 1 << 21;
pub const DLNA_ORG_FLAG_DLNA_V15: u32 = 1 << 20;
pub const DLNA_ORG_FLAG_LINK_PROTECTED: u32 = 1 << 16;
pub const DLNA_ORG_FLAG_CLEAR_TEXT_BYTE_SEEK_FULL: u32 = 1 << 15;
pub const DLNA_ORG_FLAG_CLEAR_TEXT_BYTE_SEEK_LIMITED: u32 = 1 << 14;

/// Flags advertised for a live, non-seekable, sender-side transcoded stream.
pub const LIVE_STREAM_FLAGS: u32 = DLNA_ORG_FLAG_STREAMING_TRANSFER_MODE
    | DLNA_ORG_FLAG_BACKGROUND_TRANSFER_MODE
    | DLNA_ORG_FLAG_CONNECTION_STALL
    | DLNA_ORG_FLAG_DLNA_V15;

/// Capability descriptor of a served resource.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContentFeatures {
    pub profile_name: String,
    pub support_time_seek: bool,
    pub support_range: bool,
    pub transcoded: bool,
    pub flags: u32,
}

impl ContentFeatures {
    /// Descriptor for a live transcoded stream of the given profile.
    pub fn live(profile_name: impl Into<String>) -> Self {
        Self {
            profile_name: profile_name.into(),
            support_time_seek: false,
            support_range: false,
            transcoded: true,
            flags: LIVE_STREAM_FLAGS,
        }
    }
}

/// `DLNA.ORG_FLAGS` field: 8 hex digits of primary flags followed by 24 reserved zeros.
pub fn format_dlna_flags(flags: u32) -> String {
    format!("DLNA.ORG_FLAGS={:08x}{:024x}", flags, 0)
}

impl fmt::Display for ContentFeatures {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.profile_name.is_empty() {
            write!(f, "DLNA.ORG_PN={};", self.profile_name)?;
        }
        if self.support_time_seek || self.support_range {
            write!(
                f,
                "DLNA.ORG_OP={}{};",
                u8::from(self.support_time_seek),
                u8::from(self.support_range)
            )?;
        }
        if self.transcoded {
            f.write_str("DLNA.ORG_CI=1;")?;
        }
        f.write_str(&format_dlna_flags(self.flags))
    }
}
