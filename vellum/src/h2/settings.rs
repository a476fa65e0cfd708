//! SETTINGS payload encoding/decoding (RFC 7540 §6.5): six recognized
//! 16-bit ids each paired with a 32-bit value, unknown ids ignored on
//! decode, and RFC-default values omitted on encode so a peer that never
//! changes a setting never even sees it mentioned.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum SettingId {
    HeaderTableSize = 0x1,
    EnablePush = 0x2,
    MaxConcurrentStreams = 0x3,
    InitialWindowSize = 0x4,
    MaxFrameSize = 0x5,
    MaxHeaderListSize = 0x6,
}

impl SettingId {
    fn from_u16(v: u16) -> Option<Self> {
        Some(match v {
            0x1 => Self::HeaderTableSize,
            0x2 => Self::EnablePush,
            0x3 => Self::MaxConcurrentStreams,
            0x4 => Self::InitialWindowSize,
            0x5 => Self::MaxFrameSize,
            0x6 => Self::MaxHeaderListSize,
            _ => return None,
        })
    }
}

/// A full set of SETTINGS values, always populated (every field defaults to
/// its RFC 7540 §6.5.2 value so `apply` never needs an `Option`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SettingsValues {
    pub header_table_size: u32,
    pub enable_push: bool,
    pub max_concurrent_streams: u32,
    pub initial_window_size: u32,
    pub max_frame_size: u32,
    pub max_header_list_size: u32,
}

impl Default for SettingsValues {
    fn default() -> Self {
        Self {
            header_table_size: 4096,
            enable_push: true,
            max_concurrent_streams: u32::MAX,
            initial_window_size: 65_535,
            max_frame_size: 16_384,
            max_header_list_size: u32::MAX,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SettingsError {
    #[error("SETTINGS payload length {0} is not a multiple of 6")]
    Malformed(usize),
    #[error("ENABLE_PUSH must be 0 or 1, got {0}")]
    InvalidEnablePush(u32),
    #[error("MAX_FRAME_SIZE {0} outside [16384, 16777215]")]
    InvalidMaxFrameSize(u32),
    #[error("INITIAL_WINDOW_SIZE {0} exceeds the 31-bit flow-control maximum")]
    InvalidInitialWindowSize(u32),
}

impl SettingsValues {
    /// Writes only the settings that differ from the RFC default.
    pub fn encode_diff(&self, out: &mut Vec<u8>) {
        let default = Self::default();
        let mut push = |id: SettingId, value: u32| {
            out.extend_from_slice(&(id as u16).to_be_bytes());
            out.extend_from_slice(&value.to_be_bytes());
        };
        if self.header_table_size != default.header_table_size {
            push(SettingId::HeaderTableSize, self.header_table_size);
        }
        if self.enable_push != default.enable_push {
            push(SettingId::EnablePush, self.enable_push as u32);
        }
        if self.max_concurrent_streams != default.max_concurrent_streams {
            push(SettingId::MaxConcurrentStreams, self.max_concurrent_streams);
        }
        if self.initial_window_size != default.initial_window_size {
            push(SettingId::InitialWindowSize, self.initial_window_size);
        }
        if self.max_frame_size != default.max_frame_size {
            push(SettingId::MaxFrameSize, self.max_frame_size);
        }
        if self.max_header_list_size != default.max_header_list_size {
            push(SettingId::MaxHeaderListSize, self.max_header_list_size);
        }
    }

    /// Decodes a SETTINGS payload into `(id, value)` pairs; entries with an
    /// unrecognized id are silently dropped (RFC 7540 §6.5.2: "an endpoint
    /// that receives a SETTINGS frame with any unknown or unsupported
    /// identifier MUST ignore that setting").
    pub fn decode_pairs(buf: &[u8]) -> Result<Vec<(SettingId, u32)>, SettingsError> {
        if buf.len() % 6 != 0 {
            return Err(SettingsError::Malformed(buf.len()));
        }
        let mut out = Vec::with_capacity(buf.len() / 6);
        for chunk in buf.chunks_exact(6) {
            let id = u16::from_be_bytes([chunk[0], chunk[1]]);
            let value = u32::from_be_bytes([chunk[2], chunk[3], chunk[4], chunk[5]]);
            if let Some(id) = SettingId::from_u16(id) {
                out.push((id, value));
            }
        }
        Ok(out)
    }

    /// Applies one decoded `(id, value)` pair, validating per spec §4.J.
    pub fn apply(&mut self, id: SettingId, value: u32) -> Result<(), SettingsError> {
        match id {
            SettingId::HeaderTableSize => self.header_table_size = value,
            SettingId::EnablePush => {
                if value > 1 {
                    return Err(SettingsError::InvalidEnablePush(value));
                }
                self.enable_push = value == 1;
            }
            SettingId::MaxConcurrentStreams => self.max_concurrent_streams = value,
            SettingId::InitialWindowSize => {
                if value > 0x7fff_ffff {
                    return Err(SettingsError::InvalidInitialWindowSize(value));
                }
                self.initial_window_size = value;
            }
            SettingId::MaxFrameSize => {
                if !(16_384..=16_777_215).contains(&value) {
                    return Err(SettingsError::InvalidMaxFrameSize(value));
                }
                self.max_frame_size = value;
            }
            SettingId::MaxHeaderListSize => self.max_header_list_size = value,
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_diff_omits_rfc_defaults() {
        let v = SettingsValues::default();
        let mut out = Vec::new();
        v.encode_diff(&mut out);
        assert!(out.is_empty());
    }

    #[test]
    fn encode_diff_includes_changed_fields_only() {
        let mut v = SettingsValues::default();
        v.max_concurrent_streams = 100;
        let mut out = Vec::new();
        v.encode_diff(&mut out);
        assert_eq!(out.len(), 6);
        let pairs = SettingsValues::decode_pairs(&out).unwrap();
        assert_eq!(pairs, vec![(SettingId::MaxConcurrentStreams, 100)]);
    }

    #[test]
    fn decode_ignores_unknown_ids() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&0x99u16.to_be_bytes());
        buf.extend_from_slice(&1u32.to_be_bytes());
        buf.extend_from_slice(&(SettingId::EnablePush as u16).to_be_bytes());
        buf.extend_from_slice(&0u32.to_be_bytes());
        let pairs = SettingsValues::decode_pairs(&buf).unwrap();
        assert_eq!(pairs, vec![(SettingId::EnablePush, 0)]);
    }

    #[test]
    fn apply_rejects_out_of_range_values() {
        let mut v = SettingsValues::default();
        assert!(v.apply(SettingId::EnablePush, 2).is_err());
        assert!(v.apply(SettingId::MaxFrameSize, 100).is_err());
        assert!(v.apply(SettingId::InitialWindowSize, 0x8000_0000).is_err());
        assert!(v.apply(SettingId::MaxFrameSize, 16_384).is_ok());
    }

    #[test]
    fn malformed_length_is_rejected() {
        assert!(matches!(SettingsValues::decode_pairs(&[1, 2, 3]), Err(SettingsError::Malformed(3))));
    }
}
