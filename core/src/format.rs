use crate::FdiskError;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Hardware model id 3 (mega65r3) carries 8 MiB core slots in flash.
pub const MODEL_MEGA65_R3: u8 = 3;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum VideoMode {
    Pal,
    Ntsc,
}

impl VideoMode {
    pub fn config_byte(self) -> u8 {
        match self {
            VideoMode::Pal => 0x00,
            VideoMode::Ntsc => 0x80,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FloppySource {
    SdCard,
    Drive,
}

impl FloppySource {
    pub fn config_byte(self) -> u8 {
        match self {
            FloppySource::SdCard => 0x00,
            FloppySource::Drive => 0x01,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum DmagicRevision {
    F011A,
    F011B,
}

impl DmagicRevision {
    pub fn config_byte(self) -> u8 {
        match self {
            DmagicRevision::F011A => 0x00,
            DmagicRevision::F011B => 0x01,
        }
    }
}

/// Defaults written to the system configuration sector so the hypervisor
/// does not report an invalid configuration on first boot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SystemConfig {
    pub video_mode: VideoMode,
    /// Audio amplifier enable plus mono output.
    pub audio_flags: u8,
    pub floppy_source: FloppySource,
    pub auto_amiga_mouse: bool,
    #[serde(with = "mac_address")]
    pub mac_address: [u8; 6],
    pub default_disk_image: String,
    pub dmagic: DmagicRevision,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            video_mode: VideoMode::Ntsc,
            audio_flags: 0x41,
            floppy_source: FloppySource::SdCard,
            auto_amiga_mouse: true,
            mac_address: [0x41; 6],
            default_disk_image: "mega65.d81".to_string(),
            dmagic: DmagicRevision::F011B,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct FormatOptions {
    /// Label written to the root directory volume entry.
    pub volume_label: String,
    pub hardware_model_id: u8,
    pub system_config: SystemConfig,
}

impl Default for FormatOptions {
    fn default() -> Self {
        Self {
            volume_label: "M.E.G.A.65!".to_string(),
            hardware_model_id: 0xFF,
            system_config: SystemConfig::default(),
        }
    }
}

impl FormatOptions {
    pub fn from_file(path: &Path) -> Result<Self, FdiskError> {
        let text = std::fs::read_to_string(path)?;
        let options: FormatOptions = serde_json::from_str(&text)?;
        options.validate()?;
        Ok(options)
    }

    pub fn validate(&self) -> Result<(), FdiskError> {
        if !self.volume_label.is_ascii() || self.volume_label.len() > 11 {
            return Err(FdiskError::InvalidInput(format!(
                "Volume label must be at most 11 ASCII characters: {:?}",
                self.volume_label
            )));
        }

        let image = &self.system_config.default_disk_image;
        if !image.is_ascii() || image.len() > 16 {
            return Err(FdiskError::InvalidInput(format!(
                "Default disk image name must be at most 16 ASCII characters: {:?}",
                image
            )));
        }

        Ok(())
    }

    /// Space-padded 11 byte label.
    pub fn volume_label_bytes(&self) -> [u8; 11] {
        let mut label = [b' '; 11];
        for (slot, byte) in label.iter_mut().zip(self.volume_label.bytes()) {
            *slot = byte;
        }
        label
    }

    /// Distance between core slots in flash.
    pub fn flash_slot_size(&self) -> u32 {
        if self.hardware_model_id == MODEL_MEGA65_R3 {
            8 * 1024 * 1024
        } else {
            4 * 1024 * 1024
        }
    }
}

/// Serialises a MAC address as colon separated hex, e.g. "41:41:41:41:41:41".
mod mac_address {
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(mac: &[u8; 6], serializer: S) -> Result<S::Ok, S::Error> {
        let text = mac
            .iter()
            .map(|byte| hex::encode_upper([*byte]))
            .collect::<Vec<_>>()
            .join(":");
        serializer.serialize_str(&text)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<[u8; 6], D::Error> {
        let text = String::deserialize(deserializer)?;
        let digits: String = text.chars().filter(|c| *c != ':' && *c != '-').collect();
        let mut mac = [0u8; 6];
        hex::decode_to_slice(&digits, &mut mac).map_err(D::Error::custom)?;
        Ok(mac)
    }
}
