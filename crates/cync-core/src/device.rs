//! Device model and mesh addressing

use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// Device types that accept a brightness level
const DEVICES_WITH_BRIGHTNESS: &[u16] = &[
    1, 5, 6, 7, 8, 9, 10, 11, 13, 14, 15, 17, 18, 19, 20, 21, 22, 23, 24, 25, 26, 27, 28, 29, 30,
    31, 32, 33, 34, 35, 36, 37, 48, 49, 55, 56, 80, 81, 82, 83, 85, 128, 129, 130, 131, 132, 133,
    134, 135, 136, 137, 138, 139, 140, 141, 142, 143, 144, 145, 146, 147, 148, 149, 150, 151, 152,
    153, 154, 156, 158, 159, 160, 161, 162, 163, 164, 165,
];

/// Device types with tunable white
const DEVICES_WITH_COLOR_TEMP: &[u16] = &[
    5, 6, 7, 8, 10, 11, 14, 15, 19, 20, 21, 22, 23, 25, 26, 28, 29, 30, 31, 32, 33, 34, 35, 80, 82,
    83, 85, 129, 130, 131, 132, 133, 135, 136, 137, 138, 139, 140, 141, 142, 143, 144, 145, 146,
    147, 153, 154, 156, 158, 159, 160, 161, 162, 163, 164, 165,
];

/// Device types with full color
const DEVICES_WITH_RGB: &[u16] = &[
    6, 7, 8, 21, 22, 23, 30, 31, 32, 33, 34, 35, 131, 132, 133, 137, 138, 139, 140, 141, 142, 143,
    146, 147, 153, 154, 156, 158, 159, 160, 161, 162, 163, 164, 165,
];

/// A home groups devices that share one mesh
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Home {
    pub id: u32,
    #[serde(default)]
    pub product_id: String,
}

/// A bulb or switch as reported by the cloud API
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    #[serde(rename = "deviceID")]
    pub device_id: u32,
    #[serde(rename = "switchID")]
    pub switch_id: u32,
    #[serde(rename = "displayName", default)]
    pub display_name: String,
    #[serde(rename = "deviceType", default)]
    pub device_type: u16,
    #[serde(default)]
    pub mac: String,
    #[serde(rename = "firmwareVersion", default)]
    pub firmware_version: String,
    /// Derived from `device_id` and the owning home at registration
    #[serde(skip)]
    pub mesh_id: u16,
}

impl Device {
    pub fn new(device_id: u32, switch_id: u32, display_name: impl Into<String>) -> Self {
        Self {
            device_id,
            switch_id,
            display_name: display_name.into(),
            device_type: 0,
            mac: String::new(),
            firmware_version: String::new(),
            mesh_id: 0,
        }
    }

    pub fn with_device_type(mut self, device_type: u16) -> Self {
        self.device_type = device_type;
        self
    }

    pub fn with_mac(mut self, mac: impl Into<String>) -> Self {
        self.mac = mac.into();
        self
    }

    /// Compute and store the mesh id for this device within `home`
    pub fn assign_mesh_id(&mut self, home: &Home) -> Result<u16> {
        self.mesh_id = mesh_id(self.device_id, home.id)?;
        Ok(self.mesh_id)
    }

    pub fn capabilities(&self) -> Capabilities {
        Capabilities::for_device_type(self.device_type)
    }
}

/// Which characteristics a device type supports beyond on/off
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Capabilities {
    pub brightness: bool,
    pub color_temperature: bool,
    pub rgb: bool,
}

impl Capabilities {
    pub fn for_device_type(device_type: u16) -> Self {
        Self {
            brightness: DEVICES_WITH_BRIGHTNESS.contains(&device_type),
            color_temperature: DEVICES_WITH_COLOR_TEMP.contains(&device_type),
            rgb: DEVICES_WITH_RGB.contains(&device_type),
        }
    }
}

/// Derive the 2-byte mesh address of a device.
///
/// `(d mod h) mod 1000` lands in the low range; every started thousand
/// (rounded half up) moves the address by 256. Pairs whose address does not
/// fit in two bytes are rejected.
pub fn mesh_id(device_id: u32, home_id: u32) -> Result<u16> {
    if home_id == 0 {
        return Err(Error::InvalidHomeId(home_id));
    }
    let local = u64::from(device_id % home_id);
    let bucket = (local + 500) / 1000;
    u16::try_from(local % 1000 + bucket * 256)
        .map_err(|_| Error::MeshIdOutOfRange { device_id, home_id })
}

/// Logical state of a light
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceState {
    pub on: bool,
    /// 0-100
    pub brightness: u8,
    /// Vendor scale 0-100
    pub color_temp: u8,
    pub rgb: [u8; 3],
}

impl Default for DeviceState {
    fn default() -> Self {
        Self {
            on: false,
            brightness: 0,
            color_temp: 13,
            rgb: [255, 255, 255],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mesh_id_example() {
        assert_eq!(mesh_id(2500, 1000).unwrap(), 500);
    }

    #[test]
    fn test_mesh_id_rounds_half_up() {
        // 1500 mod 1000 = 500, round(1.5) = 2
        assert_eq!(mesh_id(1500, 10_000).unwrap(), 500 + 512);
        // 1499 -> round(1.499) = 1
        assert_eq!(mesh_id(1499, 10_000).unwrap(), 499 + 256);
    }

    #[test]
    fn test_mesh_id_zero_home() {
        assert_eq!(mesh_id(1, 0), Err(Error::InvalidHomeId(0)));
    }

    #[test]
    fn test_mesh_id_at_u32_boundary() {
        assert_eq!(
            mesh_id(u32::MAX - 1, u32::MAX),
            Err(Error::MeshIdOutOfRange {
                device_id: u32::MAX - 1,
                home_id: u32::MAX
            })
        );
        assert_eq!(mesh_id(252_400, u32::MAX).unwrap(), 400 + 252 * 256);
        // 500 + 255 * 256 no longer fits in two bytes
        assert!(mesh_id(254_500, u32::MAX).is_err());
    }

    #[test]
    fn test_capabilities() {
        let caps = Capabilities::for_device_type(6);
        assert!(caps.brightness && caps.color_temperature && caps.rgb);

        let caps = Capabilities::for_device_type(1);
        assert!(caps.brightness);
        assert!(!caps.color_temperature);
        assert!(!caps.rgb);

        assert_eq!(Capabilities::for_device_type(0), Capabilities::default());
    }

    #[test]
    fn test_default_state() {
        let state = DeviceState::default();
        assert!(!state.on);
        assert_eq!(state.brightness, 0);
        assert_eq!(state.color_temp, 13);
        assert_eq!(state.rgb, [255, 255, 255]);
    }
}
