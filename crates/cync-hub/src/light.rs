//! Device state mapping
//!
//! A [`Light`] holds the logical state of one registered device and turns
//! decoded status fields into characteristic changes for the accessory
//! layer. The [`DeviceRegistry`] owns every light and indexes it by mesh id
//! and switch id for inbound routing.

use cync_core::color::{hsv_to_rgb, mired_to_temp, rgb_to_hsv, temp_to_mired, with_hue, Hsv};
use cync_core::{Device, DeviceState, Home};
use std::collections::HashMap;
use std::time::Instant;
use tokio::sync::watch;

use crate::Result;

/// A value the accessory layer exposes for a light
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Characteristic {
    On(bool),
    Brightness(u8),
    /// Mireds
    ColorTemperature(u16),
    /// Degrees, 0-360
    Hue(u16),
    /// Percent
    Saturation(u8),
}

/// A state change requested by the accessory layer
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Control {
    On(bool),
    Brightness(u8),
    Hue(f64),
    Saturation(f64),
    /// Mireds
    ColorTemperature(u16),
}

fn characteristics(state: &DeviceState) -> [Characteristic; 5] {
    let hsv = rgb_to_hsv(state.rgb);
    [
        Characteristic::On(state.on),
        Characteristic::Brightness(state.brightness),
        Characteristic::ColorTemperature(temp_to_mired(state.color_temp)),
        Characteristic::Hue(hsv.h.round() as u16),
        Characteristic::Saturation(hsv.s.round() as u8),
    ]
}

/// One registered device and its current state
#[derive(Debug)]
pub struct Light {
    device: Device,
    home: Home,
    state: watch::Sender<DeviceState>,
    /// Last requested hue; a white light carries none in its RGB
    hue: Option<f64>,
    /// When the next connection check for this device is due
    pub(crate) next_liveness: Instant,
}

impl Light {
    fn new(device: Device, home: Home, next_liveness: Instant) -> Self {
        let (state, _) = watch::channel(DeviceState::default());
        Self {
            device,
            home,
            state,
            hue: None,
            next_liveness,
        }
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    pub fn home(&self) -> &Home {
        &self.home
    }

    pub fn state(&self) -> DeviceState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<DeviceState> {
        self.state.subscribe()
    }

    /// Apply state reported by the relay; absent fields keep their value.
    ///
    /// Returns the characteristics whose externally visible value changed.
    pub fn update_state(
        &mut self,
        on: bool,
        brightness: u8,
        color_temp: Option<u8>,
        rgb: Option<[u8; 3]>,
    ) -> Vec<Characteristic> {
        let before = self.state();
        let after = DeviceState {
            on,
            brightness,
            color_temp: color_temp.unwrap_or(before.color_temp),
            rgb: rgb.unwrap_or(before.rgb),
        };
        if after.rgb != before.rgb {
            self.hue = None;
        }
        self.state.send_replace(after);

        characteristics(&before)
            .into_iter()
            .zip(characteristics(&after))
            .filter(|(old, new)| old != new)
            .map(|(_, new)| new)
            .collect()
    }

    /// Apply a requested change locally, before it is confirmed on the wire.
    ///
    /// Nothing is rolled back if the command never reaches the relay; the
    /// next sync or status frame for this device overwrites the state.
    pub fn apply_control(&mut self, control: Control) -> DeviceState {
        let mut state = self.state();
        match control {
            Control::On(on) => state.on = on,
            Control::Brightness(brightness) => state.brightness = brightness.min(100),
            Control::Hue(hue) => {
                self.hue = Some(hue);
                state.rgb = with_hue(state.rgb, hue);
            }
            Control::Saturation(saturation) => {
                let hsv = rgb_to_hsv(state.rgb);
                state.rgb = hsv_to_rgb(Hsv {
                    h: self.hue.unwrap_or(hsv.h),
                    s: saturation,
                    v: hsv.v,
                });
            }
            Control::ColorTemperature(mired) => state.color_temp = mired_to_temp(mired),
        }
        self.state.send_replace(state);
        state
    }
}

/// Registered lights, indexed for inbound routing
#[derive(Debug, Default)]
pub struct DeviceRegistry {
    lights: HashMap<u32, Light>,
    by_mesh: HashMap<u16, u32>,
    by_switch: HashMap<u32, u32>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a device, deriving its mesh id from `home`.
    ///
    /// Registering a known device id again refreshes its metadata and keeps
    /// its state.
    pub fn register(
        &mut self,
        mut device: Device,
        home: Home,
        next_liveness: Instant,
    ) -> Result<&Light> {
        device.assign_mesh_id(&home)?;
        let device_id = device.device_id;

        if let Some(previous) = self.lights.get(&device_id) {
            let mesh_id = previous.device.mesh_id;
            let switch_id = previous.device.switch_id;
            self.unindex(device_id, mesh_id, switch_id);
        }

        self.by_mesh.insert(device.mesh_id, device_id);
        self.by_switch.entry(device.switch_id).or_insert(device_id);

        let light = match self.lights.remove(&device_id) {
            Some(mut light) => {
                light.device = device;
                light.home = home;
                light
            }
            None => Light::new(device, home, next_liveness),
        };
        Ok(self.lights.entry(device_id).or_insert(light))
    }

    pub fn deregister(&mut self, device_id: u32) -> Option<Light> {
        let light = self.lights.remove(&device_id)?;
        self.unindex(device_id, light.device.mesh_id, light.device.switch_id);
        Some(light)
    }

    fn unindex(&mut self, device_id: u32, mesh_id: u16, switch_id: u32) {
        if self.by_mesh.get(&mesh_id) == Some(&device_id) {
            self.by_mesh.remove(&mesh_id);
            if let Some(other) = self
                .lights
                .values()
                .find(|l| l.device.mesh_id == mesh_id && l.device.device_id != device_id)
            {
                self.by_mesh.insert(mesh_id, other.device.device_id);
            }
        }
        if self.by_switch.get(&switch_id) == Some(&device_id) {
            self.by_switch.remove(&switch_id);
            // another light behind the same switch takes over
            if let Some(other) = self
                .lights
                .values()
                .find(|l| l.device.switch_id == switch_id && l.device.device_id != device_id)
            {
                self.by_switch.insert(switch_id, other.device.device_id);
            }
        }
    }

    pub fn get(&self, device_id: u32) -> Option<&Light> {
        self.lights.get(&device_id)
    }

    pub fn get_mut(&mut self, device_id: u32) -> Option<&mut Light> {
        self.lights.get_mut(&device_id)
    }

    pub fn by_mesh_mut(&mut self, mesh_id: u16) -> Option<&mut Light> {
        let device_id = *self.by_mesh.get(&mesh_id)?;
        self.lights.get_mut(&device_id)
    }

    pub fn by_switch(&self, switch_id: u32) -> Option<&Light> {
        let device_id = *self.by_switch.get(&switch_id)?;
        self.lights.get(&device_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Light> {
        self.lights.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Light> {
        self.lights.values_mut()
    }

    pub fn len(&self) -> usize {
        self.lights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lights.is_empty()
    }
}
