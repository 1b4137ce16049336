//! Audio device selection

use cpal::Device;
use cpal::traits::{DeviceTrait, HostTrait};

use crate::{Error, Result};

/// An enumerated audio device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub index: usize,
    pub name: String,
}

/// Resolve an input device by index, or the host default
///
/// # Errors
///
/// Returns error if the device does not exist
pub fn input_device(index: Option<usize>) -> Result<Device> {
    let host = cpal::default_host();
    match index {
        Some(index) => host
            .input_devices()
            .map_err(|e| Error::Audio(e.to_string()))?
            .nth(index)
            .ok_or_else(|| Error::Audio(format!("no input device at index {index}"))),
        None => host
            .default_input_device()
            .ok_or_else(|| Error::Audio("no input device available".to_string())),
    }
}

/// Resolve an output device by index, or the host default
///
/// # Errors
///
/// Returns error if the device does not exist
pub fn output_device(index: Option<usize>) -> Result<Device> {
    let host = cpal::default_host();
    match index {
        Some(index) => host
            .output_devices()
            .map_err(|e| Error::Audio(e.to_string()))?
            .nth(index)
            .ok_or_else(|| Error::Audio(format!("no output device at index {index}"))),
        None => host
            .default_output_device()
            .ok_or_else(|| Error::Audio("no output device available".to_string())),
    }
}

/// List input and output devices with the indexes the config expects
///
/// # Errors
///
/// Returns error if the host cannot enumerate devices
pub fn list_devices() -> Result<(Vec<DeviceInfo>, Vec<DeviceInfo>)> {
    let host = cpal::default_host();
    let describe = |(index, device): (usize, Device)| DeviceInfo {
        index,
        name: device.name().unwrap_or_else(|_| "<unnamed>".to_string()),
    };

    let inputs = host
        .input_devices()
        .map_err(|e| Error::Audio(e.to_string()))?
        .enumerate()
        .map(describe)
        .collect();
    let outputs = host
        .output_devices()
        .map_err(|e| Error::Audio(e.to_string()))?
        .enumerate()
        .map(describe)
        .collect();

    Ok((inputs, outputs))
}
