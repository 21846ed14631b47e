use hidapi::{HidApi, HidDevice};

use super::{InputSource, SourceInfo};
use crate::error::CoreError;

// HID usage page / usages for stick-class devices.
const USAGE_PAGE_GENERIC_DESKTOP: u16 = 0x01;
const USAGE_JOYSTICK: u16 = 0x04;
const USAGE_GAMEPAD: u16 = 0x05;

/// Where an axis lives inside the device's input report.
#[derive(Debug, Clone)]
pub struct AxisField {
    pub offset: usize,
    /// true = 16-bit little-endian, false = a single unsigned byte.
    pub wide: bool,
}

/// Fixed-offset input report layout.
///
/// Consumer sticks rarely ship report descriptors worth parsing at runtime;
/// the layout is configured per device class instead. The default matches the
/// common report-id + four 16-bit axes + button bytes arrangement.
#[derive(Debug, Clone)]
pub struct ReportLayout {
    pub axes: Vec<AxisField>,
    pub button_offset: usize,
    pub button_count: usize,
}

impl Default for ReportLayout {
    fn default() -> Self {
        ReportLayout {
            axes: vec![
                AxisField { offset: 1, wide: true },
                AxisField { offset: 3, wide: true },
                AxisField { offset: 5, wide: true },
                AxisField { offset: 7, wide: true },
            ],
            button_offset: 9,
            button_count: 32,
        }
    }
}

/// Physical joystick read over raw HID.
///
/// Reports are drained once per tick via [`HidJoystick::poll`]; axis and
/// button reads decode the newest report. Loss of the device surfaces as an
/// error from `poll` so the scheduler can fall back and re-probe.
pub struct HidJoystick {
    device: HidDevice,
    info: SourceInfo,
    layout: ReportLayout,
    report: Vec<u8>,
}

impl HidJoystick {
    /// Open the first joystick/gamepad-class HID device present.
    pub fn open(layout: ReportLayout) -> Result<Self, CoreError> {
        let api = HidApi::new().map_err(|e| {
            log::debug!("hidapi init failed: {}", e);
            CoreError::InputUnavailable
        })?;

        let candidate = api.device_list().find(|d| {
            d.usage_page() == USAGE_PAGE_GENERIC_DESKTOP
                && (d.usage() == USAGE_JOYSTICK || d.usage() == USAGE_GAMEPAD)
        });
        let Some(info) = candidate else {
            return Err(CoreError::InputUnavailable);
        };

        let name = info
            .product_string()
            .unwrap_or("Unknown joystick")
            .to_string();
        let device = info.open_device(&api).map_err(|e| {
            log::warn!("found '{}' but could not open it: {}", name, e);
            CoreError::InputUnavailable
        })?;
        let _ = device.set_blocking_mode(false);

        Ok(HidJoystick {
            device,
            info: SourceInfo {
                name,
                axes: layout.axes.len(),
                buttons: layout.button_count,
            },
            layout,
            report: Vec::new(),
        })
    }

    /// Drain queued input reports, keeping the newest. An IO error means the
    /// device went away.
    pub fn poll(&mut self) -> Result<(), CoreError> {
        let mut buf = [0u8; 64];
        loop {
            match self.device.read_timeout(&mut buf, 0) {
                Ok(0) => return Ok(()),
                Ok(n) => self.report = buf[..n].to_vec(),
                Err(e) => {
                    log::warn!("input device read failed: {}", e);
                    return Err(CoreError::InputUnavailable);
                }
            }
        }
    }
}

impl InputSource for HidJoystick {
    fn info(&self) -> SourceInfo {
        self.info.clone()
    }

    fn axis(&mut self, index: i32) -> f32 {
        let Ok(index) = usize::try_from(index) else {
            return 0.0;
        };
        let Some(field) = self.layout.axes.get(index) else {
            return 0.0;
        };
        decode_axis(&self.report, field)
    }

    fn button(&mut self, index: usize) -> bool {
        if index >= self.layout.button_count {
            return false;
        }
        let byte = self.layout.button_offset + index / 8;
        match self.report.get(byte) {
            Some(b) => b & (1 << (index % 8)) != 0,
            None => false,
        }
    }
}

fn decode_axis(report: &[u8], field: &AxisField) -> f32 {
    if field.wide {
        let (Some(lo), Some(hi)) = (report.get(field.offset), report.get(field.offset + 1)) else {
            return 0.0;
        };
        let raw = u16::from_le_bytes([*lo, *hi]);
        (raw as f32 / 32767.5 - 1.0).clamp(-1.0, 1.0)
    } else {
        match report.get(field.offset) {
            Some(raw) => (*raw as f32 / 127.5 - 1.0).clamp(-1.0, 1.0),
            None => 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_wide_axis_endpoints_and_center() {
        let field = AxisField { offset: 0, wide: true };
        assert_eq!(decode_axis(&[0x00, 0x00], &field), -1.0);
        assert_eq!(decode_axis(&[0xFF, 0xFF], &field), 1.0);
        let center = decode_axis(&0x8000u16.to_le_bytes(), &field);
        assert!(center.abs() < 0.001);
    }

    #[test]
    fn decode_narrow_axis() {
        let field = AxisField { offset: 0, wide: false };
        assert_eq!(decode_axis(&[0], &field), -1.0);
        assert_eq!(decode_axis(&[255], &field), 1.0);
    }

    #[test]
    fn truncated_report_reads_neutral() {
        let field = AxisField { offset: 4, wide: true };
        assert_eq!(decode_axis(&[1, 2, 3], &field), 0.0);
        assert_eq!(decode_axis(&[], &field), 0.0);
    }
}
