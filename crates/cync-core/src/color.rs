//! Color conversions
//!
//! The hub speaks a 0-100 vendor scale for white temperature and 8-bit RGB
//! for color; accessory layers speak mireds and hue/saturation.

/// Hue/saturation/value triple (h: 0-360, s and v: 0-100)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Hsv {
    pub h: f64,
    pub s: f64,
    pub v: f64,
}

/// Vendor temperature (0-100) to mireds
pub fn temp_to_mired(temp: u8) -> u16 {
    (1_000_000.0 / (2000.0 + 51.0 * temp as f64)).round() as u16
}

/// Mireds to vendor temperature, clamped to 0-100
pub fn mired_to_temp(mired: u16) -> u8 {
    if mired == 0 {
        return 100;
    }
    let temp = ((1_000_000.0 / mired as f64 - 2000.0) / 51.0).round();
    temp.clamp(0.0, 100.0) as u8
}

pub fn rgb_to_hsv(rgb: [u8; 3]) -> Hsv {
    let r = rgb[0] as f64 / 255.0;
    let g = rgb[1] as f64 / 255.0;
    let b = rgb[2] as f64 / 255.0;

    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let delta = max - min;

    let h = if delta == 0.0 {
        0.0
    } else if max == r {
        60.0 * ((g - b) / delta).rem_euclid(6.0)
    } else if max == g {
        60.0 * ((b - r) / delta + 2.0)
    } else {
        60.0 * ((r - g) / delta + 4.0)
    };
    let s = if max == 0.0 { 0.0 } else { delta / max };

    Hsv {
        h,
        s: s * 100.0,
        v: max * 100.0,
    }
}

pub fn hsv_to_rgb(hsv: Hsv) -> [u8; 3] {
    let h = hsv.h.rem_euclid(360.0) / 60.0;
    let s = (hsv.s / 100.0).clamp(0.0, 1.0);
    let v = (hsv.v / 100.0).clamp(0.0, 1.0);

    let c = v * s;
    let x = c * (1.0 - (h.rem_euclid(2.0) - 1.0).abs());
    let m = v - c;

    let (r, g, b) = match h as u8 {
        0 => (c, x, 0.0),
        1 => (x, c, 0.0),
        2 => (0.0, c, x),
        3 => (0.0, x, c),
        4 => (x, 0.0, c),
        _ => (c, 0.0, x),
    };

    let scale = |channel: f64| ((channel + m) * 255.0).round().clamp(0.0, 255.0) as u8;
    [scale(r), scale(g), scale(b)]
}

/// Replace the hue of `rgb`, keeping saturation and value
pub fn with_hue(rgb: [u8; 3], hue: f64) -> [u8; 3] {
    let hsv = rgb_to_hsv(rgb);
    hsv_to_rgb(Hsv { h: hue, ..hsv })
}

/// Replace the saturation of `rgb`, keeping hue and value
pub fn with_saturation(rgb: [u8; 3], saturation: f64) -> [u8; 3] {
    let hsv = rgb_to_hsv(rgb);
    hsv_to_rgb(Hsv {
        s: saturation,
        ..hsv
    })
}
