//! Color conversion tests

use cync_core::color::{
    hsv_to_rgb, mired_to_temp, rgb_to_hsv, temp_to_mired, with_hue, with_saturation, Hsv,
};

#[test]
fn test_temperature_roundtrip_within_one() {
    for temp in 1..=100u8 {
        let back = mired_to_temp(temp_to_mired(temp));
        assert!(
            (back as i16 - temp as i16).abs() <= 1,
            "temp {} came back as {}",
            temp,
            back
        );
    }
}

#[test]
fn test_temperature_example() {
    assert_eq!(temp_to_mired(50), 220);
    assert_eq!(mired_to_temp(220), 50);
}

#[test]
fn test_set_hue_keeps_saturation_and_value() {
    let red = [255, 0, 0];
    let green = with_hue(red, 120.0);
    assert_eq!(green, [0, 255, 0]);

    let hsv = rgb_to_hsv(green);
    assert_eq!(hsv.s, 100.0);
    assert_eq!(hsv.v, 100.0);
}

#[test]
fn test_set_saturation_keeps_hue_and_value() {
    let blue = [0, 0, 255];
    let white = with_saturation(blue, 0.0);
    assert_eq!(white, [255, 255, 255]);

    let back = with_saturation(blue, 100.0);
    assert_eq!(back, blue);
    let hsv = rgb_to_hsv(back);
    assert_eq!(hsv.h, 240.0);
    assert_eq!(hsv.v, 100.0);
}

#[test]
fn test_hsv_rgb_roundtrip_for_byte_colors() {
    for rgb in [[10, 20, 30], [255, 128, 0], [1, 2, 3], [200, 200, 200], [0, 0, 0]] {
        assert_eq!(hsv_to_rgb(rgb_to_hsv(rgb)), rgb, "rgb {:?}", rgb);
    }
}

#[test]
fn test_hue_wraps() {
    let a = hsv_to_rgb(Hsv { h: 360.0, s: 100.0, v: 100.0 });
    let b = hsv_to_rgb(Hsv { h: 0.0, s: 100.0, v: 100.0 });
    assert_eq!(a, b);
}
