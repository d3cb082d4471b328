//! ピクセルのサンプリング: 画像読み込みと RGB → 正規化HSV 変換

use std::path::Path;

use image::RgbImage;

use crate::error::{GrapheneError, Result};
use crate::types::SampledPoint;

/// 8bit HSV の色相上限 (0..=179)
pub const HUE_RANGE: f64 = 179.0;
/// 8bit HSV の彩度・明度上限 (0..=255)
pub const SV_RANGE: f64 = 255.0;

/// 画像ファイルを読み込み RGB ラスタにデコードする。
///
/// 読めないファイルとデコードできないバイト列は別のエラーになる。
pub fn load_image(path: &Path) -> Result<RgbImage> {
    let bytes = std::fs::read(path).map_err(|source| GrapheneError::ImageRead {
        path: path.to_path_buf(),
        source,
    })?;
    decode_image(&bytes)
}

/// 対応形式の生バイト列を RGB ラスタにデコード
pub fn decode_image(bytes: &[u8]) -> Result<RgbImage> {
    let img = image::load_from_memory(bytes).map_err(|source| GrapheneError::ImageDecode { source })?;
    Ok(img.to_rgb8())
}

/// `(x, y)` のピクセルを取得する。
///
/// 座標は符号付き。ラスタの左や上へのクリックも折り返さず `OutOfBounds` にする。
pub fn sample(image: &RgbImage, x: i64, y: i64) -> Result<SampledPoint> {
    let (width, height) = image.dimensions();
    if x < 0 || y < 0 || x >= width as i64 || y >= height as i64 {
        return Err(GrapheneError::OutOfBounds {
            x,
            y,
            width,
            height,
        });
    }

    let pixel = image.get_pixel(x as u32, y as u32);
    let rgb = (pixel[0], pixel[1], pixel[2]);
    Ok(SampledPoint::from_rgb(rgb))
}

/// RGB を 8bit HSV（色相 0..=179、彩度・明度 0..=255）に変換する。
///
/// 色相は2度単位で四捨五入するので180には届かない。
pub fn rgb_to_hsv8(rgb: (u8, u8, u8)) -> (u8, u8, u8) {
    let (r, g, b) = (rgb.0 as i32, rgb.1 as i32, rgb.2 as i32);
    let v = r.max(g).max(b);
    let min = r.min(g).min(b);
    let diff = v - min;

    let s = if v == 0 {
        0
    } else {
        (255.0 * diff as f64 / v as f64 + 0.5).floor() as i32
    };

    let h = if diff == 0 {
        0
    } else {
        let sector = if v == r {
            g - b
        } else if v == g {
            b - r + 2 * diff
        } else {
            r - g + 4 * diff
        };
        let h = (sector as f64 * 30.0 / diff as f64 + 0.5).floor() as i32;
        if h < 0 {
            h + 180
        } else {
            h
        }
    };

    (h.clamp(0, 179) as u8, s.clamp(0, 255) as u8, v as u8)
}

/// RGB を各チャンネル [0, 1] に正規化した HSV に変換
pub fn rgb_to_hsv_normalized(rgb: (u8, u8, u8)) -> (f64, f64, f64) {
    let (h, s, v) = rgb_to_hsv8(rgb);
    (h as f64 / HUE_RANGE, s as f64 / SV_RANGE, v as f64 / SV_RANGE)
}
