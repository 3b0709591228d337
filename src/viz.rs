//! Class-index colorization and label-vs-prediction snapshots.

use std::path::Path;

use anyhow::{Context, Result};
use image::RgbImage;

/// Deterministic color for a class index (VOC-style bit-reversal colormap);
/// class 0 is black.
pub fn class_color(index: usize) -> [u8; 3] {
    let mut c = index;
    let (mut r, mut g, mut b) = (0u8, 0u8, 0u8);
    let mut shift = 7u32;
    while c > 0 && shift < 8 {
        r |= ((c & 1) as u8) << shift;
        g |= (((c >> 1) & 1) as u8) << shift;
        b |= (((c >> 2) & 1) as u8) << shift;
        c >>= 3;
        shift = shift.wrapping_sub(1);
    }
    [r, g, b]
}

/// Render a row-major class-index map to an RGB image.
pub fn colorize(classes: &[i64], width: u32, height: u32) -> RgbImage {
    let mut img = RgbImage::new(width, height);
    for (i, class) in classes.iter().enumerate() {
        let x = i as u32 % width;
        let y = i as u32 / width;
        if y < height {
            img.put_pixel(x, y, image::Rgb(class_color((*class).max(0) as usize)));
        }
    }
    img
}

/// Write the label map and prediction map side by side (label left) as one
/// PNG, creating parent directories as needed.
pub fn save_label_vs_pred(
    label: &[i64],
    pred: &[i64],
    width: u32,
    height: u32,
    path: &Path,
) -> Result<()> {
    let label_img = colorize(label, width, height);
    let pred_img = colorize(pred, width, height);
    let mut canvas = RgbImage::new(width * 2, height);
    for (x, y, px) in label_img.enumerate_pixels() {
        canvas.put_pixel(x, y, *px);
    }
    for (x, y, px) in pred_img.enumerate_pixels() {
        canvas.put_pixel(x + width, y, *px);
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    canvas
        .save(path)
        .with_context(|| format!("failed to write {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn palette_is_deterministic_and_distinct() {
        assert_eq!(class_color(0), [0, 0, 0]);
        assert_eq!(class_color(1), [128, 0, 0]);
        let colors: Vec<[u8; 3]> = (0..8).map(class_color).collect();
        for (i, a) in colors.iter().enumerate() {
            for b in colors.iter().skip(i + 1) {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn colorize_matches_dimensions() {
        let classes = vec![0i64, 1, 1, 0, 1, 0];
        let img = colorize(&classes, 3, 2);
        assert_eq!(img.dimensions(), (3, 2));
        assert_eq!(img.get_pixel(1, 0).0, class_color(1));
        assert_eq!(img.get_pixel(0, 0).0, class_color(0));
    }

    #[test]
    fn snapshot_concatenates_label_then_pred() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("samples").join("7_lbl_vs_Pred.png");
        let label = vec![1i64, 1, 1, 1];
        let pred = vec![0i64, 0, 0, 0];
        save_label_vs_pred(&label, &pred, 2, 2, &path).expect("write snapshot");

        let img = image::open(&path).expect("reopen snapshot").to_rgb8();
        assert_eq!(img.dimensions(), (4, 2));
        assert_eq!(img.get_pixel(0, 0).0, class_color(1));
        assert_eq!(img.get_pixel(2, 0).0, class_color(0));
    }
}
