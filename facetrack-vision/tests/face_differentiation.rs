use anyhow::Result;
use facetrack_vision::{face, Pipeline, VisionError};
use image::{DynamicImage, GrayImage, ImageFormat, Luma};
use std::io::Cursor;

fn encode(img: GrayImage, format: ImageFormat) -> Result<Vec<u8>> {
    let mut buf = Cursor::new(Vec::new());
    DynamicImage::ImageLuma8(img).write_to(&mut buf, format)?;
    Ok(buf.into_inner())
}

/// Brightness ramp across the frame, left to right
fn horizontal(offset: u32) -> GrayImage {
    GrayImage::from_fn(64, 64, |x, _| Luma([(40 + offset + x * 2) as u8]))
}

/// Brightness ramp top to bottom
fn vertical() -> GrayImage {
    GrayImage::from_fn(64, 64, |_, y| Luma([(40 + y * 2) as u8]))
}

/// Diagonal ramp, half-way between the other two
fn diagonal() -> GrayImage {
    GrayImage::from_fn(64, 64, |x, y| Luma([(40 + x + y) as u8]))
}

#[test]
fn test_same_face_recaptured_scores_high() -> Result<()> {
    env_logger::try_init().ok();
    let pipeline = Pipeline::new();

    let enrolled = pipeline.extract_embedding(&encode(horizontal(0), ImageFormat::Png)?)?;
    // Brighter room, lossy camera encoding
    let probe = pipeline.extract_embedding(&encode(horizontal(12), ImageFormat::Jpeg)?)?;

    let score = face::similarity_percent(&enrolled, &probe);
    println!("same face recaptured: {:.2}", score);
    assert!(score >= 95.0, "expected >= 95, got {score}");
    Ok(())
}

#[test]
fn test_different_faces_score_low() -> Result<()> {
    env_logger::try_init().ok();
    let pipeline = Pipeline::new();

    let a = pipeline.extract_embedding(&encode(horizontal(0), ImageFormat::Png)?)?;
    let b = pipeline.extract_embedding(&encode(vertical(), ImageFormat::Png)?)?;

    let score = face::similarity_percent(&a, &b);
    println!("different faces: {:.2}", score);
    assert!(score < 5.0, "expected < 5, got {score}");
    Ok(())
}

#[test]
fn test_resembling_faces_stay_below_login_floor() -> Result<()> {
    let pipeline = Pipeline::new();

    let a = pipeline.extract_embedding(&encode(horizontal(0), ImageFormat::Png)?)?;
    let c = pipeline.extract_embedding(&encode(diagonal(), ImageFormat::Png)?)?;

    let score = face::similarity_percent(&a, &c);
    println!("resembling faces: {:.2}", score);
    assert!(score > 50.0 && score < 90.0, "expected 50..90, got {score}");
    Ok(())
}

#[test]
fn test_blank_frame_is_rejected() -> Result<()> {
    let pipeline = Pipeline::new();
    let blank = encode(GrayImage::from_pixel(64, 64, Luma([200])), ImageFormat::Png)?;

    match pipeline.extract_embedding(&blank) {
        Err(VisionError::NoFace { contrast, .. }) => assert!(contrast < 1.0),
        other => panic!("expected NoFace, got {other:?}"),
    }
    Ok(())
}
