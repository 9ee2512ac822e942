//! The screenshot pipeline: capture, optional disk write, base64 embed,
//! decode, and perceptual hash.
//!
//! A capture failure marks the observation failed and stops the pipeline —
//! by then the page usually responded, so the rest of the observation is
//! still worth keeping. Failures past capture (disk write, decode) are
//! returned to the orchestrator and fail this one target.

use std::time::Duration;

use chromiumoxide::cdp::browser_protocol::emulation::SetDeviceMetricsOverrideParams;
use chromiumoxide::cdp::browser_protocol::page::CaptureScreenshotFormat;
use chromiumoxide::error::CdpError;
use chromiumoxide::page::{Page, ScreenshotParams};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use image::DynamicImage;
use image_hasher::{HashAlg, HasherConfig};
use log::{debug, error};
use tokio::time::{timeout_at, Instant};

use crate::config::{Options, ScreenshotFormat, MAX_SCREENSHOT_FILENAME, SCREENSHOT_JPEG_QUALITY};
use crate::drivers::assembler::EventAssembler;
use crate::drivers::DriverError;
use crate::utils::{left_truncate, safe_filename};

/// Computes the canonical string form of the 64-bit DCT perceptual hash,
/// robust to minor rendering variation between near-identical pages.
pub fn perception_hash(image: &DynamicImage) -> String {
    HasherConfig::new()
        .hash_size(8, 8)
        .preproc_dct()
        .hash_alg(HashAlg::Mean)
        .to_hasher()
        .hash_image(image)
        .to_base64()
}

fn cdp_format(format: ScreenshotFormat) -> CaptureScreenshotFormat {
    match format {
        ScreenshotFormat::Jpeg => CaptureScreenshotFormat::Jpeg,
        ScreenshotFormat::Png => CaptureScreenshotFormat::Png,
    }
}

/// Runs the pipeline for one target, recording its outcome on the
/// assembler.
pub(crate) async fn capture(
    page: &Page,
    assembler: &EventAssembler,
    options: &Options,
    target: &str,
    deadline: Instant,
) -> Result<(), DriverError> {
    debug!("taking a screenshot 🔎 of {target}");

    let image = if options.scan.selector.is_empty() {
        capture_page(page, options, deadline).await
    } else {
        capture_element(page, options, deadline).await
    };

    let image = match image {
        Ok(image) => image,
        Err(reason) => {
            if options.logging.log_scan_errors {
                error!("could not grab screenshot of {target}: {reason}");
            }
            assembler.mark_failed(reason);
            return Ok(());
        }
    };

    if options.scan.screenshot_embed_in_result {
        assembler.set_screenshot(STANDARD.encode(&image));
    }

    if !options.scan.screenshot_skip_disk {
        let filename = left_truncate(
            &format!(
                "{}.{}",
                safe_filename(target),
                options.scan.screenshot_format.as_str()
            ),
            MAX_SCREENSHOT_FILENAME,
        );
        let path = options.scan.screenshot_path.join(&filename);
        std::fs::write(&path, &image).map_err(DriverError::ScreenshotWrite)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o664))
                .map_err(DriverError::ScreenshotWrite)?;
        }
        assembler.set_filename(filename);
    }

    let decoded = image::load_from_memory(&image).map_err(DriverError::ScreenshotDecode)?;
    assembler.set_perception_hash(perception_hash(&decoded));

    Ok(())
}

/// Full-viewport capture, optionally beyond the viewport for the scrolled
/// page.
async fn capture_page(
    page: &Page,
    options: &Options,
    deadline: Instant,
) -> Result<Vec<u8>, String> {
    let mut params = ScreenshotParams::builder()
        .format(cdp_format(options.scan.screenshot_format))
        .full_page(options.scan.screenshot_full_page);
    if options.scan.screenshot_format == ScreenshotFormat::Jpeg {
        params = params.quality(SCREENSHOT_JPEG_QUALITY);
    }

    match timeout_at(deadline, page.screenshot(params.build())).await {
        Ok(Ok(bytes)) => Ok(bytes),
        Ok(Err(e)) => Err(e.to_string()),
        Err(_) => Err("screenshot deadline exceeded".to_string()),
    }
}

/// Capture of a single element named by the configured CSS selector.
async fn capture_element(
    page: &Page,
    options: &Options,
    deadline: Instant,
) -> Result<Vec<u8>, String> {
    let selector = options.scan.selector.as_str();
    wait_for_visible(page, selector, deadline).await?;

    // serde_json escaping keeps hostile selectors from breaking out of the
    // probe expression.
    let escaped = serde_json::to_string(selector).map_err(|e| e.to_string())?;
    let scroll_height: f64 = match timeout_at(
        deadline,
        page.evaluate(format!("document.querySelector({escaped}).scrollHeight")),
    )
    .await
    {
        Ok(Ok(result)) => result.into_value().map_err(|e| e.to_string())?,
        Ok(Err(e)) => return Err(e.to_string()),
        Err(_) => return Err("selector probe deadline exceeded".to_string()),
    };

    let element = cdp_result(timeout_at(deadline, page.find_element(selector)).await)?;

    if options.scan.screenshot_full_page && scroll_height > f64::from(options.chrome.window_y) {
        // Grow the viewport to the element's full height so the node capture
        // is not clipped.
        let override_params = SetDeviceMetricsOverrideParams::new(
            i64::from(options.chrome.window_x),
            scroll_height as i64,
            1.0,
            false,
        );
        cdp_result(timeout_at(deadline, page.execute(override_params)).await)?;
    } else {
        cdp_result(timeout_at(deadline, element.scroll_into_view()).await)?;
    }

    cdp_result(
        timeout_at(
            deadline,
            element.screenshot(cdp_format(options.scan.screenshot_format)),
        )
        .await,
    )
}

/// Polls until the selector matches a visibly sized element or the deadline
/// passes.
async fn wait_for_visible(page: &Page, selector: &str, deadline: Instant) -> Result<(), String> {
    let escaped = serde_json::to_string(selector).map_err(|e| e.to_string())?;
    let probe = format!(
        "(() => {{ const el = document.querySelector({escaped}); \
         if (!el) return false; const r = el.getBoundingClientRect(); \
         return r.width > 0 && r.height > 0; }})()"
    );

    loop {
        match timeout_at(deadline, page.evaluate(probe.as_str())).await {
            Ok(Ok(result)) => {
                let visible = result
                    .value()
                    .and_then(serde_json::Value::as_bool)
                    .unwrap_or(false);
                if visible {
                    return Ok(());
                }
            }
            Ok(Err(e)) => return Err(e.to_string()),
            Err(_) => return Err(format!("element {selector} never became visible")),
        }
        if Instant::now() + Duration::from_millis(100) >= deadline {
            return Err(format!("element {selector} never became visible"));
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
}

fn cdp_result<T>(
    outcome: Result<Result<T, CdpError>, tokio::time::error::Elapsed>,
) -> Result<T, String> {
    match outcome {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(e.to_string()),
        Err(_) => Err("screenshot deadline exceeded".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    fn gradient_image(noise: u8) -> DynamicImage {
        let mut img = RgbaImage::new(64, 64);
        for (x, y, pixel) in img.enumerate_pixels_mut() {
            let base = ((x * 4) % 256) as u8;
            let shade = ((y * 4) % 256) as u8;
            *pixel = Rgba([
                base.saturating_add(noise),
                shade,
                base / 2,
                255,
            ]);
        }
        DynamicImage::ImageRgba8(img)
    }

    #[test]
    fn test_perception_hash_is_nonempty_and_stable() {
        let img = gradient_image(0);
        let first = perception_hash(&img);
        let second = perception_hash(&img);
        assert!(!first.is_empty());
        assert_eq!(first, second);
    }

    #[test]
    fn test_similar_images_have_small_hamming_distance() {
        // A few counts of pixel noise should barely move a DCT hash.
        let clean = perception_hash(&gradient_image(0));
        let noisy = perception_hash(&gradient_image(3));

        let clean = image_hasher::ImageHash::<Box<[u8]>>::from_base64(&clean).expect("decode");
        let noisy = image_hasher::ImageHash::<Box<[u8]>>::from_base64(&noisy).expect("decode");
        assert!(
            clean.dist(&noisy) <= 8,
            "near-identical images should hash close together"
        );
    }

    #[test]
    fn test_different_images_have_larger_distance_than_similar_ones() {
        let clean = perception_hash(&gradient_image(0));
        let noisy = perception_hash(&gradient_image(3));
        let mut inverted = gradient_image(0).to_rgba8();
        for pixel in inverted.pixels_mut() {
            pixel.0 = [255 - pixel.0[0], 255 - pixel.0[1], 255 - pixel.0[2], 255];
        }
        let inverted = perception_hash(&DynamicImage::ImageRgba8(inverted));

        let clean = image_hasher::ImageHash::<Box<[u8]>>::from_base64(&clean).expect("decode");
        let noisy = image_hasher::ImageHash::<Box<[u8]>>::from_base64(&noisy).expect("decode");
        let inverted = image_hasher::ImageHash::<Box<[u8]>>::from_base64(&inverted).expect("decode");
        assert!(clean.dist(&noisy) <= clean.dist(&inverted));
    }

    #[test]
    fn test_screenshot_filename_length_is_bounded() {
        let target = format!("http://example.com/{}", "a".repeat(400));
        let filename = left_truncate(
            &format!("{}.jpeg", safe_filename(&target)),
            MAX_SCREENSHOT_FILENAME,
        );
        assert!(filename.len() <= 204);
    }
}
