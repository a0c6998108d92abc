//! Keyframe extraction for motion media.
//!
//! Videos and animations are handed to an external ffmpeg process that pulls
//! keyframes only, restricted to the first seconds of the clip. Scratch files
//! are cleaned up with bounded retries since the decoder can hold a file
//! handle briefly after exit.

use image::DynamicImage;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};

use dejavu_core::constants::{
    FRAME_EXTRACT_TIMEOUT_SECS, MAX_MOTION_KEYFRAMES, MOTION_SCAN_SECONDS,
};
use dejavu_core::{Error, Result};

/// Extract up to [`MAX_MOTION_KEYFRAMES`] keyframes from raw video bytes.
///
/// Returns an empty list when the clip yields no decodable keyframes; the
/// caller treats that as a failed item.
pub async fn extract_keyframes(bytes: &[u8]) -> Result<Vec<DynamicImage>> {
    let scratch = tempfile::tempdir()
        .map_err(|e| Error::Process(format!("motion scratch: {}", e)))?
        .keep();

    let result = extract_into(&scratch, bytes).await;
    cleanup_scratch(scratch).await;
    result
}

async fn extract_into(scratch: &Path, bytes: &[u8]) -> Result<Vec<DynamicImage>> {
    let input = scratch.join("input.bin");
    tokio::fs::write(&input, bytes)
        .await
        .map_err(|e| Error::Process(format!("write motion input: {}", e)))?;

    let pattern = scratch.join("frame_%02d.png");
    let mut command = Command::new("ffmpeg");
    command
        .args(["-hide_banner", "-loglevel", "error"])
        .args(["-skip_frame", "nokey"])
        .args(["-t", &MOTION_SCAN_SECONDS.to_string()])
        .arg("-i")
        .arg(&input)
        .args(["-fps_mode", "vfr"])
        .args(["-frames:v", &MAX_MOTION_KEYFRAMES.to_string()])
        .arg(&pattern)
        .kill_on_drop(true);

    let output = tokio::time::timeout(
        Duration::from_secs(FRAME_EXTRACT_TIMEOUT_SECS),
        command.output(),
    )
    .await
    .map_err(|_| {
        Error::Timeout(format!(
            "frame extraction exceeded {}s",
            FRAME_EXTRACT_TIMEOUT_SECS
        ))
    })?
    .map_err(|e| Error::Process(format!("spawn ffmpeg: {}", e)))?;

    if !output.status.success() {
        return Err(Error::Process(format!(
            "ffmpeg exited with {}: {}",
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }

    let mut frames = Vec::new();
    for index in 1..=MAX_MOTION_KEYFRAMES {
        let path = scratch.join(format!("frame_{:02}.png", index));
        if !path.exists() {
            break;
        }
        match image::open(&path) {
            Ok(frame) => frames.push(frame),
            Err(e) => warn!("unreadable extracted frame {:?}: {}", path, e),
        }
    }

    debug!("extracted {} keyframes", frames.len());
    Ok(frames)
}

/// Remove the scratch directory, retrying briefly: the external decoder can
/// still hold a handle right after exit.
async fn cleanup_scratch(scratch: PathBuf) {
    for attempt in 0..3 {
        match tokio::fs::remove_dir_all(&scratch).await {
            Ok(()) => return,
            Err(_) if attempt < 2 => {
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
            Err(e) => warn!("failed to remove motion scratch {:?}: {}", scratch, e),
        }
    }
}
