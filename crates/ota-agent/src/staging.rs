//! Download/patch/verify staging.
//!
//! For each target in install order: fetch the artifact, reconstruct the
//! full image (delta artifacts are applied against the locally held base
//! image for that ECU), and verify the reconstructed SHA-256 against the
//! manifest's declared hash. Any failure is terminal for the campaign.

use std::collections::HashMap;
use std::path::Path;

use bytes::Bytes;
use ota_authority::ArtifactFetcher;
use ota_core::{CampaignId, EcuId, FailureReason, TraceLog};
use ota_crypto::sha256_hex;
use ota_manifest::{ArtifactType, Manifest};
use serde_json::json;
use tokio::fs;
use tracing::{error, info};

use crate::base_images::BaseImageStore;
use crate::error::FailureDetail;

/// Stage every target of a manifest, in install order.
///
/// Returns the verified images keyed by ECU, ready for flashing.
///
/// # Errors
/// Returns a [`FailureDetail`] identifying the failing target on any
/// transfer, patch-application, or hash failure.
pub async fn stage_targets(
    manifest: &Manifest,
    campaign_id: &CampaignId,
    fetcher: &dyn ArtifactFetcher,
    base_images: &BaseImageStore,
    download_dir: &Path,
    trace: &TraceLog,
) -> Result<HashMap<EcuId, Bytes>, FailureDetail> {
    let mut images = HashMap::new();

    for target in manifest.targets_in_install_order() {
        let ecu_id = target.ecu_id.clone();
        let extension = match target.artifact_type {
            ArtifactType::Delta => "patch",
            ArtifactType::Full => "bin",
        };
        let local_path = download_dir.join(format!("{ecu_id}_{campaign_id}.{extension}"));

        // For a full artifact the manifest hash/size describe the download
        // itself, so the fetcher can apply its resume policy; for a delta
        // they describe the reconstructed image and cannot.
        let (expected_hash, expected_size) = match target.artifact_type {
            ArtifactType::Full => (Some(target.artifact_hash.as_str()), Some(target.artifact_size)),
            ArtifactType::Delta => (None, None),
        };

        if let Err(e) = fetcher
            .fetch(&target.artifact_url, &local_path, expected_hash, expected_size)
            .await
        {
            error!(ecu = %ecu_id, url = %target.artifact_url, error = %e, "artifact download failed");
            return Err(FailureDetail::for_ecu(
                FailureReason::DownloadFailed,
                ecu_id,
                e.to_string(),
            ));
        }

        let artifact = fs::read(&local_path).await.map_err(|e| {
            FailureDetail::for_ecu(FailureReason::DownloadFailed, ecu_id.clone(), e.to_string())
        })?;

        let image = match target.artifact_type {
            ArtifactType::Full => artifact,
            ArtifactType::Delta => {
                let Some(base) = base_images.get(&ecu_id) else {
                    return Err(FailureDetail::for_ecu(
                        FailureReason::PatchFailed,
                        ecu_id,
                        "no base image held for this ECU",
                    ));
                };
                match ota_delta::patch(&base, &artifact) {
                    Ok(image) => image,
                    Err(e) => {
                        error!(ecu = %ecu_id, error = %e, "patch application failed");
                        return Err(FailureDetail::for_ecu(
                            FailureReason::PatchFailed,
                            ecu_id,
                            e.to_string(),
                        ));
                    }
                }
            }
        };

        let digest = sha256_hex(&image);
        if digest != target.artifact_hash {
            error!(
                ecu = %ecu_id,
                expected = %target.artifact_hash,
                actual = %digest,
                "reconstructed image hash mismatch"
            );
            return Err(FailureDetail::for_ecu(
                FailureReason::ShaMismatch,
                ecu_id,
                format!("expected {}, got {digest}", target.artifact_hash),
            ));
        }

        info!(ecu = %ecu_id, size = image.len(), "artifact staged and verified");
        trace.log(
            "ARTIFACT_VERIFIED",
            json!({"ecu_id": ecu_id.as_str(), "size": image.len()}),
        );
        images.insert(ecu_id, Bytes::from(image));
    }

    Ok(images)
}
