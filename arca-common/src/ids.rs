//! Deterministic identity derivation (§4.7, §8) and the shared path/size
//! validation helpers every mutation path reuses.

use crate::error::{ArcaError, Result};
use sha2::{Digest, Sha256};

fn sha256_hex16(input: &str) -> String {
    let digest = Sha256::digest(input.as_bytes());
    let hex = hex_encode(&digest);
    hex[..16].to_string()
}

fn hex_encode(bytes: &[u8]) -> String {
    let mut s = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        s.push_str(&format!("{:02x}", b));
    }
    s
}

/// `volume_id = "pvc-" + first 16 hex of SHA-256(request_name)`.
pub fn derive_volume_id(request_name: &str) -> String {
    format!("pvc-{}", sha256_hex16(request_name))
}

/// `snapshot_id = first 16 hex of SHA-256(source_volume_id + "/" + request_name)`.
pub fn derive_snapshot_id(source_volume_id: &str, request_name: &str) -> String {
    sha256_hex16(&format!("{}/{}", source_volume_id, request_name))
}

/// Relative path with no leading `/` and no `..` traversal segment.
pub fn validate_relative_path(path: &str) -> Result<()> {
    if path.is_empty() {
        return Err(ArcaError::validation("path must not be empty"));
    }
    if path.starts_with('/') {
        return Err(ArcaError::validation("path must be relative"));
    }
    if path.split('/').any(|seg| seg == "..") {
        return Err(ArcaError::validation("path must not contain .. segments"));
    }
    Ok(())
}

/// DNS-label name validation used for SVM/volume names.
pub fn validate_dns_label(name: &str) -> Result<()> {
    if name.is_empty() || name.len() > 63 {
        return Err(ArcaError::validation("name must be 1-63 characters"));
    }
    let valid = name
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        && !name.starts_with('-')
        && !name.ends_with('-');
    if !valid {
        return Err(ArcaError::validation(format!(
            "'{}' is not a valid DNS label",
            name
        )));
    }
    Ok(())
}

pub fn validate_vlan_id(vlan_id: u16) -> Result<()> {
    if vlan_id == 0 || vlan_id > 4094 {
        return Err(ArcaError::validation(format!(
            "vlan_id {} out of range 1..4094",
            vlan_id
        )));
    }
    Ok(())
}

pub fn validate_size_positive(size_bytes: u64) -> Result<()> {
    if size_bytes == 0 {
        return Err(ArcaError::validation("size_bytes must be positive"));
    }
    Ok(())
}

/// Volume/quota resize is grow-only everywhere (§4.3, §9 Open Question 2).
/// Returns `Ok(true)` if the caller should actually perform the resize,
/// `Ok(false)` if `new <= current` and the call should short-circuit as a
/// no-op success (§8 "Expand with new <= current returns success").
pub fn ensure_grow_only(current: u64, requested: u64) -> Result<bool> {
    if requested < current {
        return Err(ArcaError::validation(format!(
            "shrink from {} to {} is not permitted",
            current, requested
        )));
    }
    Ok(requested > current)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn volume_id_matches_scenario_3() {
        assert_eq!(derive_volume_id("foo"), format!("pvc-{}", sha256_hex16("foo")));
        assert!(derive_volume_id("foo").starts_with("pvc-"));
        assert_eq!(derive_volume_id("foo").len(), 20);
    }

    #[test]
    fn snapshot_id_matches_scenario_4() {
        let id = derive_snapshot_id("pvc-aaaaaaaaaaaaaaaa", "snap1");
        assert_eq!(id.len(), 16);
        assert_eq!(
            id,
            sha256_hex16("pvc-aaaaaaaaaaaaaaaa/snap1")
        );
    }

    #[test]
    fn ids_are_deterministic() {
        assert_eq!(derive_volume_id("x"), derive_volume_id("x"));
        assert_ne!(derive_volume_id("x"), derive_volume_id("y"));
    }

    #[test]
    fn relative_path_rejects_absolute_and_traversal() {
        assert!(validate_relative_path("/abs").is_err());
        assert!(validate_relative_path("a/../b").is_err());
        assert!(validate_relative_path("..").is_err());
        assert!(validate_relative_path("").is_err());
        assert!(validate_relative_path("a/b/c").is_ok());
    }

    #[test]
    fn vlan_boundary_values() {
        assert!(validate_vlan_id(0).is_err());
        assert!(validate_vlan_id(4095).is_err());
        assert!(validate_vlan_id(1).is_ok());
        assert!(validate_vlan_id(4094).is_ok());
    }

    #[test]
    fn grow_only_rejects_shrink_and_noops_equal() {
        assert!(ensure_grow_only(100, 50).is_err());
        assert_eq!(ensure_grow_only(100, 100).unwrap(), false);
        assert_eq!(ensure_grow_only(100, 200).unwrap(), true);
    }
}
