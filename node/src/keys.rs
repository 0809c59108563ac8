//! Enclave key file handling.
//!
//! The software enclave's signing key lives hex-encoded in
//! `<data_dir>/enclave.key`, readable only by the owner on Unix.

use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};

use enclave_protocol::attestation::SoftwareEnclave;
use enclave_protocol::config::ENCLAVE_KEY_FILE_NAME;

pub fn key_path(data_dir: &Path) -> PathBuf {
    data_dir.join(ENCLAVE_KEY_FILE_NAME)
}

/// Generates a new key and writes it. Refuses to overwrite unless `force`.
pub fn create(data_dir: &Path, force: bool) -> Result<SoftwareEnclave> {
    let path = key_path(data_dir);
    if path.exists() && !force {
        bail!(
            "enclave key already exists at {} (use --force to replace it)",
            path.display()
        );
    }

    std::fs::create_dir_all(data_dir)
        .with_context(|| format!("failed to create data directory: {}", data_dir.display()))?;

    let enclave = SoftwareEnclave::random();
    let secret = enclave
        .secret_bytes()
        .context("freshly generated enclave has no signing key")?;
    std::fs::write(&path, hex::encode(secret))
        .with_context(|| format!("failed to write enclave key to {}", path.display()))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600))?;
    }

    Ok(enclave)
}

pub fn load(data_dir: &Path) -> Result<SoftwareEnclave> {
    let path = key_path(data_dir);
    let text = std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read enclave key from {}", path.display()))?;
    SoftwareEnclave::from_secret_hex(&text)
        .with_context(|| format!("malformed enclave key in {}", path.display()))
}

/// Resolves the node's enclave: an explicit hex key wins, then the key file,
/// and a missing key file is created.
pub fn load_or_create(data_dir: &Path, explicit_hex: Option<&str>) -> Result<SoftwareEnclave> {
    if let Some(hex_key) = explicit_hex {
        return SoftwareEnclave::from_secret_hex(hex_key).context("malformed --enclave-key");
    }
    if key_path(data_dir).exists() {
        return load(data_dir);
    }
    tracing::warn!(
        path = %key_path(data_dir).display(),
        "no enclave key found, generating one"
    );
    create(data_dir, false)
}
