//! Encrypted profile store.
//!
//! On disk the store is a YAML envelope `{version, nonce, ciphertext}`
//! wrapping the AES-256-GCM encrypted YAML profile list. Saves always go
//! through write-temp-then-rename so a crash never leaves a truncated store.

use std::path::{Path, PathBuf};

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::info;

use crate::crypto::StoreKey;
use crate::errors::GatewayError;
use crate::profile::Profile;

/// Envelope format version.
const ENVELOPE_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    version: u32,
    nonce: String,
    ciphertext: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct PlainStore {
    profiles: Vec<Profile>,
}

pub struct ProfileStore {
    path: PathBuf,
    key: StoreKey,
    profiles: RwLock<Vec<Profile>>,
}

impl ProfileStore {
    /// Load the store, starting empty when the file does not exist yet.
    pub async fn load(path: impl AsRef<Path>, key: StoreKey) -> Result<Self, GatewayError> {
        let path = path.as_ref().to_path_buf();
        let profiles = match tokio::fs::read(&path).await {
            Ok(raw) => decode(&key, &raw)?.profiles,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %path.display(), "no profile store yet, starting empty");
                Vec::new()
            }
            Err(e) => {
                return Err(GatewayError::Internal(format!(
                    "failed to read profile store: {e}"
                )));
            }
        };
        Ok(Self {
            path,
            key,
            profiles: RwLock::new(profiles),
        })
    }

    /// Create an empty store file. Fails when the file already exists.
    pub async fn init(path: &Path, key: &StoreKey) -> Result<(), GatewayError> {
        if tokio::fs::try_exists(path).await.unwrap_or(false) {
            return Err(GatewayError::BadArguments(format!(
                "store file {} already exists",
                path.display()
            )));
        }
        let encoded = encode(key, &PlainStore::default())?;
        write_atomic(path, encoded.as_bytes()).await
    }

    /// Check that an existing store file decrypts with the given key.
    pub async fn validate(path: &Path, key: &StoreKey) -> Result<usize, GatewayError> {
        let raw = tokio::fs::read(path)
            .await
            .map_err(|e| GatewayError::BadArguments(format!("cannot read store: {e}")))?;
        Ok(decode(key, &raw)?.profiles.len())
    }

    pub async fn list_names(&self) -> Vec<String> {
        self.profiles
            .read()
            .await
            .iter()
            .map(|p| p.name.clone())
            .collect()
    }

    pub async fn get(&self, name: &str) -> Option<Profile> {
        self.profiles
            .read()
            .await
            .iter()
            .find(|p| p.name == name)
            .cloned()
    }

    /// Insert or replace a profile and persist. The save happens under the
    /// write lock so concurrent mutations serialise.
    pub async fn upsert(&self, profile: Profile) -> Result<(), GatewayError> {
        let mut profiles = self.profiles.write().await;
        match profiles.iter_mut().find(|p| p.name == profile.name) {
            Some(existing) => *existing = profile,
            None => profiles.push(profile),
        }
        self.persist(&profiles).await
    }

    /// Remove a profile. Returns whether it existed.
    pub async fn delete(&self, name: &str) -> Result<bool, GatewayError> {
        let mut profiles = self.profiles.write().await;
        let before = profiles.len();
        profiles.retain(|p| p.name != name);
        let removed = profiles.len() != before;
        if removed {
            self.persist(&profiles).await?;
        }
        Ok(removed)
    }

    async fn persist(&self, profiles: &[Profile]) -> Result<(), GatewayError> {
        let encoded = encode(
            &self.key,
            &PlainStore {
                profiles: profiles.to_vec(),
            },
        )?;
        write_atomic(&self.path, encoded.as_bytes()).await
    }
}

fn encode(key: &StoreKey, store: &PlainStore) -> Result<String, GatewayError> {
    let plaintext = serde_yaml::to_string(store)
        .map_err(|e| GatewayError::Internal(format!("failed to serialise store: {e}")))?;
    let (nonce, ciphertext) = key.seal(plaintext.as_bytes())?;
    let envelope = Envelope {
        version: ENVELOPE_VERSION,
        nonce: BASE64.encode(nonce),
        ciphertext: BASE64.encode(ciphertext),
    };
    serde_yaml::to_string(&envelope)
        .map_err(|e| GatewayError::Internal(format!("failed to serialise envelope: {e}")))
}

fn decode(key: &StoreKey, raw: &[u8]) -> Result<PlainStore, GatewayError> {
    let envelope: Envelope = serde_yaml::from_slice(raw)
        .map_err(|e| GatewayError::Crypto(format!("invalid store envelope: {e}")))?;
    if envelope.version != ENVELOPE_VERSION {
        return Err(GatewayError::Crypto(format!(
            "unsupported envelope version {}",
            envelope.version
        )));
    }
    let nonce = BASE64
        .decode(&envelope.nonce)
        .map_err(|e| GatewayError::Crypto(format!("invalid nonce encoding: {e}")))?;
    let ciphertext = BASE64
        .decode(&envelope.ciphertext)
        .map_err(|e| GatewayError::Crypto(format!("invalid ciphertext encoding: {e}")))?;
    let plaintext = key.open(&nonce, &ciphertext)?;
    serde_yaml::from_slice(&plaintext)
        .map_err(|e| GatewayError::Crypto(format!("decrypted store is not valid YAML: {e}")))
}

/// Write to `<path>.tmp` with owner-only permissions, then rename over the
/// destination. Never truncates the destination in place.
async fn write_atomic(path: &Path, contents: &[u8]) -> Result<(), GatewayError> {
    let tmp = path.with_extension("tmp");
    tokio::fs::write(&tmp, contents)
        .await
        .map_err(|e| GatewayError::Internal(format!("failed to write store: {e}")))?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tokio::fs::set_permissions(&tmp, std::fs::Permissions::from_mode(0o600))
            .await
            .map_err(|e| GatewayError::Internal(format!("failed to chmod store: {e}")))?;
    }
    tokio::fs::rename(&tmp, path)
        .await
        .map_err(|e| GatewayError::Internal(format!("failed to replace store: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::KEY_LEN;

    fn zero_key() -> StoreKey {
        StoreKey::from_bytes([0u8; KEY_LEN])
    }

    fn sample_profile() -> Profile {
        Profile {
            name: "p".into(),
            token: "t".into(),
            config_yaml: "apis: []\n".into(),
        }
    }

    #[tokio::test]
    async fn round_trips_profiles_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("profiles.enc.yaml");

        let store = ProfileStore::load(&path, zero_key()).await.unwrap();
        store.upsert(sample_profile()).await.unwrap();
        drop(store);

        let reloaded = ProfileStore::load(&path, zero_key()).await.unwrap();
        assert_eq!(reloaded.get("p").await.unwrap(), sample_profile());
    }

    #[tokio::test]
    async fn missing_file_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = ProfileStore::load(dir.path().join("none.yaml"), zero_key())
            .await
            .unwrap();
        assert!(store.list_names().await.is_empty());
    }

    #[tokio::test]
    async fn tampered_ciphertext_is_a_crypto_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("profiles.enc.yaml");
        let store = ProfileStore::load(&path, zero_key()).await.unwrap();
        store.upsert(sample_profile()).await.unwrap();
        drop(store);

        // Flip one byte inside the base64 ciphertext.
        let mut envelope: Envelope =
            serde_yaml::from_slice(&tokio::fs::read(&path).await.unwrap()).unwrap();
        let mut bytes = BASE64.decode(&envelope.ciphertext).unwrap();
        let first = bytes.first_mut().unwrap();
        *first ^= 0x01;
        envelope.ciphertext = BASE64.encode(bytes);
        tokio::fs::write(&path, serde_yaml::to_string(&envelope).unwrap())
            .await
            .unwrap();

        assert!(matches!(
            ProfileStore::load(&path, zero_key()).await,
            Err(GatewayError::Crypto(_))
        ));
    }

    #[tokio::test]
    async fn wrong_key_is_a_crypto_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("profiles.enc.yaml");
        let store = ProfileStore::load(&path, zero_key()).await.unwrap();
        store.upsert(sample_profile()).await.unwrap();
        drop(store);

        let other = StoreKey::from_bytes([7u8; KEY_LEN]);
        assert!(matches!(
            ProfileStore::load(&path, other).await,
            Err(GatewayError::Crypto(_))
        ));
    }

    #[tokio::test]
    async fn delete_persists_and_reports_existence() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("profiles.enc.yaml");
        let store = ProfileStore::load(&path, zero_key()).await.unwrap();
        store.upsert(sample_profile()).await.unwrap();

        assert!(store.delete("p").await.unwrap());
        assert!(!store.delete("p").await.unwrap());

        let reloaded = ProfileStore::load(&path, zero_key()).await.unwrap();
        assert!(reloaded.get("p").await.is_none());
    }

    #[tokio::test]
    async fn init_refuses_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("profiles.enc.yaml");
        ProfileStore::init(&path, &zero_key()).await.unwrap();
        assert!(ProfileStore::init(&path, &zero_key()).await.is_err());
        assert_eq!(ProfileStore::validate(&path, &zero_key()).await.unwrap(), 0);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn store_file_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("profiles.enc.yaml");
        ProfileStore::init(&path, &zero_key()).await.unwrap();
        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
