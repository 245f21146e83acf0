//! Storage network client configuration.
//!
//! Assembles identity, access credentials, client endpoints, redundancy and
//! encryption parameters from the environment and hands back the object store
//! handle the rest of the application talks to. Erasure coding, repair and
//! encryption themselves are the network's business; this module only carries
//! their parameters.

use crate::services::object_store::{LocalObjectStore, ObjectStore};
use std::{env, fmt, path::PathBuf, sync::Arc};
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum NetworkError {
    #[error("invalid redundancy scheme: {0}")]
    InvalidRedundancy(String),
    #[error("invalid encryption parameters: {0}")]
    InvalidEncryption(String),
    #[error("could not prepare gateway directory {path}: {source}")]
    Gateway {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IdentityConfig {
    pub cert_path: PathBuf,
    pub key_path: PathBuf,
}

#[derive(Clone, PartialEq, Eq)]
pub struct AccessConfig {
    pub access_key: String,
    pub secret_key: String,
}

#[derive(Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub overlay_addr: String,
    pub pointer_db_addr: String,
    pub api_key: String,
    /// Objects at or below this size are stored inline with their metadata.
    pub max_inline_size: u64,
    pub segment_size: u64,
}

/// Reed-Solomon parameters handed to the network.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RedundancyConfig {
    pub max_buffer_mem: u64,
    pub erasure_share_size: u32,
    pub min_threshold: u32,
    pub repair_threshold: u32,
    pub success_threshold: u32,
    pub max_threshold: u32,
}

#[derive(Clone, PartialEq, Eq)]
pub struct EncryptionConfig {
    pub key: String,
    pub block_size: u32,
    pub data_type: u8,
    pub path_type: u8,
}

/// Everything needed to obtain a storage network handle.
#[derive(Clone, Debug)]
pub struct NetworkConfig {
    pub identity: IdentityConfig,
    pub access: AccessConfig,
    pub client: ClientConfig,
    pub redundancy: RedundancyConfig,
    pub encryption: EncryptionConfig,
    /// Directory served by the filesystem gateway.
    pub gateway_dir: PathBuf,
}

impl Default for RedundancyConfig {
    fn default() -> Self {
        Self {
            max_buffer_mem: 0x400000,
            erasure_share_size: 1024,
            min_threshold: 4,
            repair_threshold: 6,
            success_threshold: 8,
            max_threshold: 10,
        }
    }
}

impl NetworkConfig {
    /// Build the configuration from process environment variables.
    pub fn from_env(data_dir: impl Into<PathBuf>) -> Self {
        Self::from_lookup(data_dir, |name| env::var(name).ok())
    }

    /// Build the configuration from an arbitrary variable lookup.
    pub fn from_lookup<F>(data_dir: impl Into<PathBuf>, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let data_dir = data_dir.into();
        let var = |name: &str| lookup(name).unwrap_or_default();

        let gateway_dir = lookup("TARDIGRADIO_STORAGE_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| data_dir.join("objects"));

        Self {
            identity: IdentityConfig {
                cert_path: data_dir.join("identity.cert"),
                key_path: data_dir.join("identity.key"),
            },
            access: AccessConfig {
                access_key: var("STORJACCESSKEY"),
                secret_key: var("STORJSECRETKEY"),
            },
            client: ClientConfig {
                overlay_addr: var("STORJOVERLAYADDR"),
                pointer_db_addr: var("STORJPOINTERDBADDR"),
                api_key: var("STORJAPIKEY"),
                max_inline_size: 4096,
                segment_size: 64_000_000,
            },
            redundancy: RedundancyConfig::default(),
            encryption: EncryptionConfig {
                key: var("STORJENCRYPTIONKEY"),
                block_size: 1024,
                data_type: 1,
                path_type: 1,
            },
            gateway_dir,
        }
    }

    /// Check the redundancy thresholds and encryption block size are coherent.
    pub fn validate(&self) -> Result<(), NetworkError> {
        let rs = &self.redundancy;
        if rs.min_threshold == 0 {
            return Err(NetworkError::InvalidRedundancy(
                "minimum threshold must be positive".into(),
            ));
        }
        if !(rs.min_threshold <= rs.repair_threshold
            && rs.repair_threshold <= rs.success_threshold
            && rs.success_threshold <= rs.max_threshold)
        {
            return Err(NetworkError::InvalidRedundancy(format!(
                "thresholds must satisfy min <= repair <= success <= max, got {}/{}/{}/{}",
                rs.min_threshold, rs.repair_threshold, rs.success_threshold, rs.max_threshold
            )));
        }
        if rs.erasure_share_size == 0 {
            return Err(NetworkError::InvalidRedundancy(
                "erasure share size must be positive".into(),
            ));
        }

        let block = self.encryption.block_size;
        if block == 0 || block % rs.erasure_share_size != 0 {
            return Err(NetworkError::InvalidEncryption(format!(
                "block size {} must be a positive multiple of the erasure share size {}",
                block, rs.erasure_share_size
            )));
        }
        Ok(())
    }

    /// Validate the configuration and obtain the shared object store handle.
    pub fn connect(&self) -> Result<Arc<dyn ObjectStore>, NetworkError> {
        self.validate()?;

        if self.access.access_key.is_empty() || self.encryption.key.is_empty() {
            warn!("storage network credentials are not set; using the local gateway only");
        }
        if !self.identity.cert_path.exists() || !self.identity.key_path.exists() {
            warn!(
                cert = %self.identity.cert_path.display(),
                key = %self.identity.key_path.display(),
                "node identity not found"
            );
        }

        std::fs::create_dir_all(&self.gateway_dir).map_err(|source| NetworkError::Gateway {
            path: self.gateway_dir.clone(),
            source,
        })?;

        let rs = &self.redundancy;
        info!(
            gateway = %self.gateway_dir.display(),
            overlay = %self.client.overlay_addr,
            min = rs.min_threshold,
            repair = rs.repair_threshold,
            success = rs.success_threshold,
            max = rs.max_threshold,
            share_size = rs.erasure_share_size,
            "storage network handle ready"
        );

        Ok(Arc::new(LocalObjectStore::new(self.gateway_dir.clone())))
    }
}

fn redact(value: &str) -> &'static str {
    if value.is_empty() { "<unset>" } else { "<redacted>" }
}

impl fmt::Debug for AccessConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessConfig")
            .field("access_key", &redact(&self.access_key))
            .field("secret_key", &redact(&self.secret_key))
            .finish()
    }
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("overlay_addr", &self.overlay_addr)
            .field("pointer_db_addr", &self.pointer_db_addr)
            .field("api_key", &redact(&self.api_key))
            .field("max_inline_size", &self.max_inline_size)
            .field("segment_size", &self.segment_size)
            .finish()
    }
}

impl fmt::Debug for EncryptionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncryptionConfig")
            .field("key", &redact(&self.key))
            .field("block_size", &self.block_size)
            .field("data_type", &self.data_type)
            .field("path_type", &self.path_type)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name: &str| map.get(name).cloned()
    }

    #[test]
    fn reads_credentials_and_defaults() {
        let cfg = NetworkConfig::from_lookup(
            "/srv/tardigradio",
            lookup(&[
                ("STORJACCESSKEY", "access"),
                ("STORJSECRETKEY", "secret"),
                ("STORJOVERLAYADDR", "satellite.example:7777"),
                ("STORJAPIKEY", "api"),
                ("STORJENCRYPTIONKEY", "enc"),
            ]),
        );

        assert_eq!(cfg.access.access_key, "access");
        assert_eq!(cfg.client.overlay_addr, "satellite.example:7777");
        assert_eq!(cfg.client.pointer_db_addr, "");
        assert_eq!(cfg.client.segment_size, 64_000_000);
        assert_eq!(cfg.redundancy, RedundancyConfig::default());
        assert_eq!(
            cfg.identity.cert_path,
            PathBuf::from("/srv/tardigradio/identity.cert")
        );
        assert_eq!(cfg.gateway_dir, PathBuf::from("/srv/tardigradio/objects"));
        cfg.validate().unwrap();
    }

    #[test]
    fn storage_dir_override() {
        let cfg = NetworkConfig::from_lookup(
            "./data",
            lookup(&[("TARDIGRADIO_STORAGE_DIR", "/mnt/objects")]),
        );
        assert_eq!(cfg.gateway_dir, PathBuf::from("/mnt/objects"));
    }

    #[test]
    fn debug_output_hides_secrets() {
        let cfg = NetworkConfig::from_lookup(
            "./data",
            lookup(&[("STORJSECRETKEY", "hunter2"), ("STORJENCRYPTIONKEY", "k3y")]),
        );
        let printed = format!("{:?}", cfg);
        assert!(!printed.contains("hunter2"));
        assert!(!printed.contains("k3y"));
        assert!(printed.contains("<redacted>"));
    }

    #[test]
    fn rejects_unordered_thresholds() {
        let mut cfg = NetworkConfig::from_lookup("./data", lookup(&[]));
        cfg.redundancy.repair_threshold = 9;
        cfg.redundancy.success_threshold = 8;
        assert!(matches!(
            cfg.validate(),
            Err(NetworkError::InvalidRedundancy(_))
        ));

        cfg.redundancy = RedundancyConfig {
            min_threshold: 0,
            ..RedundancyConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_misaligned_block_size() {
        let mut cfg = NetworkConfig::from_lookup("./data", lookup(&[]));
        cfg.encryption.block_size = 1000;
        assert!(matches!(
            cfg.validate(),
            Err(NetworkError::InvalidEncryption(_))
        ));
    }

    #[tokio::test]
    async fn connect_creates_gateway_dir() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = NetworkConfig::from_lookup(dir.path(), lookup(&[]));
        let store = cfg.connect().unwrap();
        assert!(dir.path().join("objects").is_dir());
        store.create_bucket("alice").await.unwrap();
        assert!(store.bucket_exists("alice").await.unwrap());
    }
}
