use anyhow::Result;
use url::Url;
use vice_core::env::{infer, infer_or, infer_string};

/// Process-wide settings, inferred from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    /// Namespace every analysis object lives in.
    pub namespace: String,
    /// Appended to usernames that lack it before Apps lookups.
    pub user_suffix: String,
    pub ingress_class: String,
    pub apps_url: Url,
    pub permissions_url: Url,
    pub status_url: Url,
    /// When false, no PersistentVolume/Claim pair is synthesized.
    pub use_csi_driver: bool,
    pub irods_zone: String,
    pub listen_port: u16,
    pub log_level: String,
    pub vice_proxy_image: String,
    pub file_transfers_image: String,
    /// Concurrent-analysis cap for users without a subscription row.
    pub default_concurrent_limit: i64,
}

impl Config {
    pub fn try_infer() -> Result<Self> {
        Ok(Self {
            namespace: infer_or("VICE_NAMESPACE", "vice-apps".into())?,
            user_suffix: infer_or("VICE_USER_SUFFIX", String::new())?,
            ingress_class: infer_or("VICE_INGRESS_CLASS", "nginx".into())?,
            apps_url: infer("VICE_APPS_URL")?,
            permissions_url: infer("VICE_PERMISSIONS_URL")?,
            status_url: infer("VICE_STATUS_URL")?,
            use_csi_driver: infer_or("VICE_USE_CSI_DRIVER", false)?,
            irods_zone: infer_or("VICE_IRODS_ZONE", "iplant".into())?,
            listen_port: infer_or("VICE_LISTEN_PORT", 60000)?,
            log_level: infer_or("VICE_LOG_LEVEL", "info".into())?,
            vice_proxy_image: infer_or("VICE_PROXY_IMAGE", "discoenv/vice-proxy".into())?,
            file_transfers_image: infer_or(
                "VICE_FILE_TRANSFERS_IMAGE",
                "discoenv/vice-file-transfers".into(),
            )?,
            default_concurrent_limit: infer_or("VICE_DEFAULT_CONCURRENT_LIMIT", 2)?,
        })
    }

    /// The reporter's own hostname, attached to status publications for
    /// provenance.
    pub fn hostname() -> String {
        infer_string("HOSTNAME").unwrap_or_default()
    }
}
