pub mod config;
pub mod error;
pub mod job;
pub mod labels;
pub mod name;

pub mod consts {
    /// Named port for the file-transfers sidecar. Services and pod templates
    /// must agree on the name, never the number.
    pub const FILE_TRANSFERS_PORT_NAME: &str = "file-transfers";
    pub const FILE_TRANSFERS_PORT: i32 = 60001;

    /// Named port for the user-facing proxy sidecar.
    pub const VICE_PROXY_PORT_NAME: &str = "vice-proxy";
    pub const VICE_PROXY_PORT: i32 = 60000;

    /// Container names within an analysis pod.
    pub const ANALYSIS_CONTAINER_NAME: &str = "analysis";
    pub const ANALYSIS_SETUP_CONTAINER_NAME: &str = "analysis-setup";
    pub const FILE_TRANSFERS_CONTAINER_NAME: &str = "file-transfers";
    pub const VICE_PROXY_CONTAINER_NAME: &str = "vice-proxy";

    /// Remote-filesystem (CSI) driver wiring.
    pub const CSI_DRIVER_NAME: &str = "irods.csi.cyverse.org";
    pub const CSI_DRIVER_STORAGE_CLASS: &str = "irods-csi-driver-sc";
    pub const CSI_LOCAL_MOUNT_PATH: &str = "/srv/irods";
    pub const CSI_INPUT_MOUNT_PATH: &str = "/input";
    pub const CSI_OUTPUT_MOUNT_PATH: &str = "/output";
}
