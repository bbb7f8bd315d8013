mod apps;
mod permissions;
mod status;

pub use self::apps::AppsClient;
pub use self::permissions::PermissionsClient;
pub use self::status::{AnalysisStatus, AnalysisStatusPublisher, JobState, JobStatusPublisher};
