/// Configuration default values
///
/// All default values for configuration options live here so they can be
/// changed in one place.
// Output defaults
pub const DEFAULT_OUTPUT_DIR: &str = "./wphase-output";
pub const DEFAULT_RUN_LOG_FILE_NAME: &str = "wphase-publish.log";
pub const DEFAULT_ARCHIVE_FILE_NAME: &str = "wphase_seiscomp.xml";
pub const DEFAULT_RESULT_FILE_NAME: &str = "wphase_output.json";

// Event defaults
pub const DEFAULT_AGENCY: &str = "GA";
pub const DEFAULT_EVENT_ID: &str = "unassociated";

// Computation defaults
pub const DEFAULT_COMPUTATION_COMMAND: &str = "wphase";
pub const DEFAULT_COMPUTATION_TIMEOUT_SECONDS: u64 = 30 * 60;

// Messaging defaults
pub const DEFAULT_BUS_URL: &str = "http://localhost:18180";
pub const DEFAULT_BUS_TIMEOUT_SECONDS: u64 = 10;
/// Routing group for focal mechanism notifications; not configurable
pub const FOCAL_MECHANISM_GROUP: &str = "FOCMECH";

// Object store defaults
pub const DEFAULT_OBJECT_STORE_ENDPOINT: &str = "https://s3.amazonaws.com";
pub const DEFAULT_OBJECT_STORE_TIMEOUT_SECONDS: u64 = 60;

// Notification defaults
pub const DEFAULT_NOTIFICATION_TIMEOUT_SECONDS: u64 = 10;
