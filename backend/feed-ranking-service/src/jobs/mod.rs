// ============================================
// Background Jobs
// ============================================
//
// Profile refresh: keeps behavior profiles and retention metrics warm for
// recently active users. Runs inside the service process, or once and exit
// with PROFILE_REFRESH_RUN_ONCE=true (e.g. from a Kubernetes CronJob).

pub mod profile_refresh;

pub use profile_refresh::{ProfileRefreshJob, RefreshStats};
