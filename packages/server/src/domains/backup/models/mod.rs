pub mod backup_job;
pub mod site;
pub mod worker;

pub use backup_job::{archive_file_name, BackupJob, PostgresJobStore, ARCHIVE_EXTENSION, SIGNATURE_SUFFIX};
pub use site::{parse_site_list, site_tag, PostgresSiteStore, Site};
pub use worker::{LogEntry, Worker, WorkerSummary};
