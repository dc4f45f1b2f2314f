pub mod job;
pub mod upload;

pub use job::{JobRecord, JobStatus, JobType};
pub use upload::UploadRecord;
