mod job;

pub use job::{Job, JobMessage, STT_JOB_KIND};
