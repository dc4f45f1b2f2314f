pub mod cleanup;
pub mod job_queue;
pub mod media_engine;
pub mod upload_registry;
pub mod worker;
