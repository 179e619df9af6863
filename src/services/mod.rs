pub mod chunker;
pub mod retry;
pub mod session;
pub mod staging;
pub mod uploader;
