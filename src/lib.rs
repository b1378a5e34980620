pub mod config;
pub mod pretrained;
pub mod storage;
pub mod storage_ext;
