pub mod aws;
pub mod crm;
pub mod faces;
pub mod metrics;
pub mod retry;
pub mod storage;
