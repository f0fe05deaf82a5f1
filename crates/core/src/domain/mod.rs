pub mod community;
pub mod contract;
pub mod finance;
pub mod stock;
pub mod subscription;
pub mod survey;
pub mod user;
