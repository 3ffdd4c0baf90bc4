pub mod bloom;
pub mod entity;
pub mod export;
