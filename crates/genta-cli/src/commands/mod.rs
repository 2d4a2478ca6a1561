pub mod init;
pub mod list_models;
pub mod score;
pub mod simulate;
pub mod validate;
