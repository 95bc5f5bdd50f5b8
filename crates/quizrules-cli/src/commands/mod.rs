pub mod evaluate;
pub mod init;
pub mod score;
pub mod validate;
