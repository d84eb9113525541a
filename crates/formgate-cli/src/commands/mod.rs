pub mod access;
pub mod form;
pub mod init;
pub mod lease;
pub mod member;
pub mod question;
pub mod results;
pub mod share;
pub mod submit;
