pub mod handlers;
pub mod run;
pub mod validate;
