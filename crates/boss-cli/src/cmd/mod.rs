pub mod args;
pub mod aws;
pub mod check_git;
pub mod pipeline;
pub mod setup;
pub mod validate;
pub mod version;
