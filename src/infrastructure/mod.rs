pub mod link;
pub mod logging;
