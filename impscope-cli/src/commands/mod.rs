pub mod common;
pub mod headers;
pub mod imports;
pub mod self_image;
pub mod watch;
