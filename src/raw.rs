#[cfg(target_os = "macos")]
pub mod iokit;
