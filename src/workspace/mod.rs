pub mod history;
pub mod references;
pub mod session;
pub mod tabs;
