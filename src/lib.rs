pub mod annotation;
pub mod app;
pub mod build_info;
pub mod config;
pub mod coords;
pub mod logging;
pub mod module_ui;
pub mod page;
pub mod prediction;
pub mod results;
pub mod settings;
pub mod transport;
pub mod utils;

pub use app::Explorer;
pub use page::Page;
