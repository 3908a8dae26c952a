// Host-side implementations of the card, flash and console interfaces

pub mod console;
pub mod flash;
pub mod image;

pub use console::TerminalConsole;
pub use flash::ImageFlash;
pub use image::ImageStorage;
