#[cfg(feature = "chrome")]
pub mod chrome;
pub mod scripts;

#[cfg(feature = "chrome")]
pub use chrome::ChromeDriver;
