pub mod decoder;
pub mod resample;

pub use decoder::{load_signal, load_signal_within};
