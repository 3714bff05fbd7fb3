pub mod phoneme;
pub use phoneme::PhonemeEvent;
