pub mod alphabet;

pub use alphabet::{Alphabet, Ambiguity};
