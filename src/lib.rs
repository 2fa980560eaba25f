pub mod errors;
pub mod lexer;
pub mod mathlib;
pub mod settings;
pub mod simplify;
pub mod tokens;
