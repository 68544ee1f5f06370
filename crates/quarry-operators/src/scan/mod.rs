//! Generative stages: rows out of nothing (or out of the parent value).

mod dummy;
mod expression;

pub use dummy::DummyScan;
pub use expression::ExpressionScan;
