//! Caption handling and token-to-word probability aggregation.

mod aggregate;
mod caption;
mod prediction;
mod span;

pub use aggregate::{char_probabilities, word_probabilities};
pub use caption::Caption;
pub use prediction::{BoundingBox, Prediction};
pub use span::{CharSpan, TokenSpans};
