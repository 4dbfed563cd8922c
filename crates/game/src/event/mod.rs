mod types;

pub use types::FeedbackEvent;
