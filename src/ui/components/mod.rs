mod key_result;
mod title_prompt;

pub use key_result::KeyResult;
pub use title_prompt::{TitlePrompt, TitleSubmission};
