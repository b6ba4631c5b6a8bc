pub mod openai;
pub mod util;

pub use openai::{ChatOptions, OpenAi};
pub use util::{extract_json_object, strip_code_blocks};
