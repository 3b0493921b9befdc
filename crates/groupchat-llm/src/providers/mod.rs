mod openai;

pub use openai::{OpenAICompatProvider, ProviderBuilder, ProviderConfig};
