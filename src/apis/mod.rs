pub mod anthropic;
pub mod api_client;
pub mod inference_client;
pub mod litellm;
pub mod ollama;
pub mod openai;
pub mod selector;
pub mod tool_prompt;
pub mod transformers;
