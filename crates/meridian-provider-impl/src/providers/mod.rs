pub mod aistudio;
pub mod antigravity;
pub mod claude;
pub mod claudecode;
pub mod codex;
pub mod custom;
pub mod deepseek;
pub mod geminicli;
pub mod http_client;
pub mod nvidia;
pub mod oauth_common;
pub mod openai;
pub mod vertex;
pub mod vertexexpress;
